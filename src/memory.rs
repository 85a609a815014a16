use std::io::{self, Write};

pub mod parse;

pub type Byte = u8; // register width
pub type Word = u16; // memory cell / instruction width

/// Number of cells in both the data and the instruction memory
pub const MEMORY_SIZE: usize = 256;

/// Closes a section in the loader and dump text format
pub const SECTION_END: u8 = b'%';

/// Default memory
pub type StdMem = Memory<MEMORY_SIZE>;

/// Wraps `value` into the range of a register, `[0, 255]`.
///
/// Negative values wrap around instead of being truncated, so `scale(-1)`
/// is `255`.
pub fn scale<T: Into<i64>>(value: T) -> Byte {
    value.into().rem_euclid(256) as Byte
}

/// Emulates one of the flat memories of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Memory<const S: usize> {
    /// The actual data of the memory
    pub data: [Word; S],
}

impl<const S: usize> Default for Memory<S> {
    /// Initializes the memory
    fn default() -> Self {
        Memory { data: [0; S] }
    }
}

impl<const S: usize> Memory<S> {
    /// Reads a cell. Addresses wrap around the end of the memory.
    pub fn read(&self, address: usize) -> Word {
        self.data[address % S]
    }

    /// Writes a cell. Addresses wrap around the end of the memory.
    pub fn write(&mut self, address: usize, value: Word) {
        self.data[address % S] = value;
    }

    /// Writes an array of words to the memory
    pub fn write_array(&mut self, position: usize, data: &[Word]) {
        for (offset, &word) in data.iter().enumerate() {
            self.write(position + offset, word);
        }
    }
}

/// Writes `cells` as one section of the loader text format: every value on
/// its own line, closed by `%`. Trailing zero cells are left out.
pub fn write_section<W, T>(out: &mut W, cells: &[T]) -> io::Result<()>
where
    W: Write,
    T: Copy + Into<u64>,
{
    let used = cells
        .iter()
        .rposition(|&cell| cell.into() != 0)
        .map_or(0, |last| last + 1);

    for &cell in &cells[..used] {
        write!(out, "\n{} ", cell.into())?;
    }
    writeln!(out, "\n{}", SECTION_END as char)
}

/// Writes a block of instructions directly into the memory
// Thanks for @Shemnei for helping me with this!
#[macro_export]
macro_rules! write_instructions {
    ( $mem:ident : $pos:expr => $( $word:expr ),+ ) => {
        $mem.write_array($pos, &[
            $(
                $word as $crate::memory::Word,
            )+
        ]);
    };
}
