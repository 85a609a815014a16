//! Loader for the initial machine state.
//!
//! The input is made of four sections, each closed by `%`:
//!
//! ```text
//! 7 0 0 1 %        registers
//! 72 105 %         data memory
//! OAAJ ADDD %      program, execution starts right after it
//! %                data appended to the instruction memory
//! ```
//!
//! Every entry is a dexary word: digits `0-9` shift by 10, `A-P` (worth
//! 0 to 15) by 16, `Q-X` (0 to 7) by 8 and `Y`/`Z` (1 and 0) by 2. The shift
//! applied is the one of the digit being added, so `1A` is `1 * 16 + 0`.
//! Any other byte inside a word counts like `Z`.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::error;
use std::fmt;
use std::io::{self, BufRead};

use crate::console::next_byte;
use crate::processor::{Processor, REGISTER_COUNT};

use super::{scale, Word, MEMORY_SIZE, SECTION_END};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    NumberTooLarge,
    ValueOutOfRange { value: u32 },
    SectionOverflow { capacity: usize },
    Io { kind: io::ErrorKind },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::NumberTooLarge => f.write_str("number does not fit in 32 bits"),
            ParseErrorKind::ValueOutOfRange { value } => {
                write!(f, "value `{}` does not fit in a 16 bit cell", value)
            }
            ParseErrorKind::SectionOverflow { capacity } => {
                write!(f, "section holds at most {} words", capacity)
            }
            ParseErrorKind::Io { kind } => write!(f, "failed to read input ({:?})", kind),
        }
    }
}

/// The four sections of the input, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Registers,
    Memory,
    Program,
    Data,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Section::Registers => "registers",
            Section::Memory => "memory",
            Section::Program => "program",
            Section::Data => "data",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: ParseErrorKind,
    context: Option<Cow<'static, str>>,
    section: Section,
    word_nr: usize,
}

impl ParseError {
    fn new<C, S>(kind: ParseErrorKind, context: C, section: Section, word_nr: usize) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
            section,
            word_nr,
        }
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    pub fn section(&self) -> Section {
        self.section
    }

    /// One-based position of the offending word inside its section
    pub fn word_nr(&self) -> usize {
        self.word_nr
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(
                f,
                "error [{} word {}]: {} - {}",
                self.section, self.word_nr, self.kind, context
            )
        } else {
            write!(
                f,
                "error [{} word {}]: {}",
                self.section, self.word_nr, self.kind
            )
        }
    }
}

impl error::Error for ParseError {}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Returns `(base, value)` of a dexary digit. Bytes outside the digit
/// ranges shift by 2 and add nothing, the same as `Z`.
pub fn digit(byte: u8) -> (u32, u32) {
    match byte {
        b'0'..=b'9' => (10, u32::from(byte - b'0')),
        b'A'..=b'P' => (16, u32::from(byte - b'A')),
        b'Q'..=b'X' => (8, u32::from(byte - b'Q')),
        b'Y' => (2, 1),
        _ => (2, 0),
    }
}

/// Shifts `acc` by the base of `byte` and adds its value.
fn push_digit(acc: u32, byte: u8) -> Result<u32, ParseErrorKind> {
    let (base, value) = digit(byte);

    acc.checked_mul(base)
        .and_then(|acc| acc.checked_add(value))
        .ok_or(ParseErrorKind::NumberTooLarge)
}

/// Decodes a single dexary word.
///
/// # Examples
///
/// ```
/// use mik::memory::parse::decode_word;
///
/// assert_eq!(decode_word("PP"), Ok(255));
/// assert_eq!(decode_word("FF"), Ok(85));
/// assert_eq!(decode_word("1A"), Ok(16));
/// ```
pub fn decode_word(word: &str) -> Result<u32, ParseErrorKind> {
    word.bytes().try_fold(0, push_digit)
}

/// Separates words inside a section
pub fn is_blank(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | 0x0B | 0x0C)
}

fn to_cell(value: u32) -> Result<Word, ParseErrorKind> {
    Word::try_from(value).map_err(|_| ParseErrorKind::ValueOutOfRange { value })
}

#[derive(Debug)]
pub struct Parser<'a, R> {
    input: &'a mut R,
    section: Section,
    word_nr: usize,
    /// Set once the input ran out; every following section is empty.
    exhausted: bool,
}

impl<'a, R: BufRead> Parser<'a, R> {
    /// Creates a new parser reading the initial state from `input`.
    pub fn new(input: &'a mut R) -> Self {
        Self {
            input,
            section: Section::Registers,
            word_nr: 0,
            exhausted: false,
        }
    }

    /// Consumes `self` and loads all four sections into a fresh processor.
    ///
    /// Reading stops right after the `%` closing the data section, so the
    /// rest of the input stays available to the running program.
    ///
    /// # Errors
    ///
    /// Fails on the first word that is malformed or does not fit its
    /// section. Nothing past the destination is written in that case.
    pub fn parse(mut self) -> Result<Processor> {
        let mut cpu = Processor::default();

        let registers = &mut cpu.registers;
        self.parse_section(Section::Registers, REGISTER_COUNT, |index, value| {
            registers[index] = scale(value);
            Ok(())
        })?;

        let memory = &mut cpu.memory;
        self.parse_section(Section::Memory, MEMORY_SIZE, |index, value| {
            memory.write(index, to_cell(value)?);
            Ok(())
        })?;

        let program = &mut cpu.program;
        let entry = self.parse_section(Section::Program, MEMORY_SIZE, |index, value| {
            program.write(index, to_cell(value)?);
            Ok(())
        })?;

        self.parse_section(Section::Data, MEMORY_SIZE - entry, |index, value| {
            program.write(entry + index, to_cell(value)?);
            Ok(())
        })?;

        // A full program section wraps the entry point back to the start.
        cpu.pc = scale(entry as i64);
        log::debug!("Entry point 0x{:02X}", cpu.pc);

        Ok(cpu)
    }

    /// Reads one section, handing each word to `store` together with its
    /// index. Returns the number of words stored.
    fn parse_section<F>(&mut self, section: Section, capacity: usize, mut store: F) -> Result<usize>
    where
        F: FnMut(usize, u32) -> Result<(), ParseErrorKind>,
    {
        self.section = section;
        self.word_nr = 0;

        while let Some((value, closed)) = self.next_word()? {
            if self.word_nr > capacity {
                return Err(self.error(
                    ParseErrorKind::SectionOverflow { capacity },
                    Some(format!("word `{}` has no cell left", value).into()),
                ));
            }

            store(self.word_nr - 1, value).map_err(|kind| self.error(kind, None))?;

            if closed {
                break;
            }
        }

        log::debug!("Loaded {} words into {}", self.word_nr, section);

        Ok(self.word_nr)
    }

    /// Returns the next word of the current section and whether it also
    /// closed the section. `None` once the section is over.
    fn next_word(&mut self) -> Result<Option<(u32, bool)>> {
        loop {
            match self.next_byte()? {
                None => return Ok(None),
                Some(SECTION_END) => return Ok(None),
                Some(byte) if is_blank(byte) => continue,
                Some(first) => {
                    self.word_nr += 1;
                    return self.read_word(first).map(Some);
                }
            }
        }
    }

    fn read_word(&mut self, first: u8) -> Result<(u32, bool)> {
        let mut acc = self.push_digit(0, first)?;

        loop {
            match self.next_byte()? {
                None | Some(SECTION_END) => return Ok((acc, true)),
                Some(byte) if is_blank(byte) => return Ok((acc, false)),
                Some(byte) => acc = self.push_digit(acc, byte)?,
            }
        }
    }

    fn push_digit(&self, acc: u32, byte: u8) -> Result<u32> {
        push_digit(acc, byte).map_err(|kind| self.error(kind, None))
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.exhausted {
            return Ok(None);
        }

        let byte = next_byte(&mut *self.input).map_err(|err| {
            self.error(ParseErrorKind::Io { kind: err.kind() }, Some(err.to_string().into()))
        })?;

        if byte.is_none() {
            log::debug!("Input ended inside the {} section", self.section);
            self.exhausted = true;
        }

        Ok(byte)
    }

    fn error(&self, kind: ParseErrorKind, context: Option<Cow<'static, str>>) -> ParseError {
        ParseError::new::<_, Cow<'static, str>>(kind, context, self.section, self.word_nr)
    }
}
