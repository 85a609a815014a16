use std::convert::TryFrom;
use std::fmt;
use std::io::{BufRead, Write};

use crate::console::Console;
use crate::memory::{scale, Byte, StdMem, Word, MEMORY_SIZE};
use color_eyre::eyre::{Result, WrapErr};
use log::*;
use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;

pub mod syscall;

/// Number of general purpose registers
pub const REGISTER_COUNT: usize = 16;

// The program counter is a `Byte` and wraps exactly at the end of the
// instruction memory.
const _: () = assert!(MEMORY_SIZE == Byte::MAX as usize + 1);

/// Emulates the MIK engine: registers, both memories and the program counter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Processor {
    /// Program counter, index of the next instruction
    pub pc: Byte,
    /// General purpose registers
    pub registers: [Byte; REGISTER_COUNT],
    /// Data memory
    pub memory: StdMem,
    /// Instruction memory
    pub program: StdMem,
}

impl Default for Processor {
    /// Initializes a zeroed machine
    fn default() -> Self {
        Self::new(0)
    }
}

/// What the driver should do after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Stop the machine, the value is the exit status
    Halt(Byte),
}

impl Processor {
    /// Initializes a zeroed machine starting at `entrypoint`
    pub fn new(entrypoint: Byte) -> Self {
        Self {
            pc: entrypoint,
            registers: [0; REGISTER_COUNT],
            memory: StdMem::default(),
            program: StdMem::default(),
        }
    }

    fn get(&self, index: u8) -> Byte {
        self.registers[usize::from(index)]
    }

    /// Every register write goes through here so values stay in `[0, 255]`
    fn set<T: Into<i64>>(&mut self, index: u8, value: T) {
        self.registers[usize::from(index)] = scale(value);
    }

    /// Reads a data memory cell, `address` wraps around the memory
    fn load<T: Into<usize>>(&self, address: T) -> Word {
        self.memory.read(address.into())
    }

    fn store<T: Into<usize>>(&mut self, address: T, value: Byte) {
        self.memory.write(address.into(), Word::from(value));
    }

    /// Executes a single decoded instruction. The program counter must
    /// already point past it.
    pub fn execute_instruction<R, W, E>(
        &mut self,
        instruction: Instruction,
        console: &mut Console<R, W, E>,
    ) -> Result<Control>
    where
        R: BufRead,
        W: Write,
        E: Write,
    {
        let Instruction { a, b, c, .. } = instruction;
        let imm = instruction.immediate();
        let next = next_register(a);
        let pc = self.pc;

        match instruction.operation() {
            Operation::Divide => {
                let divisor = self.get(c);
                if divisor != 0 {
                    let dividend = self.get(b);
                    self.set(a, dividend / divisor);
                    self.set(next, dividend % divisor);
                }
            }
            Operation::Push => {
                self.set(a, i64::from(self.get(a)) - 1);
                self.store(self.get(a), self.get(b));
            }
            Operation::Halt => return Ok(Control::Halt(self.get(a))),
            Operation::Recall => {
                self.pc = scale(self.load(self.get(a)));
                self.set(
                    a,
                    i64::from(self.get(a)) + i64::from(self.get(c)) + 1,
                );
                self.set(b, pc);
            }
            Operation::Pop => {
                self.set(b, self.load(self.get(a)));
                self.set(a, i64::from(self.get(a)) + 1);
            }
            Operation::Return => {
                self.pc = self.get(c);
                self.set(a, pc);
            }
            Operation::Less => self.set(a, u8::from(self.get(b) < self.get(c))),
            Operation::ShiftLeft => self.set(a, i64::from(self.get(b)) << 1),
            Operation::Subtract => self.set(a, i64::from(self.get(b)) - i64::from(self.get(c))),
            Operation::ShiftRight => self.set(a, self.get(b) >> 1),
            Operation::LoadIndexed => {
                let address = usize::from(self.get(b)) + usize::from(self.get(c));
                self.set(a, self.load(address));
            }
            Operation::Add => self.set(a, i64::from(self.get(b)) + i64::from(self.get(c))),
            Operation::StoreIndexed => {
                let address = scale(i64::from(self.get(b)) + i64::from(self.get(c)));
                self.store(address, self.get(a));
            }
            Operation::Or => self.set(a, self.get(b) | self.get(c)),
            Operation::Multiply => {
                // The low byte uses the operands as they are after the high
                // byte was written, which matters when `a + 1` is `b` or `c`.
                self.set(next, u16::from(self.get(b)) * u16::from(self.get(c)) / 256);
                self.set(a, u16::from(self.get(b)) * u16::from(self.get(c)) % 256);
            }
            Operation::And => self.set(a, self.get(b) & self.get(c)),
            Operation::CallIndexed => {
                let address = usize::from(self.get(a)) + usize::from(self.get(b));
                self.pc = scale(self.load(address));
                self.set(a, pc);
            }
            Operation::Xor => self.set(a, self.get(b) ^ self.get(c)),
            Operation::JumpIfZero => {
                if self.get(a) == 0 {
                    self.pc = imm;
                }
            }
            Operation::JumpIfNotZero => {
                if self.get(a) != 0 {
                    self.pc = imm;
                }
            }
            Operation::CallSubroutine => {
                self.set(a, pc);
                self.pc = imm;
            }
            Operation::Call => {
                self.set(a, i64::from(self.get(a)) - 1);
                self.store(self.get(a), pc);
                self.pc = imm;
            }
            Operation::Load => self.set(a, self.load(imm)),
            Operation::Store => self.store(imm, self.get(a)),
            Operation::LoadConstant => self.set(a, imm),
            Operation::SystemCall => self.system_call(a, imm, console)?,
        }

        Ok(Control::Continue)
    }

    /// Runs one execution step: fetch, advance the program counter, decode
    /// and execute
    pub fn step<R, W, E>(&mut self, console: &mut Console<R, W, E>) -> Result<Control>
    where
        R: BufRead,
        W: Write,
        E: Write,
    {
        let address = self.pc;
        let word = self.program.read(usize::from(address));
        self.pc = self.pc.wrapping_add(1);

        let instruction = Instruction::decode(word)
            .wrap_err_with(|| format!("Invalid instruction at 0x{:02X}", address))?;
        trace!("{:02X}: {:04X} {}", address, word, instruction);

        self.execute_instruction(instruction, console)
    }

    /// Run program until it halts, returning the exit status
    pub fn execute_until_halt<R, W, E>(&mut self, console: &mut Console<R, W, E>) -> Result<Byte>
    where
        R: BufRead,
        W: Write,
        E: Write,
    {
        loop {
            if let Control::Halt(status) = self.step(console)? {
                console.flush().wrap_err("Failed to flush program output")?;
                info!("Program halted at 0x{:02X}. Status: {}", self.pc, status);
                return Ok(status);
            }
        }
    }
}

/// Register following `index`, wrapping around the register file
fn next_register(index: u8) -> u8 {
    (index + 1) % REGISTER_COUNT as u8
}

macro_rules! opcodes {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $repr:literal , )+ ) => {
        /// The sixteen opcodes, stored in the top nibble of an instruction.
        /// Opcodes 0 to 7 each stand for two or three operations, see
        /// [`Instruction::operation`].
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Opcode {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl Opcode {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name) , )+
                }
            }
        }

        impl ::std::fmt::Display for Opcode {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }
    }
}

opcodes! {
    /// Divide, push or halt
    DIV = 0x0,
    /// Recall, pop or return
    RET = 0x1,
    /// Less than or shift left
    CMP = 0x2,
    /// Subtract or shift right
    SUB = 0x3,
    /// Indexed load or add
    LDX = 0x4,
    /// Indexed store or bitwise or
    STX = 0x5,
    /// Multiply or bitwise and
    MUL = 0x6,
    /// Indexed call or bitwise xor
    CLX = 0x7,
    /// Jump to `bc` if `a` is zero
    JZ = 0x8,
    /// Jump to `bc` if `a` is not zero
    JNZ = 0x9,
    /// Store the return address in `a` and jump to `bc`
    JSR = 0xA,
    /// Push the return address on the stack pointed to by `a` and jump to `bc`
    CALL = 0xB,
    /// Load memory cell `bc` into `a`
    LD = 0xC,
    /// Store `a` into memory cell `bc`
    ST = 0xD,
    /// Load constant `bc` into `a`
    LDC = 0xE,
    /// System call `bc` on register `a`
    SYS = 0xF,
}

/// A concrete operation, selected from the opcode and the operand indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Divide,
    Push,
    Halt,
    Recall,
    Pop,
    Return,
    Less,
    ShiftLeft,
    Subtract,
    ShiftRight,
    LoadIndexed,
    Add,
    StoreIndexed,
    Or,
    Multiply,
    And,
    CallIndexed,
    Xor,
    JumpIfZero,
    JumpIfNotZero,
    CallSubroutine,
    Call,
    Load,
    Store,
    LoadConstant,
    SystemCall,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Divide => "div",
            Operation::Push => "push",
            Operation::Halt => "halt",
            Operation::Recall => "recall",
            Operation::Pop => "pop",
            Operation::Return => "ret",
            Operation::Less => "lt",
            Operation::ShiftLeft => "shl",
            Operation::Subtract => "sub",
            Operation::ShiftRight => "shr",
            Operation::LoadIndexed => "ldx",
            Operation::Add => "add",
            Operation::StoreIndexed => "stx",
            Operation::Or => "or",
            Operation::Multiply => "mul",
            Operation::And => "and",
            Operation::CallIndexed => "callx",
            Operation::Xor => "xor",
            Operation::JumpIfZero => "jz",
            Operation::JumpIfNotZero => "jnz",
            Operation::CallSubroutine => "jsr",
            Operation::Call => "call",
            Operation::Load => "ld",
            Operation::Store => "st",
            Operation::LoadConstant => "ldc",
            Operation::SystemCall => "sys",
        })
    }
}

/// An unpacked instruction word: `opcode:4 a:4 b:4 c:4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub a: u8,
    pub b: u8,
    pub c: u8,
}

impl Instruction {
    /// Builds an instruction, operands are cut down to their low nibble
    pub fn new(opcode: Opcode, a: u8, b: u8, c: u8) -> Self {
        Self {
            opcode,
            a: a & 0xF,
            b: b & 0xF,
            c: c & 0xF,
        }
    }

    pub fn decode(word: Word) -> Result<Self> {
        let opcode = (word >> 12) as u8;
        let opcode = Opcode::try_from(opcode)
            .wrap_err_with(|| format!("Invalid opcode: 0x{:X}", opcode))?;

        Ok(Self::new(
            opcode,
            (word >> 8) as u8,
            (word >> 4) as u8,
            word as u8,
        ))
    }

    pub fn encode(self) -> Word {
        Word::from(u8::from(self.opcode)) << 12
            | Word::from(self.a) << 8
            | Word::from(self.b) << 4
            | Word::from(self.c)
    }

    /// The `b` and `c` fields read as one byte, `b * 16 + c`
    pub fn immediate(self) -> Byte {
        self.b << 4 | self.c
    }

    /// Picks the operation. Opcodes 0 to 7 choose by comparing the operand
    /// indices with each other, never the register contents.
    pub fn operation(self) -> Operation {
        let Self { opcode, a, b, c } = self;

        match opcode {
            Opcode::DIV if b != c => Operation::Divide,
            Opcode::DIV if a != b => Operation::Push,
            Opcode::DIV => Operation::Halt,
            Opcode::RET if a == b => Operation::Return,
            Opcode::RET if a == c => Operation::Pop,
            Opcode::RET => Operation::Recall,
            Opcode::CMP if b != c => Operation::Less,
            Opcode::CMP => Operation::ShiftLeft,
            Opcode::SUB if b != c => Operation::Subtract,
            Opcode::SUB => Operation::ShiftRight,
            Opcode::LDX if b <= c => Operation::LoadIndexed,
            Opcode::LDX => Operation::Add,
            Opcode::STX if b <= c => Operation::StoreIndexed,
            Opcode::STX => Operation::Or,
            Opcode::MUL if b <= c => Operation::Multiply,
            Opcode::MUL => Operation::And,
            Opcode::CLX if b <= c => Operation::CallIndexed,
            Opcode::CLX => Operation::Xor,
            Opcode::JZ => Operation::JumpIfZero,
            Opcode::JNZ => Operation::JumpIfNotZero,
            Opcode::JSR => Operation::CallSubroutine,
            Opcode::CALL => Operation::Call,
            Opcode::LD => Operation::Load,
            Opcode::ST => Operation::Store,
            Opcode::LDC => Operation::LoadConstant,
            Opcode::SYS => Operation::SystemCall,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} r{:X} r{:X} r{:X}",
            self.operation(),
            self.a,
            self.b,
            self.c
        )
    }
}
