//! System calls, reached through `SYS a bc` with the selector `bc`.
//!
//! Calls that read input report success in the register after `a`:
//! `1` when a value was read, `0` at the end of input.

use std::convert::TryFrom;
use std::io::{self, BufRead, Write};

use color_eyre::eyre::{Result, WrapErr};
use log::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{next_register, Processor};
use crate::console::Console;
use crate::memory::{write_section, Byte, MEMORY_SIZE};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(TryFromPrimitive, IntoPrimitive)]
pub enum SystemCall {
    /// Write the whole machine state to the error stream
    CoreDump = 0,
    /// Read a decimal integer into `a`
    ReadInteger = 1,
    /// Write `a` as a decimal integer
    WriteInteger = 2,
    /// Read one character into `a`
    ReadChar = 3,
    /// Write `a` as a character
    WriteChar = 4,
    /// Write the zero terminated string starting at memory cell `a`
    WriteString = 5,
}

impl Processor {
    /// Dispatches system call `selector` on register `a`. Unknown
    /// selectors do nothing.
    pub fn system_call<R, W, E>(
        &mut self,
        a: u8,
        selector: Byte,
        console: &mut Console<R, W, E>,
    ) -> Result<()>
    where
        R: BufRead,
        W: Write,
        E: Write,
    {
        let call = match SystemCall::try_from(selector) {
            Ok(call) => call,
            Err(_) => {
                debug!("Ignoring unknown system call {}", selector);
                return Ok(());
            }
        };
        let next = next_register(a);

        match call {
            SystemCall::CoreDump => self
                .core_dump(&mut console.error)
                .wrap_err("Failed to write core dump")?,
            SystemCall::ReadInteger => {
                match console.read_integer().wrap_err("Failed to read integer")? {
                    Some(value) => {
                        self.set(next, 1);
                        self.set(a, value);
                    }
                    None => self.set(next, 0),
                }
            }
            SystemCall::WriteInteger => write!(console.output, "{}", self.get(a))
                .wrap_err("Failed to write integer")?,
            SystemCall::ReadChar => match console.read_byte().wrap_err("Failed to read character")? {
                Some(byte) => {
                    self.set(next, 1);
                    self.set(a, byte);
                }
                None => self.set(next, 0),
            },
            SystemCall::WriteChar => console
                .write_byte(self.get(a))
                .wrap_err("Failed to write character")?,
            SystemCall::WriteString => {
                let start = usize::from(self.get(a));
                let bytes: Vec<u8> = self.memory.data[start..]
                    .iter()
                    .take_while(|&&cell| cell != 0)
                    .map(|&cell| cell as u8)
                    .collect();
                console
                    .output
                    .write_all(&bytes)
                    .wrap_err("Failed to write string")?;
            }
        }

        Ok(())
    }

    /// Writes the machine state in the loader's section format: registers,
    /// data memory, then the instruction memory split at the program counter.
    pub fn core_dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let pc = usize::from(self.pc);

        write_section(out, &self.registers)?;
        write_section(out, &self.memory.data)?;
        write_section(out, &self.program.data[..pc])?;
        write_section(out, &self.program.data[pc..MEMORY_SIZE])?;

        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::parse::Parser;
    use crate::processor::{Instruction, Opcode, REGISTER_COUNT};

    type TestConsole = Console<&'static [u8], Vec<u8>, Vec<u8>>;

    fn console(input: &'static [u8]) -> TestConsole {
        Console::new(input, Vec::new(), Vec::new())
    }

    fn syscall(cpu: &mut Processor, a: u8, call: SystemCall, console: &mut TestConsole) -> Result<()> {
        let selector = u8::from(call);
        let instruction = Instruction::new(Opcode::SYS, a, selector >> 4, selector);
        cpu.program.write(usize::from(cpu.pc), instruction.encode());
        cpu.step(console)?;

        Ok(())
    }

    #[test]
    fn test_write_integer() -> Result<()> {
        let mut cpu = Processor::default();
        let mut console = console(b"");
        cpu.registers[2] = 255;
        syscall(&mut cpu, 2, SystemCall::WriteInteger, &mut console)?;
        cpu.registers[2] = 7;
        syscall(&mut cpu, 2, SystemCall::WriteInteger, &mut console)?;

        assert_eq!(String::from_utf8(console.output)?, "2557");

        Ok(())
    }

    #[test]
    fn test_read_integer() -> Result<()> {
        let mut cpu = Processor::default();
        let mut console = console(b" -3 x");

        syscall(&mut cpu, 4, SystemCall::ReadInteger, &mut console)?;
        assert_eq!(cpu.registers[4], 253);
        assert_eq!(cpu.registers[5], 1);

        syscall(&mut cpu, 4, SystemCall::ReadInteger, &mut console)?;
        assert_eq!(cpu.registers[4], 253);
        assert_eq!(cpu.registers[5], 0);

        Ok(())
    }

    #[test]
    fn test_read_integer_flag_wraps() -> Result<()> {
        let mut cpu = Processor::default();
        let mut console = console(b"300");

        syscall(&mut cpu, 15, SystemCall::ReadInteger, &mut console)?;
        assert_eq!(cpu.registers[15], 44);
        assert_eq!(cpu.registers[0], 1);

        Ok(())
    }

    #[test]
    fn test_read_char() -> Result<()> {
        let mut cpu = Processor::default();
        let mut console = console(b"A");

        syscall(&mut cpu, 0, SystemCall::ReadChar, &mut console)?;
        assert_eq!(cpu.registers[0], b'A');
        assert_eq!(cpu.registers[1], 1);

        syscall(&mut cpu, 0, SystemCall::ReadChar, &mut console)?;
        assert_eq!(cpu.registers[0], b'A');
        assert_eq!(cpu.registers[1], 0);

        Ok(())
    }

    #[test]
    fn test_write_char() -> Result<()> {
        let mut cpu = Processor::default();
        let mut console = console(b"");
        cpu.registers[0] = b'o';
        cpu.registers[1] = b'k';
        syscall(&mut cpu, 0, SystemCall::WriteChar, &mut console)?;
        syscall(&mut cpu, 1, SystemCall::WriteChar, &mut console)?;

        assert_eq!(console.output, b"ok");

        Ok(())
    }

    #[test]
    fn test_write_string() -> Result<()> {
        let mut cpu = Processor::default();
        let mut console = console(b"");
        cpu.memory
            .write_array(0x20, &[u16::from(b'h'), u16::from(b'i'), 0, u16::from(b'x')]);
        cpu.registers[3] = 0x20;
        syscall(&mut cpu, 3, SystemCall::WriteString, &mut console)?;

        assert_eq!(console.output, b"hi");

        Ok(())
    }

    #[test]
    fn test_write_string_stops_at_memory_end() -> Result<()> {
        let mut cpu = Processor::default();
        let mut console = console(b"");
        cpu.memory.write(0xFE, u16::from(b'a'));
        cpu.memory.write(0xFF, u16::from(b'b'));
        cpu.memory.write(0x00, u16::from(b'c'));
        cpu.registers[0] = 0xFE;
        syscall(&mut cpu, 0, SystemCall::WriteString, &mut console)?;

        assert_eq!(console.output, b"ab");

        Ok(())
    }

    #[test]
    fn test_unknown_system_call() -> Result<()> {
        let mut cpu = Processor::default();
        let mut console = console(b"");
        cpu.registers[0] = 9;
        cpu.program.write(0, 0xF0FF);
        cpu.step(&mut console)?;

        let mut expected = Processor::new(1);
        expected.registers[0] = 9;
        expected.program.write(0, 0xF0FF);
        assert_eq!(cpu, expected);
        assert!(console.output.is_empty());
        assert!(console.error.is_empty());

        Ok(())
    }

    #[test]
    fn test_core_dump_format() -> Result<()> {
        let mut cpu = Processor::new(2);
        cpu.registers[0] = 5;
        cpu.registers[2] = 1;
        cpu.memory.write(1, 9);
        cpu.program.write_array(0, &[0xE0FF, 0x0111, 0x0042]);

        let mut out = Vec::new();
        cpu.core_dump(&mut out)?;

        assert_eq!(
            String::from_utf8(out)?,
            "\n5 \n0 \n1 \n%\n\n0 \n9 \n%\n\n57599 \n273 \n%\n\n66 \n%\n"
        );

        Ok(())
    }

    #[test]
    fn test_core_dump_goes_to_error_stream() -> Result<()> {
        let mut cpu = Processor::default();
        let mut console = console(b"");
        syscall(&mut cpu, 0, SystemCall::CoreDump, &mut console)?;

        assert!(console.output.is_empty());
        // the dump happens after the fetch, so the program section holds the
        // system call itself
        assert_eq!(
            String::from_utf8(console.error)?,
            "\n%\n\n%\n\n61440 \n%\n\n%\n"
        );

        Ok(())
    }

    #[test]
    fn test_zero_registers_round_trip() -> Result<()> {
        let zeros = vec!["0"; REGISTER_COUNT].join(" ");
        let text = format!("{} %%%%", zeros);
        let mut input = text.as_bytes();
        let cpu = Parser::new(&mut input).parse()?;

        let mut out = Vec::new();
        cpu.core_dump(&mut out)?;
        let dump = String::from_utf8(out)?;

        assert!(dump.starts_with("\n%\n"));
        let mut input = dump.as_bytes();
        assert_eq!(Parser::new(&mut input).parse()?.registers, [0; REGISTER_COUNT]);

        Ok(())
    }

    #[test]
    fn test_dump_reloads() -> Result<()> {
        let mut cpu = Processor::new(3);
        cpu.registers = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 200];
        cpu.memory.write_array(0x10, &[4, 0, 65535]);
        cpu.program.write_array(0, &[0xE0FF, 0xF002, 0x0111, 0x4242, 0, 0x1234]);

        let mut out = Vec::new();
        cpu.core_dump(&mut out)?;
        let mut input = out.as_slice();

        assert_eq!(Parser::new(&mut input).parse()?, cpu);

        Ok(())
    }
}
