//! Interpreter for the MIK engine: a sixteen register machine with 256
//! cells of data memory and 256 cells of instruction memory.
//!
//! The initial state is loaded with [`memory::parse::Parser`], then
//! [`processor::Processor::execute_until_halt`] runs it.

pub mod console;
pub mod memory;
pub mod processor;
