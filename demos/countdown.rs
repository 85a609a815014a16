use std::io::{self, BufWriter};

use color_eyre::eyre::Result;

use mik::console::Console;
use mik::memory::Byte;
use mik::processor::Processor;
use mik::write_instructions;
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// The program is placed here and execution starts at its first word.
const ENTRYPOINT: Byte = 0x10;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap(); // logging

    let mut cpu = Processor::new(ENTRYPOINT);
    let program = &mut cpu.program;

    // prints 9 down to 1, one number per line
    write_instructions!(program : ENTRYPOINT as usize =>
        0xE009, // ldc r0, 9
        0xF002, // sys r0, write integer
        0xE10A, // ldc r1, '\n'
        0xF104, // sys r1, write char
        0xE201, // ldc r2, 1
        0x3002, // sub r0, r0, r2
        0x9011, // jnz r0, 0x11
        0x0333  // halt r3
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut console = Console::new(stdin.lock(), BufWriter::new(stdout.lock()), io::stderr());
    cpu.execute_until_halt(&mut console)?;

    Ok(())
}
