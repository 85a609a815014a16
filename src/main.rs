use std::env;
use std::io::{self, BufWriter};
use std::process;

use color_eyre::eyre::{eyre, Result, WrapErr};
use log::LevelFilter;
use mik::console::Console;
use mik::memory::parse::Parser;
use simple_logger::SimpleLogger;

/// Environment variable holding the log level
const LOG_ENV: &str = "MIK_LOG";

/// Logging is off unless asked for, log lines would mix with program output.
fn log_level() -> Result<LevelFilter> {
    match env::var(LOG_ENV) {
        Ok(level) => level
            .parse()
            .map_err(|_| eyre!("Invalid log level `{}` in {}", level, LOG_ENV)),
        Err(_) => Ok(LevelFilter::Off),
    }
}

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().with_level(log_level()?).init()?; // logging

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut console = Console::new(stdin.lock(), BufWriter::new(stdout.lock()), io::stderr());

    let mut cpu = Parser::new(&mut console.input)
        .parse()
        .wrap_err("Failed to load the initial machine state")?;
    let status = cpu.execute_until_halt(&mut console)?;

    drop(console);
    process::exit(i32::from(status));
}
