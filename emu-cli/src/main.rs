//! `emu-cli`: loads a flash image into the `emucore` simulator, then either
//! drives it through an interactive shell or exposes a GDB RSP server.

mod error;
mod gdb;
mod shell;

use std::path::PathBuf;

use clap::Parser;
use emucore::usart::OutputSink;
use emucore::Simulator;

use error::EmuError;

/// Cycle-coarse STM32F103 / Cortex-M3 emulator.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Raw binary image loaded at flash offset 0.
    #[arg(long)]
    flash: PathBuf,

    /// Start a GDB RSP server on this address instead of the shell.
    #[arg(long, value_name = "ADDR:PORT")]
    gdb: Option<String>,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,
}

struct StdoutSink;

impl OutputSink for StdoutSink {
    fn transmit(&mut self, byte: u8) {
        use std::io::Write;
        print!("{}", byte as char);
        let _ = std::io::stdout().flush();
    }
}

fn level_from_counts(verbose: u8, quiet: u8) -> log::LevelFilter {
    let base = 2i8; // Info
    let level = (base + verbose as i8 - quiet as i8).clamp(0, 4);
    match level {
        0 => log::LevelFilter::Off,
        1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new().filter_level(level_from_counts(cli.verbose, cli.quiet)).init();

    let image = std::fs::read(&cli.flash)
        .map_err(|source| EmuError::FlashLoad { path: cli.flash.clone(), source })?;
    let mut sim = Simulator::new(Box::new(StdoutSink));
    sim.load(&image);
    log::info!("loaded {} bytes from {:?}", image.len(), cli.flash);

    match cli.gdb {
        Some(addr) => gdb::serve(&mut sim, &addr)?,
        None => shell::run(&mut sim)?,
    }
    Ok(())
}
