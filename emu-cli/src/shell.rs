//! Interactive line-oriented shell: `help`, `load`, `run`, `stop`, `step`,
//! `reset`, `reg`, `mem`, `break`, `delete`, `uart`, `quit`. Grounded in the
//! original's `ui.c` command table, reimplemented as a tolerant REPL over
//! stdin that prints an error and keeps going rather than exiting on a bad
//! command.

use std::io::{self, BufRead, Write};

use emucore::status::Status;
use emucore::Simulator;

use crate::error::EmuError;

const COMMANDS: &[(&str, &str)] = &[
    ("help", "Show this help message"),
    ("load", "Load binary: load <path>"),
    ("run", "Run until breakpoint or error"),
    ("stop", "Stop execution"),
    ("step", "Step N instructions: step [N]"),
    ("reset", "Reset the simulator"),
    ("reg", "Display registers"),
    ("mem", "Read memory: mem <addr> [count]"),
    ("break", "Set or list breakpoints: break [addr]"),
    ("delete", "Delete breakpoint: delete <addr>"),
    ("uart", "Send a byte to the USART RX line: uart <char>"),
    ("quit", "Exit the simulator"),
];

fn parse_addr(text: &str) -> Result<u32, EmuError> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|_| EmuError::BadAddress(text.to_string()))
    } else {
        text.parse::<u32>().map_err(|_| EmuError::BadAddress(text.to_string()))
    }
}

fn print_help() {
    println!("Available commands:");
    for (name, help) in COMMANDS {
        println!("  {name:<10} {help}");
    }
}

fn print_registers(sim: &Simulator) {
    let regs = sim.read_registers();
    let names = [
        "R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7", "R8", "R9", "R10", "R11", "R12", "SP",
        "LR", "PC",
    ];
    for (chunk_idx, chunk) in names.chunks(4).enumerate() {
        for (i, name) in chunk.iter().enumerate() {
            print!("{name:<4}= {:#010x}  ", regs[chunk_idx * 4 + i]);
        }
        println!();
    }
    let xpsr = regs[16];
    println!(
        "xPSR= {xpsr:#010x}  [{}{}{}{}]",
        if sim.core.n() { 'N' } else { '-' },
        if sim.core.z() { 'Z' } else { '-' },
        if sim.core.c() { 'C' } else { '-' },
        if sim.core.v() { 'V' } else { '-' },
    );
}

fn print_mem(sim: &mut Simulator, addr: u32, len: usize) {
    let mut buf = vec![0u8; len];
    sim.read_memory(addr, &mut buf);
    for (i, chunk) in buf.chunks(16).enumerate() {
        print!("{:#010x}:", addr + (i * 16) as u32);
        for byte in chunk {
            print!(" {byte:02x}");
        }
        print!("  |");
        for byte in chunk {
            let c = *byte as char;
            print!("{}", if c.is_ascii_graphic() || c == ' ' { c } else { '.' });
        }
        println!("|");
    }
}

fn list_breakpoints(sim: &Simulator) {
    let mut addrs: Vec<u32> = sim.breakpoints.iter().collect();
    addrs.sort_unstable();
    if addrs.is_empty() {
        println!("no breakpoints set");
    }
    for addr in addrs {
        println!("breakpoint at {addr:#010x}");
    }
}

fn print_status(status: Status, sim: &Simulator) {
    println!("-> {status:?} (PC={:#010x})", sim.core.pc());
}

/// Runs the REPL to completion (on `quit` or EOF on stdin).
pub fn run(sim: &mut Simulator) -> io::Result<()> {
    println!("STM32F103C8T6 Simulator");
    println!("Type 'help' for available commands\n");

    let stdin = io::stdin();
    print!("stm32> ");
    io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        match words.next() {
            None => {}
            Some("help") => print_help(),
            Some("load") => match words.next() {
                Some(path) => match std::fs::read(path) {
                    Ok(image) => {
                        sim.load(&image);
                        println!("loaded {} bytes from {path}", image.len());
                    }
                    Err(e) => println!("error: {e}"),
                },
                None => println!("usage: load <path>"),
            },
            Some("run") => {
                println!("Running...");
                let status = sim.run();
                print_status(status, sim);
            }
            Some("stop") => {
                sim.halt();
                println!("Halted");
            }
            Some("step") => {
                let n = words.next().and_then(|s| s.parse::<u32>().ok()).unwrap_or(1);
                let mut status = Status::Ok;
                for i in 0..n {
                    status = sim.step_instruction();
                    if status != Status::Ok {
                        println!("stopped at step {}", i + 1);
                        break;
                    }
                }
                print_status(status, sim);
            }
            Some("reset") => {
                sim.reset();
                println!("reset");
            }
            Some("reg") => print_registers(sim),
            Some("mem") => match words.next().map(parse_addr) {
                Some(Ok(addr)) => {
                    let len = words.next().and_then(|s| s.parse::<usize>().ok()).unwrap_or(64);
                    print_mem(sim, addr, len.min(1024));
                }
                _ => println!("usage: mem <addr> [count]"),
            },
            Some("break") => match words.next() {
                None => list_breakpoints(sim),
                Some(addr) => match parse_addr(addr) {
                    Ok(addr) => {
                        sim.add_breakpoint(addr);
                        println!("breakpoint set at {addr:#010x}");
                    }
                    Err(_) => println!("invalid address"),
                },
            },
            Some("delete") => match words.next().map(parse_addr) {
                Some(Ok(addr)) => {
                    sim.remove_breakpoint(addr);
                    println!("breakpoint removed at {addr:#010x}");
                }
                _ => println!("usage: delete <addr>"),
            },
            Some("uart") => match words.next().and_then(|s| s.chars().next()) {
                Some(c) => {
                    sim.bus.usart.inject_rx(c as u8, &mut sim.ic);
                    println!("sent {c:?} to UART");
                }
                None => println!("usage: uart <char>"),
            },
            Some("quit") => break,
            Some(other) => println!("Unknown command: '{other}'. Type 'help' for list."),
        }
        print!("stm32> ");
        io::stdout().flush()?;
    }
    println!("Goodbye.");
    Ok(())
}
