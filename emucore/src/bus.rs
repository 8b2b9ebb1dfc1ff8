//! Address-range router to memory banks and peripheral register pages
//! (spec §4.1).
//!
//! Implements the "tagged variants with static match" dispatch alternative
//! from spec §9 rather than a boxed trait-object region list: the regions
//! are a small, fixed set known at compile time (flash alias, flash, SRAM,
//! timer, USART), so a `Vec` of owned region descriptors dispatching to
//! concrete fields avoids both the aliasing hazard of a shared-pointer
//! graph and the lifetime gymnastics of borrowed trait objects, while still
//! presenting the spec's "ordered region list, first match wins" contract.

use crate::memory::MemoryBank;
use crate::nvic::InterruptController;
use crate::status::Status;
use crate::timer::Timer;
use crate::usart::Usart;

pub const FLASH_ALIAS_BASE: u32 = 0x0000_0000;
pub const FLASH_BASE: u32 = 0x0800_0000;
pub const FLASH_SIZE: u32 = 64 * 1024;
pub const SRAM_BASE: u32 = 0x2000_0000;
pub const SRAM_SIZE: u32 = 20 * 1024;
pub const TIMER_BASE: u32 = 0x4000_0000;
pub const TIMER_SIZE: u32 = 0x400;
pub const USART_BASE: u32 = 0x4001_3800;
pub const USART_SIZE: u32 = 0x400;

pub const TIMER_IRQ: usize = 28;
pub const USART_IRQ: usize = 37;

#[derive(Clone, Copy)]
enum Target {
    Flash,
    Sram,
    Timer,
    Usart,
}

struct Region {
    base: u32,
    size: u32,
    target: Target,
}

/// Routes bus accesses to flash, SRAM, and the two modeled peripherals.
pub struct Bus {
    regions: Vec<Region>,
    pub flash: MemoryBank,
    pub sram: MemoryBank,
    pub timer: Timer,
    pub usart: Usart,
}

impl Bus {
    pub fn new(usart_sink: Box<dyn crate::usart::OutputSink>) -> Self {
        let regions = vec![
            Region { base: FLASH_ALIAS_BASE, size: FLASH_SIZE, target: Target::Flash },
            Region { base: FLASH_BASE, size: FLASH_SIZE, target: Target::Flash },
            Region { base: SRAM_BASE, size: SRAM_SIZE, target: Target::Sram },
            Region { base: TIMER_BASE, size: TIMER_SIZE, target: Target::Timer },
            Region { base: USART_BASE, size: USART_SIZE, target: Target::Usart },
        ];
        Bus {
            regions,
            flash: MemoryBank::new(FLASH_SIZE as usize, false),
            sram: MemoryBank::new(SRAM_SIZE as usize, true),
            timer: Timer::new(TIMER_IRQ),
            usart: Usart::new(USART_IRQ, usart_sink),
        }
    }

    pub fn reset_peripherals(&mut self) {
        self.timer.reset();
        self.usart.reset();
        // Flash is never cleared on reset (spec §3); SRAM retains content
        // too — only peripheral register state resets.
    }

    pub fn tick_peripherals(&mut self, ic: &mut InterruptController) {
        self.timer.tick(ic);
        self.usart.tick(ic);
    }

    /// Finds the first region (in registration order) containing `addr`,
    /// returning its target, the offset from its base, and whether a
    /// `size`-byte access starting there still fits inside the region.
    fn locate(&self, addr: u32, size: u8) -> Option<(Target, u32, bool)> {
        for region in &self.regions {
            if addr >= region.base && addr < region.base + region.size {
                let offset = addr - region.base;
                let fits = offset + size as u32 <= region.size;
                return Some((region.target, offset, fits));
            }
        }
        None
    }

    /// Little-endian read of `size` (1/2/4) bytes at the absolute address
    /// `addr`. Misses and partial-past-end accesses read as 0.
    pub fn read(&mut self, addr: u32, size: u8) -> u32 {
        match self.locate(addr, size) {
            None => {
                log::trace!("bus: read miss at {addr:#010x}");
                0
            }
            Some((_, _, false)) => 0,
            Some((Target::Flash, offset, true)) => self.flash.read(offset, size),
            Some((Target::Sram, offset, true)) => self.sram.read(offset, size),
            Some((Target::Timer, offset, true)) => self.timer.bus_read(offset, size),
            Some((Target::Usart, offset, true)) => self.usart.bus_read(offset, size),
        }
    }

    /// Little-endian write of `size` (1/2/4) bytes at the absolute address
    /// `addr`. Misses return `InvalidAddress`; region-specific write
    /// semantics (e.g. flash read-only) are delegated.
    pub fn write(&mut self, addr: u32, value: u32, size: u8) -> Status {
        match self.locate(addr, size) {
            None => {
                log::trace!("bus: write miss at {addr:#010x}");
                Status::InvalidAddress
            }
            Some((_, _, false)) => Status::InvalidAddress,
            Some((Target::Flash, offset, true)) => self.flash.write(offset, value, size),
            Some((Target::Sram, offset, true)) => self.sram.write(offset, value, size),
            Some((Target::Timer, offset, true)) => self.timer.bus_write(offset, value, size),
            Some((Target::Usart, offset, true)) => self.usart.bus_write(offset, value, size),
        }
    }

    pub fn read_bytes(&mut self, addr: u32, out: &mut [u8]) {
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.read(addr.wrapping_add(i as u32), 1) as u8;
        }
    }

    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Status {
        for (i, &byte) in data.iter().enumerate() {
            let status = self.write(addr.wrapping_add(i as u32), byte as u32, 1);
            if status != Status::Ok {
                return status;
            }
        }
        Status::Ok
    }
}
