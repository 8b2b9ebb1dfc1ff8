//! General-purpose timer peripheral: prescaled up-counter with an
//! overflow-driven update interrupt (spec §4.4, register map §6).

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_bitfields;
use tock_registers::registers::InMemoryRegister;

use crate::nvic::InterruptController;
use crate::status::Status;

register_bitfields![u32,
    pub CR [
        CEN OFFSET(0) NUMBITS(1) [],
    ],
    pub DIER [
        UIE OFFSET(0) NUMBITS(1) [],
    ],
    pub SR [
        UIF OFFSET(0) NUMBITS(1) [],
    ],
];

const REG_CR: u32 = 0x00;
const REG_DIER: u32 = 0x0C;
const REG_SR: u32 = 0x10;
const REG_CNT: u32 = 0x24;
const REG_PSC: u32 = 0x28;
const REG_ARR: u32 = 0x2C;

pub struct Timer {
    irq: usize,
    control: InMemoryRegister<u32, CR::Register>,
    interrupt_enable: InMemoryRegister<u32, DIER::Register>,
    status: InMemoryRegister<u32, SR::Register>,
    count: u32,
    prescaler_reload: u32,
    auto_reload: u32,
    prescaler_counter: u32,
}

impl Timer {
    pub fn new(irq: usize) -> Self {
        Timer {
            irq,
            control: InMemoryRegister::new(0),
            interrupt_enable: InMemoryRegister::new(0),
            status: InMemoryRegister::new(0),
            count: 0,
            prescaler_reload: 0,
            auto_reload: 0,
            prescaler_counter: 0,
        }
    }

    pub fn reset(&mut self) {
        self.control.set(0);
        self.interrupt_enable.set(0);
        self.status.set(0);
        self.count = 0;
        self.prescaler_reload = 0;
        self.auto_reload = 0;
        self.prescaler_counter = 0;
    }

    /// Advances the prescaler and, on overflow, the main counter. Raises
    /// the configured IRQ through `ic` when the update-interrupt is both
    /// enabled and the counter wraps.
    pub fn tick(&mut self, ic: &mut InterruptController) {
        if !self.control.is_set(CR::CEN) {
            return;
        }
        self.prescaler_counter += 1;
        if self.prescaler_counter > self.prescaler_reload {
            self.prescaler_counter = 0;
            self.count += 1;
            if self.auto_reload != 0 && self.count >= self.auto_reload {
                self.count = 0;
                self.status.modify(SR::UIF::SET);
                if self.interrupt_enable.is_set(DIER::UIE) {
                    ic.set_pending(self.irq);
                }
            }
        }
    }

    fn peek_word(&self, word_offset: u32) -> u32 {
        match word_offset {
            REG_CR => self.control.get(),
            REG_DIER => self.interrupt_enable.get(),
            REG_SR => self.status.get(),
            REG_CNT => self.count,
            REG_PSC => self.prescaler_reload,
            REG_ARR => self.auto_reload,
            _ => 0,
        }
    }

    fn write_word(&mut self, word_offset: u32, value: u32) {
        match word_offset {
            REG_CR => self.control.set(value),
            REG_DIER => self.interrupt_enable.set(value),
            // Write-zero-to-clear: a written 0 bit clears the corresponding
            // hardware-set status bit; a written 1 bit leaves it untouched.
            REG_SR => self.status.set(self.status.get() & value),
            REG_CNT => self.count = value,
            REG_PSC => self.prescaler_reload = value,
            REG_ARR => self.auto_reload = value,
            _ => {}
        }
    }

    pub fn bus_read(&self, offset: u32, size: u8) -> u32 {
        let word_offset = offset & !0x3;
        let shift = (offset & 0x3) * 8;
        let word = self.peek_word(word_offset);
        extract(word, shift, size)
    }

    pub fn bus_write(&mut self, offset: u32, value: u32, size: u8) -> Status {
        let word_offset = offset & !0x3;
        let shift = (offset & 0x3) * 8;
        let current = self.peek_word(word_offset);
        let merged = merge(current, value, shift, size);
        self.write_word(word_offset, merged);
        Status::Ok
    }
}

fn width_mask(size: u8) -> u32 {
    match size {
        1 => 0xFF,
        2 => 0xFFFF,
        _ => 0xFFFF_FFFF,
    }
}

fn extract(word: u32, shift: u32, size: u8) -> u32 {
    (word >> shift) & width_mask(size)
}

fn merge(current: u32, value: u32, shift: u32, size: u8) -> u32 {
    let mask = width_mask(size) << shift;
    (current & !mask) | ((value << shift) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_timer_does_not_count() {
        let mut timer = Timer::new(28);
        let mut ic = InterruptController::new();
        timer.bus_write(REG_ARR, 5, 4);
        for _ in 0..10 {
            timer.tick(&mut ic);
        }
        assert_eq!(timer.bus_read(REG_CNT, 4), 0);
    }

    #[test]
    fn overflow_sets_status_and_raises_irq() {
        let mut timer = Timer::new(28);
        let mut ic = InterruptController::new();
        ic.enable(28);
        ic.set_priority(28, 1);

        timer.bus_write(REG_ARR, 5, 4);
        timer.bus_write(REG_DIER, 1, 4); // UIE
        timer.bus_write(REG_CR, 1, 4); // CEN

        for _ in 0..5 {
            timer.tick(&mut ic);
        }
        assert_eq!(timer.bus_read(REG_CNT, 4), 0, "count wraps at ARR");
        assert_eq!(timer.bus_read(REG_SR, 4) & 1, 1, "UIF set");
        assert!(ic.is_pending(28));
    }

    #[test]
    fn status_write_zero_to_clear() {
        let mut timer = Timer::new(28);
        let mut ic = InterruptController::new();
        timer.bus_write(REG_ARR, 1, 4);
        timer.bus_write(REG_CR, 1, 4);
        timer.tick(&mut ic);
        assert_eq!(timer.bus_read(REG_SR, 4) & 1, 1);
        timer.bus_write(REG_SR, 0, 4);
        assert_eq!(timer.bus_read(REG_SR, 4) & 1, 0);
    }

    #[test]
    fn count_never_exceeds_auto_reload() {
        let mut timer = Timer::new(28);
        let mut ic = InterruptController::new();
        timer.bus_write(REG_ARR, 3, 4);
        timer.bus_write(REG_CR, 1, 4);
        for _ in 0..20 {
            timer.tick(&mut ic);
            assert!(timer.bus_read(REG_CNT, 4) <= 3);
        }
    }
}
