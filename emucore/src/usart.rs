//! USART peripheral: one-byte-at-a-time transmit plus an RX ring buffer
//! (spec §4.5, register map §6).

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_bitfields;
use tock_registers::registers::InMemoryRegister;

use crate::nvic::InterruptController;
use crate::status::Status;

register_bitfields![u32,
    pub CR [
        RXEN OFFSET(2) NUMBITS(1) [],
        TXEN OFFSET(3) NUMBITS(1) [],
        RXNEIE OFFSET(5) NUMBITS(1) [],
        TCIE OFFSET(6) NUMBITS(1) [],
        TXEIE OFFSET(7) NUMBITS(1) [],
        UE OFFSET(13) NUMBITS(1) [],
    ],
    pub SR [
        RXNE OFFSET(5) NUMBITS(1) [],
        TC OFFSET(6) NUMBITS(1) [],
        TXE OFFSET(7) NUMBITS(1) [],
    ],
];

const REG_SR: u32 = 0x00;
const REG_DR: u32 = 0x04;
const REG_BRR: u32 = 0x08;
const REG_CR: u32 = 0x0C;

/// RX ring buffer capacity. Not spec-mandated; the spec only requires a
/// "fixed capacity" ring whose `RXNE ⇔ count > 0` invariant holds.
const RX_CAPACITY: usize = 16;

/// Destination for bytes the USART transmits. The CLI wires this to stdout
/// or a log file; tests wire it to a `Vec<u8>`.
pub trait OutputSink {
    fn transmit(&mut self, byte: u8);
}

impl OutputSink for Vec<u8> {
    fn transmit(&mut self, byte: u8) {
        self.push(byte);
    }
}

struct RxRing {
    buf: [u8; RX_CAPACITY],
    head: usize,
    tail: usize,
    count: usize,
}

impl RxRing {
    fn new() -> Self {
        RxRing { buf: [0; RX_CAPACITY], head: 0, tail: 0, count: 0 }
    }

    fn push(&mut self, byte: u8) -> bool {
        if self.count == RX_CAPACITY {
            return false;
        }
        self.buf[self.tail] = byte;
        self.tail = (self.tail + 1) % RX_CAPACITY;
        self.count += 1;
        true
    }

    fn pop(&mut self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % RX_CAPACITY;
        self.count -= 1;
        Some(byte)
    }
}

pub struct Usart {
    irq: usize,
    status: InMemoryRegister<u32, SR::Register>,
    baud: u32,
    control: InMemoryRegister<u32, CR::Register>,
    tx_pending: Option<u8>,
    rx: RxRing,
    sink: Box<dyn OutputSink>,
}

impl Usart {
    pub fn new(irq: usize, sink: Box<dyn OutputSink>) -> Self {
        Usart {
            irq,
            status: InMemoryRegister::new(0),
            baud: 0,
            control: InMemoryRegister::new(0),
            tx_pending: None,
            rx: RxRing::new(),
            sink,
        }
    }

    pub fn reset(&mut self) {
        self.status.set(0);
        self.baud = 0;
        self.control.set(0);
        self.tx_pending = None;
        self.rx = RxRing::new();
    }

    /// Delivers at most one pending TX byte to the sink, then sets TXE/TC
    /// and raises the USART IRQ if TXE-interrupt is enabled.
    pub fn tick(&mut self, ic: &mut InterruptController) {
        if let Some(byte) = self.tx_pending.take() {
            self.sink.transmit(byte);
            self.status.modify(SR::TXE::SET + SR::TC::SET);
            if self.control.is_set(CR::TXEIE) {
                ic.set_pending(self.irq);
            }
        }
    }

    /// Host-side injection of a received byte. Dropped silently if the ring
    /// is full. Raises the USART IRQ if RX-not-empty interrupt is enabled
    /// and the USART is enabled.
    pub fn inject_rx(&mut self, byte: u8, ic: &mut InterruptController) {
        if self.rx.push(byte) {
            self.status.modify(SR::RXNE::SET);
            if self.control.is_set(CR::RXNEIE) && self.control.is_set(CR::UE) {
                ic.set_pending(self.irq);
            }
        }
    }

    fn peek_word(&self, word_offset: u32) -> u32 {
        match word_offset {
            REG_SR => self.status.get(),
            REG_DR => 0, // reading DATA is a side-effecting pop, not idempotent
            REG_BRR => self.baud,
            REG_CR => self.control.get(),
            _ => 0,
        }
    }

    fn read_word_effectful(&mut self, word_offset: u32) -> u32 {
        match word_offset {
            REG_DR => {
                let byte = self.rx.pop().unwrap_or(0);
                if self.rx.count == 0 {
                    self.status.modify(SR::RXNE::CLEAR);
                }
                byte as u32
            }
            _ => self.peek_word(word_offset),
        }
    }

    fn write_word(&mut self, word_offset: u32, value: u32) {
        match word_offset {
            REG_SR => self.status.set(self.status.get() & value),
            REG_DR => {
                if self.control.is_set(CR::UE) {
                    self.tx_pending = Some(value as u8);
                    self.status.modify(SR::TXE::CLEAR + SR::TC::CLEAR);
                }
            }
            REG_BRR => self.baud = value,
            REG_CR => self.control.set(value),
            _ => {}
        }
    }

    pub fn bus_read(&mut self, offset: u32, size: u8) -> u32 {
        let word_offset = offset & !0x3;
        let shift = (offset & 0x3) * 8;
        let word = self.read_word_effectful(word_offset);
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
