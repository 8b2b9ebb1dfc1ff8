//! ARM Cortex-M3 core: register file, xPSR, fetch/decode/execute loop, and
//! exception entry/exit (spec §4.6–§4.7).

pub mod decode;
pub mod flags;

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_bitfields;
use tock_registers::registers::InMemoryRegister;

use crate::bus::Bus;
use crate::nvic::InterruptController;
use crate::status::Status;

register_bitfields![u32,
    pub XPSR [
        N OFFSET(31) NUMBITS(1) [],
        Z OFFSET(30) NUMBITS(1) [],
        C OFFSET(29) NUMBITS(1) [],
        V OFFSET(28) NUMBITS(1) [],
        T OFFSET(24) NUMBITS(1) [],
    ],
];

pub const NUM_REGISTERS: usize = 16;
pub const R_SP: usize = 13;
pub const R_LR: usize = 14;
pub const R_PC: usize = 15;
/// Debugger-surface register index for xPSR (spec §4.9: "16 is xPSR").
pub const R_XPSR: usize = 16;

/// Mask recognizing any EXC_RETURN token (spec §6): top 28 bits all 1.
fn is_exc_return(value: u32) -> bool {
    value & 0xFFFF_FFF0 == 0xFFFF_FFF0
}

/// EXC_RETURN value produced on exception entry here: thread mode, main
/// stack. 0xFFFFFFF1 (handler mode) and 0xFFFFFFFD (thread/PSP) are never
/// produced but are still recognized on exit.
pub const EXC_RETURN_THREAD_MSP: u32 = 0xFFFF_FFF9;

pub struct Core {
    registers: [u32; NUM_REGISTERS],
    xpsr: InMemoryRegister<u32, XPSR::Register>,
    interruptible: bool,
    current_irq: u32,
    cycles_executed: u64,
    halted: bool,
    /// Set by an instruction handler that wrote PC explicitly; cleared and
    /// consulted once per `step()` (spec §4.6, "PC advancement").
    pc_written: bool,
}

impl Core {
    pub fn new() -> Self {
        Core {
            registers: [0; NUM_REGISTERS],
            xpsr: InMemoryRegister::new(0),
            interruptible: true,
            current_irq: 0,
            cycles_executed: 0,
            halted: false,
            pc_written: false,
        }
    }

    /// Reads the initial SP and reset-handler PC from the vector table at
    /// absolute 0x0, clears the general registers, and sets only the Thumb
    /// bit in xPSR.
    pub fn reset(&mut self, bus: &mut Bus) {
        let sp = bus.read(0, 4);
        let entry = bus.read(4, 4) & !1;
        self.registers = [0; NUM_REGISTERS];
        self.registers[R_SP] = sp;
        self.registers[R_PC] = entry;
        self.xpsr.set(0);
        self.xpsr.modify(XPSR::T::SET);
        self.interruptible = true;
        self.current_irq = 0;
        self.cycles_executed = 0;
        self.halted = false;
        log::debug!("core: reset sp={sp:#010x} pc={entry:#010x}");
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn cycles_executed(&self) -> u64 {
        self.cycles_executed
    }

    pub fn current_irq(&self) -> u32 {
        self.current_irq
    }

    pub fn pc(&self) -> u32 {
        self.registers[R_PC]
    }

    pub fn register(&self, index: usize) -> u32 {
        if index == R_XPSR {
            self.xpsr.get()
        } else {
            self.registers[index]
        }
    }

    pub fn set_register(&mut self, index: usize, value: u32) {
        if index == R_XPSR {
            self.xpsr.set(value);
        } else if index < NUM_REGISTERS {
            self.registers[index] = value;
        }
    }

    /// R0–R15 followed by xPSR, for the debugger surface's "read all
    /// registers".
    pub fn all_registers(&self) -> [u32; NUM_REGISTERS + 1] {
        let mut out = [0u32; NUM_REGISTERS + 1];
        out[..NUM_REGISTERS].copy_from_slice(&self.registers);
        out[NUM_REGISTERS] = self.xpsr.get();
        out
    }

    pub fn set_all_registers(&mut self, regs: &[u32; NUM_REGISTERS + 1]) {
        self.registers.copy_from_slice(&regs[..NUM_REGISTERS]);
        self.xpsr.set(regs[NUM_REGISTERS]);
    }

    pub fn n(&self) -> bool {
        self.xpsr.is_set(XPSR::N)
    }

    pub fn z(&self) -> bool {
        self.xpsr.is_set(XPSR::Z)
    }

    pub fn c(&self) -> bool {
        self.xpsr.is_set(XPSR::C)
    }

    pub fn v(&self) -> bool {
        self.xpsr.is_set(XPSR::V)
    }

    pub fn set_nz(&mut self, n: bool, z: bool) {
        self.xpsr.modify(
            (if n { XPSR::N::SET } else { XPSR::N::CLEAR })
                + (if z { XPSR::Z::SET } else { XPSR::Z::CLEAR }),
        );
    }

    pub fn set_nzcv(&mut self, n: bool, z: bool, c: bool, v: bool) {
        self.xpsr.modify(
            (if n { XPSR::N::SET } else { XPSR::N::CLEAR })
                + (if z { XPSR::Z::SET } else { XPSR::Z::CLEAR })
                + (if c { XPSR::C::SET } else { XPSR::C::CLEAR })
                + (if v { XPSR::V::SET } else { XPSR::V::CLEAR }),
        );
    }

    pub fn set_c(&mut self, c: bool) {
        self.xpsr.modify(if c { XPSR::C::SET } else { XPSR::C::CLEAR });
    }

    /// The single site where PC is assigned from a computed value (spec
    /// §9's "EXC_RETURN detection site"): every branch-like write —
    /// BX, POP-into-PC, MOV/ADD-into-PC, direct branches — funnels through
    /// here so exception return is never missed.
    pub fn branch_to(&mut self, target: u32, bus: &mut Bus, ic: &mut InterruptController) {
        if is_exc_return(target) {
            self.exception_return(bus, ic);
        } else {
            self.registers[R_PC] = target & !1;
            self.pc_written = true;
        }
    }

    fn exception_return(&mut self, bus: &mut Bus, ic: &mut InterruptController) {
        let sp = self.registers[R_SP];
        self.registers[0] = bus.read(sp, 4);
        self.registers[1] = bus.read(sp + 4, 4);
        self.registers[2] = bus.read(sp + 8, 4);
        self.registers[3] = bus.read(sp + 12, 4);
        self.registers[12] = bus.read(sp + 16, 4);
        self.registers[R_LR] = bus.read(sp + 20, 4);
        self.registers[R_PC] = bus.read(sp + 24, 4) & !1;
        self.xpsr.set(bus.read(sp + 28, 4));
        self.registers[R_SP] = sp.wrapping_add(32);
        self.pc_written = true;

        let irq = self.current_irq.wrapping_sub(1) as usize;
        ic.complete(irq);
        self.current_irq = 0;
        log::debug!("core: exception return irq={irq} pc={:#010x}", self.registers[R_PC]);
    }

    fn enter_exception(&mut self, irq: usize, bus: &mut Bus, ic: &mut InterruptController) {
        let sp = self.registers[R_SP].wrapping_sub(32);
        self.registers[R_SP] = sp;
        bus.write(sp, self.registers[0], 4);
        bus.write(sp + 4, self.registers[1], 4);
        bus.write(sp + 8, self.registers[2], 4);
        bus.write(sp + 12, self.registers[3], 4);
        bus.write(sp + 16, self.registers[12], 4);
        bus.write(sp + 20, self.registers[R_LR], 4);
        bus.write(sp + 24, self.registers[R_PC], 4);
        bus.write(sp + 28, self.xpsr.get(), 4);

        self.registers[R_LR] = EXC_RETURN_THREAD_MSP;
        let vector_addr = (16 + irq as u32) * 4;
        let handler = bus.read(vector_addr, 4) & !1;
        self.registers[R_PC] = handler;

        ic.acknowledge(irq);
        self.current_irq = irq as u32 + 1;
        log::debug!("core: exception entry irq={irq} handler={handler:#010x}");
    }

    /// Fetch, decode, execute one instruction, then check for a preemptable
    /// IRQ (spec §4.7, "Entry is triggered by the core after a completed
    /// instruction").
    pub fn step(&mut self, bus: &mut Bus, ic: &mut InterruptController) -> Status {
        if self.halted {
            return Status::Halted;
        }

        let instr_addr = self.registers[R_PC];
        let hi = bus.read(instr_addr, 2) as u16;
        let is_32bit = matches!((hi >> 11) & 0x1F, 0b11101 | 0b11110 | 0b11111);
        let (lo, size) = if is_32bit {
            (Some(bus.read(instr_addr.wrapping_add(2), 2) as u16), 4u32)
        } else {
            (None, 2u32)
        };

        self.pc_written = false;
        let status = decode::execute(self, hi, lo, instr_addr, bus, ic);
        if status.is_fatal() {
            return status;
        }

        if !self.pc_written {
            self.registers[R_PC] = instr_addr.wrapping_add(size);
        }
        self.cycles_executed += 1;

        if self.interruptible {
            if let Some(irq) = ic.next_preemptable() {
                self.enter_exception(irq, bus, ic);
            }
        }
        Status::Ok
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}
