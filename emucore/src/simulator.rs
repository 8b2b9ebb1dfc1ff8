//! Drives the core/bus/interrupt-controller aggregate through `step()`
//! and `run()` (spec §4.8).

use crate::breakpoints::Breakpoints;
use crate::bus::Bus;
use crate::cpu::Core;
use crate::nvic::InterruptController;
use crate::status::Status;
use crate::usart::OutputSink;

pub struct Simulator {
    pub core: Core,
    pub bus: Bus,
    pub ic: InterruptController,
    pub breakpoints: Breakpoints,
}

impl Simulator {
    pub fn new(usart_sink: Box<dyn OutputSink>) -> Self {
        let mut sim = Simulator {
            core: Core::new(),
            bus: Bus::new(usart_sink),
            ic: InterruptController::new(),
            breakpoints: Breakpoints::new(),
        };
        sim.core.reset(&mut sim.bus);
        sim
    }

    /// Copies `image` into flash at offset 0, then resets (spec §4.8).
    pub fn load(&mut self, image: &[u8]) {
        self.bus.flash.load_image(image);
        self.reset();
    }

    /// Idempotent: resets peripherals, the interrupt controller, and the
    /// core's registers from the (possibly just-loaded) vector table.
    pub fn reset(&mut self) {
        self.bus.reset_peripherals();
        self.ic.reset();
        self.core.reset(&mut self.bus);
    }

    /// Idempotent: halting an already-halted core is a no-op.
    pub fn halt(&mut self) {
        self.core.halt();
    }

    pub fn is_halted(&self) -> bool {
        self.core.is_halted()
    }

    /// Peripheral ticks (registration order), then a core step, then a
    /// breakpoint check against the new PC (spec §4.8, §5).
    pub fn step(&mut self) -> Status {
        if self.core.is_halted() {
            return Status::Halted;
        }
        self.bus.tick_peripherals(&mut self.ic);
        let status = self.core.step(&mut self.bus, &mut self.ic);
        if status.is_fatal() {
            self.core.halt();
            return status;
        }
        if self.breakpoints.contains(self.core.pc()) {
            self.core.halt();
            return Status::BreakpointHit;
        }
        status
    }

    /// Loops `step()` until halted, a fatal status, or a breakpoint fires.
    pub fn run(&mut self) -> Status {
        loop {
            match self.step() {
                Status::Ok => continue,
                other => return other,
            }
        }
    }
}
