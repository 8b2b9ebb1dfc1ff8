//! Interrupt controller: priority-ordered selection over 43 IRQ lines
//! (spec §4.3).
//!
//! Named after the real Cortex-M NVIC, but this is not a memory-mapped
//! register block — it is the plain Rust state the bus's timer/usart
//! register pages and the core's exception-entry logic both call into
//! directly, per the design note in spec §9 ("pass an IC handle into each
//! tick() call" rather than a shared mutable pointer graph).

/// Number of modeled external interrupt lines.
pub const NUM_IRQS: usize = 43;

/// "No active IRQ" sentinel for `current_priority`.
pub const NO_ACTIVE_PRIORITY: u8 = 0xFF;

#[derive(Clone, Copy, Default)]
struct IrqLine {
    pending: bool,
    active: bool,
    enabled: bool,
    priority: u8,
}

/// Priority-ordered interrupt controller.
///
/// Invariant: an IRQ is never simultaneously pending and active as a result
/// of the same event (`acknowledge` clears pending and sets active in one
/// call). `current_priority` always equals the minimum priority over active
/// IRQs, or `NO_ACTIVE_PRIORITY` when none are active.
pub struct InterruptController {
    lines: [IrqLine; NUM_IRQS],
    current_priority: u8,
}

impl InterruptController {
    pub fn new() -> Self {
        InterruptController {
            lines: [IrqLine::default(); NUM_IRQS],
            current_priority: NO_ACTIVE_PRIORITY,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn set_pending(&mut self, irq: usize) {
        if let Some(line) = self.lines.get_mut(irq) {
            line.pending = true;
        }
    }

    pub fn clear_pending(&mut self, irq: usize) {
        if let Some(line) = self.lines.get_mut(irq) {
            line.pending = false;
        }
    }

    pub fn is_pending(&self, irq: usize) -> bool {
        self.lines.get(irq).is_some_and(|l| l.pending)
    }

    pub fn is_active(&self, irq: usize) -> bool {
        self.lines.get(irq).is_some_and(|l| l.active)
    }

    pub fn enable(&mut self, irq: usize) {
        if let Some(line) = self.lines.get_mut(irq) {
            line.enabled = true;
        }
    }

    pub fn disable(&mut self, irq: usize) {
        if let Some(line) = self.lines.get_mut(irq) {
            line.enabled = false;
        }
    }

    pub fn is_enabled(&self, irq: usize) -> bool {
        self.lines.get(irq).is_some_and(|l| l.enabled)
    }

    pub fn set_priority(&mut self, irq: usize, priority: u8) {
        if let Some(line) = self.lines.get_mut(irq) {
            line.priority = priority;
        }
    }

    pub fn priority(&self, irq: usize) -> u8 {
        self.lines.get(irq).map_or(NO_ACTIVE_PRIORITY, |l| l.priority)
    }

    pub fn current_priority(&self) -> u8 {
        self.current_priority
    }

    /// Most urgent pending-and-enabled IRQ strictly more urgent than the
    /// priority of the currently active handler, ties broken by lowest IRQ
    /// number. Numerically lower priority is more urgent.
    pub fn next_preemptable(&self) -> Option<usize> {
        let mut best: Option<(usize, u8)> = None;
        for (irq, line) in self.lines.iter().enumerate() {
            if !line.pending || !line.enabled {
                continue;
            }
            if line.priority >= self.current_priority {
                continue;
            }
            match best {
                Some((_, best_prio)) if line.priority >= best_prio => {}
                _ => best = Some((irq, line.priority)),
            }
        }
        best.map(|(irq, _)| irq)
    }

    /// Atomically clears pending, sets active, and raises `current_priority`
    /// to this IRQ's priority.
    pub fn acknowledge(&mut self, irq: usize) {
        if let Some(line) = self.lines.get_mut(irq) {
            line.pending = false;
            line.active = true;
            self.current_priority = line.priority;
            log::debug!("nvic: acknowledge irq={irq} priority={}", line.priority);
        }
    }

    /// Clears active and recomputes `current_priority` as the minimum
    /// priority across all remaining active IRQs (or `NO_ACTIVE_PRIORITY`).
    pub fn complete(&mut self, irq: usize) {
        if let Some(line) = self.lines.get_mut(irq) {
            line.active = false;
        }
        self.current_priority = self
            .lines
            .iter()
            .filter(|l| l.active)
            .map(|l| l.priority)
            .min()
            .unwrap_or(NO_ACTIVE_PRIORITY);
        log::debug!("nvic: complete irq={irq} current_priority={}", self.current_priority);
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preemption_requires_strictly_higher_urgency() {
        let mut ic = InterruptController::new();
        ic.enable(5);
        ic.set_priority(5, 10);
        ic.set_pending(5);
        ic.acknowledge(5);
        assert_eq!(ic.current_priority(), 10);

        ic.enable(6);
        ic.set_priority(6, 10);
        ic.set_pending(6);
        assert_eq!(ic.next_preemptable(), None, "equal priority must not preempt");

        ic.set_priority(6, 5);
        assert_eq!(ic.next_preemptable(), Some(6));
    }

    #[test]
    fn ties_broken_by_lowest_irq_number() {
        let mut ic = InterruptController::new();
        for irq in [10usize, 3, 7] {
            ic.enable(irq);
            ic.set_priority(irq, 1);
            ic.set_pending(irq);
        }
        assert_eq!(ic.next_preemptable(), Some(3));
    }

    #[test]
    fn complete_recomputes_min_priority_over_remaining_active() {
        let mut ic = InterruptController::new();
        ic.enable(1);
        ic.set_priority(1, 20);
        ic.set_pending(1);
        ic.acknowledge(1);

        ic.enable(2);
        ic.set_priority(2, 5);
        ic.set_pending(2);
        ic.acknowledge(2);
        assert_eq!(ic.current_priority(), 5);

        ic.complete(2);
        assert_eq!(ic.current_priority(), 20);

        ic.complete(1);
        assert_eq!(ic.current_priority(), NO_ACTIVE_PRIORITY);
    }

    #[test]
    fn out_of_range_irq_is_ignored() {
        let mut ic = InterruptController::new();
        ic.set_pending(1000);
        ic.enable(1000);
        assert_eq!(ic.next_preemptable(), None);
    }

    #[test]
    fn disabled_irq_never_preempts() {
        let mut ic = InterruptController::new();
        ic.set_priority(4, 1);
        ic.set_pending(4);
        assert_eq!(ic.next_preemptable(), None);
    }
}
