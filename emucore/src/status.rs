//! Closed set of outcomes returned by fallible bus and core operations.
//!
//! Mirrors the original emulator's `common/status.h`: a small enum, not a
//! `Result<_, E>` chain, because callers (the bus, the core, the debugger
//! surface) need to distinguish "not an error" outcomes like `BreakpointHit`
//! from real faults without threading a separate error type through the hot
//! path.

/// Outcome of a bus, core, or simulator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Operation completed normally.
    Ok,
    /// Generic failure (e.g. a write to read-only flash).
    Error,
    /// The address did not resolve to any registered bus region.
    InvalidAddress,
    /// No decode table entry matched the fetched instruction.
    InvalidInstruction,
    /// A step landed on a registered breakpoint address.
    BreakpointHit,
    /// `step()` was called while the core's halt flag was set; the call was
    /// a no-op.
    Halted,
}

impl Status {
    /// True for anything other than `Ok`/`BreakpointHit`/`Halted`, i.e. a
    /// condition that should stop `Simulator::run`.
    pub fn is_fatal(self) -> bool {
        matches!(self, Status::Error | Status::InvalidAddress | Status::InvalidInstruction)
    }
}
