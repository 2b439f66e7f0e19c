//! Timer handles and fired-timer deliveries.

use navicue_types::LedgerId;

/// Opaque token for one scheduled callback.
///
/// A handle records the ledger that issued it, so voiding a handle on the
/// wrong ledger is a no-op rather than cancelling an unrelated timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle {
    ledger: LedgerId,
    seq: u64,
}

impl TimerHandle {
    pub(crate) const fn new(ledger: LedgerId, seq: u64) -> Self {
        Self { ledger, seq }
    }

    /// The ledger that issued this handle.
    pub const fn ledger(self) -> LedgerId {
        self.ledger
    }

    /// Schedule order within the issuing ledger.
    pub const fn seq(self) -> u64 {
        self.seq
    }
}

impl core::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.ledger, self.seq)
    }
}

/// A payload whose delay has elapsed, handed back by
/// [`TimerLedger::pop_due`](crate::TimerLedger::pop_due).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer<A> {
    /// The handle the payload was scheduled under.
    pub handle: TimerHandle,
    /// Ledger time at which the payload was due.
    pub due_at_ms: u64,
    /// The scheduled payload.
    pub payload: A,
}
