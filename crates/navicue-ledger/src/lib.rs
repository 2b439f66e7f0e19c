//! Scoped timer ledger for NaviCue module instances.
//!
//! Every delayed callback a module instance schedules is registered with the
//! instance's [`TimerLedger`]. The ledger is the only place timers live, so
//! tearing an instance down is a single call that voids all of them.
//!
//! # Architecture
//!
//! The ledger crate provides three modules:
//!
//! - [`ledger`] -- The [`TimerLedger`] struct: schedule, void, pump.
//! - [`handle`] -- [`TimerHandle`] tokens and [`FiredTimer`] deliveries.
//! - [`accounting`] -- Timer accounting verification.
//!
//! # Accounting Law
//!
//! For every ledger at every point in time:
//!
//! ```text
//! scheduled == fired + voided + pending
//! ```
//!
//! and once the ledger is closed, `pending == 0`. A violation produces an
//! [`AccountingAnomaly`]. This is the "no timer outlives its owner" rule in
//! checkable form.
//!
//! # Time
//!
//! The ledger carries its own millisecond clock. It never fires anything by
//! itself: the owner pumps it with [`TimerLedger::pop_due`], one payload at
//! a time, so a payload voided by an earlier delivery in the same batch can
//! never fire.
//!
//! # Usage
//!
//! ```
//! use navicue_ledger::TimerLedger;
//!
//! let mut ledger: TimerLedger<&str> = TimerLedger::new();
//! let _arrive = ledger.schedule("arrive", 1_200).ok();
//! let fade = ledger.schedule("fade", 5_000).ok();
//!
//! if let Some(handle) = fade {
//!     assert!(ledger.void_one(handle));
//! }
//!
//! let fired = ledger.pop_due(2_000).map(|t| t.payload);
//! assert_eq!(fired, Some("arrive"));
//! assert!(ledger.pop_due(10_000).is_none());
//!
//! ledger.close();
//! assert!(ledger.schedule("late", 0).is_err());
//! ```

pub mod accounting;
pub mod handle;
pub mod ledger;

// Re-export primary types at crate root.
pub use accounting::{AccountingAnomaly, AccountingResult, LedgerStats};
pub use handle::{FiredTimer, TimerHandle};
pub use ledger::TimerLedger;

use navicue_types::LedgerId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when scheduling on a ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger has been voided or closed. Nothing was registered.
    #[error("timer ledger {ledger} is closed")]
    Closed {
        /// The closed ledger.
        ledger: LedgerId,
    },

    /// The handle sequence counter would overflow.
    #[error("timer sequence overflow on ledger {ledger}")]
    ArithmeticOverflow {
        /// The ledger whose counter overflowed.
        ledger: LedgerId,
    },
}
