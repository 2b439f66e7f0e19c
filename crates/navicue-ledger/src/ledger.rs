//! The timer ledger: a scoped registry of pending delayed payloads.
//!
//! A [`TimerLedger`] belongs to exactly one module instance. It holds every
//! payload that instance has scheduled, keeps its own millisecond clock, and
//! hands payloads back in due order when pumped.
//!
//! # Design
//!
//! - **Never synchronous**: `schedule` only registers. Even a zero delay is
//!   delivered by the next `pop_due`.
//! - **One at a time**: `pop_due` removes a single payload, so the owner can
//!   void the rest of a batch in reaction to the first.
//! - **Voided is final**: after `void_all` (or `close`, its teardown name)
//!   every `schedule` is rejected with
//!   [`LedgerError::Closed`] and nothing is ever delivered again.
//! - **Ordering**: due time first, then schedule order.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use navicue_types::LedgerId;

use crate::accounting::{self, AccountingResult, LedgerStats};
use crate::handle::{FiredTimer, TimerHandle};
use crate::LedgerError;

/// A payload waiting for its due time.
#[derive(Debug)]
struct PendingTimer<A> {
    due_at_ms: u64,
    payload: A,
}

/// Scoped registry of pending delayed payloads owned by one instance.
///
/// The payload type `A` is whatever the owner wants delivered back; a stage
/// machine uses a small enum naming the transition to attempt, while a plain
/// boxed closure works just as well.
#[derive(Debug)]
pub struct TimerLedger<A> {
    /// Identity stamped into every handle this ledger issues.
    id: LedgerId,
    /// Ledger clock, in milliseconds since creation.
    now_ms: u64,
    /// Sequence number for the next handle.
    next_seq: u64,
    /// Pending payloads keyed by handle sequence.
    pending: BTreeMap<u64, PendingTimer<A>>,
    /// Set permanently by [`void_all`](Self::void_all).
    closed: bool,
    /// Running counters for accounting.
    stats: LedgerStats,
}

impl<A> Default for TimerLedger<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> TimerLedger<A> {
    /// Create an empty, open ledger with its clock at zero.
    pub fn new() -> Self {
        Self {
            id: LedgerId::new(),
            now_ms: 0,
            next_seq: 0,
            pending: BTreeMap::new(),
            closed: false,
            stats: LedgerStats::default(),
        }
    }

    /// Return this ledger's identifier.
    pub const fn id(&self) -> LedgerId {
        self.id
    }

    /// Return the ledger clock in milliseconds.
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Return whether the ledger has been closed.
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Return the number of pending payloads.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Return whether `handle` is still pending on this ledger.
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        handle.ledger() == self.id && self.pending.contains_key(&handle.seq())
    }

    /// Return the running counters.
    pub const fn stats(&self) -> LedgerStats {
        self.stats
    }

    /// Register `payload` to be delivered `delay_ms` after the current
    /// ledger time.
    ///
    /// Due times saturate at `u64::MAX` rather than overflowing.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Closed`] after [`void_all`](Self::void_all), and
    /// [`LedgerError::ArithmeticOverflow`] if the handle counter is
    /// exhausted. In both cases nothing is registered.
    pub fn schedule(&mut self, payload: A, delay_ms: u64) -> Result<TimerHandle, LedgerError> {
        if self.closed {
            self.stats.rejected = self.stats.rejected.saturating_add(1);
            return Err(LedgerError::Closed { ledger: self.id });
        }

        let seq = self.next_seq;
        self.next_seq = seq
            .checked_add(1)
            .ok_or(LedgerError::ArithmeticOverflow { ledger: self.id })?;

        let due_at_ms = self.now_ms.saturating_add(delay_ms);
        self.pending.insert(seq, PendingTimer { due_at_ms, payload });
        self.stats.scheduled = self.stats.scheduled.saturating_add(1);

        trace!(ledger = %self.id, seq, delay_ms, due_at_ms, "timer scheduled");
        Ok(TimerHandle::new(self.id, seq))
    }

    /// Cancel a single handle.
    ///
    /// Returns `true` if a pending payload was removed. Handles that already
    /// fired, were already voided, or belong to another ledger are ignored.
    pub fn void_one(&mut self, handle: TimerHandle) -> bool {
        if handle.ledger() != self.id {
            return false;
        }
        if self.pending.remove(&handle.seq()).is_some() {
            self.stats.voided = self.stats.voided.saturating_add(1);
            true
        } else {
            false
        }
    }

    /// Cancel every pending handle and refuse further scheduling.
    /// Idempotent.
    ///
    /// Returns the number of payloads removed by this call. Once voided, the
    /// ledger is closed: later [`schedule`](Self::schedule) calls return
    /// [`LedgerError::Closed`] and nothing is delivered again.
    pub fn void_all(&mut self) -> usize {
        let count = self.pending.len();
        if count > 0 {
            self.pending.clear();
            let voided = u64::try_from(count).unwrap_or(u64::MAX);
            self.stats.voided = self.stats.voided.saturating_add(voided);
        }
        if !self.closed {
            self.closed = true;
            debug!(ledger = %self.id, voided = count, "timer ledger closed");
        }
        count
    }

    /// Teardown. Same as [`void_all`](Self::void_all).
    pub fn close(&mut self) -> usize {
        self.void_all()
    }

    /// Return the due time of the earliest pending payload.
    pub fn next_due_ms(&self) -> Option<u64> {
        self.pending.values().map(|timer| timer.due_at_ms).min()
    }

    /// Move the ledger clock forward to `ms`. The clock never moves back.
    ///
    /// This does not deliver anything; pump with [`pop_due`](Self::pop_due)
    /// first if payloads may be due before `ms`.
    pub fn advance_to(&mut self, ms: u64) {
        if ms > self.now_ms {
            self.now_ms = ms;
        }
    }

    /// Remove and return the earliest payload due at or before `until_ms`.
    ///
    /// The ledger clock moves to the payload's due time (never backwards).
    /// Returns `None` when nothing is due, and always after `void_all`.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<FiredTimer<A>> {
        if self.closed {
            return None;
        }

        let seq = self
            .pending
            .iter()
            .filter(|(_, timer)| timer.due_at_ms <= until_ms)
            .min_by_key(|(seq, timer)| (timer.due_at_ms, **seq))
            .map(|(seq, _)| *seq)?;

        let timer = self.pending.remove(&seq)?;
        self.advance_to(timer.due_at_ms);
        self.stats.fired = self.stats.fired.saturating_add(1);

        trace!(ledger = %self.id, seq, due_at_ms = timer.due_at_ms, "timer fired");
        Some(FiredTimer {
            handle: TimerHandle::new(self.id, seq),
            due_at_ms: timer.due_at_ms,
            payload: timer.payload,
        })
    }

    /// Check the accounting law for this ledger.
    pub fn verify_accounting(&self) -> AccountingResult {
        let pending = u64::try_from(self.pending.len()).unwrap_or(u64::MAX);
        accounting::verify_accounting(self.id, self.stats, pending, self.closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ledger_is_empty_and_open() {
        let ledger: TimerLedger<u8> = TimerLedger::new();
        assert_eq!(ledger.pending(), 0);
        assert_eq!(ledger.now_ms(), 0);
        assert!(!ledger.is_closed());
        assert_eq!(ledger.next_due_ms(), None);
    }

    #[test]
    fn zero_delay_never_fires_synchronously() {
        let mut ledger = TimerLedger::new();
        let handle = ledger.schedule('a', 0).ok();
        assert!(handle.is_some());
        assert_eq!(ledger.pending(), 1);
        assert_eq!(ledger.stats().fired, 0);

        let fired = ledger.pop_due(0);
        assert_eq!(fired.map(|t| t.payload), Some('a'));
    }

    #[test]
    fn delivers_in_due_then_schedule_order() {
        let mut ledger = TimerLedger::new();
        let _ = ledger.schedule("late", 300);
        let _ = ledger.schedule("first-tie", 100);
        let _ = ledger.schedule("second-tie", 100);

        let order: Vec<&str> = std::iter::from_fn(|| ledger.pop_due(1_000))
            .map(|t| t.payload)
            .collect();
        assert_eq!(order, vec!["first-tie", "second-tie", "late"]);
        assert_eq!(ledger.now_ms(), 300);
    }

    #[test]
    fn pop_due_respects_horizon() {
        let mut ledger = TimerLedger::new();
        let _ = ledger.schedule(1, 500);
        assert!(ledger.pop_due(499).is_none());
        assert_eq!(ledger.pending(), 1);
        let fired = ledger.pop_due(500);
        assert_eq!(fired.map(|t| t.due_at_ms), Some(500));
    }

    #[test]
    fn delays_are_relative_to_ledger_clock() {
        let mut ledger = TimerLedger::new();
        ledger.advance_to(1_000);
        let _ = ledger.schedule((), 250);
        assert_eq!(ledger.next_due_ms(), Some(1_250));
    }

    #[test]
    fn clock_never_moves_backwards() {
        let mut ledger: TimerLedger<()> = TimerLedger::new();
        ledger.advance_to(800);
        ledger.advance_to(200);
        assert_eq!(ledger.now_ms(), 800);
    }

    #[test]
    fn void_one_cancels_only_that_handle() {
        let mut ledger = TimerLedger::new();
        let keep = ledger.schedule("keep", 10).ok();
        let dropped = ledger.schedule("drop", 10).ok();

        if let Some(handle) = dropped {
            assert!(ledger.void_one(handle));
            // Second void is a no-op.
            assert!(!ledger.void_one(handle));
        }
        if let Some(handle) = keep {
            assert!(ledger.is_pending(handle));
        }

        let fired: Vec<&str> = std::iter::from_fn(|| ledger.pop_due(10))
            .map(|t| t.payload)
            .collect();
        assert_eq!(fired, vec!["keep"]);
    }

    #[test]
    fn void_one_after_fire_is_noop() {
        let mut ledger = TimerLedger::new();
        let handle = ledger.schedule(7, 5).ok();
        let _ = ledger.pop_due(5);
        if let Some(handle) = handle {
            assert!(!ledger.void_one(handle));
        }
        assert_eq!(ledger.stats().voided, 0);
        assert_eq!(ledger.stats().fired, 1);
    }

    #[test]
    fn foreign_handle_is_ignored() {
        let mut ours = TimerLedger::new();
        let mut theirs = TimerLedger::new();
        let _ = ours.schedule(1, 10);
        let foreign = theirs.schedule(2, 10).ok();

        if let Some(handle) = foreign {
            assert!(!ours.void_one(handle));
            assert!(!ours.is_pending(handle));
        }
        assert_eq!(ours.pending(), 1);
    }

    #[test]
    fn void_all_is_idempotent() {
        let mut ledger = TimerLedger::new();
        let _ = ledger.schedule(1, 10);
        let _ = ledger.schedule(2, 20);

        assert_eq!(ledger.void_all(), 2);
        assert_eq!(ledger.void_all(), 0);
        assert_eq!(ledger.pending(), 0);
        assert!(ledger.pop_due(u64::MAX).is_none());
        assert_eq!(ledger.stats().voided, 2);
    }

    #[test]
    fn nothing_fires_after_void_all() {
        let mut ledger = TimerLedger::new();
        let _ = ledger.schedule("before", 10);
        assert_eq!(ledger.void_all(), 1);
        assert!(ledger.is_closed());

        let result = ledger.schedule("after", 5);
        assert_eq!(result, Err(LedgerError::Closed { ledger: ledger.id() }));
        assert_eq!(ledger.pending(), 0);
        assert!(ledger.pop_due(100).is_none());
        assert_eq!(ledger.stats().fired, 0);
        assert_eq!(ledger.verify_accounting(), AccountingResult::Balanced);
    }

    #[test]
    fn close_rejects_scheduling() {
        let mut ledger = TimerLedger::new();
        let _ = ledger.schedule(1, 10);
        assert_eq!(ledger.close(), 1);
        assert_eq!(ledger.close(), 0);
        assert!(ledger.is_closed());

        let result = ledger.schedule(2, 0);
        assert_eq!(result, Err(LedgerError::Closed { ledger: ledger.id() }));
        assert_eq!(ledger.stats().rejected, 1);
        assert!(ledger.pop_due(u64::MAX).is_none());
    }

    #[test]
    fn due_time_saturates() {
        let mut ledger = TimerLedger::new();
        ledger.advance_to(u64::MAX - 5);
        let _ = ledger.schedule((), 100);
        assert_eq!(ledger.next_due_ms(), Some(u64::MAX));
    }

    #[test]
    fn accounting_balances_through_lifecycle() {
        let mut ledger = TimerLedger::new();
        let a = ledger.schedule('a', 10).ok();
        let _ = ledger.schedule('b', 20);
        let _ = ledger.schedule('c', 30);
        assert_eq!(ledger.verify_accounting(), AccountingResult::Balanced);

        let _ = ledger.pop_due(10);
        if let Some(handle) = a {
            assert!(!ledger.void_one(handle));
        }
        assert_eq!(ledger.verify_accounting(), AccountingResult::Balanced);

        ledger.close();
        assert_eq!(ledger.verify_accounting(), AccountingResult::Balanced);
        let stats = ledger.stats();
        assert_eq!(stats.scheduled, 3);
        assert_eq!(stats.fired, 1);
        assert_eq!(stats.voided, 2);
    }
}
