//! Timer accounting verification for the ledger.
//!
//! Every handle a ledger issues ends in exactly one of two ways: it fires,
//! or it is voided. Until then it is pending. The accounting check is:
//!
//! ```text
//! scheduled == fired + voided + pending
//! ```
//!
//! and, for a closed ledger, `pending == 0`. The ledger maintains its
//! counters so that this holds by construction; the check exists so that
//! owners and tests can assert the teardown guarantee directly.

use serde::Serialize;

use navicue_types::LedgerId;

/// Running counters kept by a [`TimerLedger`](crate::TimerLedger).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    /// Handles issued.
    pub scheduled: u64,
    /// Payloads delivered through `pop_due`.
    pub fired: u64,
    /// Handles cancelled through `void_one`, `void_all` or `close`.
    pub voided: u64,
    /// Schedule attempts rejected because the ledger was closed.
    pub rejected: u64,
}

/// The result of an accounting check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountingResult {
    /// Every issued handle is fired, voided, or still pending.
    Balanced,
    /// The counters do not add up.
    Anomaly(AccountingAnomaly),
}

/// An accounting violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingAnomaly {
    /// The ledger that failed the check.
    pub ledger: LedgerId,
    /// Counters at the time of the check.
    pub stats: LedgerStats,
    /// Pending handles at the time of the check.
    pub pending: u64,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for AccountingAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Verify the accounting law for a ledger's counters.
pub fn verify_accounting(
    ledger: LedgerId,
    stats: LedgerStats,
    pending: u64,
    closed: bool,
) -> AccountingResult {
    let settled = stats
        .fired
        .checked_add(stats.voided)
        .and_then(|sum| sum.checked_add(pending));

    let Some(settled) = settled else {
        return AccountingResult::Anomaly(AccountingAnomaly {
            ledger,
            stats,
            pending,
            message: format!("ledger {ledger}: counter overflow during accounting"),
        });
    };

    if settled != stats.scheduled {
        return AccountingResult::Anomaly(AccountingAnomaly {
            ledger,
            stats,
            pending,
            message: format!(
                "ledger {ledger}: scheduled {} != fired {} + voided {} + pending {pending}",
                stats.scheduled, stats.fired, stats.voided
            ),
        });
    }

    if closed && pending != 0 {
        return AccountingResult::Anomaly(AccountingAnomaly {
            ledger,
            stats,
            pending,
            message: format!("ledger {ledger}: closed with {pending} pending timer(s)"),
        });
    }

    AccountingResult::Balanced
}
