//! Stage observer that logs every transition of the previewed module.
//!
//! Each entry is logged as structured fields plus a JSON rendering of the
//! transition record, which is what a presentation layer would receive.

use navicue_core::{StageObserver, TransitionRecord};
use tracing::{info, warn};

/// Observer that bridges stage transitions to the log.
pub struct TransitionLogger {
    module: String,
    entries: u32,
}

impl TransitionLogger {
    /// Create a logger for the named module.
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_owned(),
            entries: 0,
        }
    }

    /// Number of transitions logged so far.
    pub const fn entries(&self) -> u32 {
        self.entries
    }
}

impl StageObserver<String> for TransitionLogger {
    fn on_stage_entered(&mut self, record: &TransitionRecord<String>) {
        self.entries = self.entries.saturating_add(1);
        match serde_json::to_string(record) {
            Ok(json) => info!(
                module = %self.module,
                to = %record.to,
                role = record.role.as_str(),
                cause = ?record.cause,
                at_ms = record.at_ms,
                record = %json,
                "Stage entered"
            ),
            Err(error) => warn!(module = %self.module, %error, "Transition record not serializable"),
        }
    }
}
