//! Feeding a module's demo script into a running driver.
//!
//! Waits become real sleeps; every other step becomes a [`DriverInput`].
//! Feeding stops early once the driver has gone away.

use navicue_core::{ChoreographyHandle, DriverInput, ScriptStep};
use tokio::time::{Duration, sleep};
use tracing::debug;

/// Convert a non-wait script step into a driver input.
pub fn to_driver_input(step: &ScriptStep) -> Option<DriverInput<String>> {
    match step {
        ScriptStep::Wait { .. } => None,
        ScriptStep::Input { stage, input } => Some(DriverInput::Interact {
            expected: stage.clone(),
            input: *input,
        }),
        ScriptStep::Advance { stage } => Some(DriverInput::Advance {
            expected: stage.clone(),
        }),
        ScriptStep::Retry { stage } => Some(DriverInput::Retry {
            expected: stage.clone(),
        }),
    }
}

/// Play `steps` into the driver behind `handle`. Returns the number of
/// steps delivered.
pub async fn feed_script(steps: &[ScriptStep], handle: &ChoreographyHandle<String>) -> usize {
    let mut delivered: usize = 0;
    for step in steps {
        if let ScriptStep::Wait { ms } = step {
            sleep(Duration::from_millis(*ms)).await;
        } else if let Some(input) = to_driver_input(step) {
            if handle.send(input).await.is_err() {
                debug!(delivered, "Driver stopped before the script ended");
                break;
            }
        }
        delivered = delivered.saturating_add(1);
    }
    delivered
}
