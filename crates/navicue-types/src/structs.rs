//! Input events, render snapshots and completion reports.
//!
//! These are the values that cross the boundary between the choreography
//! engine and the presentation layer. They are plain data: the engine never
//! depends on how they are rendered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{StageRole, TimingMode};
use crate::ids::InstanceId;

// ---------------------------------------------------------------------------
// Interaction input
// ---------------------------------------------------------------------------

/// A raw input event delivered by the presentation layer.
///
/// Accumulators decide which events they care about; an event that does not
/// match the bound accumulator's rule is ignored rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum InteractionInput {
    /// A tap. Off-target taps (`qualifying: false`) are never counted.
    Tap {
        /// Whether the tap landed on the target.
        qualifying: bool,
    },
    /// A pointer went down (hold begins).
    PressStart,
    /// A pointer went up (hold ends, decay begins).
    PressEnd,
    /// A drag movement since the previous drag event, in logical pixels.
    Drag {
        /// Horizontal delta.
        dx: f64,
        /// Vertical delta.
        dy: f64,
    },
    /// The observation condition started holding (the user is still).
    ObservationStart,
    /// The observation condition broke (the user touched or moved).
    ObservationBreak,
}

// ---------------------------------------------------------------------------
// Render snapshot
// ---------------------------------------------------------------------------

/// A read-only view of a machine for the rendering layer.
///
/// The presentation layer subscribes to these; nothing it does with a
/// snapshot feeds back into the machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StageSnapshot {
    /// The instance this snapshot describes.
    pub instance_id: InstanceId,
    /// Symbolic name of the current stage.
    pub stage: String,
    /// Role of the current stage.
    pub role: StageRole,
    /// Zero-based position of the current stage in the table.
    pub stage_index: u32,
    /// Number of stages in the table.
    pub stage_count: u32,
    /// Progress of the accumulator bound to the current stage, `0.0..=1.0`.
    pub progress: Option<f64>,
    /// Whether the terminal stage has been reached.
    pub completed: bool,
    /// Whether the instance has been torn down.
    pub torn_down: bool,
    /// Milliseconds since mount on the machine's clock.
    pub now_ms: u64,
    /// Timing mode the instance was mounted with.
    pub mode: TimingMode,
}

// ---------------------------------------------------------------------------
// Completion report
// ---------------------------------------------------------------------------

/// Handed to the owner's completion callback, exactly once per instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CompletionReport {
    /// The instance that completed.
    pub instance_id: InstanceId,
    /// Name of the terminal stage.
    pub final_stage: String,
    /// Milliseconds between mount and completion on the machine's clock.
    pub elapsed_ms: u64,
    /// Number of stage transitions, not counting the mount.
    pub transitions: u32,
    /// Number of in-stage retries.
    pub retries: u32,
    /// Wall-clock time of completion.
    pub completed_at: DateTime<Utc>,
}
