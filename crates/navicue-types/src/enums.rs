//! Enumeration types shared by the choreography engine, the catalogue and
//! the presentation layer.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Stage roles
// ---------------------------------------------------------------------------

/// The narrative role a stage plays in a module's arc.
///
/// Every module walks the same arc: it arrives in an ambient stage, asks for
/// one or more interactions, reflects in a resonant stage, and settles in a
/// terminal afterglow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum StageRole {
    /// Entry state: the module arrives and sets the scene.
    Ambient,
    /// The module waits on (or invites) user interaction.
    Interactive,
    /// Didactic reflection after the interaction.
    Resonant,
    /// Terminal state. Entering it completes the module.
    Afterglow,
}

impl StageRole {
    /// Lower-case name used in logs and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::Interactive => "interactive",
            Self::Resonant => "resonant",
            Self::Afterglow => "afterglow",
        }
    }
}

// ---------------------------------------------------------------------------
// Timing mode
// ---------------------------------------------------------------------------

/// Whether durations run at production speed or compressed for a preview
/// ("Lab") surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TimingMode {
    /// Production timing: every stage uses its nominal duration.
    #[default]
    Production,
    /// Lab timing: stages use their documented compressed durations.
    Lab,
}

impl TimingMode {
    /// Parse a mode name (`production` or `lab`, case-insensitive).
    ///
    /// Returns `None` for anything else.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "lab" | "preview" => Some(Self::Lab),
            _ => None,
        }
    }

    /// Lower-case name used in logs and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Lab => "lab",
        }
    }
}

// ---------------------------------------------------------------------------
// Transition causes
// ---------------------------------------------------------------------------

/// Why a stage was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TransitionCause {
    /// The initial stage, entered when the module mounted.
    Mount,
    /// A stage's own auto-advance timer elapsed.
    AutoAdvance,
    /// A gated stage's long-duration safety timer elapsed before the user
    /// finished the interaction.
    SafetyAdvance,
    /// An accumulator crossed its threshold.
    Interaction,
    /// The presentation layer called `advance()` directly.
    Explicit,
}

// ---------------------------------------------------------------------------
// Interaction kinds
// ---------------------------------------------------------------------------

/// The family of interaction a module asks for. Used by the catalogue and
/// the presentation layer to pick input affordances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum InteractionKind {
    /// Discrete taps.
    Tap,
    /// Press and hold.
    Hold,
    /// Drag gestures.
    Drag,
    /// Stillness: watching without touching.
    Observe,
}
