//! Shared type definitions for the NaviCue stage choreography engine.
//!
//! This crate is the single source of truth for the values that cross the
//! boundary between the engine and the presentation layer. Types defined here
//! flow downstream to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for instances and timer ledgers
//! - [`enums`] -- Stage roles, timing modes, transition causes, interaction kinds
//! - [`structs`] -- Interaction input, render snapshots, completion reports

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{InteractionKind, StageRole, TimingMode, TransitionCause};
pub use ids::{InstanceId, LedgerId};
pub use structs::{CompletionReport, InteractionInput, StageSnapshot};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the presentation layer.

    #[test]
    fn export_bindings() {
        // ts-rs writes the bindings relative to the crate root when
        // `export_all` runs.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::InstanceId::export_all();
        let _ = crate::ids::LedgerId::export_all();

        // Enums
        let _ = crate::enums::StageRole::export_all();
        let _ = crate::enums::TimingMode::export_all();
        let _ = crate::enums::TransitionCause::export_all();
        let _ = crate::enums::InteractionKind::export_all();

        // Structs
        let _ = crate::structs::InteractionInput::export_all();
        let _ = crate::structs::StageSnapshot::export_all();
        let _ = crate::structs::CompletionReport::export_all();
    }
}
