//! Stage choreography for NaviCue modules.
//!
//! This crate owns the engine that walks a module instance through its
//! narrative arc: ambient arrival, interaction, resonant reflection and a
//! terminal afterglow.
//!
//! # Modules
//!
//! - [`timing`] -- [`LabTimeContext`] and per-stage [`StageTiming`] with
//!   Lab compression.
//! - [`table`] -- Validated [`StageTable`]s and the [`StageKey`] trait.
//! - [`accumulator`] -- Interaction accumulators (counter, hold with decay,
//!   drag distance, dwell).
//! - [`machine`] -- The per-instance [`StageMachine`].
//! - [`module`] -- Data-driven [`ModuleDefinition`]s and demo scripts.
//! - [`config`] -- Configuration loading from `navicue-config.yaml`.
//! - [`driver`] -- The async driver that runs a machine against real time.
//!
//! # Usage
//!
//! ```
//! use navicue_core::{LabTimeContext, StageMachine, StageSpec, StageTable, StageTiming};
//!
//! let table = StageTable::new(vec![
//!     StageSpec::ambient("arriving", StageTiming::fixed(3_000, 1_200)),
//!     StageSpec::interactive("holding", Some(StageTiming::same(45_000))),
//!     StageSpec::resonant("resonant", StageTiming::fraction(5_000, 0.3)),
//!     StageSpec::afterglow("afterglow"),
//! ]);
//!
//! if let Ok(table) = table {
//!     let mut machine = StageMachine::mount(table, LabTimeContext::lab(), |_report| {});
//!     machine.elapse(1_200);
//!     assert_eq!(machine.current(), Some(&"holding"));
//! }
//! ```

pub mod accumulator;
pub mod config;
pub mod driver;
pub mod machine;
pub mod module;
pub mod table;
pub mod timing;

// Re-export primary types at crate root.
pub use accumulator::{
    Accumulator, AccumulatorError, AccumulatorRule, AccumulatorSignal, DwellBreak,
};
pub use config::{ConfigError, NavicueConfig};
pub use driver::{
    ChoreographyHandle, DriverEndReason, DriverInput, DriverOutcome, UnmountHandle,
    run_choreography, spawn_choreography,
};
pub use machine::{
    AdvanceOutcome, CompletionCallback, InputOutcome, MachineError, NoOpObserver, StageMachine,
    StageMachineBuilder, StageObserver, TimerAction, TransitionRecord,
};
pub use module::{
    AccumulatorBinding, ModuleDefinition, ModuleError, ModuleMeta, ScriptRun, ScriptStep,
};
pub use table::{AdvanceRule, StageKey, StageSpec, StageTable, StageTableError};
pub use timing::{LabRescale, LabTimeContext, StageTiming};
