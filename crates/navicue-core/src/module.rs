//! Data-driven module definitions.
//!
//! A [`ModuleDefinition`] is everything needed to mount one NaviCue module:
//! metadata, a stage table with production and Lab timings, the
//! accumulator rules of its gated stages, and a scripted demo interaction.
//! Built-in modules are compiled into the catalogue crate; extra ones can
//! be declared in YAML configuration.

use serde::{Deserialize, Serialize};

use navicue_types::{CompletionReport, InteractionInput, InteractionKind};

use crate::accumulator::{Accumulator, AccumulatorError, AccumulatorRule};
use crate::machine::{MachineError, StageMachine, StageMachineBuilder};
use crate::table::{StageSpec, StageTable, StageTableError};
use crate::timing::LabTimeContext;

/// Errors raised when turning a definition into a machine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModuleError {
    /// The stage table is malformed.
    #[error("module `{module}`: {source}")]
    Table {
        /// The module id.
        module: String,
        /// The underlying table error.
        source: StageTableError,
    },

    /// An accumulator rule is malformed.
    #[error("module `{module}`: {source}")]
    Accumulator {
        /// The module id.
        module: String,
        /// The underlying accumulator error.
        source: AccumulatorError,
    },

    /// An accumulator is bound to a missing or non-gated stage.
    #[error("module `{module}`: {source}")]
    Binding {
        /// The module id.
        module: String,
        /// The underlying machine error.
        source: MachineError,
    },

    /// A demo script step names a stage that is not in the table.
    #[error("module `{module}`: demo script step {index} names unknown stage `{stage}`")]
    ScriptStage {
        /// The module id.
        module: String,
        /// Position of the step in the script.
        index: usize,
        /// The unknown stage name.
        stage: String,
    },
}

/// Descriptive metadata carried by every module.
///
/// `signature`, `mechanism`, `kbe` and `form` are opaque inputs to the
/// presentation layer's palette derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMeta {
    /// Stable module id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Signature tag.
    pub signature: String,
    /// Mechanism tag.
    pub mechanism: String,
    /// Knowing/believing/embodying layer tag.
    pub kbe: String,
    /// Form tag.
    pub form: String,
    /// The interaction the module asks for.
    pub interaction: InteractionKind,
}

/// An accumulator rule bound to a named gated stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorBinding {
    /// The gated stage.
    pub stage: String,
    /// Its progress rule.
    pub rule: AccumulatorRule,
}

/// One step of a scripted interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Let time pass.
    Wait {
        /// Milliseconds to wait.
        ms: u64,
    },
    /// Deliver an input event guarded by `stage`.
    Input {
        /// The stage the input is meant for.
        stage: String,
        /// The event.
        input: InteractionInput,
    },
    /// Request an explicit advance from `stage`.
    Advance {
        /// The stage to leave.
        stage: String,
    },
    /// Reset the accumulator of `stage`.
    Retry {
        /// The stage to retry.
        stage: String,
    },
}

impl ScriptStep {
    /// The stage this step is guarded by, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Wait { .. } => None,
            Self::Input { stage, .. } | Self::Advance { stage } | Self::Retry { stage } => {
                Some(stage)
            }
        }
    }

    /// Apply this step directly to a machine.
    pub fn apply(&self, machine: &mut StageMachine<String>) {
        match self {
            Self::Wait { ms } => machine.elapse(*ms),
            Self::Input { stage, input } => {
                machine.input(stage, *input);
            }
            Self::Advance { stage } => {
                machine.advance(stage);
            }
            Self::Retry { stage } => {
                machine.retry(stage);
            }
        }
    }
}

/// The outcome of running a demo script headlessly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptRun {
    /// Whether the module reached its terminal stage.
    pub completed: bool,
    /// Stage the machine ended on.
    pub final_stage: String,
    /// Machine time at the end of the run.
    pub elapsed_ms: u64,
    /// Stage transitions, not counting the mount.
    pub transitions: usize,
}

/// Everything needed to mount one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    /// Metadata.
    pub meta: ModuleMeta,
    /// Ordered stage table.
    pub stages: Vec<StageSpec<String>>,
    /// Accumulators of the gated stages.
    #[serde(default)]
    pub accumulators: Vec<AccumulatorBinding>,
    /// A scripted interaction that completes the module.
    #[serde(default)]
    pub demo_script: Vec<ScriptStep>,
}

impl ModuleDefinition {
    /// Return the module id.
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    /// Build and validate the stage table.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Table`] if the table is malformed.
    pub fn table(&self) -> Result<StageTable<String>, ModuleError> {
        StageTable::new(self.stages.clone()).map_err(|source| ModuleError::Table {
            module: self.meta.id.clone(),
            source,
        })
    }

    /// Check the table, the accumulator bindings and the demo script.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModuleError`] found.
    pub fn validate(&self) -> Result<(), ModuleError> {
        let builder = self.builder(LabTimeContext::production())?;
        let table = builder.table();
        for (index, step) in self.demo_script.iter().enumerate() {
            let unknown = step
                .stage()
                .filter(|stage| table.position(&(*stage).to_owned()).is_none());
            if let Some(stage) = unknown {
                return Err(ModuleError::ScriptStage {
                    module: self.meta.id.clone(),
                    index,
                    stage: stage.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Start assembling a machine with every accumulator bound.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError`] if the table or a binding is malformed.
    pub fn builder(&self, ctx: LabTimeContext) -> Result<StageMachineBuilder<String>, ModuleError> {
        let mut builder = StageMachine::builder(self.table()?, ctx);
        for binding in &self.accumulators {
            let accumulator =
                Accumulator::new(binding.rule).map_err(|source| ModuleError::Accumulator {
                    module: self.meta.id.clone(),
                    source,
                })?;
            builder = builder
                .accumulator(&binding.stage, accumulator)
                .map_err(|source| ModuleError::Binding {
                    module: self.meta.id.clone(),
                    source,
                })?;
        }
        Ok(builder)
    }

    /// Mount the module.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError`] if the definition is malformed.
    pub fn mount(
        &self,
        ctx: LabTimeContext,
        on_complete: impl FnOnce(CompletionReport) + Send + 'static,
    ) -> Result<StageMachine<String>, ModuleError> {
        Ok(self.builder(ctx)?.on_complete(on_complete).mount())
    }

    /// Mount the module and play its demo script against the machine's own
    /// clock, then let any remaining timers run out.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError`] if the definition is malformed.
    pub fn run_script_headless(&self, ctx: LabTimeContext) -> Result<ScriptRun, ModuleError> {
        let mut machine = self.builder(ctx)?.mount();
        for step in &self.demo_script {
            step.apply(&mut machine);
        }
        machine.settle();
        let run = ScriptRun {
            completed: machine.is_completed(),
            final_stage: machine.current().cloned().unwrap_or_default(),
            elapsed_ms: machine.now_ms(),
            transitions: machine.history().len().saturating_sub(1),
        };
        machine.teardown();
        Ok(run)
    }
}
