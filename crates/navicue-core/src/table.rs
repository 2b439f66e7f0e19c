//! Stage tables: the ordered narrative arc of one module.
//!
//! A [`StageTable`] is validated once at construction. After that the
//! machine can rely on its shape: an ambient entry, at least one interactive
//! and one resonant stage, and a single terminal afterglow at the end.

use serde::{Deserialize, Serialize};

use navicue_types::StageRole;

use crate::timing::{LabTimeContext, StageTiming};

/// Errors that can occur when validating a stage table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageTableError {
    /// The table has no stages.
    #[error("stage table is empty")]
    Empty,

    /// The first stage is not an ambient stage.
    #[error("first stage `{stage}` must be ambient, found {role:?}")]
    FirstStageNotAmbient {
        /// Name of the offending stage.
        stage: String,
        /// Its declared role.
        role: StageRole,
    },

    /// The last stage is not a terminal afterglow.
    #[error("last stage `{stage}` must be an afterglow with a terminal rule")]
    LastStageNotTerminal {
        /// Name of the offending stage.
        stage: String,
    },

    /// An afterglow or terminal stage appears before the end.
    #[error("stage `{stage}` at position {index} is terminal but not last")]
    TerminalBeforeEnd {
        /// Name of the offending stage.
        stage: String,
        /// Its position in the table.
        index: usize,
    },

    /// A required role is missing.
    #[error("stage table has no {role:?} stage")]
    MissingRole {
        /// The missing role.
        role: StageRole,
    },

    /// Two stages share a key.
    #[error("duplicate stage `{stage}`")]
    DuplicateStage {
        /// The repeated name.
        stage: String,
    },

    /// A stage's timing rule is malformed.
    #[error("invalid timing on stage `{stage}`: {reason}")]
    InvalidTiming {
        /// Name of the offending stage.
        stage: String,
        /// Explanation of what is wrong.
        reason: String,
    },
}

/// A module's stage identifier.
///
/// Compiled modules use their own enums; modules loaded from configuration
/// use `String`. The name is what logs, snapshots and reports show.
pub trait StageKey: Clone + PartialEq + core::fmt::Debug {
    /// Symbolic name of the stage.
    fn name(&self) -> &str;
}

impl StageKey for String {
    fn name(&self) -> &str {
        self
    }
}

impl StageKey for &'static str {
    fn name(&self) -> &str {
        self
    }
}

/// How a stage is left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdvanceRule {
    /// Advance automatically after the rescaled duration.
    Auto {
        /// Duration of the stage.
        timing: StageTiming,
    },
    /// Advance only on a guarded interaction, or when the optional safety
    /// cap elapses first.
    Gated {
        /// Long-duration fallback that guarantees forward progress.
        #[serde(default)]
        safety: Option<StageTiming>,
    },
    /// Never left. Entering it completes the module.
    Terminal,
}

impl AdvanceRule {
    /// The timer this rule schedules on entry, if any.
    pub const fn timing(self) -> Option<StageTiming> {
        match self {
            Self::Auto { timing } => Some(timing),
            Self::Gated { safety } => safety,
            Self::Terminal => None,
        }
    }

    /// Return whether the stage waits on interaction.
    pub const fn is_gated(self) -> bool {
        matches!(self, Self::Gated { .. })
    }
}

/// One entry of a stage table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec<S> {
    /// Stage identifier.
    pub key: S,
    /// Narrative role.
    pub role: StageRole,
    /// How the stage is left.
    pub rule: AdvanceRule,
}

impl<S> StageSpec<S> {
    /// An auto-advancing ambient (arrival) stage.
    pub const fn ambient(key: S, timing: StageTiming) -> Self {
        Self {
            key,
            role: StageRole::Ambient,
            rule: AdvanceRule::Auto { timing },
        }
    }

    /// An interaction-gated stage with an optional safety cap.
    pub const fn interactive(key: S, safety: Option<StageTiming>) -> Self {
        Self {
            key,
            role: StageRole::Interactive,
            rule: AdvanceRule::Gated { safety },
        }
    }

    /// An auto-advancing interactive stage (a timed presentation beat).
    pub const fn presentation(key: S, timing: StageTiming) -> Self {
        Self {
            key,
            role: StageRole::Interactive,
            rule: AdvanceRule::Auto { timing },
        }
    }

    /// An auto-advancing resonant (reflection) stage.
    pub const fn resonant(key: S, timing: StageTiming) -> Self {
        Self {
            key,
            role: StageRole::Resonant,
            rule: AdvanceRule::Auto { timing },
        }
    }

    /// The terminal afterglow.
    pub const fn afterglow(key: S) -> Self {
        Self {
            key,
            role: StageRole::Afterglow,
            rule: AdvanceRule::Terminal,
        }
    }
}

/// A validated, ordered stage table.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTable<S> {
    stages: Vec<StageSpec<S>>,
}

impl<S: StageKey> StageTable<S> {
    /// Validate and wrap an ordered list of stages.
    ///
    /// # Errors
    ///
    /// Returns [`StageTableError`] if the table does not have the shape
    /// ambient, interactive, resonant, then a single terminal afterglow, if
    /// keys repeat, or if a timing rule is malformed.
    pub fn new(stages: Vec<StageSpec<S>>) -> Result<Self, StageTableError> {
        let first = stages.first().ok_or(StageTableError::Empty)?;
        if first.role != StageRole::Ambient {
            return Err(StageTableError::FirstStageNotAmbient {
                stage: first.key.name().to_owned(),
                role: first.role,
            });
        }

        let last_index = stages.len().saturating_sub(1);
        for (index, spec) in stages.iter().enumerate() {
            let terminal =
                spec.role == StageRole::Afterglow || matches!(spec.rule, AdvanceRule::Terminal);
            if index == last_index {
                if spec.role != StageRole::Afterglow || !matches!(spec.rule, AdvanceRule::Terminal)
                {
                    return Err(StageTableError::LastStageNotTerminal {
                        stage: spec.key.name().to_owned(),
                    });
                }
            } else if terminal {
                return Err(StageTableError::TerminalBeforeEnd {
                    stage: spec.key.name().to_owned(),
                    index,
                });
            }

            if let Some(timing) = spec.rule.timing() {
                timing
                    .validate()
                    .map_err(|reason| StageTableError::InvalidTiming {
                        stage: spec.key.name().to_owned(),
                        reason,
                    })?;
            }

            if stages
                .iter()
                .take(index)
                .any(|earlier| earlier.key == spec.key)
            {
                return Err(StageTableError::DuplicateStage {
                    stage: spec.key.name().to_owned(),
                });
            }
        }

        for role in [StageRole::Interactive, StageRole::Resonant] {
            if !stages.iter().any(|spec| spec.role == role) {
                return Err(StageTableError::MissingRole { role });
            }
        }

        Ok(Self { stages })
    }

    /// Return the stage at `index`.
    pub fn get(&self, index: usize) -> Option<&StageSpec<S>> {
        self.stages.get(index)
    }

    /// Return the position of `key`.
    pub fn position(&self, key: &S) -> Option<usize> {
        self.stages.iter().position(|spec| spec.key == *key)
    }

    /// Return all stages in order.
    pub fn stages(&self) -> &[StageSpec<S>] {
        &self.stages
    }

    /// Return the number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always `false`: a validated table has at least one stage.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Position of the terminal afterglow.
    pub fn terminal_index(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    /// Upper bound on the time to reach the terminal stage with no user
    /// input at all.
    ///
    /// This is the sum of every rescaled auto-advance and safety duration.
    /// Returns `None` when some gated stage has no safety cap, in which case
    /// the module waits on the user indefinitely.
    pub fn liveness_bound_ms(&self, ctx: LabTimeContext) -> Option<u64> {
        self.stages
            .iter()
            .filter(|spec| !matches!(spec.rule, AdvanceRule::Terminal))
            .try_fold(0_u64, |total, spec| {
                let timing = spec.rule.timing()?;
                Some(total.saturating_add(ctx.rescale(timing)))
            })
    }
}
