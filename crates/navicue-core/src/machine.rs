//! The per-instance stage machine.
//!
//! A [`StageMachine`] walks one module instance through its stage table.
//! Every timer it needs lives in its own [`TimerLedger`]; every transition is
//! guarded by the stage the caller believes is current, so late or duplicate
//! events are harmless.
//!
//! The machine never reads a wall clock. Time moves only through
//! [`StageMachine::elapse`], which the owner (a driver task, a test, or a
//! headless preview) calls with the milliseconds that have passed. Within one
//! `elapse` call, due timers and time-based accumulator crossings are
//! processed one at a time in time order.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use navicue_ledger::{AccountingResult, LedgerStats, TimerHandle, TimerLedger};
use navicue_types::{
    CompletionReport, InstanceId, InteractionInput, StageRole, StageSnapshot, TransitionCause,
};

use crate::accumulator::{Accumulator, AccumulatorSignal};
use crate::table::{AdvanceRule, StageKey, StageTable};
use crate::timing::LabTimeContext;

/// Upper bound on the number of events [`StageMachine::settle`] processes.
const SETTLE_LIMIT: usize = 1_024;

/// Errors raised while assembling a machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MachineError {
    /// The named stage is not in the table.
    #[error("unknown stage `{stage}`")]
    UnknownStage {
        /// The stage name.
        stage: String,
    },

    /// Accumulators can only be bound to interaction-gated stages.
    #[error("stage `{stage}` is not interaction-gated")]
    NotGated {
        /// The stage name.
        stage: String,
    },
}

/// The payload of every timer a machine schedules.
///
/// `from` is the index of the stage that scheduled the timer. A payload
/// whose stage is no longer current is ignored on delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// The stage's own duration elapsed.
    AutoAdvance {
        /// Index of the scheduling stage.
        from: usize,
    },
    /// A gated stage's safety cap elapsed.
    SafetyAdvance {
        /// Index of the scheduling stage.
        from: usize,
    },
}

/// Result of [`StageMachine::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome<S> {
    /// Moved to a non-terminal stage.
    Advanced {
        /// The stage that was left.
        from: S,
        /// The stage that was entered.
        to: S,
    },
    /// Moved into the terminal stage and fired the completion callback.
    Completed {
        /// The stage that was left.
        from: S,
        /// The terminal stage.
        to: S,
    },
    /// The guard did not match. Nothing changed.
    Stale,
}

/// Result of [`StageMachine::input`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputOutcome {
    /// The bound accumulator moved, still below its threshold.
    Progress(f64),
    /// The threshold was crossed and the machine advanced.
    Advanced,
    /// The threshold was crossed and the machine completed.
    Completed,
    /// The current stage has no accumulator, or the event does not apply.
    Ignored,
    /// The guard did not match. Nothing changed.
    Stale,
}

/// One entry of a machine's transition history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRecord<S> {
    /// The stage that was left. `None` for the mount.
    pub from: Option<S>,
    /// The stage that was entered.
    pub to: S,
    /// Role of the entered stage.
    pub role: StageRole,
    /// What caused the transition.
    pub cause: TransitionCause,
    /// Machine time of the transition.
    pub at_ms: u64,
}

/// Callback invoked on every stage entry, including the mount.
///
/// Implementations can use this to push render snapshots, record traces,
/// etc. Observers cannot touch the machine.
pub trait StageObserver<S>: Send {
    /// Called after a stage has been entered.
    fn on_stage_entered(&mut self, record: &TransitionRecord<S>);
}

/// A no-op observer for testing.
pub struct NoOpObserver;

impl<S> StageObserver<S> for NoOpObserver {
    fn on_stage_entered(&mut self, _record: &TransitionRecord<S>) {}
}

/// Single-fire completion callback.
pub type CompletionCallback = Box<dyn FnOnce(CompletionReport) + Send>;

/// Assembles a [`StageMachine`] before mounting it.
pub struct StageMachineBuilder<S: StageKey> {
    table: StageTable<S>,
    ctx: LabTimeContext,
    bindings: Vec<Option<Accumulator>>,
    observers: Vec<Box<dyn StageObserver<S>>>,
    on_complete: Option<CompletionCallback>,
}

impl<S: StageKey> StageMachineBuilder<S> {
    /// Bind an accumulator to a gated stage, replacing any earlier binding.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError`] if the stage is unknown or not gated.
    pub fn accumulator(mut self, stage: &S, accumulator: Accumulator) -> Result<Self, MachineError> {
        let index = self
            .table
            .position(stage)
            .ok_or_else(|| MachineError::UnknownStage {
                stage: stage.name().to_owned(),
            })?;
        let gated = self
            .table
            .get(index)
            .is_some_and(|spec| spec.rule.is_gated());
        if !gated {
            return Err(MachineError::NotGated {
                stage: stage.name().to_owned(),
            });
        }
        if let Some(slot) = self.bindings.get_mut(index) {
            *slot = Some(accumulator);
        }
        Ok(self)
    }

    /// Return the stage table.
    pub const fn table(&self) -> &StageTable<S> {
        &self.table
    }

    /// Add an observer.
    #[must_use]
    pub fn observer(mut self, observer: impl StageObserver<S> + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Set the completion callback.
    #[must_use]
    pub fn on_complete(mut self, callback: impl FnOnce(CompletionReport) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Mount the machine: enter the ambient stage and schedule its timer.
    pub fn mount(self) -> StageMachine<S> {
        let mut machine = StageMachine {
            id: InstanceId::new(),
            ctx: self.ctx,
            ledger: TimerLedger::new(),
            current: 0,
            current_key: None,
            current_role: StageRole::Ambient,
            stage_timers: Vec::new(),
            bindings: self.bindings,
            history: Vec::new(),
            completed: false,
            torn_down: false,
            retries: 0,
            on_complete: self.on_complete,
            observers: self.observers,
            table: self.table,
        };
        debug!(
            instance = %machine.id,
            mode = machine.ctx.mode().as_str(),
            stages = machine.table.len(),
            "Mounting stage machine"
        );
        machine.enter(0, TransitionCause::Mount);
        machine
    }
}

/// A mounted module instance.
pub struct StageMachine<S: StageKey> {
    id: InstanceId,
    table: StageTable<S>,
    ctx: LabTimeContext,
    ledger: TimerLedger<TimerAction>,
    current: usize,
    current_key: Option<S>,
    current_role: StageRole,
    stage_timers: Vec<TimerHandle>,
    bindings: Vec<Option<Accumulator>>,
    history: Vec<TransitionRecord<S>>,
    completed: bool,
    torn_down: bool,
    retries: u32,
    on_complete: Option<CompletionCallback>,
    observers: Vec<Box<dyn StageObserver<S>>>,
}

impl<S: StageKey> core::fmt::Debug for StageMachine<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StageMachine")
            .field("id", &self.id)
            .field("current", &self.current_key)
            .field("now_ms", &self.ledger.now_ms())
            .field("completed", &self.completed)
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl<S: StageKey> StageMachine<S> {
    /// Start assembling a machine for `table` under `ctx`.
    pub fn builder(table: StageTable<S>, ctx: LabTimeContext) -> StageMachineBuilder<S> {
        let bindings = table.stages().iter().map(|_| None).collect();
        StageMachineBuilder {
            table,
            ctx,
            bindings,
            observers: Vec::new(),
            on_complete: None,
        }
    }

    /// Mount a machine with no accumulators or observers.
    pub fn mount(
        table: StageTable<S>,
        ctx: LabTimeContext,
        on_complete: impl FnOnce(CompletionReport) + Send + 'static,
    ) -> Self {
        Self::builder(table, ctx).on_complete(on_complete).mount()
    }

    // -----------------------------------------------------------------------
    // Guarded operations
    // -----------------------------------------------------------------------

    /// Advance from `expected` to the next stage.
    ///
    /// Returns [`AdvanceOutcome::Stale`] without touching anything if
    /// `expected` is not current, or the machine is completed or torn down.
    pub fn advance(&mut self, expected: &S) -> AdvanceOutcome<S> {
        if !self.is_current(expected) {
            return AdvanceOutcome::Stale;
        }
        self.step(TransitionCause::Explicit)
    }

    /// Feed an input event to the accumulator bound to `expected`.
    ///
    /// Crossing the threshold advances the machine exactly once.
    pub fn input(&mut self, expected: &S, input: InteractionInput) -> InputOutcome {
        if !self.is_current(expected) {
            return InputOutcome::Stale;
        }
        let Some(accumulator) = self.current_accumulator_mut() else {
            return InputOutcome::Ignored;
        };
        match accumulator.feed(input) {
            AccumulatorSignal::Progress(progress) => InputOutcome::Progress(progress),
            AccumulatorSignal::Ignored => InputOutcome::Ignored,
            AccumulatorSignal::Crossed => match self.step(TransitionCause::Interaction) {
                AdvanceOutcome::Advanced { .. } => InputOutcome::Advanced,
                AdvanceOutcome::Completed { .. } => InputOutcome::Completed,
                AdvanceOutcome::Stale => InputOutcome::Stale,
            },
        }
    }

    /// Reset the accumulator of the current stage for another attempt.
    ///
    /// The stage is not re-entered and its timers keep running. Returns
    /// `false` if the guard does not match, the stage has no accumulator,
    /// or the accumulator already crossed.
    pub fn retry(&mut self, expected: &S) -> bool {
        if !self.is_current(expected) {
            return false;
        }
        let reset = self
            .current_accumulator_mut()
            .is_some_and(Accumulator::reset);
        if reset {
            self.retries = self.retries.saturating_add(1);
            debug!(
                instance = %self.id,
                stage = expected.name(),
                retries = self.retries,
                "Stage retried"
            );
        }
        reset
    }

    /// Let `ms` milliseconds pass on the machine's clock.
    ///
    /// Timers and time-based accumulator crossings due within the window are
    /// processed one at a time in time order. When a crossing and a timer
    /// land on the same millisecond, the crossing wins.
    pub fn elapse(&mut self, ms: u64) {
        if self.torn_down {
            return;
        }
        let target = self.ledger.now_ms().saturating_add(ms);

        while let Some(at) = self.next_deadline_ms().filter(|at| *at <= target) {
            let now = self.ledger.now_ms();
            let signal = self
                .current_accumulator_mut()
                .map_or(AccumulatorSignal::Ignored, |acc| {
                    acc.elapse(at.saturating_sub(now))
                });
            self.ledger.advance_to(at);

            if matches!(signal, AccumulatorSignal::Crossed) {
                self.step(TransitionCause::Interaction);
                continue;
            }
            if let Some(fired) = self.ledger.pop_due(at) {
                self.dispatch(fired.payload);
            }
        }

        if self.completed || self.torn_down {
            self.ledger.advance_to(target);
            return;
        }
        let now = self.ledger.now_ms();
        let signal = self
            .current_accumulator_mut()
            .map_or(AccumulatorSignal::Ignored, |acc| {
                acc.elapse(target.saturating_sub(now))
            });
        self.ledger.advance_to(target);
        if matches!(signal, AccumulatorSignal::Crossed) {
            self.step(TransitionCause::Interaction);
        }
    }

    /// Run time forward until nothing more is scheduled.
    ///
    /// Returns whether the machine completed. A gated stage without a
    /// safety cap or a running time-based accumulator stops the run.
    pub fn settle(&mut self) -> bool {
        for _ in 0..SETTLE_LIMIT {
            let Some(at) = self.next_deadline_ms() else {
                break;
            };
            self.elapse(at.saturating_sub(self.ledger.now_ms()));
        }
        self.completed
    }

    /// Tear the instance down: void every timer and drop the callbacks.
    ///
    /// Idempotent. Every later call on the machine is a no-op.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let voided = self.ledger.close();
        self.stage_timers.clear();
        self.on_complete = None;
        self.observers.clear();
        debug!(
            instance = %self.id,
            stage = self.current_key.as_ref().map(StageKey::name),
            voided,
            completed = self.completed,
            "Stage machine torn down"
        );
    }

    // -----------------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------------

    /// Return the instance id.
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Return the timing context the machine was mounted with.
    pub const fn context(&self) -> LabTimeContext {
        self.ctx
    }

    /// Return the stage table.
    pub const fn table(&self) -> &StageTable<S> {
        &self.table
    }

    /// Return the current stage.
    pub const fn current(&self) -> Option<&S> {
        self.current_key.as_ref()
    }

    /// Return the position of the current stage.
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// Return the role of the current stage.
    pub const fn current_role(&self) -> StageRole {
        self.current_role
    }

    /// Progress of the accumulator bound to the current stage.
    pub fn progress(&self) -> Option<f64> {
        self.bindings
            .get(self.current)
            .and_then(Option::as_ref)
            .map(Accumulator::progress)
    }

    /// Return whether the terminal stage has been reached.
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// Return whether the machine has been torn down.
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Return every transition so far, starting with the mount.
    pub fn history(&self) -> &[TransitionRecord<S>] {
        &self.history
    }

    /// Milliseconds since mount on the machine's clock.
    pub const fn now_ms(&self) -> u64 {
        self.ledger.now_ms()
    }

    /// Return the number of successful retries.
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Machine time of the next timer or accumulator crossing, if any.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        if self.completed || self.torn_down {
            return None;
        }
        let crossing = self
            .bindings
            .get(self.current)
            .and_then(Option::as_ref)
            .and_then(Accumulator::time_to_cross_ms)
            .map(|ms| self.ledger.now_ms().saturating_add(ms));
        match (self.ledger.next_due_ms(), crossing) {
            (Some(timer), Some(crossing)) => Some(timer.min(crossing)),
            (timer, crossing) => timer.or(crossing),
        }
    }

    /// Number of timers still pending.
    pub fn pending_timers(&self) -> usize {
        self.ledger.pending()
    }

    /// Return the ledger counters.
    pub const fn ledger_stats(&self) -> LedgerStats {
        self.ledger.stats()
    }

    /// Check the ledger's accounting law.
    pub fn verify_accounting(&self) -> AccountingResult {
        self.ledger.verify_accounting()
    }

    /// Build a render snapshot.
    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            instance_id: self.id,
            stage: self
                .current_key
                .as_ref()
                .map(|key| key.name().to_owned())
                .unwrap_or_default(),
            role: self.current_role,
            stage_index: u32::try_from(self.current).unwrap_or(u32::MAX),
            stage_count: u32::try_from(self.table.len()).unwrap_or(u32::MAX),
            progress: self.progress(),
            completed: self.completed,
            torn_down: self.torn_down,
            now_ms: self.ledger.now_ms(),
            mode: self.ctx.mode(),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn is_current(&self, expected: &S) -> bool {
        !self.completed && !self.torn_down && self.current_key.as_ref() == Some(expected)
    }

    fn current_accumulator_mut(&mut self) -> Option<&mut Accumulator> {
        self.bindings.get_mut(self.current).and_then(Option::as_mut)
    }

    fn dispatch(&mut self, action: TimerAction) {
        match action {
            TimerAction::AutoAdvance { from } if from == self.current => {
                self.step(TransitionCause::AutoAdvance);
            }
            TimerAction::SafetyAdvance { from } if from == self.current => {
                self.step(TransitionCause::SafetyAdvance);
            }
            _ => {}
        }
    }

    /// Move to the next stage. The caller has checked the guard.
    fn step(&mut self, cause: TransitionCause) -> AdvanceOutcome<S> {
        if self.completed || self.torn_down {
            return AdvanceOutcome::Stale;
        }
        let Some(from) = self.current_key.clone() else {
            return AdvanceOutcome::Stale;
        };
        let Some(next) = self
            .current
            .checked_add(1)
            .filter(|next| *next < self.table.len())
        else {
            return AdvanceOutcome::Stale;
        };

        self.enter(next, cause);
        let Some(to) = self.current_key.clone() else {
            return AdvanceOutcome::Stale;
        };
        if self.completed {
            AdvanceOutcome::Completed { from, to }
        } else {
            AdvanceOutcome::Advanced { from, to }
        }
    }

    fn enter(&mut self, index: usize, cause: TransitionCause) {
        let Some(spec) = self.table.get(index) else {
            return;
        };
        let (key, role, rule) = (spec.key.clone(), spec.role, spec.rule);

        for handle in self.stage_timers.drain(..) {
            self.ledger.void_one(handle);
        }

        let record = TransitionRecord {
            from: self.current_key.replace(key.clone()),
            to: key,
            role,
            cause,
            at_ms: self.ledger.now_ms(),
        };
        self.current = index;
        self.current_role = role;

        debug!(
            instance = %self.id,
            from = record.from.as_ref().map(StageKey::name),
            to = record.to.name(),
            role = role.as_str(),
            cause = ?cause,
            at_ms = record.at_ms,
            "Stage entered"
        );
        for observer in &mut self.observers {
            observer.on_stage_entered(&record);
        }
        self.history.push(record);

        match rule {
            AdvanceRule::Terminal => self.complete(),
            AdvanceRule::Auto { timing } => {
                self.schedule(TimerAction::AutoAdvance { from: index }, self.ctx.rescale(timing));
            }
            AdvanceRule::Gated {
                safety: Some(timing),
            } => {
                self.schedule(
                    TimerAction::SafetyAdvance { from: index },
                    self.ctx.rescale(timing),
                );
            }
            AdvanceRule::Gated { safety: None } => {}
        }
    }

    fn schedule(&mut self, action: TimerAction, delay_ms: u64) {
        match self.ledger.schedule(action, delay_ms) {
            Ok(handle) => self.stage_timers.push(handle),
            Err(error) => {
                debug!(instance = %self.id, %error, "Timer not scheduled");
            }
        }
    }

    fn complete(&mut self) {
        self.completed = true;
        let voided = self.ledger.void_all();
        self.stage_timers.clear();

        let report = CompletionReport {
            instance_id: self.id,
            final_stage: self
                .current_key
                .as_ref()
                .map(|key| key.name().to_owned())
                .unwrap_or_default(),
            elapsed_ms: self.ledger.now_ms(),
            transitions: u32::try_from(self.history.len().saturating_sub(1)).unwrap_or(u32::MAX),
            retries: self.retries,
            completed_at: Utc::now(),
        };
        info!(
            instance = %self.id,
            final_stage = %report.final_stage,
            elapsed_ms = report.elapsed_ms,
            transitions = report.transitions,
            voided,
            "Module completed"
        );
        if let Some(callback) = self.on_complete.take() {
            callback(report);
        }
    }
}

impl<S: StageKey> Drop for StageMachine<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
