//! Real-time driver for a single stage machine.
//!
//! [`run_choreography`] is the body of a tokio task that owns one
//! [`StageMachine`]. It sleeps until the machine's next deadline, applies
//! input events from a channel in arrival order, and stops on completion,
//! on an external unmount, or when input is closed and nothing is left to
//! wait for. Before every input it moves the machine's clock to the real
//! elapsed time, so timers and inputs interleave in the order they happened.
//!
//! The machine is always torn down before the driver returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{Notify, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use navicue_ledger::AccountingResult;
use navicue_types::InteractionInput;

use crate::machine::{AdvanceOutcome, StageMachine};
use crate::table::StageKey;

/// An event delivered to a running driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverInput<S> {
    /// Feed an interaction to the accumulator of `expected`.
    Interact {
        /// The stage the input is meant for.
        expected: S,
        /// The event.
        input: InteractionInput,
    },
    /// Request an explicit advance from `expected`.
    Advance {
        /// The stage to leave.
        expected: S,
    },
    /// Retry the current interaction of `expected`.
    Retry {
        /// The stage to retry.
        expected: S,
    },
}

/// Why a driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverEndReason {
    /// The module reached its terminal stage.
    Completed,
    /// The owner unmounted the module first.
    Unmounted,
    /// The input channel closed and the machine had nothing scheduled.
    InputClosed,
}

/// Summary returned when a driver stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverOutcome<S> {
    /// Why the driver stopped.
    pub end_reason: DriverEndReason,
    /// Stage the machine ended on.
    pub final_stage: Option<S>,
    /// Machine time when the driver stopped.
    pub elapsed_ms: u64,
    /// Stage transitions, not counting the mount.
    pub transitions: usize,
}

/// Shared unmount signal for a running driver.
///
/// Cheap to check, and awaitable without polling.
#[derive(Debug, Default)]
pub struct UnmountHandle {
    requested: AtomicBool,
    notify: Notify,
}

impl UnmountHandle {
    /// Create a new, un-triggered handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an unmount. Idempotent.
    pub fn unmount(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Return whether an unmount has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Wait until an unmount is requested. Returns at once if it already
    /// was.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}

/// Owner's handle to a driver spawned with [`spawn_choreography`].
///
/// Dropping the handle unmounts the module: a driver never outlives its
/// owner.
#[derive(Debug)]
pub struct ChoreographyHandle<S> {
    inputs: Option<mpsc::Sender<DriverInput<S>>>,
    unmount: Arc<UnmountHandle>,
    task: JoinHandle<DriverOutcome<S>>,
}

impl<S> ChoreographyHandle<S> {
    /// Send an input to the driver, waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns the input back if the driver has stopped or
    /// [`close_inputs`](Self::close_inputs) was called.
    pub async fn send(&self, input: DriverInput<S>) -> Result<(), SendError<DriverInput<S>>> {
        match &self.inputs {
            Some(inputs) => inputs.send(input).await,
            None => Err(SendError(input)),
        }
    }

    /// Close the input channel. The driver keeps running on timers alone.
    pub fn close_inputs(&mut self) {
        self.inputs = None;
    }

    /// Request an unmount.
    pub fn unmount(&self) {
        self.unmount.unmount();
    }

    /// A shared unmount signal, for unmounting from another task.
    pub fn unmount_handle(&self) -> Arc<UnmountHandle> {
        Arc::clone(&self.unmount)
    }

    /// Close the input channel and wait for the driver to stop.
    ///
    /// # Errors
    ///
    /// Returns the [`JoinError`] if the driver task panicked or was
    /// cancelled.
    pub async fn join(mut self) -> Result<DriverOutcome<S>, JoinError> {
        self.inputs = None;
        (&mut self.task).await
    }
}

impl<S> Drop for ChoreographyHandle<S> {
    fn drop(&mut self) {
        self.unmount.unmount();
    }
}

/// Spawn a driver task for `machine` with an input channel of `capacity`.
pub fn spawn_choreography<S>(machine: StageMachine<S>, capacity: usize) -> ChoreographyHandle<S>
where
    S: StageKey + Send + 'static,
{
    let (inputs, receiver) = mpsc::channel(capacity.max(1));
    let unmount = Arc::new(UnmountHandle::new());
    let task = tokio::spawn(run_choreography(machine, receiver, Arc::clone(&unmount)));
    ChoreographyHandle {
        inputs: Some(inputs),
        unmount,
        task,
    }
}

/// Drive `machine` until it completes, is unmounted, or runs out of both
/// input and scheduled work.
pub async fn run_choreography<S: StageKey>(
    mut machine: StageMachine<S>,
    mut inputs: mpsc::Receiver<DriverInput<S>>,
    unmount: Arc<UnmountHandle>,
) -> DriverOutcome<S> {
    let clock = DriverClock::start(machine.now_ms());
    let mut inputs_open = true;

    info!(
        instance = %machine.id(),
        mode = machine.context().mode().as_str(),
        "Choreography started"
    );

    let end_reason = loop {
        clock.sync(&mut machine);
        if machine.is_completed() {
            break DriverEndReason::Completed;
        }
        if unmount.is_requested() {
            break DriverEndReason::Unmounted;
        }
        let deadline = machine.next_deadline_ms();
        if !inputs_open && deadline.is_none() {
            break DriverEndReason::InputClosed;
        }

        tokio::select! {
            biased;

            () = unmount.wait() => {
                break DriverEndReason::Unmounted;
            }
            received = inputs.recv(), if inputs_open => {
                if let Some(input) = received {
                    clock.sync(&mut machine);
                    apply(&mut machine, input);
                } else {
                    inputs_open = false;
                    debug!(instance = %machine.id(), "Input channel closed");
                }
            }
            () = sleep_until(deadline.and_then(|at| clock.instant_at(at))) => {}
        }
    };

    let outcome = DriverOutcome {
        end_reason,
        final_stage: machine.current().cloned(),
        elapsed_ms: machine.now_ms(),
        transitions: machine.history().len().saturating_sub(1),
    };
    machine.teardown();

    if let AccountingResult::Anomaly(anomaly) = machine.verify_accounting() {
        warn!(instance = %machine.id(), %anomaly, "Timer accounting anomaly after teardown");
    }
    info!(
        instance = %machine.id(),
        end_reason = ?outcome.end_reason,
        elapsed_ms = outcome.elapsed_ms,
        transitions = outcome.transitions,
        "Choreography ended"
    );
    outcome
}

/// Maps real elapsed time onto the machine's clock.
struct DriverClock {
    started: Instant,
    base_ms: u64,
}

impl DriverClock {
    fn start(base_ms: u64) -> Self {
        Self {
            started: Instant::now(),
            base_ms,
        }
    }

    fn machine_now_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.base_ms.saturating_add(elapsed)
    }

    fn sync<S: StageKey>(&self, machine: &mut StageMachine<S>) {
        let behind = self.machine_now_ms().saturating_sub(machine.now_ms());
        if behind > 0 {
            machine.elapse(behind);
        }
    }

    fn instant_at(&self, machine_ms: u64) -> Option<Instant> {
        let offset = machine_ms.saturating_sub(self.base_ms);
        self.started.checked_add(Duration::from_millis(offset))
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn apply<S: StageKey>(machine: &mut StageMachine<S>, input: DriverInput<S>) {
    match input {
        DriverInput::Interact { expected, input } => {
            let outcome = machine.input(&expected, input);
            trace!(stage = expected.name(), ?outcome, "Input applied");
        }
        DriverInput::Advance { expected } => {
            let stale = matches!(machine.advance(&expected), AdvanceOutcome::Stale);
            trace!(stage = expected.name(), stale, "Advance applied");
        }
        DriverInput::Retry { expected } => {
            let retried = machine.retry(&expected);
            trace!(stage = expected.name(), retried, "Retry applied");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::accumulator::{Accumulator, AccumulatorRule};
    use crate::table::{StageSpec, StageTable};
    use crate::timing::{LabTimeContext, StageTiming};

    const TAP: InteractionInput = InteractionInput::Tap { qualifying: true };

    fn machine(safety: Option<StageTiming>) -> (StageMachine<&'static str>, Arc<AtomicU32>) {
        let table = StageTable::new(vec![
            StageSpec::ambient("arriving", StageTiming::same(1_000)),
            StageSpec::interactive("tapping", safety),
            StageSpec::resonant("resonant", StageTiming::same(500)),
            StageSpec::afterglow("afterglow"),
        ])
        .unwrap();
        let count = Arc::new(AtomicU32::new(0));
        let inner = Arc::clone(&count);
        let machine = StageMachine::builder(table, LabTimeContext::production())
            .accumulator(
                &"tapping",
                Accumulator::new(AccumulatorRule::Counter { target: 2 }).unwrap(),
            )
            .unwrap()
            .on_complete(move |_| {
                inner.fetch_add(1, Ordering::SeqCst);
            })
            .mount();
        (machine, count)
    }

    #[tokio::test(start_paused = true)]
    async fn drives_to_completion_with_inputs() {
        let (machine, count) = machine(None);
        let handle = spawn_choreography(machine, 8);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        for _ in 0..2 {
            let input = DriverInput::Interact {
                expected: "tapping",
                input: TAP,
            };
            handle.send(input).await.unwrap();
        }

        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.end_reason, DriverEndReason::Completed);
        assert_eq!(outcome.final_stage, Some("afterglow"));
        assert_eq!(outcome.elapsed_ms, 2_000);
        assert_eq!(outcome.transitions, 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_stops_the_driver() {
        let (machine, count) = machine(Some(StageTiming::same(10_000)));
        let handle = spawn_choreography(machine, 8);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        handle.unmount();
        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.end_reason, DriverEndReason::Unmounted);
        assert_eq!(outcome.final_stage, Some("tapping"));

        tokio::time::sleep(Duration::from_millis(60_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_timers_after_input_closes() {
        let (machine, count) = machine(Some(StageTiming::same(3_000)));
        let mut handle = spawn_choreography(machine, 8);
        handle.close_inputs();

        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.end_reason, DriverEndReason::Completed);
        assert_eq!(outcome.elapsed_ms, 1_000 + 3_000 + 500);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn input_closed_at_an_uncapped_gate() {
        let (machine, count) = machine(None);
        let mut handle = spawn_choreography(machine, 8);
        handle.close_inputs();

        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.end_reason, DriverEndReason::InputClosed);
        assert_eq!(outcome.final_stage, Some("tapping"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_inputs_are_harmless() {
        let (machine, count) = machine(None);
        let handle = spawn_choreography(machine, 8);

        for expected in ["resonant", "afterglow", "tapping"] {
            let input = DriverInput::Advance { expected };
            handle.send(input).await.unwrap();
        }
        handle.unmount();
        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.final_stage, Some("arriving"));
        assert_eq!(outcome.transitions, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_unmounts() {
        let (machine, count) = machine(Some(StageTiming::same(3_000)));
        let handle = spawn_choreography(machine, 8);
        let unmount = handle.unmount_handle();

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(handle);
        assert!(unmount.is_requested());

        tokio::time::sleep(Duration::from_millis(60_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn send_after_close_returns_the_input() {
        let (machine, _count) = machine(None);
        let mut handle = spawn_choreography(machine, 8);
        handle.close_inputs();
        let input = DriverInput::Advance {
            expected: "arriving",
        };
        let result = handle.send(input.clone()).await;
        assert_eq!(result.map_err(|e| e.0), Err(input));
        handle.unmount();
        assert_eq!(handle.join().await.unwrap().end_reason, DriverEndReason::Unmounted);
    }

    #[tokio::test]
    async fn unmount_wait_returns_when_already_requested() {
        let handle = UnmountHandle::new();
        handle.unmount();
        handle.wait().await;
        assert!(handle.is_requested());
    }
}
