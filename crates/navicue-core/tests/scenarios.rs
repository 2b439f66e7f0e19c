//! End-to-end choreography scenarios for compiled stage enums.
//!
//! Each test mounts a machine over a small enum-keyed table and drives it
//! with explicit `elapse` calls, the way a headless preview does.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use navicue_core::{
    Accumulator, AccumulatorRule, AdvanceOutcome, InputOutcome, LabTimeContext, StageKey,
    StageMachine, StageSpec, StageTable, StageTiming,
};
use navicue_types::{CompletionReport, InteractionInput, TransitionCause};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cue {
    Arriving,
    Engaging,
    Resonant,
    Afterglow,
}

impl StageKey for Cue {
    fn name(&self) -> &str {
        match self {
            Self::Arriving => "arriving",
            Self::Engaging => "engaging",
            Self::Resonant => "resonant",
            Self::Afterglow => "afterglow",
        }
    }
}

const TAP: InteractionInput = InteractionInput::Tap { qualifying: true };

fn table(arrival: StageTiming, safety: Option<StageTiming>) -> StageTable<Cue> {
    StageTable::new(vec![
        StageSpec::ambient(Cue::Arriving, arrival),
        StageSpec::interactive(Cue::Engaging, safety),
        StageSpec::resonant(Cue::Resonant, StageTiming::fraction(5_000, 0.3)),
        StageSpec::afterglow(Cue::Afterglow),
    ])
    .unwrap()
}

fn completion_counter() -> (
    Arc<AtomicU32>,
    impl FnOnce(CompletionReport) + Send + 'static,
) {
    let count = Arc::new(AtomicU32::new(0));
    let inner = Arc::clone(&count);
    (count, move |_report: CompletionReport| {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

fn hold_machine() -> (StageMachine<Cue>, Arc<AtomicU32>) {
    let (count, callback) = completion_counter();
    let hold = Accumulator::new(AccumulatorRule::HoldDecay {
        rise_per_sec: 0.4,
        decay_per_sec: 0.3,
    })
    .unwrap();
    let machine = StageMachine::builder(
        table(StageTiming::fixed(2_000, 800), None),
        LabTimeContext::production(),
    )
    .accumulator(&Cue::Engaging, hold)
    .unwrap()
    .on_complete(callback)
    .mount();
    (machine, count)
}

#[test]
fn no_input_reaches_afterglow_after_arrival_and_resonance() {
    let (count, callback) = completion_counter();
    let mut machine = StageMachine::mount(
        table(StageTiming::same(2_000), None),
        LabTimeContext::production(),
        callback,
    );

    machine.elapse(2_000);
    assert_eq!(machine.current(), Some(&Cue::Engaging));

    // The gate has no duration of its own; this module taps straight through.
    let outcome = machine.advance(&Cue::Engaging);
    assert!(matches!(outcome, AdvanceOutcome::Advanced { .. }));

    machine.elapse(4_999);
    assert!(!machine.is_completed());
    machine.elapse(1);
    assert!(machine.is_completed());
    assert_eq!(machine.now_ms(), 2_000 + 5_000);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    machine.elapse(60_000);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn no_input_with_safety_cap_completes_unattended() {
    let (count, callback) = completion_counter();
    let mut machine = StageMachine::mount(
        table(StageTiming::same(2_000), Some(StageTiming::same(45_000))),
        LabTimeContext::production(),
        callback,
    );
    assert!(machine.settle());
    assert_eq!(machine.now_ms(), 2_000 + 45_000 + 5_000);
    let causes: Vec<_> = machine.history().iter().map(|r| r.cause).collect();
    assert_eq!(
        causes,
        vec![
            TransitionCause::Mount,
            TransitionCause::AutoAdvance,
            TransitionCause::SafetyAdvance,
            TransitionCause::AutoAdvance,
        ]
    );
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn counter_advances_on_fifth_tap_only() {
    let (count, callback) = completion_counter();
    let mut machine = StageMachine::builder(
        table(StageTiming::same(2_000), None),
        LabTimeContext::production(),
    )
    .accumulator(
        &Cue::Engaging,
        Accumulator::new(AccumulatorRule::Counter { target: 5 }).unwrap(),
    )
    .unwrap()
    .on_complete(callback)
    .mount();
    machine.elapse(2_000);

    for _ in 0..4 {
        let outcome = machine.input(&Cue::Engaging, TAP);
        assert!(matches!(outcome, InputOutcome::Progress(p) if p < 1.0));
        assert_eq!(machine.current(), Some(&Cue::Engaging));
    }
    assert_eq!(machine.input(&Cue::Engaging, TAP), InputOutcome::Advanced);
    assert_eq!(machine.current(), Some(&Cue::Resonant));

    assert_eq!(machine.input(&Cue::Engaging, TAP), InputOutcome::Stale);
    assert_eq!(machine.current(), Some(&Cue::Resonant));
    let interactions = machine
        .history()
        .iter()
        .filter(|r| r.cause == TransitionCause::Interaction)
        .count();
    assert_eq!(interactions, 1);

    machine.elapse(5_000);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn hold_decays_from_the_held_value() {
    let (mut machine, _) = hold_machine();
    machine.elapse(2_000);

    machine.input(&Cue::Engaging, InteractionInput::PressStart);
    machine.elapse(1_000);
    assert!(machine.progress().is_some_and(|p| (p - 0.4).abs() < 1e-9));

    machine.input(&Cue::Engaging, InteractionInput::PressEnd);
    machine.elapse(500);
    let expected = (0.4_f64 - 0.3 * 0.5).max(0.0);
    assert!(machine.progress().is_some_and(|p| (p - expected).abs() < 1e-9));
    assert_eq!(machine.current(), Some(&Cue::Engaging));
}

#[test]
fn hold_crosses_at_full_progress() {
    let (mut machine, _) = hold_machine();
    machine.elapse(2_000);
    machine.input(&Cue::Engaging, InteractionInput::PressStart);

    machine.elapse(2_499);
    assert_eq!(machine.current(), Some(&Cue::Engaging));
    machine.elapse(1);
    assert_eq!(machine.current(), Some(&Cue::Resonant));
    assert_eq!(machine.history()[2].at_ms, 2_000 + 2_500);
    assert_eq!(machine.history()[2].cause, TransitionCause::Interaction);
}

#[test]
fn lab_mode_schedules_documented_arrival() {
    let (_, callback) = completion_counter();
    let mut machine = StageMachine::mount(
        table(StageTiming::fixed(3_000, 1_200), None),
        LabTimeContext::lab(),
        callback,
    );
    assert_eq!(machine.next_deadline_ms(), Some(1_200));

    machine.elapse(1_199);
    assert_eq!(machine.current(), Some(&Cue::Arriving));
    machine.elapse(1);
    assert_eq!(machine.current(), Some(&Cue::Engaging));
    assert_eq!(machine.history()[1].at_ms, 1_200);

    let (_, callback) = completion_counter();
    let production = StageMachine::mount(
        table(StageTiming::fixed(3_000, 1_200), None),
        LabTimeContext::production(),
        callback,
    );
    assert_eq!(production.next_deadline_ms(), Some(3_000));
}

#[test]
fn teardown_mid_hold_silences_everything() {
    let (mut machine, count) = hold_machine();
    machine.elapse(2_000);
    machine.input(&Cue::Engaging, InteractionInput::PressStart);
    machine.elapse(1_000);

    machine.teardown();
    let transitions = machine.history().len();

    // Well past the moment the hold would have crossed.
    machine.elapse(10_000);
    assert_eq!(machine.history().len(), transitions);
    assert_eq!(machine.current(), Some(&Cue::Engaging));
    assert_eq!(machine.advance(&Cue::Engaging), AdvanceOutcome::Stale);
    assert_eq!(
        machine.input(&Cue::Engaging, InteractionInput::PressEnd),
        InputOutcome::Stale
    );
    assert_eq!(machine.pending_timers(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn dropping_a_machine_never_completes_it() {
    let (mut machine, count) = hold_machine();
    machine.elapse(2_000);
    machine.input(&Cue::Engaging, InteractionInput::PressStart);
    drop(machine);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}
