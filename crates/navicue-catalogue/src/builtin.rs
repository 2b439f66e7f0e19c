//! Built-in NaviCue modules.
//!
//! Six modules, one or two per interaction kind. Every module walks the
//! same arc (ambient arrival, interaction, resonant reflection, afterglow)
//! and carries documented Lab figures for every timed stage: arrivals use a
//! fixed Lab duration, resonant fades a flat fraction, and safety caps keep
//! their production length.
//!
//! Demo scripts wait with production durations, so the same script
//! completes a module in either timing mode.

use navicue_core::{
    AccumulatorBinding, AccumulatorRule, DwellBreak, ModuleDefinition, ModuleMeta, ScriptStep,
    StageSpec, StageTiming,
};
use navicue_types::{InteractionInput, InteractionKind};

use crate::catalogue::{Catalogue, CatalogueError};

/// Share of the production duration a resonant fade keeps in Lab mode.
const LAB_RESONANT_FRACTION: f64 = 0.3;

/// Helper to build [`ModuleMeta`].
fn meta(
    id: &str,
    title: &str,
    signature: &str,
    mechanism: &str,
    kbe: &str,
    form: &str,
    interaction: InteractionKind,
) -> ModuleMeta {
    ModuleMeta {
        id: id.to_owned(),
        title: title.to_owned(),
        signature: signature.to_owned(),
        mechanism: mechanism.to_owned(),
        kbe: kbe.to_owned(),
        form: form.to_owned(),
        interaction,
    }
}

/// Helper to build the common four-stage arc around one gated stage.
fn arc(
    arrival: StageTiming,
    gate: &str,
    safety: Option<StageTiming>,
    resonant_ms: u64,
) -> Vec<StageSpec<String>> {
    vec![
        StageSpec::ambient("arriving".to_owned(), arrival),
        StageSpec::interactive(gate.to_owned(), safety),
        StageSpec::resonant(
            "resonant".to_owned(),
            StageTiming::fraction(resonant_ms, LAB_RESONANT_FRACTION),
        ),
        StageSpec::afterglow("afterglow".to_owned()),
    ]
}

fn bind(stage: &str, rule: AccumulatorRule) -> Vec<AccumulatorBinding> {
    vec![AccumulatorBinding {
        stage: stage.to_owned(),
        rule,
    }]
}

const fn wait(ms: u64) -> ScriptStep {
    ScriptStep::Wait { ms }
}

fn input(stage: &str, input: InteractionInput) -> ScriptStep {
    ScriptStep::Input {
        stage: stage.to_owned(),
        input,
    }
}

fn tap(stage: &str) -> ScriptStep {
    input(stage, InteractionInput::Tap { qualifying: true })
}

fn miss(stage: &str) -> ScriptStep {
    input(stage, InteractionInput::Tap { qualifying: false })
}

// ---------------------------------------------------------------------------
// Tap modules
// ---------------------------------------------------------------------------

/// Five deliberate taps to cross a threshold.
fn threshold_taps() -> ModuleDefinition {
    let mut demo_script = vec![wait(3_000)];
    for _ in 0..5 {
        demo_script.push(tap("tapping"));
        demo_script.push(wait(400));
    }
    ModuleDefinition {
        meta: meta(
            "threshold_taps",
            "Threshold",
            "sacred_ordinary",
            "metacognition",
            "knowing",
            "ritual",
            InteractionKind::Tap,
        ),
        stages: arc(StageTiming::fixed(3_000, 1_200), "tapping", None, 5_000),
        accumulators: bind("tapping", AccumulatorRule::Counter { target: 5 }),
        demo_script,
    }
}

/// Twelve lanterns lit one at a time after a short presentation beat.
fn lantern_chain() -> ModuleDefinition {
    let mut stages = arc(
        StageTiming::fixed(2_500, 1_000),
        "lighting",
        Some(StageTiming::same(60_000)),
        6_000,
    );
    stages.insert(
        1,
        StageSpec::presentation("presenting".to_owned(), StageTiming::fixed(2_000, 800)),
    );

    let mut demo_script = vec![wait(4_500), miss("lighting")];
    for _ in 0..12 {
        demo_script.push(tap("lighting"));
        demo_script.push(wait(250));
    }
    ModuleDefinition {
        meta: meta(
            "lantern_chain",
            "Lantern Chain",
            "relational_ghost",
            "behavioral_activation",
            "embodying",
            "practice",
            InteractionKind::Tap,
        ),
        stages,
        accumulators: bind("lighting", AccumulatorRule::Counter { target: 12 }),
        demo_script,
    }
}

/// Six paced breaths, with one restart partway through.
fn six_breaths() -> ModuleDefinition {
    let mut demo_script = vec![
        wait(3_000),
        tap("breathing"),
        wait(1_000),
        tap("breathing"),
        ScriptStep::Retry {
            stage: "breathing".to_owned(),
        },
    ];
    for _ in 0..6 {
        demo_script.push(wait(1_000));
        demo_script.push(tap("breathing"));
    }
    ModuleDefinition {
        meta: meta(
            "six_breaths",
            "Six Breaths",
            "somatic_clock",
            "interoception",
            "embodying",
            "ritual",
            InteractionKind::Tap,
        ),
        stages: arc(StageTiming::fixed(3_000, 1_200), "breathing", None, 5_000),
        accumulators: bind("breathing", AccumulatorRule::Counter { target: 6 }),
        demo_script,
    }
}

// ---------------------------------------------------------------------------
// Hold, drag and observe modules
// ---------------------------------------------------------------------------

/// Press and hold to anchor; letting go lets the anchor drift back.
fn breath_anchor() -> ModuleDefinition {
    ModuleDefinition {
        meta: meta(
            "breath_anchor",
            "Breath Anchor",
            "somatic_clock",
            "interoception",
            "believing",
            "practice",
            InteractionKind::Hold,
        ),
        stages: arc(
            StageTiming::fixed(2_000, 800),
            "holding",
            Some(StageTiming::same(45_000)),
            5_000,
        ),
        accumulators: bind(
            "holding",
            AccumulatorRule::HoldDecay {
                rise_per_sec: 0.4,
                decay_per_sec: 0.3,
            },
        ),
        demo_script: vec![
            wait(2_000),
            input("holding", InteractionInput::PressStart),
            wait(1_000),
            input("holding", InteractionInput::PressEnd),
            wait(500),
            input("holding", InteractionInput::PressStart),
            wait(2_000),
            input("holding", InteractionInput::PressEnd),
        ],
    }
}

/// Drag the stone downstream until it is released.
fn river_release() -> ModuleDefinition {
    let mut demo_script = vec![wait(2_200)];
    for _ in 0..3 {
        demo_script.push(input(
            "dragging",
            InteractionInput::Drag {
                dx: 120.0,
                dy: 160.0,
            },
        ));
        demo_script.push(wait(300));
    }
    ModuleDefinition {
        meta: meta(
            "river_release",
            "River Release",
            "sensory_cinema",
            "defusion",
            "believing",
            "mirror",
            InteractionKind::Drag,
        ),
        stages: arc(
            StageTiming::fixed(2_200, 900),
            "dragging",
            Some(StageTiming::same(60_000)),
            4_500,
        ),
        accumulators: bind("dragging", AccumulatorRule::DragDistance { threshold: 600.0 }),
        demo_script,
    }
}

/// Stay still for eight seconds; any touch starts the count again.
fn still_point() -> ModuleDefinition {
    ModuleDefinition {
        meta: meta(
            "still_point",
            "Still Point",
            "koan_paradox",
            "exposure",
            "knowing",
            "probe",
            InteractionKind::Observe,
        ),
        stages: arc(
            StageTiming::fixed(2_000, 800),
            "observing",
            Some(StageTiming::same(30_000)),
            5_000,
        ),
        accumulators: bind(
            "observing",
            AccumulatorRule::Dwell {
                target_ms: 8_000,
                on_break: DwellBreak::Reset,
            },
        ),
        demo_script: vec![
            wait(5_000),
            input("observing", InteractionInput::ObservationBreak),
            wait(1_000),
            input("observing", InteractionInput::ObservationStart),
            wait(8_000),
        ],
    }
}

/// Build the catalogue of built-in modules.
///
/// # Errors
///
/// Returns [`CatalogueError`] if a built-in definition fails validation.
pub fn create_catalogue() -> Result<Catalogue, CatalogueError> {
    let mut catalogue = Catalogue::new();
    catalogue.extend([
        threshold_taps(),
        lantern_chain(),
        breath_anchor(),
        river_release(),
        still_point(),
        six_breaths(),
    ])?;
    Ok(catalogue)
}
