//! Lab time context and per-stage timing profiles.
//!
//! A module instance is mounted either at production speed or inside a Lab
//! preview surface that compresses durations. The context only carries the
//! mode flag. The compressed numbers live with each stage's [`StageTiming`],
//! because modules compress non-uniformly: a safety cap may stay long in both
//! modes while a resonant fade always shrinks to a flat fraction.
//!
//! Rescaling is pure and total. Lab durations never exceed production
//! durations, and every result is a finite, non-negative millisecond count.

use serde::{Deserialize, Serialize};

use navicue_types::TimingMode;

/// How a stage's duration is compressed in Lab mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LabRescale {
    /// Keep the production duration (long safety caps).
    Same,
    /// Use a documented Lab duration in milliseconds. Clamped to the
    /// production duration.
    Fixed(u64),
    /// Scale the production duration by a fraction in `0.0..=1.0`.
    Fraction(f64),
}

/// Nominal duration of a timed stage plus its Lab compression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Duration at production speed, in milliseconds.
    pub production_ms: u64,
    /// Lab compression rule.
    #[serde(default = "default_lab_rescale")]
    pub lab: LabRescale,
}

const fn default_lab_rescale() -> LabRescale {
    LabRescale::Same
}

impl StageTiming {
    /// A duration that is the same in both modes.
    pub const fn same(production_ms: u64) -> Self {
        Self {
            production_ms,
            lab: LabRescale::Same,
        }
    }

    /// A duration with a documented Lab figure.
    pub const fn fixed(production_ms: u64, lab_ms: u64) -> Self {
        Self {
            production_ms,
            lab: LabRescale::Fixed(lab_ms),
        }
    }

    /// A duration compressed to `fraction` of production in Lab mode.
    pub const fn fraction(production_ms: u64, fraction: f64) -> Self {
        Self {
            production_ms,
            lab: LabRescale::Fraction(fraction),
        }
    }

    /// The effective Lab duration.
    pub fn lab_ms(self) -> u64 {
        match self.lab {
            LabRescale::Same => self.production_ms,
            LabRescale::Fixed(ms) => ms.min(self.production_ms),
            LabRescale::Fraction(fraction) => scale_fraction(self.production_ms, fraction),
        }
    }

    /// Check that the Lab rule is well formed.
    ///
    /// Returns a human-readable reason on failure. [`lab_ms`](Self::lab_ms)
    /// stays total even for rules that fail this check.
    pub fn validate(self) -> Result<(), String> {
        match self.lab {
            LabRescale::Same => Ok(()),
            LabRescale::Fixed(ms) if ms > self.production_ms => Err(format!(
                "lab duration {ms}ms exceeds production duration {}ms",
                self.production_ms
            )),
            LabRescale::Fixed(_) => Ok(()),
            LabRescale::Fraction(fraction) if !fraction.is_finite() => {
                Err(format!("lab fraction {fraction} is not finite"))
            }
            LabRescale::Fraction(fraction) if !(0.0..=1.0).contains(&fraction) => {
                Err(format!("lab fraction {fraction} is outside 0.0..=1.0"))
            }
            LabRescale::Fraction(_) => Ok(()),
        }
    }
}

/// Scale `production_ms` by `fraction`, rounding to the nearest millisecond.
///
/// Non-finite fractions leave the duration unchanged; finite ones are
/// clamped to `0.0..=1.0`, so the result never exceeds `production_ms`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scale_fraction(production_ms: u64, fraction: f64) -> u64 {
    if !fraction.is_finite() {
        return production_ms;
    }
    let fraction = fraction.clamp(0.0, 1.0);
    let scaled = (production_ms as f64 * fraction).round();
    // Precision loss on very large durations can round past the input.
    if scaled >= production_ms as f64 {
        production_ms
    } else {
        (scaled as u64).min(production_ms)
    }
}

/// The timing mode a module instance is mounted with.
///
/// Provided once at the root of a preview surface and read-only for every
/// instance below it. Passed explicitly into each machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabTimeContext {
    mode: TimingMode,
}

impl LabTimeContext {
    /// Create a context for the given mode.
    pub const fn new(mode: TimingMode) -> Self {
        Self { mode }
    }

    /// Production timing.
    pub const fn production() -> Self {
        Self::new(TimingMode::Production)
    }

    /// Compressed Lab timing.
    pub const fn lab() -> Self {
        Self::new(TimingMode::Lab)
    }

    /// Return the mode.
    pub const fn mode(self) -> TimingMode {
        self.mode
    }

    /// Return whether durations are compressed.
    pub const fn is_compressed(self) -> bool {
        matches!(self.mode, TimingMode::Lab)
    }

    /// Return the duration to actually schedule for `timing`.
    pub fn rescale(self, timing: StageTiming) -> u64 {
        if self.is_compressed() {
            timing.lab_ms()
        } else {
            timing.production_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_uses_nominal_duration() {
        let ctx = LabTimeContext::production();
        assert!(!ctx.is_compressed());
        assert_eq!(ctx.rescale(StageTiming::fixed(3_000, 1_200)), 3_000);
        assert_eq!(ctx.rescale(StageTiming::fraction(5_000, 0.3)), 5_000);
    }

    #[test]
    fn lab_uses_documented_figure() {
        let ctx = LabTimeContext::lab();
        assert!(ctx.is_compressed());
        assert_eq!(ctx.rescale(StageTiming::fixed(3_000, 1_200)), 1_200);
    }

    #[test]
    fn lab_keeps_safety_caps() {
        let ctx = LabTimeContext::lab();
        assert_eq!(ctx.rescale(StageTiming::same(45_000)), 45_000);
    }

    #[test]
    fn lab_fraction_rounds() {
        let ctx = LabTimeContext::lab();
        assert_eq!(ctx.rescale(StageTiming::fraction(5_000, 0.3)), 1_500);
        assert_eq!(ctx.rescale(StageTiming::fraction(1_001, 0.5)), 501);
    }

    #[test]
    fn lab_never_exceeds_production() {
        let ctx = LabTimeContext::lab();
        let timings = [
            StageTiming::fixed(1_000, 5_000),
            StageTiming::fraction(1_000, 2.5),
            StageTiming::fraction(1_000, -1.0),
            StageTiming::fraction(1_000, f64::NAN),
            StageTiming::fraction(1_000, f64::INFINITY),
            StageTiming::fraction(u64::MAX, 1.0),
            StageTiming::fraction(u64::MAX, 0.999_999),
            StageTiming::same(0),
        ];
        for timing in timings {
            let lab = ctx.rescale(timing);
            let production = LabTimeContext::production().rescale(timing);
            assert!(lab <= production, "{timing:?}: {lab} > {production}");
        }
    }

    #[test]
    fn negative_fraction_clamps_to_zero() {
        assert_eq!(StageTiming::fraction(1_000, -1.0).lab_ms(), 0);
    }

    #[test]
    fn validate_flags_bad_rules() {
        assert!(StageTiming::fixed(1_000, 1_200).validate().is_err());
        assert!(StageTiming::fraction(1_000, 1.5).validate().is_err());
        assert!(StageTiming::fraction(1_000, f64::NAN).validate().is_err());
        assert!(StageTiming::fixed(1_000, 400).validate().is_ok());
        assert!(StageTiming::fraction(1_000, 0.0).validate().is_ok());
        assert!(StageTiming::same(1_000).validate().is_ok());
    }

    #[test]
    fn timing_parses_from_yaml() {
        let yaml = "production_ms: 3000\nlab:\n  kind: fixed\n  value: 1200\n";
        let timing: Result<StageTiming, _> = serde_yml::from_str(yaml);
        assert!(matches!(
            timing,
            Ok(StageTiming {
                production_ms: 3_000,
                lab: LabRescale::Fixed(1_200)
            })
        ));

        let yaml = "production_ms: 45000\n";
        let timing: Result<StageTiming, _> = serde_yml::from_str(yaml);
        assert!(matches!(timing, Ok(StageTiming { lab: LabRescale::Same, .. })));
    }
}
