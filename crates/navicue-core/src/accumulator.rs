//! Interaction accumulators.
//!
//! An accumulator turns raw input events into progress toward a threshold.
//! Once the threshold is crossed it latches and ignores everything after,
//! so the stage it gates advances at most once.
//!
//! Two of the rules are time-based (hold-with-decay and dwell). They expose
//! [`Accumulator::time_to_cross_ms`] so the machine can order an upcoming
//! crossing against its pending timers.

use serde::{Deserialize, Serialize};

use navicue_types::InteractionInput;

/// Slack used when deciding that a time-based rule has reached its target,
/// both on the progress scale and in milliseconds.
const CROSSING_EPSILON: f64 = 1e-9;

/// Errors raised when building an accumulator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccumulatorError {
    /// The rule parameters cannot ever cross, or are not finite.
    #[error("invalid accumulator rule: {reason}")]
    InvalidRule {
        /// Explanation of what is wrong.
        reason: String,
    },
}

/// What an observation break does to accumulated dwell time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DwellBreak {
    /// Keep accumulated time; resume when observation starts again.
    #[default]
    Pause,
    /// Drop accumulated time back to zero.
    Reset,
}

/// The progress rule of an accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccumulatorRule {
    /// Counts qualifying taps up to `target`.
    Counter {
        /// Qualifying taps needed to cross.
        target: u32,
    },
    /// Rises while pressed and decays while released.
    HoldDecay {
        /// Progress gained per second of holding.
        rise_per_sec: f64,
        /// Progress lost per second after release.
        decay_per_sec: f64,
    },
    /// Sums the length of drag movements.
    DragDistance {
        /// Distance needed to cross, in logical pixels.
        threshold: f64,
    },
    /// Sums time spent observing.
    Dwell {
        /// Observation time needed to cross.
        target_ms: u64,
        /// Behaviour on an observation break.
        #[serde(default)]
        on_break: DwellBreak,
    },
}

impl AccumulatorRule {
    /// Return whether progress moves with time alone.
    pub const fn is_time_based(self) -> bool {
        matches!(self, Self::HoldDecay { .. } | Self::Dwell { .. })
    }

    fn validate(self) -> Result<(), AccumulatorError> {
        let reason = match self {
            Self::Counter { target: 0 } => Some("counter target must be at least 1".to_owned()),
            Self::HoldDecay {
                rise_per_sec,
                decay_per_sec,
            } if !rise_per_sec.is_finite() || rise_per_sec <= 0.0 => Some(format!(
                "hold rise rate {rise_per_sec} must be positive (decay {decay_per_sec})"
            )),
            Self::HoldDecay { decay_per_sec, .. }
                if !decay_per_sec.is_finite() || decay_per_sec < 0.0 =>
            {
                Some(format!("hold decay rate {decay_per_sec} must be non-negative"))
            }
            Self::DragDistance { threshold } if !threshold.is_finite() || threshold <= 0.0 => {
                Some(format!("drag threshold {threshold} must be positive"))
            }
            Self::Dwell { target_ms: 0, .. } => Some("dwell target must be at least 1ms".to_owned()),
            _ => None,
        };
        reason.map_or(Ok(()), |reason| Err(AccumulatorError::InvalidRule { reason }))
    }
}

/// The result of feeding an event or elapsed time into an accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccumulatorSignal {
    /// Progress changed (or was re-reported) and is still below the target.
    Progress(f64),
    /// The threshold was crossed by this event. Reported exactly once.
    Crossed,
    /// The event did not apply to this rule, or the accumulator already
    /// crossed.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Counter { count: u32 },
    Hold { level: f64, pressed: bool },
    Drag { distance: f64 },
    Dwell { elapsed_ms: u64, observing: bool },
}

impl State {
    const fn fresh(rule: AccumulatorRule) -> Self {
        match rule {
            AccumulatorRule::Counter { .. } => Self::Counter { count: 0 },
            AccumulatorRule::HoldDecay { .. } => Self::Hold {
                level: 0.0,
                pressed: false,
            },
            AccumulatorRule::DragDistance { .. } => Self::Drag { distance: 0.0 },
            AccumulatorRule::Dwell { .. } => Self::Dwell {
                elapsed_ms: 0,
                observing: true,
            },
        }
    }

    /// Zero the progress value, keeping the pointer and observation flags.
    const fn cleared(self) -> Self {
        match self {
            Self::Counter { .. } => Self::Counter { count: 0 },
            Self::Hold { pressed, .. } => Self::Hold {
                level: 0.0,
                pressed,
            },
            Self::Drag { .. } => Self::Drag { distance: 0.0 },
            Self::Dwell { observing, .. } => Self::Dwell {
                elapsed_ms: 0,
                observing,
            },
        }
    }
}

/// Progress toward a stage's interaction threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    rule: AccumulatorRule,
    state: State,
    crossed: bool,
}

impl Accumulator {
    /// Build an accumulator at zero progress.
    ///
    /// Dwell accumulators start observing: time counts from stage entry
    /// until the first [`InteractionInput::ObservationBreak`].
    ///
    /// # Errors
    ///
    /// Returns [`AccumulatorError::InvalidRule`] if the rule could never
    /// cross or has non-finite parameters.
    pub fn new(rule: AccumulatorRule) -> Result<Self, AccumulatorError> {
        rule.validate()?;
        Ok(Self {
            rule,
            state: State::fresh(rule),
            crossed: false,
        })
    }

    /// Return the rule.
    pub const fn rule(&self) -> AccumulatorRule {
        self.rule
    }

    /// Return whether the threshold has been crossed.
    pub const fn is_crossed(&self) -> bool {
        self.crossed
    }

    /// Current progress in `0.0..=1.0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f64 {
        if self.crossed {
            return 1.0;
        }
        let raw = match (self.rule, self.state) {
            (AccumulatorRule::Counter { target }, State::Counter { count }) => {
                f64::from(count) / f64::from(target)
            }
            (AccumulatorRule::HoldDecay { .. }, State::Hold { level, .. }) => level,
            (AccumulatorRule::DragDistance { threshold }, State::Drag { distance }) => {
                distance / threshold
            }
            (AccumulatorRule::Dwell { target_ms, .. }, State::Dwell { elapsed_ms, .. }) => {
                elapsed_ms as f64 / target_ms as f64
            }
            _ => 0.0,
        };
        raw.clamp(0.0, 1.0)
    }

    /// Feed one input event.
    pub fn feed(&mut self, input: InteractionInput) -> AccumulatorSignal {
        if self.crossed {
            return AccumulatorSignal::Ignored;
        }
        match (self.rule, &mut self.state, input) {
            (
                AccumulatorRule::Counter { target },
                State::Counter { count },
                InteractionInput::Tap { qualifying: true },
            ) => {
                *count = count.saturating_add(1);
                if *count >= target {
                    self.cross()
                } else {
                    AccumulatorSignal::Progress(self.progress())
                }
            }
            (AccumulatorRule::HoldDecay { .. }, State::Hold { pressed, .. }, event)
                if matches!(
                    event,
                    InteractionInput::PressStart | InteractionInput::PressEnd
                ) =>
            {
                *pressed = matches!(event, InteractionInput::PressStart);
                AccumulatorSignal::Progress(self.progress())
            }
            (
                AccumulatorRule::DragDistance { threshold },
                State::Drag { distance },
                InteractionInput::Drag { dx, dy },
            ) => {
                let step = dx.hypot(dy);
                if !step.is_finite() {
                    return AccumulatorSignal::Ignored;
                }
                *distance += step;
                if *distance >= threshold {
                    self.cross()
                } else {
                    AccumulatorSignal::Progress(self.progress())
                }
            }
            (
                AccumulatorRule::Dwell { on_break, .. },
                State::Dwell {
                    elapsed_ms,
                    observing,
                },
                event,
            ) => match event {
                InteractionInput::ObservationStart => {
                    *observing = true;
                    AccumulatorSignal::Progress(self.progress())
                }
                InteractionInput::ObservationBreak => {
                    *observing = false;
                    if on_break == DwellBreak::Reset {
                        *elapsed_ms = 0;
                    }
                    AccumulatorSignal::Progress(self.progress())
                }
                _ => AccumulatorSignal::Ignored,
            },
            _ => AccumulatorSignal::Ignored,
        }
    }

    /// Let `dt_ms` milliseconds pass.
    ///
    /// Only time-based rules react. A hold decays from the exact level it
    /// had at release, never from zero.
    pub fn elapse(&mut self, dt_ms: u64) -> AccumulatorSignal {
        if self.crossed || dt_ms == 0 {
            return AccumulatorSignal::Ignored;
        }
        if self.time_to_cross_ms().is_some_and(|ttc| dt_ms >= ttc) {
            return self.cross();
        }
        match (self.rule, &mut self.state) {
            (
                AccumulatorRule::HoldDecay {
                    rise_per_sec,
                    decay_per_sec,
                },
                State::Hold { level, pressed },
            ) => {
                let secs = millis_to_secs(dt_ms);
                if *pressed {
                    *level += rise_per_sec * secs;
                    if *level >= 1.0 - CROSSING_EPSILON {
                        *level = 1.0;
                        return self.cross();
                    }
                } else {
                    if *level <= 0.0 {
                        return AccumulatorSignal::Ignored;
                    }
                    *level = (*level - decay_per_sec * secs).max(0.0);
                }
                AccumulatorSignal::Progress(self.progress())
            }
            (
                AccumulatorRule::Dwell { target_ms, .. },
                State::Dwell {
                    elapsed_ms,
                    observing: true,
                },
            ) => {
                *elapsed_ms = elapsed_ms.saturating_add(dt_ms);
                if *elapsed_ms >= target_ms {
                    self.cross()
                } else {
                    AccumulatorSignal::Progress(self.progress())
                }
            }
            _ => AccumulatorSignal::Ignored,
        }
    }

    /// Milliseconds until this accumulator crosses if nothing else happens.
    ///
    /// `None` for event-driven rules, for a released hold or broken dwell,
    /// and once crossed. Always at least 1 otherwise.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn time_to_cross_ms(&self) -> Option<u64> {
        if self.crossed {
            return None;
        }
        match (self.rule, self.state) {
            (
                AccumulatorRule::HoldDecay { rise_per_sec, .. },
                State::Hold {
                    level,
                    pressed: true,
                },
            ) => {
                let remaining_ms =
                    ((1.0 - level).max(0.0) / rise_per_sec * 1_000.0 - CROSSING_EPSILON).ceil();
                let ms = if remaining_ms.is_finite() && remaining_ms < u64::MAX as f64 {
                    remaining_ms as u64
                } else {
                    u64::MAX
                };
                Some(ms.max(1))
            }
            (
                AccumulatorRule::Dwell { target_ms, .. },
                State::Dwell {
                    elapsed_ms,
                    observing: true,
                },
            ) => Some(target_ms.saturating_sub(elapsed_ms).max(1)),
            _ => None,
        }
    }

    /// Drop progress back to zero for a same-stage retry.
    ///
    /// Whether the pointer is down or observation holds is input state, not
    /// progress, and survives the reset. Returns `false` (and does nothing)
    /// once the accumulator has crossed.
    pub fn reset(&mut self) -> bool {
        if self.crossed {
            return false;
        }
        self.state = self.state.cleared();
        true
    }

    const fn cross(&mut self) -> AccumulatorSignal {
        self.crossed = true;
        AccumulatorSignal::Crossed
    }
}

#[allow(clippy::cast_precision_loss)]
fn millis_to_secs(ms: u64) -> f64 {
    ms as f64 / 1_000.0
}
