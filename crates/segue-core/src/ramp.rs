//! Transition planning: sample-indexed ramps between two parameter values.
//!
//! A [`RampPlan`] describes `sample_count` values from `old` to `new`,
//! inclusive of both endpoints. The plan is computed by index rather than
//! stored, so building and consuming one on the audio thread never allocates;
//! callers that want the values in memory render them into a slice they own
//! (usually a pooled scratch buffer).
//!
//! ## Curves
//!
//! - [`RampCurve::Linear`]: constant rate of change, the default
//! - [`RampCurve::Exponential`]: geometric interpolation, for frequency-like
//!   parameters where equal ratios sound like equal steps
//! - [`RampCurve::Logarithmic`]: fast start, slow finish, for gains
//!
//! Every curve is monotonic and hits both endpoints exactly.
//!
//! ## Usage
//!
//! ```rust
//! use segue_core::{plan_ramp, samples_for_duration};
//!
//! let samples = samples_for_duration(0.1, 48000.0);
//! let plan = plan_ramp(440.0, 880.0, samples);
//!
//! assert_eq!(plan.sample_count(), 4800);
//! assert_eq!(plan.first(), 440.0);
//! assert_eq!(plan.last(), 880.0);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Interpolation shape of a ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RampCurve {
    /// `old + (new - old) * t`.
    #[default]
    Linear,
    /// `old * (new / old)^t`. Falls back to linear when the endpoints do not
    /// share a strict sign.
    Exponential,
    /// `old + (new - old) * log2(1 + t)`.
    Logarithmic,
}

impl RampCurve {
    /// Interpolate between `old` and `new` at normalized position `t` in `[0, 1]`.
    #[inline]
    pub fn interpolate(self, old: f32, new: f32, t: f64) -> f32 {
        let (a, b) = (f64::from(old), f64::from(new));
        let value = match self {
            Self::Linear => a + (b - a) * t,
            Self::Exponential => {
                if a * b > 0.0 && a.is_finite() && b.is_finite() {
                    a * (b / a).powf(t)
                } else {
                    a + (b - a) * t
                }
            }
            Self::Logarithmic => a + (b - a) * (1.0 + t).log2(),
        };
        value as f32
    }
}

/// Convert a smoothing time to a sample count at the given sample rate.
///
/// Negative, zero and non-finite durations map to zero samples (an instant
/// change at the next block boundary).
#[inline]
pub fn samples_for_duration(seconds: f32, sample_rate: f64) -> usize {
    if !seconds.is_finite() || seconds <= 0.0 || !sample_rate.is_finite() || sample_rate <= 0.0 {
        return 0;
    }
    (f64::from(seconds) * sample_rate).round() as usize
}

/// Plan a linear ramp from `old` to `new` over `sample_count` samples.
///
/// A `sample_count` of 0 or 1 yields a single-sample plan equal to `new`.
#[inline]
pub fn plan_ramp(old: f32, new: f32, sample_count: usize) -> RampPlan {
    RampPlan::new(old, new, sample_count, RampCurve::Linear)
}

/// Plan a ramp with an explicit curve.
#[inline]
pub fn plan_ramp_with_curve(old: f32, new: f32, sample_count: usize, curve: RampCurve) -> RampPlan {
    RampPlan::new(old, new, sample_count, curve)
}

/// A finite, deterministic sequence of interpolated values.
///
/// `value_at(0) == old` and `value_at(sample_count - 1) == new`. Plans never
/// hold fewer than one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampPlan {
    old: f32,
    new: f32,
    sample_count: usize,
    curve: RampCurve,
}

impl RampPlan {
    /// Create a plan. `sample_count` is clamped to at least 1; a single-sample
    /// plan starts at `new`.
    pub fn new(old: f32, new: f32, sample_count: usize, curve: RampCurve) -> Self {
        let sample_count = sample_count.max(1);
        Self {
            old: if sample_count == 1 { new } else { old },
            new,
            sample_count,
            curve,
        }
    }

    /// Number of samples in the plan (always at least 1).
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Whether the plan is a single instant step.
    #[inline]
    pub fn is_instant(&self) -> bool {
        self.sample_count == 1
    }

    /// Interpolation curve.
    #[inline]
    pub fn curve(&self) -> RampCurve {
        self.curve
    }

    /// First value of the plan.
    #[inline]
    pub fn first(&self) -> f32 {
        self.old
    }

    /// Final value of the plan.
    #[inline]
    pub fn last(&self) -> f32 {
        self.new
    }

    /// Value at sample `index`. Indices past the end hold the final value.
    #[inline]
    pub fn value_at(&self, index: usize) -> f32 {
        let last = self.sample_count - 1;
        if index >= last {
            return self.new;
        }
        if index == 0 {
            return self.old;
        }
        let t = index as f64 / last as f64;
        self.curve.interpolate(self.old, self.new, t)
    }

    /// Write values starting at sample `start` into `out`.
    ///
    /// Slots past the end of the plan are filled with the final value.
    /// Returns how many ramp samples were consumed (at most `out.len()`).
    pub fn render_into(&self, start: usize, out: &mut [f32]) -> usize {
        let remaining = self.sample_count.saturating_sub(start);
        let consumed = remaining.min(out.len());
        for (i, slot) in out[..consumed].iter_mut().enumerate() {
            *slot = self.value_at(start + i);
        }
        out[consumed..].fill(self.new);
        consumed
    }

    /// Iterate over all values of the plan.
    pub fn iter(&self) -> RampIter {
        RampIter {
            plan: *self,
            index: 0,
        }
    }

    /// Collect the plan into a vector. Allocates; not for the audio thread.
    pub fn to_vec(&self) -> Vec<f32> {
        self.iter().collect()
    }
}

impl IntoIterator for RampPlan {
    type Item = f32;
    type IntoIter = RampIter;

    fn into_iter(self) -> RampIter {
        self.iter()
    }
}

/// Iterator over the values of a [`RampPlan`].
#[derive(Debug, Clone)]
pub struct RampIter {
    plan: RampPlan,
    index: usize,
}

impl Iterator for RampIter {
    type Item = f32;

    #[inline]
    fn next(&mut self) -> Option<f32> {
        if self.index >= self.plan.sample_count {
            return None;
        }
        let value = self.plan.value_at(self.index);
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.sample_count - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RampIter {}
