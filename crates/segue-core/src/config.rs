//! Reconciler configuration.
//!
//! Everything here is fixed once [`initialize`](crate::initialize) returns,
//! except the sample rate and block size, which the audio side may update
//! through [`AudioReconciler::set_sample_rate`](crate::AudioReconciler::set_sample_rate).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SegueError;
use crate::param::CurvePolicy;
use crate::pool::PoolConfig;

/// Default change queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
/// Default parameter registry size.
pub const DEFAULT_MAX_PARAMETERS: usize = 1024;
/// Default number of simultaneously ramping parameters.
pub const DEFAULT_MAX_ACTIVE_RAMPS: usize = 256;
/// Default largest audio block, in frames.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 4096;

/// Settings for a control/audio reconciler pair.
///
/// # Example
///
/// ```rust
/// use segue_core::ReconcilerConfig;
///
/// let config = ReconcilerConfig::new(48000.0).with_queue_capacity(16);
/// assert!(config.validate().is_ok());
/// assert!(ReconcilerConfig::new(0.0).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReconcilerConfig {
    /// Engine sample rate in Hz.
    pub sample_rate: f64,
    /// Change sets the queue can hold before `apply_diff` reports backpressure.
    pub queue_capacity: usize,
    /// Spent change sets the audio thread can hand back before it has to
    /// drop one itself.
    pub retire_capacity: usize,
    /// Distinct parameter paths the registry accepts.
    pub max_parameters: usize,
    /// Parameters that may ramp at the same time.
    pub max_active_ramps: usize,
    /// Pre-render per-sample ramp values into pooled scratch buffers. When
    /// false, ramps update once per block.
    pub prerender_ramps: bool,
    /// Largest block passed to `process`, in frames.
    pub max_block_size: usize,
    /// Scratch buffer pool.
    pub pool: PoolConfig,
    /// Ramp curve per parameter kind.
    pub curves: CurvePolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::new(48000.0)
    }
}

impl ReconcilerConfig {
    /// Default configuration at the given sample rate.
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retire_capacity: DEFAULT_QUEUE_CAPACITY,
            max_parameters: DEFAULT_MAX_PARAMETERS,
            max_active_ramps: DEFAULT_MAX_ACTIVE_RAMPS,
            prerender_ramps: true,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            pool: PoolConfig::default(),
            curves: CurvePolicy::default(),
        }
    }

    /// Set the queue depth. The retire channel follows it.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self.retire_capacity = capacity;
        self
    }

    /// Set the retire channel depth.
    pub fn with_retire_capacity(mut self, capacity: usize) -> Self {
        self.retire_capacity = capacity;
        self
    }

    /// Set the parameter registry size.
    pub fn with_max_parameters(mut self, max: usize) -> Self {
        self.max_parameters = max;
        self
    }

    /// Set the active ramp limit.
    pub fn with_max_active_ramps(mut self, max: usize) -> Self {
        self.max_active_ramps = max;
        self
    }

    /// Enable or disable per-sample ramp pre-rendering.
    pub fn with_prerender_ramps(mut self, enabled: bool) -> Self {
        self.prerender_ramps = enabled;
        self
    }

    /// Set the largest block size.
    pub fn with_max_block_size(mut self, frames: usize) -> Self {
        self.max_block_size = frames;
        self
    }

    /// Replace the pool configuration.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Replace the curve policy.
    pub fn with_curves(mut self, curves: CurvePolicy) -> Self {
        self.curves = curves;
        self
    }

    /// Reject values the reconciler cannot run with.
    pub fn validate(&self) -> Result<(), SegueError> {
        validate_sample_rate(self.sample_rate)?;
        if self.queue_capacity == 0 {
            return Err(SegueError::invalid_config("queue_capacity", "must be at least 1"));
        }
        if self.retire_capacity == 0 {
            return Err(SegueError::invalid_config("retire_capacity", "must be at least 1"));
        }
        if self.max_parameters == 0 || self.max_parameters > u32::MAX as usize {
            return Err(SegueError::invalid_config(
                "max_parameters",
                format!("must be between 1 and {}", u32::MAX),
            ));
        }
        if self.max_block_size == 0 {
            return Err(SegueError::invalid_config("max_block_size", "must be at least 1"));
        }
        self.pool.validate()?;
        if self.prerender_ramps {
            let needed = self.max_block_size * size_of::<f32>();
            if self.pool.extra_large.size_bytes < needed {
                return Err(SegueError::invalid_config(
                    "max_block_size",
                    format!("{needed} bytes of ramp scratch exceed the largest pool tier"),
                ));
            }
        }
        Ok(())
    }
}

/// Sample rates must be finite and positive.
pub(crate) fn validate_sample_rate(sample_rate: f64) -> Result<(), SegueError> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(SegueError::InvalidSampleRate(sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{BufferTier, TierConfig};

    #[test]
    fn defaults_are_valid() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.retire_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_sample_rates() {
        for sr in [0.0, -44100.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                ReconcilerConfig::new(sr).validate(),
                Err(SegueError::InvalidSampleRate(_))
            ));
        }
    }

    #[test]
    fn rejects_zero_capacities() {
        let err = ReconcilerConfig::new(48000.0)
            .with_queue_capacity(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, SegueError::InvalidConfig { field: "queue_capacity", .. }));

        let err = ReconcilerConfig::new(48000.0)
            .with_max_parameters(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, SegueError::InvalidConfig { field: "max_parameters", .. }));
    }

    #[test]
    fn prerender_needs_a_tier_for_the_largest_block() {
        let pool = PoolConfig::default()
            .with_tier(BufferTier::ExtraLarge, TierConfig::new(2 * 1024 * 1024, 0, 1));
        let config = ReconcilerConfig::new(48000.0)
            .with_pool(pool)
            .with_max_block_size(1024 * 1024);
        assert!(config.validate().is_err());
        assert!(config.with_prerender_ramps(false).validate().is_ok());
    }

    #[test]
    fn pool_errors_surface() {
        let mut config = ReconcilerConfig::new(48000.0);
        config.pool.max_total_bytes = 1;
        assert!(matches!(config.validate(), Err(SegueError::Pool(_))));
    }
}
