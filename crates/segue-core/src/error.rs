//! Control-side error types.
//!
//! Nothing on the audio thread returns these: the real-time path reports
//! through booleans, options, invalid handles and diagnostic counters. Errors
//! here are for the control thread, where failing fast is preferable to
//! running with a bad configuration.

use thiserror::Error;

use crate::pool::PoolError;

/// Errors raised by control-side operations.
#[derive(Debug, Error)]
pub enum SegueError {
    /// Sample rate is zero, negative, or not finite.
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    /// A configuration value is out of range.
    #[error("invalid configuration '{field}': {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Buffer pool configuration was rejected.
    #[error("buffer pool: {0}")]
    Pool(#[from] PoolError),

    /// A parameter path was empty.
    #[error("parameter path is empty")]
    EmptyParameterPath,

    /// The parameter registry is full.
    #[error("cannot register parameter '{path}': registry holds at most {capacity} parameters")]
    ParameterCapacity {
        /// Path that could not be registered.
        path: String,
        /// Registry capacity.
        capacity: usize,
    },

    /// A parameter change carries a NaN or infinite value.
    #[error("parameter '{path}' has a non-finite value")]
    NonFiniteValue {
        /// Offending parameter path.
        path: String,
    },

    /// A parameter change carries a negative or non-finite smoothing time.
    #[error("parameter '{path}' has invalid smoothing time {seconds}s")]
    InvalidSmoothTime {
        /// Offending parameter path.
        path: String,
        /// Smoothing time that was supplied.
        seconds: f32,
    },
}

impl SegueError {
    /// Create an invalid configuration error.
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
