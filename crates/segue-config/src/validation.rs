//! Settings validation.
//!
//! [`validate_settings`] checks every field against the ranges the reconciler
//! can run with and reports all problems at once.
//!
//! # Example
//!
//! ```rust
//! use segue_config::{EngineSettings, ValidationError, validate_settings};
//!
//! let mut settings = EngineSettings::default();
//! assert!(validate_settings(&settings).is_ok());
//!
//! settings.sample_rate = 0;
//! assert!(matches!(
//!     validate_settings(&settings),
//!     Err(ValidationError::OutOfRange { field: "sample_rate", .. })
//! ));
//! ```

use std::collections::HashSet;
use std::ops::RangeInclusive;

use segue_core::PoolError;
use thiserror::Error;

use crate::settings::EngineSettings;

/// Accepted sample rates in Hz.
pub const SAMPLE_RATE_RANGE: RangeInclusive<u64> = 8_000..=768_000;
/// Accepted maximum block sizes in frames.
pub const BLOCK_SIZE_RANGE: RangeInclusive<u64> = 1..=65_536;
/// Accepted queue and retire channel depths.
pub const QUEUE_CAPACITY_RANGE: RangeInclusive<u64> = 1..=65_536;
/// Accepted parameter registry sizes.
pub const MAX_PARAMETERS_RANGE: RangeInclusive<u64> = 1..=1_048_576;
/// Accepted active ramp limits. Zero makes every change instant.
pub const MAX_ACTIVE_RAMPS_RANGE: RangeInclusive<u64> = 0..=65_536;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Numeric setting outside its accepted range.
    #[error("'{field}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Name of the setting.
        field: &'static str,
        /// The value that was out of range.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },

    /// A declared parameter has an empty path.
    #[error("parameter #{index} has an empty path")]
    EmptyParameterPath {
        /// Position in the declaration list.
        index: usize,
    },

    /// The same parameter path is declared twice.
    #[error("parameter '{0}' declared more than once")]
    DuplicateParameter(String),

    /// More parameters declared than the registry can hold.
    #[error("{declared} parameters declared, registry holds {max}")]
    TooManyParameters {
        /// Number of declarations.
        declared: usize,
        /// Configured registry size.
        max: usize,
    },

    /// Pool tiers are inconsistent.
    #[error("buffer pool: {0}")]
    Pool(PoolError),

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", join_messages(.0))]
    Multiple(Vec<ValidationError>),
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn check_range(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: u64,
    range: &RangeInclusive<u64>,
) {
    if !range.contains(&value) {
        errors.push(ValidationError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        });
    }
}

/// Validate every setting, collecting all problems.
///
/// Returns the single error when there is one, and
/// [`ValidationError::Multiple`] otherwise.
pub fn validate_settings(settings: &EngineSettings) -> ValidationResult<()> {
    let mut errors = Vec::new();

    check_range(
        &mut errors,
        "sample_rate",
        u64::from(settings.sample_rate),
        &SAMPLE_RATE_RANGE,
    );
    check_range(
        &mut errors,
        "max_block_size",
        settings.max_block_size as u64,
        &BLOCK_SIZE_RANGE,
    );
    check_range(
        &mut errors,
        "queue.capacity",
        settings.queue.capacity as u64,
        &QUEUE_CAPACITY_RANGE,
    );
    if let Some(retire) = settings.queue.retire_capacity {
        check_range(
            &mut errors,
            "queue.retire_capacity",
            retire as u64,
            &QUEUE_CAPACITY_RANGE,
        );
    }
    check_range(
        &mut errors,
        "max_parameters",
        settings.max_parameters as u64,
        &MAX_PARAMETERS_RANGE,
    );
    check_range(
        &mut errors,
        "ramps.max_active",
        settings.ramps.max_active as u64,
        &MAX_ACTIVE_RAMPS_RANGE,
    );

    if let Err(e) = settings.pool.validate() {
        errors.push(ValidationError::Pool(e));
    }

    let mut seen = HashSet::new();
    for (index, decl) in settings.parameters.iter().enumerate() {
        if decl.path.is_empty() {
            errors.push(ValidationError::EmptyParameterPath { index });
        } else if !seen.insert(decl.path.as_str()) {
            errors.push(ValidationError::DuplicateParameter(decl.path.clone()));
        }
    }
    if settings.parameters.len() > settings.max_parameters {
        errors.push(ValidationError::TooManyParameters {
            declared: settings.parameters.len(),
            max: settings.max_parameters,
        });
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}
