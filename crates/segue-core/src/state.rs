//! Engine state snapshots.
//!
//! An [`EngineState`] is a plain value describing everything the reconciler
//! cares about: the active performance, its scalar settings, the instrument
//! assigned to each role, and the current value of every automatable
//! parameter. The control side builds a fresh snapshot on every user-visible
//! edit and hands `(before, after)` pairs to [`compute_diff`](crate::compute_diff).
//!
//! # Example
//!
//! ```rust
//! use segue_core::EngineState;
//!
//! let state = EngineState::new()
//!     .with_performance("techno")
//!     .with_density(0.8)
//!     .with_instrument("bass", "acid-303", Some("squelch"))
//!     .with_parameter("osc1.pitch", 440.0, 0.1);
//!
//! assert_eq!(state.instrument("bass").map(|a| a.instrument_id.as_str()), Some("acid-303"));
//! ```

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Instrument assigned to a role (e.g. `"drums"`, `"bass"`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InstrumentAssignment {
    /// Role name, unique within a well-formed snapshot.
    pub role: String,
    /// Instrument identifier.
    pub instrument_id: String,
    /// Preset loaded into the instrument, if any.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub preset_id: Option<String>,
}

impl InstrumentAssignment {
    /// Create an assignment.
    pub fn new(
        role: impl Into<String>,
        instrument_id: impl Into<String>,
        preset_id: Option<&str>,
    ) -> Self {
        Self {
            role: role.into(),
            instrument_id: instrument_id.into(),
            preset_id: preset_id.map(str::to_owned),
        }
    }
}

/// Current value of one automatable parameter and how fast changes to it
/// should be smoothed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterValue {
    /// Parameter value in its natural unit.
    pub value: f32,
    /// Ramp length used when this value changes, in seconds.
    #[cfg_attr(feature = "serde", serde(default))]
    pub smooth_time_seconds: f32,
}

impl ParameterValue {
    /// Create a parameter value with the given smoothing time.
    pub fn new(value: f32, smooth_time_seconds: f32) -> Self {
        Self {
            value,
            smooth_time_seconds,
        }
    }
}

/// Snapshot of all reconciler-relevant engine configuration.
///
/// Snapshots are value types. The control side owns them exclusively until
/// they are handed to the diff engine, after which they are only read.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineState {
    /// Identifier of the active performance (empty when none is loaded).
    pub active_performance_id: String,
    /// Performance density scalar.
    pub density: f32,
    /// Groove profile applied to the performance.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub groove_profile_id: Option<String>,
    /// Console (mixing) profile applied to the performance.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub console_profile_id: Option<String>,
    /// Ordered instrument-role assignments.
    pub instruments: Vec<InstrumentAssignment>,
    /// Parameter values keyed by parameter path (e.g. `"osc1.pitch"`).
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl EngineState {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active performance.
    pub fn with_performance(mut self, performance_id: impl Into<String>) -> Self {
        self.active_performance_id = performance_id.into();
        self
    }

    /// Set the density scalar.
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// Set the groove profile.
    pub fn with_groove_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.groove_profile_id = Some(profile_id.into());
        self
    }

    /// Set the console profile.
    pub fn with_console_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.console_profile_id = Some(profile_id.into());
        self
    }

    /// Assign an instrument to a role, replacing any existing assignment for
    /// that role in place (ordering is preserved).
    pub fn with_instrument(
        mut self,
        role: impl Into<String>,
        instrument_id: impl Into<String>,
        preset_id: Option<&str>,
    ) -> Self {
        let assignment = InstrumentAssignment::new(role, instrument_id, preset_id);
        match self
            .instruments
            .iter_mut()
            .find(|a| a.role == assignment.role)
        {
            Some(existing) => *existing = assignment,
            None => self.instruments.push(assignment),
        }
        self
    }

    /// Remove the assignment for a role, if present.
    pub fn without_instrument(mut self, role: &str) -> Self {
        self.instruments.retain(|a| a.role != role);
        self
    }

    /// Set a parameter value and its smoothing time.
    pub fn with_parameter(
        mut self,
        path: impl Into<String>,
        value: f32,
        smooth_time_seconds: f32,
    ) -> Self {
        self.parameters
            .insert(path.into(), ParameterValue::new(value, smooth_time_seconds));
        self
    }

    /// Look up the assignment for a role (first match wins).
    pub fn instrument(&self, role: &str) -> Option<&InstrumentAssignment> {
        self.instruments.iter().find(|a| a.role == role)
    }

    /// Look up a parameter by path.
    pub fn parameter(&self, path: &str) -> Option<&ParameterValue> {
        self.parameters.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_instrument_replaces_in_place() {
        let state = EngineState::new()
            .with_instrument("drums", "808", None)
            .with_instrument("bass", "303", Some("acid"))
            .with_instrument("drums", "909", Some("tight"));

        assert_eq!(state.instruments.len(), 2);
        assert_eq!(state.instruments[0].role, "drums");
        assert_eq!(state.instruments[0].instrument_id, "909");
        assert_eq!(state.instruments[0].preset_id.as_deref(), Some("tight"));
    }

    #[test]
    fn without_instrument_removes_role() {
        let state = EngineState::new()
            .with_instrument("drums", "808", None)
            .without_instrument("drums");
        assert!(state.instrument("drums").is_none());
    }

    #[test]
    fn parameter_lookup() {
        let state = EngineState::new().with_parameter("filter.cutoff", 1200.0, 0.05);
        let p = state.parameter("filter.cutoff").unwrap();
        assert_eq!(p.value, 1200.0);
        assert_eq!(p.smooth_time_seconds, 0.05);
        assert!(state.parameter("filter.q").is_none());
    }
}
