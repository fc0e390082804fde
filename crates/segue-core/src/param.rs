//! Parameter addressing and curve policy.
//!
//! Parameter paths (`"osc1.pitch"`, `"master.gain"`) are free-form strings at
//! the control boundary. The [`ParameterRegistry`] resolves each path once,
//! on the control thread, into a dense [`ParamSlot`] index so the audio thread
//! never compares or hashes strings.
//!
//! Every registered parameter carries a [`ParamKind`] semantic type. The
//! [`CurvePolicy`] maps that type to a [`RampCurve`]; curve selection is never
//! inferred from the parameter name.
//!
//! # Example
//!
//! ```rust
//! use segue_core::{CurvePolicy, ParamKind, ParameterRegistry, RampCurve};
//!
//! let mut registry = ParameterRegistry::new(64);
//! let pitch = registry.register("osc1.pitch", ParamKind::Frequency).unwrap();
//!
//! assert_eq!(registry.slot("osc1.pitch"), Some(pitch));
//! assert_eq!(CurvePolicy::default().curve_for(ParamKind::Frequency), RampCurve::Exponential);
//! ```

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SegueError;
use crate::ramp::RampCurve;

/// Dense index of a registered parameter.
///
/// Slots are assigned sequentially from 0 and never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamSlot(pub(crate) u32);

impl ParamSlot {
    /// Create a slot from a raw index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for ParamSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ParamSlot({})", self.0)
    }
}

/// Semantic type of a parameter, used to pick its ramp curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ParamKind {
    /// Anything without a perceptual scale (mix, density, pan).
    #[default]
    Generic,
    /// Frequency-like values (pitch, cutoff, rate).
    Frequency,
    /// Amplitude gains.
    Gain,
}

/// Maps parameter kinds to ramp curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CurvePolicy {
    /// Curve for [`ParamKind::Generic`].
    pub generic: RampCurve,
    /// Curve for [`ParamKind::Frequency`].
    pub frequency: RampCurve,
    /// Curve for [`ParamKind::Gain`].
    pub gain: RampCurve,
}

impl Default for CurvePolicy {
    fn default() -> Self {
        Self {
            generic: RampCurve::Linear,
            frequency: RampCurve::Exponential,
            gain: RampCurve::Logarithmic,
        }
    }
}

impl CurvePolicy {
    /// A policy that ramps everything linearly.
    pub fn linear() -> Self {
        Self {
            generic: RampCurve::Linear,
            frequency: RampCurve::Linear,
            gain: RampCurve::Linear,
        }
    }

    /// Curve to use for a parameter of the given kind.
    #[inline]
    pub fn curve_for(&self, kind: ParamKind) -> RampCurve {
        match kind {
            ParamKind::Generic => self.generic,
            ParamKind::Frequency => self.frequency,
            ParamKind::Gain => self.gain,
        }
    }
}

/// Control-side table from parameter path to slot and kind.
#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    slots: HashMap<String, ParamSlot>,
    /// Indexed by `ParamSlot::index()`.
    entries: Vec<(String, ParamKind)>,
    capacity: usize,
}

impl ParameterRegistry {
    /// Create an empty registry that accepts at most `capacity` parameters.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            entries: Vec::new(),
            capacity,
        }
    }

    /// Register a path, or update the kind of an already-registered path.
    ///
    /// Returns the path's slot.
    ///
    /// # Errors
    ///
    /// Returns [`SegueError::ParameterCapacity`] when the registry is full,
    /// or [`SegueError::EmptyParameterPath`] for an empty path.
    pub fn register(&mut self, path: &str, kind: ParamKind) -> Result<ParamSlot, SegueError> {
        if path.is_empty() {
            return Err(SegueError::EmptyParameterPath);
        }
        if let Some(&slot) = self.slots.get(path) {
            self.entries[slot.index()].1 = kind;
            return Ok(slot);
        }
        if self.entries.len() >= self.capacity {
            return Err(SegueError::ParameterCapacity {
                path: path.to_string(),
                capacity: self.capacity,
            });
        }
        let slot = ParamSlot(self.entries.len() as u32);
        self.slots.insert(path.to_string(), slot);
        self.entries.push((path.to_string(), kind));
        Ok(slot)
    }

    /// Resolve a path, registering it as [`ParamKind::Generic`] if unknown.
    pub fn resolve(&mut self, path: &str) -> Result<ParamSlot, SegueError> {
        match self.slots.get(path) {
            Some(&slot) => Ok(slot),
            None => {
                tracing::debug!("param_registry: auto-registering '{path}' as generic");
                self.register(path, ParamKind::Generic)
            }
        }
    }

    /// Slot of a registered path.
    pub fn slot(&self, path: &str) -> Option<ParamSlot> {
        self.slots.get(path).copied()
    }

    /// Path of a slot.
    pub fn path(&self, slot: ParamSlot) -> Option<&str> {
        self.entries.get(slot.index()).map(|(p, _)| p.as_str())
    }

    /// Kind of a slot.
    pub fn kind(&self, slot: ParamSlot) -> Option<ParamKind> {
        self.entries.get(slot.index()).map(|&(_, k)| k)
    }

    /// Number of registered parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no parameter is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of parameters.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate `(slot, path, kind)` in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ParamSlot, &str, ParamKind)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, (p, k))| (ParamSlot(i as u32), p.as_str(), *k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_sequential_and_stable() {
        let mut registry = ParameterRegistry::new(8);
        let a = registry.register("a", ParamKind::Generic).unwrap();
        let b = registry.register("b", ParamKind::Gain).unwrap();
        let a_again = registry.register("a", ParamKind::Frequency).unwrap();

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(a, a_again);
        assert_eq!(registry.kind(a), Some(ParamKind::Frequency));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn resolve_auto_registers_generic() {
        let mut registry = ParameterRegistry::new(8);
        let slot = registry.resolve("fx.mix").unwrap();
        assert_eq!(registry.kind(slot), Some(ParamKind::Generic));
        assert_eq!(registry.path(slot), Some("fx.mix"));
        assert_eq!(registry.resolve("fx.mix").unwrap(), slot);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut registry = ParameterRegistry::new(1);
        registry.register("a", ParamKind::Generic).unwrap();
        let err = registry.register("b", ParamKind::Generic).unwrap_err();
        assert!(matches!(err, SegueError::ParameterCapacity { capacity: 1, .. }));
        // Re-registering an existing path still works when full.
        assert!(registry.register("a", ParamKind::Gain).is_ok());
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut registry = ParameterRegistry::new(4);
        assert!(matches!(
            registry.register("", ParamKind::Generic),
            Err(SegueError::EmptyParameterPath)
        ));
    }

    #[test]
    fn curve_policy_is_keyed_by_kind() {
        let policy = CurvePolicy::default();
        assert_eq!(policy.curve_for(ParamKind::Generic), RampCurve::Linear);
        assert_eq!(policy.curve_for(ParamKind::Frequency), RampCurve::Exponential);
        assert_eq!(policy.curve_for(ParamKind::Gain), RampCurve::Logarithmic);
        assert_eq!(CurvePolicy::linear().curve_for(ParamKind::Gain), RampCurve::Linear);
    }
}
