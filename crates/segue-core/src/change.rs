//! Typed change records and change sets.
//!
//! A [`Change`] is one difference between two [`EngineState`](crate::EngineState)
//! snapshots. Every variant validates itself via `is_valid()`; the reconciler
//! drops records that fail the check and counts them instead of failing the
//! audio block.
//!
//! A [`ChangeSet`] is an unordered batch of changes, partitioned by variant so
//! the audio thread can walk instrument and performance swaps before any
//! parameter ramp starts.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An instrument was added to, retargeted on, or removed from a role.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InstrumentChange {
    /// Role being changed.
    pub role: String,
    /// Instrument previously assigned to the role.
    pub old_instrument_id: Option<String>,
    /// Instrument to assign.
    pub new_instrument_id: String,
    /// Preset previously loaded.
    pub old_preset_id: Option<String>,
    /// Preset to load.
    pub new_preset_id: Option<String>,
}

impl InstrumentChange {
    /// Valid iff both the role and the new instrument are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.role.is_empty() && !self.new_instrument_id.is_empty()
    }
}

/// A scalar parameter moves from one value to another over a smoothing time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterChange {
    /// Parameter path, e.g. `"osc1.pitch"`.
    pub parameter_path: String,
    /// Value before the change.
    pub old_value: f32,
    /// Value after the change.
    pub new_value: f32,
    /// Ramp length in seconds (converted to samples on the audio thread).
    pub smooth_time_seconds: f32,
}

impl ParameterChange {
    /// Create a parameter change.
    pub fn new(
        parameter_path: impl Into<String>,
        old_value: f32,
        new_value: f32,
        smooth_time_seconds: f32,
    ) -> Self {
        Self {
            parameter_path: parameter_path.into(),
            old_value,
            new_value,
            smooth_time_seconds,
        }
    }

    /// Valid iff the path is non-empty and the change is not a no-op.
    pub fn is_valid(&self) -> bool {
        !self.parameter_path.is_empty() && self.old_value != self.new_value
    }
}

/// All performance scalars, old and new, applied as one atomic swap.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerformanceChange {
    /// Performance active before the change.
    pub old_performance_id: Option<String>,
    /// Performance to activate.
    pub new_performance_id: String,
    /// Density before the change.
    pub old_density: f32,
    /// Density after the change.
    pub new_density: f32,
    /// Groove profile before the change.
    pub old_groove_profile_id: Option<String>,
    /// Groove profile after the change.
    pub new_groove_profile_id: Option<String>,
    /// Console profile before the change.
    pub old_console_profile_id: Option<String>,
    /// Console profile after the change.
    pub new_console_profile_id: Option<String>,
}

impl PerformanceChange {
    /// Valid iff the new performance identifier is non-empty.
    pub fn is_valid(&self) -> bool {
        !self.new_performance_id.is_empty()
    }
}

/// One typed difference between two engine snapshots.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Change {
    /// Instrument swap on a role.
    Instrument(InstrumentChange),
    /// Scalar parameter ramp.
    Parameter(ParameterChange),
    /// Performance swap.
    Performance(PerformanceChange),
}

impl Change {
    /// Whether the record is well-formed enough to apply.
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Instrument(c) => c.is_valid(),
            Self::Parameter(c) => c.is_valid(),
            Self::Performance(c) => c.is_valid(),
        }
    }
}

impl From<InstrumentChange> for Change {
    fn from(change: InstrumentChange) -> Self {
        Self::Instrument(change)
    }
}

impl From<ParameterChange> for Change {
    fn from(change: ParameterChange) -> Self {
        Self::Parameter(change)
    }
}

impl From<PerformanceChange> for Change {
    fn from(change: PerformanceChange) -> Self {
        Self::Performance(change)
    }
}

/// Borrowed view of a change, yielded by [`ChangeSet::iter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeRef<'a> {
    /// Instrument swap on a role.
    Instrument(&'a InstrumentChange),
    /// Scalar parameter ramp.
    Parameter(&'a ParameterChange),
    /// Performance swap.
    Performance(&'a PerformanceChange),
}

impl ChangeRef<'_> {
    /// Whether the referenced record is well-formed enough to apply.
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Instrument(c) => c.is_valid(),
            Self::Parameter(c) => c.is_valid(),
            Self::Performance(c) => c.is_valid(),
        }
    }
}

/// Batch of changes, partitioned by variant.
///
/// Order within a partition is insertion order; there is no ordering between
/// partitions. The reconciler applies instrument changes, then performance
/// changes, then parameter ramps.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChangeSet {
    /// Instrument swaps.
    pub instrument_changes: Vec<InstrumentChange>,
    /// Parameter ramps.
    pub parameter_changes: Vec<ParameterChange>,
    /// Performance swaps.
    pub performance_changes: Vec<PerformanceChange>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a change to its partition.
    pub fn push(&mut self, change: impl Into<Change>) {
        match change.into() {
            Change::Instrument(c) => self.instrument_changes.push(c),
            Change::Parameter(c) => self.parameter_changes.push(c),
            Change::Performance(c) => self.performance_changes.push(c),
        }
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, change: impl Into<Change>) -> Self {
        self.push(change);
        self
    }

    /// Move every change of `other` into `self`.
    pub fn extend(&mut self, other: ChangeSet) {
        self.instrument_changes.extend(other.instrument_changes);
        self.parameter_changes.extend(other.parameter_changes);
        self.performance_changes.extend(other.performance_changes);
    }

    /// Whether the set holds at least one change.
    pub fn has_changes(&self) -> bool {
        self.count_changes() > 0
    }

    /// Total number of changes across all partitions.
    pub fn count_changes(&self) -> usize {
        self.instrument_changes.len()
            + self.parameter_changes.len()
            + self.performance_changes.len()
    }

    /// Number of changes that fail their validity predicate.
    pub fn invalid_count(&self) -> usize {
        self.iter().filter(|c| !c.is_valid()).count()
    }

    /// Empty every partition.
    ///
    /// Takes `&mut self`, so no other reader can observe a half-cleared set.
    pub fn clear(&mut self) {
        self.instrument_changes.clear();
        self.parameter_changes.clear();
        self.performance_changes.clear();
    }

    /// Iterate instrument, then performance, then parameter changes.
    pub fn iter(&self) -> impl Iterator<Item = ChangeRef<'_>> {
        self.instrument_changes
            .iter()
            .map(ChangeRef::Instrument)
            .chain(self.performance_changes.iter().map(ChangeRef::Performance))
            .chain(self.parameter_changes.iter().map(ChangeRef::Parameter))
    }
}

impl FromIterator<Change> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        let mut set = Self::new();
        for change in iter {
            set.push(change);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(role: &str, new_id: &str) -> InstrumentChange {
        InstrumentChange {
            role: role.to_string(),
            old_instrument_id: None,
            new_instrument_id: new_id.to_string(),
            old_preset_id: None,
            new_preset_id: None,
        }
    }

    #[test]
    fn instrument_validity() {
        assert!(instrument("drums", "808").is_valid());
        assert!(!instrument("", "808").is_valid());
        assert!(!instrument("drums", "").is_valid());
    }

    #[test]
    fn parameter_validity() {
        assert!(ParameterChange::new("osc1.pitch", 440.0, 880.0, 0.1).is_valid());
        assert!(!ParameterChange::new("", 440.0, 880.0, 0.1).is_valid());
        assert!(!ParameterChange::new("osc1.pitch", 440.0, 440.0, 0.1).is_valid());
    }

    #[test]
    fn performance_validity() {
        let mut change = PerformanceChange {
            new_performance_id: "techno".to_string(),
            ..Default::default()
        };
        assert!(change.is_valid());
        change.new_performance_id.clear();
        assert!(!change.is_valid());
    }

    #[test]
    fn has_changes_tracks_count() {
        let mut set = ChangeSet::new();
        assert!(!set.has_changes());
        assert_eq!(set.count_changes(), 0);

        set.push(instrument("drums", "808"));
        set.push(ParameterChange::new("gain", 0.0, 1.0, 0.0));
        assert!(set.has_changes());
        assert_eq!(set.count_changes(), 2);

        set.clear();
        assert!(!set.has_changes());
        assert_eq!(set.count_changes(), 0);
    }

    #[test]
    fn push_partitions_by_variant() {
        let set: ChangeSet = [
            Change::from(instrument("drums", "808")),
            Change::from(ParameterChange::new("gain", 0.0, 1.0, 0.0)),
            Change::from(PerformanceChange {
                new_performance_id: "p".to_string(),
                ..Default::default()
            }),
            Change::from(instrument("bass", "303")),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.instrument_changes.len(), 2);
        assert_eq!(set.parameter_changes.len(), 1);
        assert_eq!(set.performance_changes.len(), 1);
    }

    #[test]
    fn iter_orders_structural_changes_first() {
        let set = ChangeSet::new()
            .with(ParameterChange::new("gain", 0.0, 1.0, 0.0))
            .with(PerformanceChange {
                new_performance_id: "p".to_string(),
                ..Default::default()
            })
            .with(instrument("drums", "808"));

        let kinds: Vec<&str> = set
            .iter()
            .map(|c| match c {
                ChangeRef::Instrument(_) => "instrument",
                ChangeRef::Performance(_) => "performance",
                ChangeRef::Parameter(_) => "parameter",
            })
            .collect();
        assert_eq!(kinds, ["instrument", "performance", "parameter"]);
    }

    #[test]
    fn invalid_count_reports_malformed_records() {
        let set = ChangeSet::new()
            .with(instrument("", "808"))
            .with(ParameterChange::new("gain", 0.5, 0.5, 0.0))
            .with(ParameterChange::new("gain", 0.5, 0.6, 0.0));
        assert_eq!(set.invalid_count(), 2);
    }

    #[test]
    fn extend_merges_partitions() {
        let mut a = ChangeSet::new().with(instrument("drums", "808"));
        let b = ChangeSet::new()
            .with(instrument("bass", "303"))
            .with(ParameterChange::new("gain", 0.0, 1.0, 0.0));
        a.extend(b);
        assert_eq!(a.count_changes(), 3);
        assert_eq!(a.instrument_changes[1].role, "bass");
    }
}
