//! Snapshot diffing.
//!
//! [`compute_diff`] compares two [`EngineState`]s field by field and emits one
//! typed record per difference. It is pure and total: malformed input never
//! fails, it only produces fewer records.
//!
//! ## Coalescing
//!
//! The performance scalars (active performance, density, groove profile and
//! console profile) are emitted as a single [`PerformanceChange`] whenever any
//! of them differs. The reconciler applies that record in one step, so a
//! performance is never observed with the old density and the new groove
//! profile.
//!
//! ## Roles
//!
//! Instrument roles are compared role by role. Added and retargeted roles
//! (different instrument or preset) yield an [`InstrumentChange`] to the new
//! assignment; removed roles yield an [`InstrumentChange`] to
//! [`SILENT_INSTRUMENT_ID`], which the engine target treats as "unload".
//! When a snapshot lists the same role twice, the first entry wins.
//!
//! ## Parameters
//!
//! Parameters are compared path by path. A path present on only one side has
//! no known ramp origin or destination and is skipped.

use std::collections::HashSet;

use crate::change::{ChangeSet, InstrumentChange, ParameterChange, PerformanceChange};
use crate::state::{EngineState, InstrumentAssignment};

/// Instrument identifier emitted when a role disappears from a snapshot.
pub const SILENT_INSTRUMENT_ID: &str = "silence";

/// Compare two snapshots and return every difference as a typed change.
///
/// # Example
///
/// ```rust
/// use segue_core::{EngineState, compute_diff};
///
/// let before = EngineState::new().with_performance("piano").with_density(0.5);
/// let after = EngineState::new().with_performance("techno").with_density(0.8);
///
/// let diff = compute_diff(&before, &after);
/// assert_eq!(diff.count_changes(), 1);
/// assert_eq!(diff.performance_changes[0].new_performance_id, "techno");
/// ```
pub fn compute_diff(before: &EngineState, after: &EngineState) -> ChangeSet {
    let mut changes = ChangeSet::new();
    diff_performance(before, after, &mut changes);
    diff_instruments(before, after, &mut changes);
    diff_parameters(before, after, &mut changes);
    changes
}

/// Float inequality where two NaNs compare equal, so a snapshot always diffs
/// empty against itself.
#[inline]
fn values_differ(a: f32, b: f32) -> bool {
    !(a == b || (a.is_nan() && b.is_nan()))
}

fn non_empty(id: &str) -> Option<String> {
    (!id.is_empty()).then(|| id.to_string())
}

fn diff_performance(before: &EngineState, after: &EngineState, changes: &mut ChangeSet) {
    let changed = before.active_performance_id != after.active_performance_id
        || values_differ(before.density, after.density)
        || before.groove_profile_id != after.groove_profile_id
        || before.console_profile_id != after.console_profile_id;
    if !changed {
        return;
    }

    changes.push(PerformanceChange {
        old_performance_id: non_empty(&before.active_performance_id),
        new_performance_id: after.active_performance_id.clone(),
        old_density: before.density,
        new_density: after.density,
        old_groove_profile_id: before.groove_profile_id.clone(),
        new_groove_profile_id: after.groove_profile_id.clone(),
        old_console_profile_id: before.console_profile_id.clone(),
        new_console_profile_id: after.console_profile_id.clone(),
    });
}

fn diff_instruments(before: &EngineState, after: &EngineState, changes: &mut ChangeSet) {
    let mut seen: HashSet<&str> = HashSet::with_capacity(after.instruments.len());

    for assignment in &after.instruments {
        if !seen.insert(assignment.role.as_str()) {
            continue;
        }
        match before.instrument(&assignment.role) {
            Some(old) if old.instrument_id == assignment.instrument_id
                && old.preset_id == assignment.preset_id => {}
            old => changes.push(InstrumentChange {
                role: assignment.role.clone(),
                old_instrument_id: old.map(|a| a.instrument_id.clone()),
                new_instrument_id: assignment.instrument_id.clone(),
                old_preset_id: old.and_then(|a| a.preset_id.clone()),
                new_preset_id: assignment.preset_id.clone(),
            }),
        }
    }

    let mut removed: HashSet<&str> = HashSet::new();
    for InstrumentAssignment {
        role,
        instrument_id,
        preset_id,
    } in &before.instruments
    {
        if seen.contains(role.as_str()) || !removed.insert(role.as_str()) {
            continue;
        }
        changes.push(InstrumentChange {
            role: role.clone(),
            old_instrument_id: Some(instrument_id.clone()),
            new_instrument_id: SILENT_INSTRUMENT_ID.to_string(),
            old_preset_id: preset_id.clone(),
            new_preset_id: None,
        });
    }
}

fn diff_parameters(before: &EngineState, after: &EngineState, changes: &mut ChangeSet) {
    for (path, new) in &after.parameters {
        let Some(old) = before.parameters.get(path) else {
            continue;
        };
        if values_differ(old.value, new.value) {
            changes.push(ParameterChange::new(
                path.clone(),
                old.value,
                new.value,
                new.smooth_time_seconds,
            ));
        }
    }
}
