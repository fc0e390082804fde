//! Diagnostic counters shared between the audio and control threads.
//!
//! The audio thread never logs. It bumps these counters with relaxed atomic
//! adds, and the control thread reads a [`StatsSnapshot`] whenever it wants to
//! report.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters. Every field is a monotonically increasing total until
/// [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct ReconcilerStats {
    change_sets_applied: AtomicU64,
    instruments_swapped: AtomicU64,
    performances_applied: AtomicU64,
    ramps_started: AtomicU64,
    ramps_completed: AtomicU64,
    parameters_committed: AtomicU64,
    invalid_changes: AtomicU64,
    cancelled_discarded: AtomicU64,
    scratch_misses: AtomicU64,
    ramp_overflows: AtomicU64,
    retire_overflows: AtomicU64,
    backpressure_rejections: AtomicU64,
}

/// Plain copy of [`ReconcilerStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Change sets dequeued and applied.
    pub change_sets_applied: u64,
    /// Valid instrument changes handed to the engine.
    pub instruments_swapped: u64,
    /// Valid performance changes handed to the engine.
    pub performances_applied: u64,
    /// Parameter ramps started.
    pub ramps_started: u64,
    /// Parameter ramps that reached their target.
    pub ramps_completed: u64,
    /// Parameters committed without a ramp (instant, overflow, reset).
    pub parameters_committed: u64,
    /// Change records dropped for failing their validity check.
    pub invalid_changes: u64,
    /// Queue entries discarded by cancellation.
    pub cancelled_discarded: u64,
    /// Blocks where a ramp fell back to block-rate updates for lack of
    /// scratch memory.
    pub scratch_misses: u64,
    /// Ramps committed immediately because the active ramp list was full.
    pub ramp_overflows: u64,
    /// Spent change sets dropped on the audio thread because the retire
    /// channel was full.
    pub retire_overflows: u64,
    /// Change sets the control thread could not enqueue.
    pub backpressure_rejections: u64,
}

macro_rules! counters {
    ($($field:ident => $bump:ident),* $(,)?) => {
        impl ReconcilerStats {
            $(
                #[inline]
                pub(crate) fn $bump(&self, n: u64) {
                    self.$field.fetch_add(n, Ordering::Relaxed);
                }
            )*

            /// Read every counter.
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }

            /// Zero every counter.
            pub fn reset(&self) {
                $(self.$field.store(0, Ordering::Relaxed);)*
            }
        }
    };
}

counters! {
    change_sets_applied => add_change_sets_applied,
    instruments_swapped => add_instruments_swapped,
    performances_applied => add_performances_applied,
    ramps_started => add_ramps_started,
    ramps_completed => add_ramps_completed,
    parameters_committed => add_parameters_committed,
    invalid_changes => add_invalid_changes,
    cancelled_discarded => add_cancelled_discarded,
    scratch_misses => add_scratch_misses,
    ramp_overflows => add_ramp_overflows,
    retire_overflows => add_retire_overflows,
    backpressure_rejections => add_backpressure_rejections,
}

impl ReconcilerStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }
}
