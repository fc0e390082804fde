//! Control-thread API and reconciler construction.
//!
//! [`initialize`] validates a [`ReconcilerConfig`], builds the buffer pool,
//! change queue and retire channel, and splits them into a
//! [`ChangeController`] for the control thread and an
//! [`AudioReconciler`] for the audio thread.
//!
//! ## Backpressure
//!
//! [`ChangeController::apply_diff`] never blocks. When the queue is full it
//! returns `Ok(false)` and the caller decides what to do. The
//! [`submit_state`](ChangeController::submit_state) path handles that for
//! you: it remembers the newest requested state and, on the next
//! [`flush`](ChangeController::flush) or submission, sends ONE diff from the
//! last accepted state to the newest one, so a burst of edits under pressure
//! collapses into a single change set.
//!
//! # Example
//!
//! ```rust
//! use segue_core::{
//!     EngineState, EngineTarget, InstrumentChange, ParamSlot, PerformanceChange,
//!     ReconcilerConfig, Submission, initialize,
//! };
//!
//! struct Silence;
//!
//! impl EngineTarget for Silence {
//!     fn prepare(&mut self, _sample_rate: f64, _max_block_size: usize) {}
//!     fn swap_instrument(&mut self, _change: &InstrumentChange) {}
//!     fn apply_performance(&mut self, _change: &PerformanceChange) {}
//!     fn set_parameter(&mut self, _slot: ParamSlot, _value: f32) {}
//!     fn render(&mut self, _frames: usize) {}
//! }
//!
//! let (mut control, mut audio) = initialize(Silence, ReconcilerConfig::new(48000.0)).unwrap();
//!
//! let state = EngineState::new().with_performance("techno").with_density(0.8);
//! assert_eq!(control.submit_state(state).unwrap(), Submission::Applied(1));
//!
//! audio.process(256);
//! assert!(!control.has_pending_changes());
//! ```

use std::sync::Arc;

use crate::change::ChangeSet;
use crate::config::ReconcilerConfig;
use crate::diff::compute_diff;
use crate::error::SegueError;
use crate::param::{CurvePolicy, ParamKind, ParamSlot, ParameterRegistry};
use crate::pool::BufferPool;
use crate::queue::{ChangeProducer, RetireReceiver, change_queue, retire_channel};
use crate::reconcile::{
    AudioReconciler, EngineTarget, QueuedChangeSet, RampTarget, SharedControl,
};
use crate::state::EngineState;
use crate::stats::{ReconcilerStats, StatsSnapshot};

/// Build a connected controller/reconciler pair.
///
/// Calls [`EngineTarget::prepare`] with the configured sample rate and
/// maximum block size before returning.
///
/// # Errors
///
/// Returns [`SegueError::InvalidSampleRate`] for a non-finite or non-positive
/// sample rate, and [`SegueError::InvalidConfig`] or [`SegueError::Pool`] for
/// any other rejected setting.
pub fn initialize<T: EngineTarget>(
    mut target: T,
    config: ReconcilerConfig,
) -> Result<(ChangeController, AudioReconciler<T>), SegueError> {
    config.validate()?;

    let pool = BufferPool::new(config.pool)?;
    let (producer, consumer) = change_queue(config.queue_capacity);
    let (retire_tx, retire_rx) = retire_channel(config.retire_capacity);
    let stats = Arc::new(ReconcilerStats::new());
    let control = Arc::new(SharedControl::new(config.sample_rate));

    target.prepare(config.sample_rate, config.max_block_size);

    let audio = AudioReconciler::new(
        target,
        consumer,
        retire_tx,
        pool.clone(),
        Arc::clone(&stats),
        Arc::clone(&control),
        &config,
    );
    let controller = ChangeController {
        producer,
        retired: retire_rx,
        registry: ParameterRegistry::new(config.max_parameters),
        curves: config.curves,
        pool,
        stats,
        control,
        baseline: None,
        latest: None,
    };

    tracing::info!(
        sample_rate = config.sample_rate,
        queue_capacity = config.queue_capacity,
        max_parameters = config.max_parameters,
        max_active_ramps = config.max_active_ramps,
        "reconciler initialized"
    );
    Ok((controller, audio))
}

/// Outcome of [`ChangeController::submit_state`] and
/// [`ChangeController::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A change set with this many records was enqueued.
    Applied(usize),
    /// The requested state matches the last accepted one.
    NoChange,
    /// The queue was full; the state is held for the next flush.
    Deferred,
}

/// Control-thread half of a reconciler pair.
pub struct ChangeController {
    producer: ChangeProducer<QueuedChangeSet>,
    retired: RetireReceiver<QueuedChangeSet>,
    registry: ParameterRegistry,
    curves: CurvePolicy,
    pool: BufferPool,
    stats: Arc<ReconcilerStats>,
    control: Arc<SharedControl>,
    /// Last state whose diff was accepted by the queue.
    baseline: Option<EngineState>,
    /// Newest requested state not yet accepted.
    latest: Option<EngineState>,
}

impl ChangeController {
    /// Diff two snapshots. Same as [`compute_diff`].
    pub fn compute_diff(&self, before: &EngineState, after: &EngineState) -> ChangeSet {
        compute_diff(before, after)
    }

    /// Enqueue a change set for the audio thread.
    ///
    /// Returns `Ok(false)` if the queue is full; nothing was enqueued and the
    /// caller still owns `changes`. An empty set is accepted without touching
    /// the queue.
    ///
    /// # Errors
    ///
    /// Fails before enqueueing anything if a valid parameter change has a
    /// non-finite value or a negative smoothing time, or if its path would
    /// overflow the parameter registry. Records that fail their own validity
    /// check are not errors: they travel to the audio thread, which drops and
    /// counts them.
    pub fn apply_diff(&mut self, changes: &ChangeSet) -> Result<bool, SegueError> {
        if !changes.has_changes() {
            return Ok(true);
        }
        self.collect_retired();

        let queued = self.resolve(changes)?;
        match self.producer.push(queued) {
            Ok(sequence) => {
                tracing::debug!(
                    sequence,
                    instruments = changes.instrument_changes.len(),
                    performances = changes.performance_changes.len(),
                    parameters = changes.parameter_changes.len(),
                    "change set enqueued"
                );
                Ok(true)
            }
            Err(_rejected) => {
                self.stats.add_backpressure_rejections(1);
                tracing::warn!(
                    pending = self.producer.pending_count(),
                    capacity = self.producer.capacity(),
                    "change queue full, change set rejected"
                );
                Ok(false)
            }
        }
    }

    fn resolve(&mut self, changes: &ChangeSet) -> Result<QueuedChangeSet, SegueError> {
        let mut targets = Vec::with_capacity(changes.parameter_changes.len());
        for change in &changes.parameter_changes {
            if !change.is_valid() {
                targets.push(None);
                continue;
            }
            if !change.old_value.is_finite() || !change.new_value.is_finite() {
                return Err(SegueError::NonFiniteValue {
                    path: change.parameter_path.clone(),
                });
            }
            let seconds = change.smooth_time_seconds;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(SegueError::InvalidSmoothTime {
                    path: change.parameter_path.clone(),
                    seconds,
                });
            }
            let slot = self.registry.resolve(&change.parameter_path).inspect_err(|e| {
                tracing::warn!("apply_diff: {e}");
            })?;
            let kind = self.registry.kind(slot).unwrap_or_default();
            targets.push(Some(RampTarget {
                slot,
                curve: self.curves.curve_for(kind),
            }));
        }
        Ok(QueuedChangeSet::new(changes.clone(), targets))
    }

    /// Remember `state` as the desired engine state and try to send the diff
    /// from the last accepted state.
    ///
    /// With no accepted state yet, the diff is taken against
    /// [`EngineState::default`]; use [`rebase`](Self::rebase) to seed the
    /// baseline with what the engine is actually running.
    pub fn submit_state(&mut self, state: EngineState) -> Result<Submission, SegueError> {
        self.latest = Some(state);
        self.flush()
    }

    /// Retry a deferred submission, coalesced into one diff.
    ///
    /// On error the deferred state is discarded so it cannot fail again.
    pub fn flush(&mut self) -> Result<Submission, SegueError> {
        let Some(latest) = self.latest.take() else {
            return Ok(Submission::NoChange);
        };

        let diff = match &self.baseline {
            Some(baseline) => compute_diff(baseline, &latest),
            None => compute_diff(&EngineState::default(), &latest),
        };
        if !diff.has_changes() {
            self.baseline = Some(latest);
            return Ok(Submission::NoChange);
        }

        if self.apply_diff(&diff)? {
            self.baseline = Some(latest);
            Ok(Submission::Applied(diff.count_changes()))
        } else {
            self.latest = Some(latest);
            Ok(Submission::Deferred)
        }
    }

    /// Treat `state` as accepted without sending anything.
    pub fn rebase(&mut self, state: EngineState) {
        self.baseline = Some(state);
        self.latest = None;
    }

    /// Last accepted state.
    pub fn baseline(&self) -> Option<&EngineState> {
        self.baseline.as_ref()
    }

    /// Whether a submission is waiting for queue space.
    pub fn has_deferred(&self) -> bool {
        self.latest.is_some()
    }

    /// Discard every change set the audio thread has not dequeued yet.
    ///
    /// Returns how many change sets were cancelled. Their queue slots are free
    /// again when this returns, even if the audio thread is not running. Sets
    /// already dequeued, including ramps in flight, are unaffected. The submission baseline is
    /// left as is; call [`rebase`](Self::rebase) if it no longer matches the
    /// engine.
    pub fn cancel_pending_changes(&mut self) -> usize {
        let stats = &self.stats;
        let cancelled = self
            .producer
            .cancel_pending_with(|_| stats.add_cancelled_discarded(1));
        if cancelled > 0 {
            tracing::debug!(cancelled, "pending change sets cancelled");
        }
        cancelled
    }

    /// Cancel pending changes, forget the submission baseline, ask the audio
    /// thread to snap in-flight ramps to their targets at its next block, and
    /// zero the diagnostic counters.
    pub fn reset(&mut self) {
        let cancelled = self.producer.cancel_pending();
        self.baseline = None;
        self.latest = None;
        self.control.request_reset();
        self.stats.reset();
        tracing::info!(cancelled, "reconciler reset");
    }

    /// Whether any enqueued change set has not been dequeued yet.
    pub fn has_pending_changes(&self) -> bool {
        self.producer.has_pending()
    }

    /// Number of enqueued change sets not dequeued yet.
    pub fn pending_change_count(&self) -> usize {
        self.producer.pending_count()
    }

    /// Free change sets the audio thread has finished with. Called
    /// automatically by [`apply_diff`](Self::apply_diff).
    pub fn collect_retired(&mut self) -> usize {
        self.retired.collect()
    }

    /// Register a parameter path with a semantic kind ahead of use.
    pub fn register_parameter(
        &mut self,
        path: &str,
        kind: ParamKind,
    ) -> Result<ParamSlot, SegueError> {
        self.registry.register(path, kind)
    }

    /// Parameter registry.
    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    /// Mutable parameter registry.
    pub fn registry_mut(&mut self) -> &mut ParameterRegistry {
        &mut self.registry
    }

    /// Curve policy applied to newly resolved changes.
    pub fn curves(&self) -> &CurvePolicy {
        &self.curves
    }

    /// Shared scratch buffer pool.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Sample rate the audio side is running at.
    pub fn sample_rate(&self) -> f64 {
        self.control.sample_rate()
    }
}

impl core::fmt::Debug for ChangeController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeController")
            .field("producer", &self.producer)
            .field("parameters", &self.registry.len())
            .field("deferred", &self.latest.is_some())
            .finish_non_exhaustive()
    }
}
