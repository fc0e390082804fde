//! Audio-thread application of queued change sets.
//!
//! [`AudioReconciler`] owns the engine (anything implementing [`EngineTarget`])
//! and is driven once per audio block by [`process`](AudioReconciler::process).
//! Each call:
//!
//! 1. honours a pending reset by snapping in-flight ramps to their targets,
//! 2. drains every queued change set in FIFO order, applying instrument swaps,
//!    then performance swaps, then starting parameter ramps,
//! 3. pre-renders this block of every active ramp into one pooled scratch
//!    buffer and hands the values to the engine,
//! 4. renders the block,
//! 5. advances ramps and commits the ones that reached their target.
//!
//! Spent change sets go back to the control thread through the retire channel
//! so their strings are freed there.
//!
//! ## Real-Time Safety
//!
//! `process` never blocks, logs, or allocates: the active ramp list and the
//! committed value table are sized at construction, scratch memory comes from
//! [`BufferPool::acquire_realtime`], and every failure (invalid record, full
//! ramp list, empty pool, full retire channel) degrades to a simpler behaviour
//! and bumps a [`ReconcilerStats`] counter.
//!
//! ## Parameter Lifecycle
//!
//! ```text
//! Queued ──► Ramping ──► Committed
//!    └─────────────────────▲        (sample_count <= 1, ramp list full, reset)
//! ```
//!
//! Instrument and performance changes go straight from Queued to applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::change::{ChangeSet, InstrumentChange, ParameterChange, PerformanceChange};
use crate::config::{ReconcilerConfig, validate_sample_rate};
use crate::error::SegueError;
use crate::param::ParamSlot;
use crate::pool::{BufferHandle, BufferPool};
use crate::queue::{ChangeConsumer, RetireSender};
use crate::ramp::{RampCurve, RampPlan, plan_ramp_with_curve, samples_for_duration};
use crate::stats::{ReconcilerStats, StatsSnapshot};

/// The engine a reconciler drives.
///
/// Implemented by the embedding application's DSP graph. Every method is
/// called on the audio thread and must be real-time safe.
///
/// # Example
///
/// ```rust
/// use segue_core::{EngineTarget, InstrumentChange, ParamSlot, PerformanceChange};
///
/// struct Silence;
///
/// impl EngineTarget for Silence {
///     fn prepare(&mut self, _sample_rate: f64, _max_block_size: usize) {}
///     fn swap_instrument(&mut self, _change: &InstrumentChange) {}
///     fn apply_performance(&mut self, _change: &PerformanceChange) {}
///     fn set_parameter(&mut self, _slot: ParamSlot, _value: f32) {}
///     fn render(&mut self, _frames: usize) {}
/// }
/// ```
pub trait EngineTarget {
    /// Called before the first block and whenever the sample rate or the
    /// maximum block size changes.
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize);

    /// Load `change.new_instrument_id` (and preset) into `change.role`.
    ///
    /// [`SILENT_INSTRUMENT_ID`](crate::SILENT_INSTRUMENT_ID) means the role
    /// was removed.
    fn swap_instrument(&mut self, change: &InstrumentChange);

    /// Switch performance, density, groove and console profile in one step.
    fn apply_performance(&mut self, change: &PerformanceChange);

    /// Set a parameter for the rest of the block.
    fn set_parameter(&mut self, slot: ParamSlot, value: f32);

    /// Per-sample values of a ramping parameter for the next block.
    ///
    /// `values` holds one entry per frame of the upcoming
    /// [`render`](Self::render) call. The default applies the block's final
    /// value via [`set_parameter`](Self::set_parameter).
    fn automate_parameter(&mut self, slot: ParamSlot, values: &[f32]) {
        if let Some(&last) = values.last() {
            self.set_parameter(slot, last);
        }
    }

    /// Render `frames` samples.
    fn render(&mut self, frames: usize);
}

/// Where a parameter change lands: its slot and the curve chosen for its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampTarget {
    /// Resolved parameter slot.
    pub slot: ParamSlot,
    /// Curve from the controller's [`CurvePolicy`](crate::CurvePolicy).
    pub curve: RampCurve,
}

/// A change set as it travels through the queue: the original records plus
/// control-side resolution of every parameter path.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedChangeSet {
    changes: ChangeSet,
    /// Parallel to `changes.parameter_changes`; `None` for records that failed
    /// validation.
    targets: Vec<Option<RampTarget>>,
}

impl QueuedChangeSet {
    pub(crate) fn new(changes: ChangeSet, targets: Vec<Option<RampTarget>>) -> Self {
        debug_assert_eq!(changes.parameter_changes.len(), targets.len());
        Self { changes, targets }
    }

    /// The records as submitted.
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Resolved target of each parameter change, in order.
    pub fn targets(&self) -> &[Option<RampTarget>] {
        &self.targets
    }

    /// Recover the submitted records.
    pub fn into_changes(self) -> ChangeSet {
        self.changes
    }
}

/// Flags and values the control thread reads or writes across the boundary.
#[derive(Debug)]
pub(crate) struct SharedControl {
    reset_requested: AtomicBool,
    sample_rate_bits: AtomicU64,
}

impl SharedControl {
    pub(crate) fn new(sample_rate: f64) -> Self {
        Self {
            reset_requested: AtomicBool::new(false),
            sample_rate_bits: AtomicU64::new(sample_rate.to_bits()),
        }
    }

    pub(crate) fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    pub(crate) fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate_bits.load(Ordering::Acquire))
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveRamp {
    slot: ParamSlot,
    plan: RampPlan,
    /// Index of the next sample to play.
    position: usize,
}

impl ActiveRamp {
    #[inline]
    fn current(&self) -> f32 {
        self.plan.value_at(self.position)
    }
}

/// Audio-thread half of a reconciler pair. Created by
/// [`initialize`](crate::initialize).
pub struct AudioReconciler<T: EngineTarget> {
    target: T,
    changes: ChangeConsumer<QueuedChangeSet>,
    retire: RetireSender<QueuedChangeSet>,
    pool: BufferPool,
    stats: Arc<ReconcilerStats>,
    control: Arc<SharedControl>,
    sample_rate: f64,
    max_block_size: usize,
    prerender: bool,
    max_active_ramps: usize,
    /// Never grows past `max_active_ramps`.
    ramps: Vec<ActiveRamp>,
    /// Indexed by `ParamSlot::index()`.
    committed: Vec<Option<f32>>,
}

impl<T: EngineTarget> AudioReconciler<T> {
    pub(crate) fn new(
        target: T,
        changes: ChangeConsumer<QueuedChangeSet>,
        retire: RetireSender<QueuedChangeSet>,
        pool: BufferPool,
        stats: Arc<ReconcilerStats>,
        control: Arc<SharedControl>,
        config: &ReconcilerConfig,
    ) -> Self {
        Self {
            target,
            changes,
            retire,
            pool,
            stats,
            control,
            sample_rate: config.sample_rate,
            max_block_size: config.max_block_size,
            prerender: config.prerender_ramps,
            max_active_ramps: config.max_active_ramps,
            ramps: Vec::with_capacity(config.max_active_ramps),
            committed: vec![None; config.max_parameters],
        }
    }

    /// Apply pending changes and render one block of `frames` samples.
    pub fn process(&mut self, frames: usize) {
        if self.control.reset_requested.swap(false, Ordering::AcqRel) {
            self.snap_ramps();
        }

        self.drain_changes();

        let scratch = if frames > 0 && !self.ramps.is_empty() {
            self.automate(frames)
        } else {
            BufferHandle::invalid()
        };

        self.target.render(frames);
        drop(scratch);

        self.advance(frames);
    }

    fn drain_changes(&mut self) {
        loop {
            let retire = &mut self.retire;
            let stats = &self.stats;
            let popped = self.changes.try_pop_with(|cancelled| {
                stats.add_cancelled_discarded(1);
                Self::retire_spent(retire, stats, cancelled);
            });
            let Some(entry) = popped else {
                break;
            };
            self.apply(&entry.payload);
            Self::retire_spent(&mut self.retire, &self.stats, entry.payload);
        }
    }

    fn retire_spent(
        retire: &mut RetireSender<QueuedChangeSet>,
        stats: &ReconcilerStats,
        spent: QueuedChangeSet,
    ) {
        if let Err(spent) = retire.retire(spent) {
            stats.add_retire_overflows(1);
            drop(spent);
        }
    }

    fn apply(&mut self, queued: &QueuedChangeSet) {
        let changes = &queued.changes;
        let mut invalid = 0;

        for change in &changes.instrument_changes {
            if change.is_valid() {
                self.target.swap_instrument(change);
                self.stats.add_instruments_swapped(1);
            } else {
                invalid += 1;
            }
        }

        for change in &changes.performance_changes {
            if change.is_valid() {
                self.target.apply_performance(change);
                self.stats.add_performances_applied(1);
            } else {
                invalid += 1;
            }
        }

        for (change, target) in changes.parameter_changes.iter().zip(&queued.targets) {
            let started = match target {
                Some(target) if change.is_valid() => self.start_ramp(change, *target),
                _ => false,
            };
            if !started {
                invalid += 1;
            }
        }

        if invalid > 0 {
            self.stats.add_invalid_changes(invalid);
        }
        self.stats.add_change_sets_applied(1);
    }

    /// Returns false if the slot is outside the committed value table.
    fn start_ramp(&mut self, change: &ParameterChange, target: RampTarget) -> bool {
        let slot = target.slot;
        if slot.index() >= self.committed.len() {
            return false;
        }

        let samples = samples_for_duration(change.smooth_time_seconds, self.sample_rate);
        let existing = self.ramps.iter().position(|r| r.slot == slot);
        let from = existing.map_or(change.old_value, |i| self.ramps[i].current());

        if samples <= 1 {
            if let Some(i) = existing {
                self.ramps.swap_remove(i);
            }
            self.commit(slot, change.new_value);
            return true;
        }

        let ramp = ActiveRamp {
            slot,
            plan: plan_ramp_with_curve(from, change.new_value, samples, target.curve),
            position: 0,
        };
        match existing {
            Some(i) => self.ramps[i] = ramp,
            None if self.ramps.len() < self.max_active_ramps => self.ramps.push(ramp),
            None => {
                self.stats.add_ramp_overflows(1);
                self.commit(slot, change.new_value);
                return true;
            }
        }
        self.stats.add_ramps_started(1);
        true
    }

    fn commit(&mut self, slot: ParamSlot, value: f32) {
        self.target.set_parameter(slot, value);
        self.committed[slot.index()] = Some(value);
        self.stats.add_parameters_committed(1);
    }

    /// Hand this block's ramp values to the engine. The returned scratch
    /// handle must outlive the render call.
    fn automate(&mut self, frames: usize) -> BufferHandle {
        let mut scratch = if self.prerender {
            self.pool.acquire_realtime_bytes(frames * size_of::<f32>())
        } else {
            BufferHandle::invalid()
        };

        if scratch.is_valid() {
            let block = &mut scratch.as_f32_mut()[..frames];
            for ramp in &self.ramps {
                ramp.plan.render_into(ramp.position, block);
                self.target.automate_parameter(ramp.slot, block);
            }
        } else {
            if self.prerender {
                self.stats.add_scratch_misses(1);
            }
            for ramp in &self.ramps {
                let end = ramp.plan.value_at(ramp.position + frames - 1);
                self.target.set_parameter(ramp.slot, end);
            }
        }
        scratch
    }

    fn advance(&mut self, frames: usize) {
        let mut i = 0;
        while i < self.ramps.len() {
            let ramp = &mut self.ramps[i];
            ramp.position += frames;
            if ramp.position >= ramp.plan.sample_count() {
                let (slot, value) = (ramp.slot, ramp.plan.last());
                self.ramps.swap_remove(i);
                self.committed[slot.index()] = Some(value);
                self.stats.add_ramps_completed(1);
            } else {
                i += 1;
            }
        }
    }

    fn snap_ramps(&mut self) {
        for ramp in self.ramps.drain(..) {
            let value = ramp.plan.last();
            self.target.set_parameter(ramp.slot, value);
            self.committed[ramp.slot.index()] = Some(value);
            self.stats.add_parameters_committed(1);
        }
    }

    /// Change the sample rate and maximum block size.
    ///
    /// Calls [`EngineTarget::prepare`]. Ramps already in flight keep their
    /// sample counts. Not real-time safe if the engine's `prepare` is not;
    /// call it while the audio stream is stopped or between callbacks.
    pub fn set_sample_rate(
        &mut self,
        sample_rate: f64,
        max_block_size: usize,
    ) -> Result<(), SegueError> {
        validate_sample_rate(sample_rate)?;
        if max_block_size == 0 {
            return Err(SegueError::invalid_config("max_block_size", "must be at least 1"));
        }
        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.control
            .sample_rate_bits
            .store(sample_rate.to_bits(), Ordering::Release);
        self.target.prepare(sample_rate, max_block_size);
        Ok(())
    }

    /// Current sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Largest block the engine was prepared for.
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Last value a parameter settled on, if it was ever committed.
    pub fn committed_value(&self, slot: ParamSlot) -> Option<f32> {
        self.committed.get(slot.index()).copied().flatten()
    }

    /// Value a parameter will have at the next sample: the in-flight ramp
    /// value if ramping, otherwise the committed value.
    pub fn current_value(&self, slot: ParamSlot) -> Option<f32> {
        self.ramps
            .iter()
            .find(|r| r.slot == slot)
            .map(ActiveRamp::current)
            .or_else(|| self.committed_value(slot))
    }

    /// Whether a parameter has a ramp in flight.
    pub fn is_ramping(&self, slot: ParamSlot) -> bool {
        self.ramps.iter().any(|r| r.slot == slot)
    }

    /// Number of ramps in flight.
    pub fn active_ramps(&self) -> usize {
        self.ramps.len()
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The engine being driven.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Mutable access to the engine.
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }
}

impl<T: EngineTarget> core::fmt::Debug for AudioReconciler<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioReconciler")
            .field("sample_rate", &self.sample_rate)
            .field("max_block_size", &self.max_block_size)
            .field("active_ramps", &self.ramps.len())
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}
