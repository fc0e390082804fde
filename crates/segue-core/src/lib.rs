//! Segue Core - real-time-safe state reconciliation for a running audio engine
//!
//! A control thread (UI, session editor, undo/redo) edits engine snapshots; the
//! audio thread applies the differences at block boundaries without ever
//! blocking, allocating, or taking a lock.
//!
//! # Core Abstractions
//!
//! ## State and Diffing
//!
//! - [`EngineState`] - Snapshot of performance, instruments and parameters
//! - [`compute_diff`] - Pure snapshot comparison producing a [`ChangeSet`]
//! - [`Change`] - Closed set of typed records ([`InstrumentChange`],
//!   [`ParameterChange`], [`PerformanceChange`]), each with `is_valid()`
//!
//! ## Transitions
//!
//! - [`RampPlan`] - Sample-indexed ramp between two values, computed by index
//! - [`RampCurve`] - Linear, exponential and logarithmic shapes
//! - [`CurvePolicy`] - Curve per [`ParamKind`], never inferred from names
//!
//! ## Memory and Transport
//!
//! - [`BufferPool`] - Four-tier lock-free scratch pool with move-only
//!   [`BufferHandle`]s
//! - [`change_queue`] - Lock-free SPSC queue with sequence numbers and
//!   cancellation that frees its slots immediately
//!
//! ## Reconciliation
//!
//! - [`initialize`] - Build a connected [`ChangeController`] /
//!   [`AudioReconciler`] pair
//! - [`EngineTarget`] - Seam implemented by the embedding DSP graph
//! - [`ReconcilerStats`] - Counters the audio thread bumps instead of logging
//!
//! # Example
//!
//! ```rust
//! use segue_core::{
//!     EngineState, EngineTarget, InstrumentChange, ParamSlot, PerformanceChange,
//!     ReconcilerConfig, initialize,
//! };
//!
//! #[derive(Default)]
//! struct Synth {
//!     pitch: f32,
//! }
//!
//! impl EngineTarget for Synth {
//!     fn prepare(&mut self, _sample_rate: f64, _max_block_size: usize) {}
//!     fn swap_instrument(&mut self, _change: &InstrumentChange) {}
//!     fn apply_performance(&mut self, _change: &PerformanceChange) {}
//!     fn set_parameter(&mut self, _slot: ParamSlot, value: f32) {
//!         self.pitch = value;
//!     }
//!     fn render(&mut self, _frames: usize) {}
//! }
//!
//! let (mut control, mut audio) =
//!     initialize(Synth::default(), ReconcilerConfig::new(48000.0)).unwrap();
//!
//! let before = EngineState::new().with_parameter("osc1.pitch", 440.0, 0.1);
//! let after = EngineState::new().with_parameter("osc1.pitch", 880.0, 0.1);
//! let diff = control.compute_diff(&before, &after);
//! assert!(control.apply_diff(&diff).unwrap());
//!
//! // 0.1 s at 48 kHz is 4800 samples.
//! for _ in 0..10 {
//!     audio.process(480);
//! }
//! assert_eq!(audio.target().pitch, 880.0);
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: No allocation, locking, logging or panics in
//!   [`AudioReconciler::process`]
//! - **Explicit ownership**: No global pool; [`initialize`] wires everything
//! - **Numeric addressing**: Paths resolve to [`ParamSlot`]s on the control
//!   thread
//! - **Degrade, count, continue**: Invalid records, exhausted pools and full
//!   queues are reported through return values and counters, never by failing
//!   the audio block

pub mod bridge;
pub mod change;
pub mod config;
pub mod diff;
pub mod error;
pub mod param;
pub mod pool;
pub mod queue;
pub mod ramp;
pub mod reconcile;
pub mod state;
pub mod stats;

// Re-export main types at crate root
pub use bridge::{ChangeController, Submission, initialize};
pub use change::{
    Change, ChangeRef, ChangeSet, InstrumentChange, ParameterChange, PerformanceChange,
};
pub use config::{
    DEFAULT_MAX_ACTIVE_RAMPS, DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MAX_PARAMETERS,
    DEFAULT_QUEUE_CAPACITY, ReconcilerConfig,
};
pub use diff::{SILENT_INSTRUMENT_ID, compute_diff};
pub use error::SegueError;
pub use param::{CurvePolicy, ParamKind, ParamSlot, ParameterRegistry};
pub use pool::{
    BufferHandle, BufferPool, BufferTier, PoolConfig, PoolError, PoolStats, TierConfig,
    TierSnapshot,
};
pub use queue::{
    ChangeConsumer, ChangeProducer, RetireReceiver, RetireSender, Sequenced, change_queue,
    retire_channel,
};
pub use ramp::{
    RampCurve, RampIter, RampPlan, plan_ramp, plan_ramp_with_curve, samples_for_duration,
};
pub use reconcile::{AudioReconciler, EngineTarget, QueuedChangeSet, RampTarget};
pub use state::{EngineState, InstrumentAssignment, ParameterValue};
pub use stats::{ReconcilerStats, StatsSnapshot};
