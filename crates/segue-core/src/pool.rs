//! Tiered, lock-free pool of pre-sized scratch buffers.
//!
//! The audio thread needs scratch memory (pre-rendered ramps, crossfade
//! buffers) but may never call into the allocator. [`BufferPool`] keeps four
//! size tiers, each preallocated to a configurable floor, and hands buffers
//! out as move-only [`BufferHandle`]s that return themselves to their tier's
//! free list on drop.
//!
//! # Tiers
//!
//! | Tier | Default size | Floor | Ceiling |
//! |------|--------------|-------|---------|
//! | [`Small`](BufferTier::Small) | 4 KiB | 32 | 256 |
//! | [`Medium`](BufferTier::Medium) | 64 KiB | 8 | 64 |
//! | [`Large`](BufferTier::Large) | 1 MiB | 2 | 16 |
//! | [`ExtraLarge`](BufferTier::ExtraLarge) | 8 MiB | 0 | 4 |
//!
//! # Thread Safety
//!
//! - **Free lists**: `crossbeam` `ArrayQueue`, sized to the tier ceiling, so a
//!   release never fails and never allocates.
//! - **Counters**: each tier packs its allocated and in-flight counts into
//!   one `AtomicU64`, so [`BufferPool::tier_snapshot`] always observes
//!   `in_flight + free == allocated`, even while other threads acquire and
//!   release.
//! - [`acquire_realtime`](BufferPool::acquire_realtime) never allocates: an
//!   empty free list yields an invalid handle. [`acquire`](BufferPool::acquire)
//!   may grow a tier up to its ceiling and is for non-real-time threads (and
//!   for pre-warming).
//!
//! # Example
//!
//! ```rust
//! use segue_core::{BufferPool, BufferTier, PoolConfig};
//!
//! let pool = BufferPool::new(PoolConfig::default()).unwrap();
//!
//! let mut handle = pool.acquire_realtime(BufferTier::Small);
//! assert!(handle.is_valid());
//! handle.as_f32_mut()[0] = 1.0;
//! assert_eq!(pool.in_flight(BufferTier::Small), 1);
//!
//! drop(handle);
//! assert_eq!(pool.in_flight(BufferTier::Small), 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Backing storage. `u64` words keep every buffer 8-byte aligned so the byte
/// and `f32` views are plain casts.
type Words = Box<[u64]>;

/// Low half of a tier's packed counts: buffers allocated.
const ALLOCATED_ONE: u64 = 1;
/// High half of a tier's packed counts: buffers held by handles.
const IN_FLIGHT_ONE: u64 = 1 << 32;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Size tier of a pooled buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferTier {
    /// Smallest tier.
    Small,
    /// Second tier.
    Medium,
    /// Third tier.
    Large,
    /// Largest tier.
    ExtraLarge,
}

impl BufferTier {
    /// All tiers, smallest first.
    pub const ALL: [Self; 4] = [Self::Small, Self::Medium, Self::Large, Self::ExtraLarge];

    #[inline]
    fn index(self) -> usize {
        match self {
            Self::Small => 0,
            Self::Medium => 1,
            Self::Large => 2,
            Self::ExtraLarge => 3,
        }
    }

    /// Lowercase tier name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::ExtraLarge => "extra_large",
        }
    }
}

impl core::fmt::Display for BufferTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Size and population bounds of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TierConfig {
    /// Size of each buffer in bytes.
    pub size_bytes: usize,
    /// Buffers preallocated at construction; the tier never shrinks below this.
    pub floor: usize,
    /// Maximum number of buffers the tier may ever hold.
    pub ceiling: usize,
}

impl TierConfig {
    /// Create a tier configuration.
    pub const fn new(size_bytes: usize, floor: usize, ceiling: usize) -> Self {
        Self {
            size_bytes,
            floor,
            ceiling,
        }
    }
}

/// Configuration for all four tiers. Fixed once the pool is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Upper bound on `sum(size_bytes * ceiling)` across tiers.
    pub max_total_bytes: usize,
    /// [`BufferTier::Small`] bounds.
    pub small: TierConfig,
    /// [`BufferTier::Medium`] bounds.
    pub medium: TierConfig,
    /// [`BufferTier::Large`] bounds.
    pub large: TierConfig,
    /// [`BufferTier::ExtraLarge`] bounds.
    pub extra_large: TierConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: 100 * MIB,
            small: TierConfig::new(4 * KIB, 32, 256),
            medium: TierConfig::new(64 * KIB, 8, 64),
            large: TierConfig::new(MIB, 2, 16),
            extra_large: TierConfig::new(8 * MIB, 0, 4),
        }
    }
}

impl PoolConfig {
    /// Bounds for a tier.
    pub fn tier(&self, tier: BufferTier) -> &TierConfig {
        match tier {
            BufferTier::Small => &self.small,
            BufferTier::Medium => &self.medium,
            BufferTier::Large => &self.large,
            BufferTier::ExtraLarge => &self.extra_large,
        }
    }

    /// Mutable bounds for a tier.
    pub fn tier_mut(&mut self, tier: BufferTier) -> &mut TierConfig {
        match tier {
            BufferTier::Small => &mut self.small,
            BufferTier::Medium => &mut self.medium,
            BufferTier::Large => &mut self.large,
            BufferTier::ExtraLarge => &mut self.extra_large,
        }
    }

    /// Builder form of [`tier_mut`](Self::tier_mut).
    pub fn with_tier(mut self, tier: BufferTier, config: TierConfig) -> Self {
        *self.tier_mut(tier) = config;
        self
    }

    /// Worst-case footprint if every tier grows to its ceiling.
    pub fn ceiling_bytes(&self) -> usize {
        BufferTier::ALL
            .iter()
            .map(|&t| {
                let c = self.tier(t);
                c.size_bytes.saturating_mul(c.ceiling)
            })
            .fold(0usize, usize::saturating_add)
    }

    /// Check tier bounds and the total footprint.
    pub fn validate(&self) -> Result<(), PoolError> {
        let mut previous_size = 0;
        for tier in BufferTier::ALL {
            let c = self.tier(tier);
            if c.size_bytes == 0 {
                return Err(PoolError::invalid_tier(tier, "size_bytes must be non-zero"));
            }
            if c.size_bytes <= previous_size {
                return Err(PoolError::invalid_tier(
                    tier,
                    format!(
                        "size_bytes {} must exceed the previous tier ({previous_size})",
                        c.size_bytes
                    ),
                ));
            }
            if c.ceiling > u32::MAX as usize {
                return Err(PoolError::invalid_tier(tier, "ceiling must fit in 32 bits"));
            }
            if c.floor > c.ceiling {
                return Err(PoolError::invalid_tier(
                    tier,
                    format!("floor {} exceeds ceiling {}", c.floor, c.ceiling),
                ));
            }
            previous_size = c.size_bytes;
        }
        let ceiling_bytes = self.ceiling_bytes();
        if ceiling_bytes > self.max_total_bytes {
            return Err(PoolError::FootprintExceeded {
                ceiling_bytes,
                max_total_bytes: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Buffer pool configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A tier's bounds are inconsistent.
    #[error("tier '{tier}': {reason}")]
    InvalidTier {
        /// Offending tier.
        tier: BufferTier,
        /// Why the bounds were rejected.
        reason: String,
    },

    /// The tiers' ceilings add up to more than the configured maximum.
    #[error("tier ceilings need {ceiling_bytes} bytes, limit is {max_total_bytes}")]
    FootprintExceeded {
        /// Worst-case footprint of the configuration.
        ceiling_bytes: usize,
        /// Configured limit.
        max_total_bytes: usize,
    },
}

impl PoolError {
    fn invalid_tier(tier: BufferTier, reason: impl Into<String>) -> Self {
        Self::InvalidTier {
            tier,
            reason: reason.into(),
        }
    }
}

/// Acquisition counters for a tier or a whole pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Acquisitions served from a free list.
    pub hits: u64,
    /// Acquisitions that found the free list empty.
    pub misses: u64,
    /// Buffers allocated after construction.
    pub allocations: u64,
    /// Acquisitions that returned an invalid handle.
    pub exhausted: u64,
}

impl PoolStats {
    /// Fraction of acquisitions served from a free list (1.0 when idle).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            1.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            allocations: self.allocations + other.allocations,
            exhausted: self.exhausted + other.exhausted,
        }
    }
}

/// A consistent view of one tier's buffer counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierSnapshot {
    /// Buffers that exist, free or held.
    pub allocated: usize,
    /// Buffers held by handles.
    pub in_flight: usize,
    /// Buffers available to acquire (`allocated - in_flight`).
    pub free: usize,
}

impl TierSnapshot {
    fn unpack(counts: u64) -> Self {
        let allocated = (counts & u64::from(u32::MAX)) as usize;
        let in_flight = (counts >> 32) as usize;
        Self {
            allocated,
            in_flight,
            free: allocated.saturating_sub(in_flight),
        }
    }
}

struct TierSlot {
    size_bytes: usize,
    words: usize,
    ceiling: usize,
    free: ArrayQueue<Words>,
    /// `in_flight << 32 | allocated`. `in_flight` drops before a buffer
    /// re-enters the free list and rises only after one leaves it, so it never
    /// exceeds `allocated`.
    counts: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    allocations: AtomicU64,
    exhausted: AtomicU64,
}

impl TierSlot {
    fn new(config: &TierConfig) -> Self {
        let words = config.size_bytes.div_ceil(8);
        // ArrayQueue rejects zero capacity; a zero-ceiling tier never holds a buffer anyway.
        let free = ArrayQueue::new(config.ceiling.max(1));
        for _ in 0..config.floor {
            let _ = free.push(vec![0u64; words].into_boxed_slice());
        }
        Self {
            size_bytes: config.size_bytes,
            words,
            ceiling: config.ceiling,
            free,
            counts: AtomicU64::new(config.floor as u64 * ALLOCATED_ONE),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> TierSnapshot {
        TierSnapshot::unpack(self.counts.load(Ordering::Acquire))
    }

    /// Count one more allocated buffer, plus `extra`, if the tier is below
    /// its ceiling.
    fn reserve(&self, extra: u64) -> bool {
        self.counts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                let allocated = TierSnapshot::unpack(c).allocated;
                (allocated < self.ceiling).then_some(c + ALLOCATED_ONE + extra)
            })
            .is_ok()
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

struct PoolInner {
    tiers: [TierSlot; 4],
    config: PoolConfig,
}

/// Shared handle to a tiered buffer pool.
///
/// Cloning is cheap (`Arc`); every clone refers to the same buffers. The pool
/// lives as long as its last clone or outstanding [`BufferHandle`].
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Build a pool and preallocate every tier to its floor.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let tiers = BufferTier::ALL.map(|t| TierSlot::new(config.tier(t)));
        tracing::debug!(
            footprint = BufferTier::ALL
                .iter()
                .map(|&t| config.tier(t).size_bytes * config.tier(t).floor)
                .sum::<usize>(),
            ceiling = config.ceiling_bytes(),
            "buffer_pool: preallocated"
        );
        Ok(Self {
            inner: Arc::new(PoolInner { tiers, config }),
        })
    }

    #[inline]
    fn slot(&self, tier: BufferTier) -> &TierSlot {
        &self.inner.tiers[tier.index()]
    }

    /// Configuration the pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Smallest tier whose buffers hold at least `len_bytes`.
    pub fn tier_for(&self, len_bytes: usize) -> Option<BufferTier> {
        BufferTier::ALL
            .into_iter()
            .find(|&t| self.slot(t).size_bytes >= len_bytes)
    }

    /// Acquire a buffer, growing the tier up to its ceiling if the free list
    /// is empty. May allocate: use from non-real-time threads only.
    pub fn acquire(&self, tier: BufferTier) -> BufferHandle {
        self.acquire_inner(tier, true)
    }

    /// Acquire a buffer without ever allocating. Returns an invalid handle if
    /// the tier's free list is empty.
    #[inline]
    pub fn acquire_realtime(&self, tier: BufferTier) -> BufferHandle {
        self.acquire_inner(tier, false)
    }

    /// [`acquire`](Self::acquire) from the smallest tier that fits `len_bytes`.
    pub fn acquire_bytes(&self, len_bytes: usize) -> BufferHandle {
        match self.tier_for(len_bytes) {
            Some(tier) => self.acquire(tier),
            None => BufferHandle::invalid(),
        }
    }

    /// [`acquire_realtime`](Self::acquire_realtime) from the smallest tier
    /// that fits `len_bytes`.
    #[inline]
    pub fn acquire_realtime_bytes(&self, len_bytes: usize) -> BufferHandle {
        match self.tier_for(len_bytes) {
            Some(tier) => self.acquire_realtime(tier),
            None => BufferHandle::invalid(),
        }
    }

    fn acquire_inner(&self, tier: BufferTier, may_allocate: bool) -> BufferHandle {
        let slot = self.slot(tier);

        if let Some(words) = slot.free.pop() {
            slot.counts.fetch_add(IN_FLIGHT_ONE, Ordering::AcqRel);
            slot.hits.fetch_add(1, Ordering::Relaxed);
            return self.handle(tier, words);
        }

        slot.misses.fetch_add(1, Ordering::Relaxed);
        if !may_allocate || !slot.reserve(IN_FLIGHT_ONE) {
            slot.exhausted.fetch_add(1, Ordering::Relaxed);
            return BufferHandle::invalid();
        }

        slot.allocations.fetch_add(1, Ordering::Relaxed);
        let words = vec![0u64; slot.words].into_boxed_slice();
        self.handle(tier, words)
    }

    fn handle(&self, tier: BufferTier, words: Words) -> BufferHandle {
        BufferHandle {
            slot: Some(HandleSlot {
                pool: self.clone(),
                tier,
                words,
            }),
        }
    }

    fn give_back(&self, tier: BufferTier, words: Words) {
        let slot = self.slot(tier);
        slot.counts.fetch_sub(IN_FLIGHT_ONE, Ordering::AcqRel);
        if let Err(words) = slot.free.push(words) {
            // Unreachable while allocated <= ceiling == free-list capacity.
            drop(words);
            slot.counts.fetch_sub(ALLOCATED_ONE, Ordering::AcqRel);
        }
    }

    /// Grow a tier's free list by up to `count` buffers (bounded by its
    /// ceiling). Allocates; call before audio starts. Returns how many
    /// buffers were added.
    pub fn prewarm(&self, tier: BufferTier, count: usize) -> usize {
        let slot = self.slot(tier);
        let mut added = 0;
        while added < count && slot.reserve(0) {
            let words = vec![0u64; slot.words].into_boxed_slice();
            slot.allocations.fetch_add(1, Ordering::Relaxed);
            if slot.free.push(words).is_err() {
                slot.counts.fetch_sub(ALLOCATED_ONE, Ordering::AcqRel);
                break;
            }
            added += 1;
        }
        if added > 0 {
            tracing::debug!("buffer_pool: prewarmed {added} {tier} buffers");
        }
        added
    }

    /// Buffers of a tier currently held by handles.
    pub fn in_flight(&self, tier: BufferTier) -> usize {
        self.slot(tier).snapshot().in_flight
    }

    /// Buffers of a tier available to acquire.
    pub fn free_len(&self, tier: BufferTier) -> usize {
        self.slot(tier).snapshot().free
    }

    /// Buffers of a tier that exist (free or in flight).
    pub fn total_allocated(&self, tier: BufferTier) -> usize {
        self.slot(tier).snapshot().allocated
    }

    /// Allocated, in-flight and free counts of a tier, read in one atomic
    /// load.
    pub fn tier_snapshot(&self, tier: BufferTier) -> TierSnapshot {
        self.slot(tier).snapshot()
    }

    /// Buffer size of a tier in bytes.
    pub fn size_bytes(&self, tier: BufferTier) -> usize {
        self.slot(tier).size_bytes
    }

    /// Counters for one tier.
    pub fn tier_stats(&self, tier: BufferTier) -> PoolStats {
        self.slot(tier).stats()
    }

    /// Counters summed over all tiers.
    pub fn stats(&self) -> PoolStats {
        BufferTier::ALL
            .iter()
            .map(|&t| self.tier_stats(t))
            .fold(PoolStats::default(), PoolStats::merge)
    }

    /// Bytes currently allocated across all tiers.
    pub fn footprint_bytes(&self) -> usize {
        BufferTier::ALL
            .iter()
            .map(|&t| self.total_allocated(t) * self.size_bytes(t))
            .sum()
    }
}

impl core::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut s = f.debug_struct("BufferPool");
        for tier in BufferTier::ALL {
            let counts = self.tier_snapshot(tier);
            s.field(
                tier.name(),
                &format_args!(
                    "{} in flight / {} free / {} allocated",
                    counts.in_flight, counts.free, counts.allocated
                ),
            );
        }
        s.finish()
    }
}

struct HandleSlot {
    pool: BufferPool,
    tier: BufferTier,
    words: Words,
}

/// Exclusive, move-only access to one pooled buffer.
///
/// The buffer returns to its tier when the handle is dropped or
/// [`release`](Self::release)d. Releasing twice, or releasing an invalid
/// handle, does nothing. Contents are not cleared between uses.
#[must_use = "dropping a handle returns its buffer to the pool immediately"]
pub struct BufferHandle {
    slot: Option<HandleSlot>,
}

impl BufferHandle {
    /// A handle that owns no buffer.
    pub const fn invalid() -> Self {
        Self { slot: None }
    }

    /// Whether the handle owns a buffer.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.slot.is_some()
    }

    /// Tier of the owned buffer.
    pub fn tier(&self) -> Option<BufferTier> {
        self.slot.as_ref().map(|s| s.tier)
    }

    /// Usable size in bytes (0 for an invalid handle).
    pub fn capacity_bytes(&self) -> usize {
        self.slot
            .as_ref()
            .map_or(0, |s| s.pool.size_bytes(s.tier))
    }

    /// Byte view of the buffer (empty for an invalid handle).
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.capacity_bytes();
        match &self.slot {
            Some(s) => &bytemuck::cast_slice::<u64, u8>(&s.words)[..len],
            None => &[],
        }
    }

    /// Mutable byte view of the buffer.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.capacity_bytes();
        match &mut self.slot {
            Some(s) => &mut bytemuck::cast_slice_mut::<u64, u8>(&mut s.words)[..len],
            None => &mut [],
        }
    }

    /// `f32` view of the buffer.
    pub fn as_f32(&self) -> &[f32] {
        let len = self.capacity_bytes() / size_of::<f32>();
        match &self.slot {
            Some(s) => &bytemuck::cast_slice::<u64, f32>(&s.words)[..len],
            None => &[],
        }
    }

    /// Mutable `f32` view of the buffer.
    pub fn as_f32_mut(&mut self) -> &mut [f32] {
        let len = self.capacity_bytes() / size_of::<f32>();
        match &mut self.slot {
            Some(s) => &mut bytemuck::cast_slice_mut::<u64, f32>(&mut s.words)[..len],
            None => &mut [],
        }
    }

    /// Return the buffer to its pool now. The handle becomes invalid.
    pub fn release(&mut self) {
        if let Some(HandleSlot { pool, tier, words }) = self.slot.take() {
            pool.give_back(tier, words);
        }
    }
}

impl Default for BufferHandle {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl core::fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.slot {
            Some(s) => f
                .debug_struct("BufferHandle")
                .field("tier", &s.tier)
                .field("bytes", &self.capacity_bytes())
                .finish(),
            None => f.write_str("BufferHandle(invalid)"),
        }
    }
}
