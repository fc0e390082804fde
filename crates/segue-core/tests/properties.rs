//! Property-based tests for segue-core.
//!
//! Covers diff totality and coalescing, ramp endpoints and monotonicity, pool
//! conservation observed while threads contend, and queue ordering across
//! threads, using proptest for randomized inputs.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use proptest::prelude::*;
use segue_core::{
    BufferHandle, BufferPool, BufferTier, EngineState, PoolConfig, RampCurve, TierConfig,
    change_queue, compute_diff, plan_ramp_with_curve,
};

fn curve_strategy() -> impl Strategy<Value = RampCurve> {
    prop_oneof![
        Just(RampCurve::Linear),
        Just(RampCurve::Exponential),
        Just(RampCurve::Logarithmic),
    ]
}

fn id_strategy() -> impl Strategy<Value = String> {
    "[a-d]{0,3}"
}

fn state_strategy() -> impl Strategy<Value = EngineState> {
    (
        id_strategy(),
        prop::num::f32::ANY,
        prop::option::of(id_strategy()),
        prop::option::of(id_strategy()),
        prop::collection::vec(
            ("[a-c]", id_strategy(), prop::option::of(id_strategy())),
            0..5,
        ),
        prop::collection::vec(("[p-s]", -1000.0f32..1000.0, 0.0f32..1.0), 0..5),
    )
        .prop_map(|(performance, density, groove, console, instruments, params)| {
            let mut state = EngineState::new()
                .with_performance(performance)
                .with_density(density);
            state.groove_profile_id = groove;
            state.console_profile_id = console;
            for (role, instrument, preset) in instruments {
                // Push directly so duplicate roles survive into the snapshot.
                state.instruments.push(segue_core::InstrumentAssignment::new(
                    &role,
                    &instrument,
                    preset.as_deref(),
                ));
            }
            for (path, value, smooth) in params {
                state = state.with_parameter(path, value, smooth);
            }
            state
        })
}

/// Small tiers so random workloads hit both the free list and the ceiling.
fn stress_pool_config() -> PoolConfig {
    PoolConfig {
        small: TierConfig::new(256, 2, 6),
        medium: TierConfig::new(1024, 1, 4),
        large: TierConfig::new(4096, 0, 3),
        extra_large: TierConfig::new(16384, 0, 2),
        max_total_bytes: 1 << 20,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Any snapshot diffed against itself yields no changes, NaNs included.
    #[test]
    fn diff_against_self_is_empty(state in state_strategy()) {
        let diff = compute_diff(&state, &state);
        prop_assert!(!diff.has_changes(), "unexpected changes: {:?}", diff);
        prop_assert_eq!(diff.count_changes(), 0);
    }

    /// However many performance scalars differ, at most one performance
    /// record is emitted and it carries every new value.
    #[test]
    fn performance_scalars_always_coalesce(
        before in state_strategy(),
        after in state_strategy(),
    ) {
        let diff = compute_diff(&before, &after);
        prop_assert!(diff.performance_changes.len() <= 1);
        if let Some(change) = diff.performance_changes.first() {
            prop_assert_eq!(&change.new_performance_id, &after.active_performance_id);
            prop_assert_eq!(&change.new_groove_profile_id, &after.groove_profile_id);
            prop_assert_eq!(&change.new_console_profile_id, &after.console_profile_id);
        }
        prop_assert_eq!(diff.has_changes(), diff.count_changes() > 0);
    }

    /// Instrument records never repeat a role.
    #[test]
    fn instrument_changes_have_unique_roles(
        before in state_strategy(),
        after in state_strategy(),
    ) {
        let diff = compute_diff(&before, &after);
        let mut roles: Vec<&str> = diff
            .instrument_changes
            .iter()
            .map(|c| c.role.as_str())
            .collect();
        let total = roles.len();
        roles.sort_unstable();
        roles.dedup();
        prop_assert_eq!(roles.len(), total);
    }

    /// Plans of two or more samples have exactly the requested length and
    /// hit both endpoints.
    #[test]
    fn ramp_hits_endpoints(
        old in -20000.0f32..20000.0,
        new in -20000.0f32..20000.0,
        count in 2usize..4096,
        curve in curve_strategy(),
    ) {
        let values = plan_ramp_with_curve(old, new, count, curve).to_vec();
        prop_assert_eq!(values.len(), count);
        prop_assert_eq!(values[0], old);
        prop_assert_eq!(values[count - 1], new);
    }

    /// Every curve moves monotonically from old to new and stays in range.
    #[test]
    fn ramp_is_monotonic(
        old in -20000.0f32..20000.0,
        new in -20000.0f32..20000.0,
        count in 2usize..2048,
        curve in curve_strategy(),
    ) {
        let values = plan_ramp_with_curve(old, new, count, curve).to_vec();
        let (lo, hi) = (old.min(new), old.max(new));
        let eps = 1e-5 * old.abs().max(new.abs()).max(1.0);
        for pair in values.windows(2) {
            if new >= old {
                prop_assert!(pair[1] >= pair[0] - eps, "{:?} not rising ({:?})", pair, curve);
            } else {
                prop_assert!(pair[1] <= pair[0] + eps, "{:?} not falling ({:?})", pair, curve);
            }
        }
        for &v in &values {
            prop_assert!(v >= lo - eps && v <= hi + eps, "{} outside [{}, {}]", v, lo, hi);
        }
    }

    /// Block-wise rendering reproduces the indexed values.
    #[test]
    fn render_into_matches_value_at(
        count in 1usize..512,
        block in 1usize..128,
        curve in curve_strategy(),
    ) {
        let plan = plan_ramp_with_curve(1.0, 100.0, count, curve);
        let mut out = vec![0.0f32; block];
        let mut position = 0;
        while position < count {
            let consumed = plan.render_into(position, &mut out);
            for (i, &v) in out[..consumed].iter().enumerate() {
                prop_assert_eq!(v, plan.value_at(position + i));
            }
            position += consumed;
        }
        prop_assert_eq!(position, count);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Randomized acquire/release from several threads never hands one
    /// buffer to two live handles, and every tier's counts stay consistent
    /// and within bounds while the workers run.
    #[test]
    fn pool_conserves_buffers_under_concurrency(
        workloads in prop::collection::vec(
            prop::collection::vec((0usize..4, any::<bool>(), 0usize..4), 1..200),
            2..5,
        ),
    ) {
        let config = stress_pool_config();
        let pool = BufferPool::new(config).unwrap();
        let live = Mutex::new(HashSet::new());
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    for tier in BufferTier::ALL {
                        let bounds = config.tier(tier);
                        let counts = pool.tier_snapshot(tier);
                        assert_eq!(counts.in_flight + counts.free, counts.allocated);
                        assert!((bounds.floor..=bounds.ceiling).contains(&counts.allocated));
                    }
                }
            });

            let workers: Vec<_> = workloads
                .iter()
                .enumerate()
                .map(|(worker, ops)| {
                    let (pool, live) = (&pool, &live);
                    scope.spawn(move || {
                        let mut held: Vec<(BufferHandle, u64)> = Vec::new();
                        for (step, &(tier, realtime, keep)) in ops.iter().enumerate() {
                            let tier = BufferTier::ALL[tier];
                            let mut handle = if realtime {
                                pool.acquire_realtime(tier)
                            } else {
                                pool.acquire(tier)
                            };
                            if handle.is_valid() {
                                let address = handle.as_bytes().as_ptr() as usize;
                                let fresh = live.lock().unwrap().insert(address);
                                assert!(fresh, "buffer {address:#x} held twice");
                                let stamp = ((worker as u64) << 32) | step as u64;
                                handle.as_bytes_mut()[..8]
                                    .copy_from_slice(&stamp.to_le_bytes());
                                held.push((handle, stamp));
                            }
                            for (h, stamp) in &held {
                                assert_eq!(h.as_bytes()[..8], stamp.to_le_bytes());
                            }
                            while held.len() > keep {
                                let (mut h, _) = held.remove(0);
                                let address = h.as_bytes().as_ptr() as usize;
                                live.lock().unwrap().remove(&address);
                                h.release();
                                h.release();
                            }
                        }
                        for (h, _) in &held {
                            live.lock().unwrap().remove(&(h.as_bytes().as_ptr() as usize));
                        }
                    })
                })
                .collect();

            let joined: Vec<_> = workers.into_iter().map(|w| w.join()).collect();
            done.store(true, Ordering::Release);
            assert!(joined.iter().all(Result::is_ok));
        });

        for tier in BufferTier::ALL {
            let counts = pool.tier_snapshot(tier);
            prop_assert_eq!(counts.in_flight, 0);
            prop_assert_eq!(counts.free, counts.allocated);
            prop_assert_eq!(pool.free_len(tier), counts.allocated);
        }
    }

    /// Everything pushed by the producer thread arrives in order with strictly
    /// increasing sequence numbers.
    #[test]
    fn queue_preserves_fifo_across_threads(
        items in prop::collection::vec(any::<u32>(), 0..500),
        capacity in 1usize..16,
    ) {
        let (mut tx, mut rx) = change_queue::<u32>(capacity);
        let expected = items.clone();

        let received = thread::scope(|scope| {
            scope.spawn(move || {
                for mut item in items {
                    loop {
                        match tx.push(item) {
                            Ok(_) => break,
                            Err(back) => {
                                item = back;
                                thread::yield_now();
                            }
                        }
                    }
                }
            });

            let mut received = Vec::with_capacity(expected.len());
            let mut last_sequence = None;
            while received.len() < expected.len() {
                match rx.try_pop() {
                    Some(entry) => {
                        if let Some(last) = last_sequence {
                            assert!(entry.sequence > last);
                        }
                        last_sequence = Some(entry.sequence);
                        received.push(entry.payload);
                    }
                    None => thread::yield_now(),
                }
            }
            received
        });

        prop_assert_eq!(received, expected);
    }
}
