//! Lock-free single-producer/single-consumer change transport.
//!
//! [`change_queue`] builds a bounded `crossbeam` [`ArrayQueue`] shared between
//! the control thread (producer) and the audio thread (consumer). Every
//! accepted entry is stamped with a strictly increasing sequence number.
//! Neither side ever blocks: a full queue hands the payload back to the
//! producer, an empty queue yields `None`.
//!
//! ## Cancellation
//!
//! [`ChangeProducer::cancel_pending`] raises a sequence watermark and then
//! drains the queue on the control thread, so every slot is free again as soon
//! as it returns, whether or not the audio thread is running. An entry the
//! consumer pops while the drain is in progress is older than the watermark
//! and is discarded on its side. Entries already dequeued are unaffected.
//!
//! ## Retirement
//!
//! Payloads that own heap memory must not be dropped on the audio thread.
//! [`retire_channel`] is the return path: the consumer pushes spent payloads
//! back over an [`rtrb`] ring and the control thread drops them at its
//! leisure.
//!
//! # Example
//!
//! ```rust
//! use segue_core::change_queue;
//!
//! let (mut tx, mut rx) = change_queue::<u32>(2);
//! assert_eq!(tx.push(10), Ok(0));
//! assert_eq!(tx.push(20), Ok(1));
//! assert_eq!(tx.push(30), Err(30)); // full
//!
//! assert_eq!(rx.try_pop().map(|e| e.payload), Some(10));
//! assert_eq!(tx.cancel_pending(), 1); // 20 is dropped here
//! assert_eq!(tx.slots_free(), 2);
//! assert!(rx.try_pop().is_none());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use rtrb::{PushError, RingBuffer};

/// A queued payload and its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequenced<T> {
    /// Position in the producer's stream, starting at 0.
    pub sequence: u64,
    /// The queued value.
    pub payload: T,
}

struct QueueShared<T> {
    entries: ArrayQueue<Sequenced<T>>,
    /// Entries with a lower sequence number are never applied.
    cancelled_before: AtomicU64,
    /// Sequence number the consumer will see next.
    consumed_through: AtomicU64,
    /// Entries discarded because of cancellation, on either side.
    discarded: AtomicU64,
}

/// Create a change queue holding at most `capacity` entries (minimum 1).
pub fn change_queue<T>(capacity: usize) -> (ChangeProducer<T>, ChangeConsumer<T>) {
    let shared = Arc::new(QueueShared {
        entries: ArrayQueue::new(capacity.max(1)),
        cancelled_before: AtomicU64::new(0),
        consumed_through: AtomicU64::new(0),
        discarded: AtomicU64::new(0),
    });
    (
        ChangeProducer {
            next_sequence: 0,
            shared: Arc::clone(&shared),
        },
        ChangeConsumer { shared },
    )
}

/// Control-thread end of a change queue.
pub struct ChangeProducer<T> {
    next_sequence: u64,
    shared: Arc<QueueShared<T>>,
}

impl<T> ChangeProducer<T> {
    /// Enqueue a payload without blocking.
    ///
    /// Returns the assigned sequence number, or the payload back if the queue
    /// is full.
    pub fn push(&mut self, payload: T) -> Result<u64, T> {
        let sequence = self.next_sequence;
        match self.shared.entries.push(Sequenced { sequence, payload }) {
            Ok(()) => {
                self.next_sequence += 1;
                Ok(sequence)
            }
            Err(entry) => Err(entry.payload),
        }
    }

    /// Discard every entry the consumer has not dequeued yet, dropping the
    /// payloads on this thread.
    ///
    /// Returns how many entries were cancelled. The queue is empty when this
    /// returns.
    pub fn cancel_pending(&mut self) -> usize {
        self.cancel_pending_with(drop)
    }

    /// [`cancel_pending`](Self::cancel_pending), handing each payload drained
    /// here to `discard`.
    pub fn cancel_pending_with(&mut self, mut discard: impl FnMut(T)) -> usize {
        let cancelled = self.pending_count();
        self.shared
            .cancelled_before
            .store(self.next_sequence, Ordering::Release);
        while let Some(entry) = self.shared.entries.pop() {
            self.shared.discarded.fetch_add(1, Ordering::Relaxed);
            discard(entry.payload);
        }
        cancelled
    }

    /// Entries accepted but neither dequeued nor cancelled.
    pub fn pending_count(&self) -> usize {
        let watermark = self.shared.cancelled_before.load(Ordering::Acquire);
        let consumed = self.shared.consumed_through.load(Ordering::Acquire);
        let pending = self.next_sequence.saturating_sub(watermark.max(consumed));
        usize::try_from(pending).unwrap_or(usize::MAX)
    }

    /// Whether any accepted entry is still waiting to be applied.
    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Sequence number the next accepted entry will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Queue slots currently free.
    pub fn slots_free(&self) -> usize {
        self.capacity() - self.shared.entries.len()
    }

    /// Total queue capacity.
    pub fn capacity(&self) -> usize {
        self.shared.entries.capacity()
    }
}

impl<T> core::fmt::Debug for ChangeProducer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeProducer")
            .field("next_sequence", &self.next_sequence)
            .field("pending", &self.pending_count())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Audio-thread end of a change queue.
pub struct ChangeConsumer<T> {
    shared: Arc<QueueShared<T>>,
}

impl<T> ChangeConsumer<T> {
    /// Dequeue the oldest live entry, dropping cancelled ones.
    ///
    /// Cancelled payloads are dropped in place; use
    /// [`try_pop_with`](Self::try_pop_with) when they own heap memory.
    #[inline]
    pub fn try_pop(&mut self) -> Option<Sequenced<T>> {
        self.try_pop_with(drop)
    }

    /// Dequeue the oldest live entry, handing cancelled payloads to `discard`.
    pub fn try_pop_with(&mut self, mut discard: impl FnMut(T)) -> Option<Sequenced<T>> {
        loop {
            let entry = self.shared.entries.pop()?;
            self.shared
                .consumed_through
                .fetch_max(entry.sequence + 1, Ordering::AcqRel);
            if entry.sequence < self.shared.cancelled_before.load(Ordering::Acquire) {
                self.shared.discarded.fetch_add(1, Ordering::Relaxed);
                discard(entry.payload);
                continue;
            }
            return Some(entry);
        }
    }

    /// Entries sitting in the queue.
    pub fn slots_occupied(&self) -> usize {
        self.shared.entries.len()
    }

    /// Total number of entries discarded by cancellation.
    pub fn discarded(&self) -> u64 {
        self.shared.discarded.load(Ordering::Relaxed)
    }
}

impl<T> core::fmt::Debug for ChangeConsumer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeConsumer")
            .field("occupied", &self.slots_occupied())
            .field("discarded", &self.discarded())
            .finish()
    }
}

/// Create a return channel for spent payloads.
pub fn retire_channel<T>(capacity: usize) -> (RetireSender<T>, RetireReceiver<T>) {
    let (tx, rx) = RingBuffer::new(capacity.max(1));
    (RetireSender { tx }, RetireReceiver { rx })
}

/// Audio-thread end of a retire channel.
pub struct RetireSender<T> {
    tx: rtrb::Producer<T>,
}

impl<T> RetireSender<T> {
    /// Hand a payload back to the control thread. Returns it if the channel is
    /// full.
    #[inline]
    pub fn retire(&mut self, payload: T) -> Result<(), T> {
        self.tx.push(payload).map_err(|e| match e {
            PushError::Full(p) => p,
        })
    }
}

/// Control-thread end of a retire channel.
pub struct RetireReceiver<T> {
    rx: rtrb::Consumer<T>,
}

impl<T> RetireReceiver<T> {
    /// Take one retired payload.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.pop().ok()
    }

    /// Drop every retired payload. Returns how many were collected.
    pub fn collect(&mut self) -> usize {
        let mut n = 0;
        while self.rx.pop().is_ok() {
            n += 1;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_strictly_increasing() {
        let (mut tx, mut rx) = change_queue(8);
        for i in 0..5u32 {
            assert_eq!(tx.push(i), Ok(u64::from(i)));
        }
        let seqs: Vec<u64> = std::iter::from_fn(|| rx.try_pop().map(|e| e.sequence)).collect();
        assert_eq!(seqs, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn full_queue_returns_payload() {
        let (mut tx, _rx) = change_queue(1);
        assert!(tx.push("a").is_ok());
        assert_eq!(tx.push("b"), Err("b"));
        // Rejected pushes do not consume a sequence number.
        assert_eq!(tx.next_sequence(), 1);
        assert_eq!(tx.slots_free(), 0);
    }

    #[test]
    fn pending_count_tracks_consumption() {
        let (mut tx, mut rx) = change_queue(4);
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        assert_eq!(tx.pending_count(), 2);
        rx.try_pop();
        assert_eq!(tx.pending_count(), 1);
        rx.try_pop();
        assert!(!tx.has_pending());
    }

    #[test]
    fn cancel_skips_only_undequeued_entries() {
        let (mut tx, mut rx) = change_queue(8);
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        tx.push(3).unwrap();
        assert_eq!(rx.try_pop().map(|e| e.payload), Some(1));

        let mut drained = Vec::new();
        assert_eq!(tx.cancel_pending_with(|p| drained.push(p)), 2);
        assert_eq!(drained, [2, 3]);
        assert_eq!(tx.pending_count(), 0);
        assert_eq!(rx.slots_occupied(), 0);
        assert_eq!(rx.discarded(), 2);

        tx.push(4).unwrap();
        assert_eq!(tx.pending_count(), 1);
        assert_eq!(rx.try_pop().map(|e| (e.sequence, e.payload)), Some((3, 4)));
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn cancel_frees_capacity_without_consumer() {
        let (mut tx, _rx) = change_queue(2);
        tx.push("a").unwrap();
        tx.push("b").unwrap();
        assert_eq!(tx.push("c"), Err("c"));

        assert_eq!(tx.cancel_pending(), 2);
        assert_eq!(tx.slots_free(), 2);
        assert!(!tx.has_pending());
        assert_eq!(tx.push("c"), Ok(2));
        assert_eq!(tx.push("d"), Ok(3));

        // Repeated cancels never accumulate occupied slots.
        assert_eq!(tx.cancel_pending(), 2);
        assert_eq!(tx.slots_free(), 2);
    }

    #[test]
    fn consumer_discards_entries_below_watermark() {
        let (mut tx, mut rx) = change_queue(4);
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        // An entry that races the drain still carries an old sequence number.
        tx.shared.cancelled_before.store(2, Ordering::Release);

        let mut discarded = Vec::new();
        assert!(rx.try_pop_with(|p| discarded.push(p)).is_none());
        assert_eq!(discarded, [1, 2]);
        assert_eq!(rx.discarded(), 2);
    }

    #[test]
    fn cancel_on_empty_queue_is_noop() {
        let (mut tx, mut rx) = change_queue::<u8>(2);
        assert_eq!(tx.cancel_pending(), 0);
        tx.push(9).unwrap();
        assert_eq!(rx.try_pop().map(|e| e.payload), Some(9));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (tx, _rx) = change_queue::<u8>(0);
        assert_eq!(tx.capacity(), 1);
    }

    #[test]
    fn retire_channel_round_trip() {
        let (mut tx, mut rx) = retire_channel(2);
        assert!(tx.retire(String::from("a")).is_ok());
        assert!(tx.retire(String::from("b")).is_ok());
        assert_eq!(tx.retire(String::from("c")), Err(String::from("c")));
        assert_eq!(rx.try_recv().as_deref(), Some("a"));
        assert_eq!(rx.collect(), 1);
        assert_eq!(rx.collect(), 0);
    }
}
