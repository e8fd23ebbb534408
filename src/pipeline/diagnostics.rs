//! Diagnostics for the real-time callback.
//!
//! The callback must not log: a `tracing` subscriber may take locks or do I/O.
//! Instead it pushes [`CallbackNote`]s into a bounded lock-free queue and bumps
//! atomic counters. The session drains the queue on the configuration thread
//! and logs from there.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Default capacity of the note queue.
pub const NOTE_QUEUE_CAPACITY: usize = 64;

/// Something noteworthy that happened inside one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackNote {
    /// The recorded host channel count exceeds the hard maximum.
    ChannelLimitExceeded {
        /// Recorded host channel count.
        host_channels: usize,
        /// Hard maximum.
        max: usize,
    },
    /// The driver signalled a period without an input buffer.
    MissingInput,
    /// The input buffer holds fewer bytes than the frame count implies.
    ShortInput {
        /// Bytes implied by frames × device channels × sample width.
        expected: usize,
        /// Bytes actually received.
        actual: usize,
    },
    /// The period is longer than the preallocated scratch region.
    PeriodTooLong {
        /// Frames in the period.
        frames: usize,
        /// Frames the scratch region can hold.
        max_frames: usize,
    },
    /// The driver reported an input overflow before this period.
    InputOverflow,
    /// The sink panicked while receiving a buffer.
    SinkPanicked,
}

impl fmt::Display for CallbackNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelLimitExceeded { host_channels, max } => write!(
                f,
                "host channel count {host_channels} exceeds the supported maximum of {max}"
            ),
            Self::MissingInput => write!(f, "driver delivered a period without input"),
            Self::ShortInput { expected, actual } => {
                write!(f, "input buffer too short: {actual} of {expected} bytes")
            }
            Self::PeriodTooLong { frames, max_frames } => {
                write!(f, "period of {frames} frames exceeds scratch capacity of {max_frames}")
            }
            Self::InputOverflow => write!(f, "driver reported an input overflow"),
            Self::SinkPanicked => write!(f, "sink panicked while receiving audio"),
        }
    }
}

/// Counters shared between the callback and the session.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    periods: AtomicU64,
    delivered: AtomicU64,
    suppressed: AtomicU64,
    dropped: AtomicU64,
    notes_lost: AtomicU64,
}

/// Point-in-time copy of [`PipelineCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Periods the driver invoked the callback for.
    pub periods: u64,
    /// Buffers handed to the sink.
    pub delivered: u64,
    /// Buffers withheld by the timestamp or channel-count guard.
    pub suppressed: u64,
    /// Periods abandoned because of an internal error.
    pub dropped: u64,
    /// Notes discarded because the queue was full.
    pub notes_lost: u64,
}

impl PipelineCounters {
    /// Creates zeroed counters.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record_period(&self) {
        self.periods.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            periods: self.periods.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            notes_lost: self.notes_lost.load(Ordering::Relaxed),
        }
    }
}

/// Callback side of the note queue. Never blocks.
pub struct NoteSender {
    producer: HeapProd<CallbackNote>,
    counters: Arc<PipelineCounters>,
}

impl NoteSender {
    /// Queues a note, counting it as lost if the queue is full.
    #[inline]
    pub fn send(&mut self, note: CallbackNote) {
        if self.producer.try_push(note).is_err() {
            self.counters.notes_lost.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Configuration-thread side of the note queue.
pub struct NoteReceiver {
    consumer: HeapCons<CallbackNote>,
}

impl NoteReceiver {
    /// Pops every queued note, in order.
    pub fn drain(&mut self) -> Vec<CallbackNote> {
        let mut notes = Vec::new();
        while let Some(note) = self.consumer.try_pop() {
            notes.push(note);
        }
        notes
    }
}

/// Creates a bounded note queue reporting losses into `counters`.
pub fn note_queue(capacity: usize, counters: Arc<PipelineCounters>) -> (NoteSender, NoteReceiver) {
    let (producer, consumer) = HeapRb::<CallbackNote>::new(capacity.max(1)).split();
    (
        NoteSender { producer, counters },
        NoteReceiver { consumer },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notes_arrive_in_order() {
        let (mut tx, mut rx) = note_queue(8, PipelineCounters::new());
        tx.send(CallbackNote::MissingInput);
        tx.send(CallbackNote::InputOverflow);
        assert_eq!(
            rx.drain(),
            vec![CallbackNote::MissingInput, CallbackNote::InputOverflow]
        );
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_full_queue_counts_losses() {
        let counters = PipelineCounters::new();
        let (mut tx, mut rx) = note_queue(2, counters.clone());
        for _ in 0..5 {
            tx.send(CallbackNote::MissingInput);
        }
        assert_eq!(rx.drain().len(), 2);
        assert_eq!(counters.snapshot().notes_lost, 3);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = PipelineCounters::new();
        counters.record_period();
        counters.record_period();
        counters.record_delivered();
        counters.record_suppressed();
        counters.record_dropped();
        assert_eq!(
            counters.snapshot(),
            PipelineStats {
                periods: 2,
                delivered: 1,
                suppressed: 1,
                dropped: 1,
                notes_lost: 0,
            }
        );
    }

    #[test]
    fn test_note_display() {
        let note = CallbackNote::ShortInput {
            expected: 64,
            actual: 32,
        };
        assert_eq!(note.to_string(), "input buffer too short: 32 of 64 bytes");
    }
}
