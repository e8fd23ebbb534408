//! Allocation-free callback tests.
//!
//! These verify that `StreamCallback::on_period` does not touch the heap
//! once the stream is open, including when long driver buffers are split.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use assert_no_alloc::{assert_no_alloc, AllocDisabler};
use route_audio::pipeline::{
    note_queue, split_period, Clock, PeriodHandler, PeriodTiming, PipelineCounters,
    StreamCallback, StreamSnapshot, MAX_PERIOD_FRAMES, MUTED, NOTE_QUEUE_CAPACITY,
};
use route_audio::{AudioSink, DeliveryDecision, HostFormat, SourceAudio};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

struct TickClock(AtomicU64);

impl Clock for TickClock {
    fn now_ns(&self) -> u64 {
        self.0.fetch_add(10_000_000, Ordering::Relaxed)
    }
}

/// Sums what it receives without keeping anything.
#[derive(Default)]
struct TallySink {
    frames: AtomicUsize,
    nonzero_bytes: AtomicUsize,
}

impl AudioSink for TallySink {
    fn name(&self) -> &str {
        "tally"
    }

    fn output_audio(&self, audio: &SourceAudio<'_>) {
        self.frames.fetch_add(audio.frames, Ordering::Relaxed);
        let nonzero = audio.data.iter().filter(|&&b| b != 0).count();
        self.nonzero_bytes.fetch_add(nonzero, Ordering::Relaxed);
    }
}

fn callback(format: HostFormat, sink: Arc<TallySink>) -> (StreamCallback, Arc<PipelineCounters>) {
    let snapshot = StreamSnapshot::new(4, 2, format, 48000, &[3, MUTED]).unwrap();
    let counters = PipelineCounters::new();
    // The receiver is dropped; pushes into the queue must still not allocate
    let (notes, _rx) = note_queue(NOTE_QUEUE_CAPACITY, counters.clone());
    let callback = StreamCallback::new(
        Arc::new(snapshot),
        sink,
        Arc::new(TickClock(AtomicU64::new(1_000_000_000))),
        notes,
        counters.clone(),
    );
    (callback, counters)
}

#[test]
fn test_periods_are_alloc_free() {
    for format in [HostFormat::I16, HostFormat::I32, HostFormat::Float] {
        let sink = Arc::new(TallySink::default());
        let (mut callback, counters) = callback(format, sink.clone());
        let frames = 256;
        let input = vec![1u8; frames * 4 * 4];

        assert_no_alloc(|| {
            for _ in 0..100 {
                callback.on_period(Some(&input), frames, PeriodTiming::default());
            }
        });

        let stats = counters.snapshot();
        assert_eq!(stats.delivered, 99, "{format:?}");
        assert_eq!(sink.frames.load(Ordering::Relaxed), 99 * frames);
        assert!(sink.nonzero_bytes.load(Ordering::Relaxed) > 0);
    }
}

#[test]
fn test_dropped_periods_are_alloc_free() {
    let sink = Arc::new(TallySink::default());
    let (mut callback, counters) = callback(HostFormat::Float, sink);

    assert_no_alloc(|| {
        for _ in 0..(NOTE_QUEUE_CAPACITY * 2) {
            let decision = callback.on_period(None, 64, PeriodTiming::default());
            assert!(matches!(decision, DeliveryDecision::Dropped(_)));
        }
    });

    let stats = counters.snapshot();
    assert_eq!(stats.dropped, (NOTE_QUEUE_CAPACITY * 2) as u64);
}

#[test]
fn test_split_long_buffer_is_alloc_free() {
    let sink = Arc::new(TallySink::default());
    let (mut callback, counters) = callback(HostFormat::Float, sink.clone());
    let frames = MAX_PERIOD_FRAMES * 3;
    let input = vec![1u8; frames * 4 * 4];

    assert_no_alloc(|| {
        let handler: &mut dyn PeriodHandler = &mut callback;
        for _ in 0..4 {
            split_period(handler, Some(&input), frames, 4 * 4, PeriodTiming::default());
        }
    });

    assert_eq!(counters.snapshot().periods, 12);
    assert_eq!(counters.snapshot().dropped, 0);
    assert_eq!(sink.frames.load(Ordering::Relaxed), 11 * MAX_PERIOD_FRAMES);
}
