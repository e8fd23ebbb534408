//! The per-period stream callback.
//!
//! [`StreamCallback`] runs on the driver's real-time thread. For every period
//! it routes the selected device channels into a zeroed, preallocated host
//! buffer, stamps it with the estimated capture time, and hands it to the
//! [`AudioSink`]. It never allocates, never logs, and never lets a panic
//! escape: failures drop the period and leave a [`CallbackNote`] behind.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::format::{bytes_per_sample, HostFormat};
use crate::pipeline::diagnostics::{CallbackNote, NoteSender, PipelineCounters};
use crate::pipeline::routing::{build_route, speaker_layout_for, RouteTable, MAX_HOST_CHANNELS};
use crate::pipeline::scratch::{ScratchBuffer, MAX_PERIOD_FRAMES};
use crate::pipeline::timestamp::{capture_timestamp, Clock, FirstTimestampMark};
use crate::sink::AudioSink;
use crate::chunk::DELIVERED_FORMAT;
use crate::{RouteAudioError, SourceAudio};

/// Timing flags reported by the driver alongside a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodTiming {
    /// The driver lost input data before this period.
    pub input_overflow: bool,
    /// Frames of the same driver buffer that follow this period.
    ///
    /// Non-zero only when a long driver buffer is split; the capture
    /// estimate moves back by their duration.
    pub trailing_frames: usize,
}

/// Why a computed buffer was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Timestamp not strictly after the first-buffer anchor.
    NotAfterAnchor,
    /// The host records zero channels.
    NoChannels,
}

/// Outcome of one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDecision {
    /// The buffer was handed to the sink.
    Delivered,
    /// The buffer was computed but withheld.
    Suppressed(SuppressReason),
    /// The period was abandoned.
    Dropped(CallbackNote),
}

/// Receives periods from a driver stream.
///
/// Drivers always keep the stream running after a call returns, whatever
/// the decision.
pub trait PeriodHandler: Send {
    /// Processes one period of interleaved device input.
    ///
    /// `input` is `None` when the driver signals a period without input.
    fn on_period(
        &mut self,
        input: Option<&[u8]>,
        frames: usize,
        timing: PeriodTiming,
    ) -> DeliveryDecision;
}

/// Everything the callback reads, frozen for the lifetime of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    device_channels: usize,
    host_channels: usize,
    format: HostFormat,
    bytes_per_sample: usize,
    sample_rate: u32,
    routes: RouteTable,
}

impl StreamSnapshot {
    /// Builds a snapshot, validating routes against `device_channels`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat` if `format` has no sample width.
    pub fn new(
        device_channels: u16,
        host_channels: usize,
        format: HostFormat,
        sample_rate: u32,
        raw_routes: &[i64],
    ) -> Result<Self, RouteAudioError> {
        let bytes_per_sample =
            bytes_per_sample(format).ok_or_else(|| RouteAudioError::UnsupportedFormat {
                format: format!("{format:?}"),
            })?;
        Ok(Self {
            device_channels: usize::from(device_channels),
            host_channels,
            format: format.packed(),
            bytes_per_sample,
            sample_rate,
            routes: build_route(host_channels, raw_routes, device_channels),
        })
    }

    /// Device input channels per frame.
    pub fn device_channels(&self) -> usize {
        self.device_channels
    }

    /// Host channel slots per frame, as recorded from the host.
    pub fn host_channels(&self) -> usize {
        self.host_channels
    }

    /// Sample encoding of the device stream.
    ///
    /// Delivered buffers keep these bytes but are tagged [`DELIVERED_FORMAT`].
    pub fn format(&self) -> HostFormat {
        self.format
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Validated routes.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

/// The real-time pipeline for one open stream.
pub struct StreamCallback {
    snapshot: Arc<StreamSnapshot>,
    sink: Arc<dyn AudioSink>,
    clock: Arc<dyn Clock>,
    scratch: ScratchBuffer,
    first_ts: FirstTimestampMark,
    notes: NoteSender,
    counters: Arc<PipelineCounters>,
}

impl StreamCallback {
    /// Creates the callback and preallocates its scratch region.
    ///
    /// Call this on the configuration thread, before the stream opens.
    pub fn new(
        snapshot: Arc<StreamSnapshot>,
        sink: Arc<dyn AudioSink>,
        clock: Arc<dyn Clock>,
        notes: NoteSender,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        let scratch = ScratchBuffer::for_host_channels(snapshot.host_channels);
        Self {
            snapshot,
            sink,
            clock,
            scratch,
            first_ts: FirstTimestampMark::new(),
            notes,
            counters,
        }
    }

    fn drop_period(&mut self, note: CallbackNote) -> DeliveryDecision {
        self.notes.send(note);
        self.counters.record_dropped();
        DeliveryDecision::Dropped(note)
    }
}

impl PeriodHandler for StreamCallback {
    fn on_period(
        &mut self,
        input: Option<&[u8]>,
        frames: usize,
        timing: PeriodTiming,
    ) -> DeliveryDecision {
        self.counters.record_period();
        if timing.input_overflow {
            self.notes.send(CallbackNote::InputOverflow);
        }

        let snap = Arc::clone(&self.snapshot);
        if snap.host_channels > MAX_HOST_CHANNELS {
            return self.drop_period(CallbackNote::ChannelLimitExceeded {
                host_channels: snap.host_channels,
                max: MAX_HOST_CHANNELS,
            });
        }
        let Some(input) = input else {
            return self.drop_period(CallbackNote::MissingInput);
        };

        let width = snap.bytes_per_sample;
        let in_stride = snap.device_channels * width;
        let out_stride = snap.host_channels * width;

        let expected = frames * in_stride;
        if input.len() < expected {
            return self.drop_period(CallbackNote::ShortInput {
                expected,
                actual: input.len(),
            });
        }

        let max_frames = self.scratch.capacity().checked_div(out_stride).unwrap_or(usize::MAX);
        let Some(output) = self.scratch.acquire(frames * out_stride) else {
            return self.drop_period(CallbackNote::PeriodTooLong { frames, max_frames });
        };

        // Muted slots keep the zero fill from acquire()
        if in_stride > 0 && out_stride > 0 {
            let frames_in = input[..expected].chunks_exact(in_stride);
            for (src, dst) in frames_in.zip(output.chunks_exact_mut(out_stride)) {
                for (slot, route) in snap.routes.as_slice().iter().enumerate() {
                    let Some(channel) = route.device_channel() else {
                        continue;
                    };
                    let from = channel * width;
                    let to = slot * width;
                    if let (Some(s), Some(d)) =
                        (src.get(from..from + width), dst.get_mut(to..to + width))
                    {
                        d.copy_from_slice(s);
                    }
                }
            }
        }

        let timestamp_ns = capture_timestamp(
            self.clock.now_ns(),
            frames + timing.trailing_frames,
            snap.sample_rate,
        );
        let after_anchor = self.first_ts.admit(timestamp_ns);
        if !after_anchor {
            self.counters.record_suppressed();
            return DeliveryDecision::Suppressed(SuppressReason::NotAfterAnchor);
        }
        if snap.host_channels == 0 {
            self.counters.record_suppressed();
            return DeliveryDecision::Suppressed(SuppressReason::NoChannels);
        }

        let audio = SourceAudio {
            data: output,
            format: DELIVERED_FORMAT,
            bytes_per_sample: width,
            speakers: speaker_layout_for(snap.host_channels),
            channels: snap.host_channels,
            sample_rate: snap.sample_rate,
            frames,
            timestamp_ns,
        };
        let sink = &self.sink;
        if catch_unwind(AssertUnwindSafe(|| sink.output_audio(&audio))).is_err() {
            return self.drop_period(CallbackNote::SinkPanicked);
        }
        self.counters.record_delivered();
        DeliveryDecision::Delivered
    }
}

/// Hands one driver buffer to `handler` in periods of at most
/// [`MAX_PERIOD_FRAMES`] frames.
///
/// Drivers call this instead of [`PeriodHandler::on_period`] so that a host
/// running larger buffers than the scratch region still gets every frame.
/// `frame_bytes` is the size of one interleaved input frame. Returns the
/// decision for the last piece.
pub fn split_period(
    handler: &mut dyn PeriodHandler,
    input: Option<&[u8]>,
    frames: usize,
    frame_bytes: usize,
    timing: PeriodTiming,
) -> DeliveryDecision {
    let Some(input) = input.filter(|_| frames > MAX_PERIOD_FRAMES && frame_bytes > 0) else {
        return handler.on_period(input, frames, timing);
    };

    let mut offset = 0;
    let mut decision = DeliveryDecision::Delivered;
    while offset < frames {
        let piece = (frames - offset).min(MAX_PERIOD_FRAMES);
        let start = (offset * frame_bytes).min(input.len());
        let end = ((offset + piece) * frame_bytes).min(input.len());
        let piece_timing = PeriodTiming {
            input_overflow: timing.input_overflow && offset == 0,
            trailing_frames: timing.trailing_frames + frames - offset - piece,
        };
        decision = handler.on_period(Some(&input[start..end]), piece, piece_timing);
        offset += piece;
    }
    decision
}
