//! Delivered audio buffers.

use std::sync::Arc;
use std::time::Duration;

use crate::format::HostFormat;
use crate::pipeline::SpeakerLayout;

/// Format tag carried by every delivered buffer.
///
/// The host records the source as float regardless of the stream's bit depth;
/// `bytes_per_sample` tells consumers how wide the copied samples really are.
pub const DELIVERED_FORMAT: HostFormat = HostFormat::Float;

/// One period of routed audio, as handed to an [`AudioSink`](crate::AudioSink).
///
/// The sample bytes borrow the pipeline's scratch region and are only valid
/// for the duration of the sink call. Use [`to_packet`](Self::to_packet) to
/// keep a copy.
#[derive(Debug, Clone, Copy)]
pub struct SourceAudio<'a> {
    /// Interleaved sample bytes, `frames × channels × bytes_per_sample`.
    pub data: &'a [u8],
    /// Format tag reported to the host. Always [`DELIVERED_FORMAT`].
    pub format: HostFormat,
    /// Width in bytes of each sample in `data`, taken from the stream's bit
    /// depth.
    pub bytes_per_sample: usize,
    /// Speaker layout for `channels`.
    pub speakers: SpeakerLayout,
    /// Number of interleaved host channels.
    pub channels: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of frames in `data`.
    pub frames: usize,
    /// Estimated capture instant of the first frame, in nanoseconds on the
    /// session clock.
    pub timestamp_ns: u64,
}

impl SourceAudio<'_> {
    /// Returns the duration of this period.
    pub fn duration(&self) -> Duration {
        frames_duration(self.frames, self.sample_rate)
    }

    /// Returns the bytes of one channel slot in one frame.
    ///
    /// Returns `None` if the slot or frame is out of range.
    pub fn sample_bytes(&self, frame: usize, channel: usize) -> Option<&[u8]> {
        sample_slice(self.data, self.bytes_per_sample, self.channels, frame, channel)
    }

    /// Copies the period into an owned [`AudioPacket`].
    pub fn to_packet(&self) -> AudioPacket {
        AudioPacket {
            data: Arc::new(self.data.to_vec()),
            format: self.format,
            bytes_per_sample: self.bytes_per_sample,
            speakers: self.speakers,
            channels: self.channels,
            sample_rate: self.sample_rate,
            frames: self.frames,
            timestamp_ns: self.timestamp_ns,
        }
    }
}

/// Owned copy of a delivered period.
///
/// Sample bytes are stored in an `Arc` so packets can be cloned cheaply
/// between consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    /// Interleaved sample bytes.
    pub data: Arc<Vec<u8>>,
    /// Format tag reported to the host.
    pub format: HostFormat,
    /// Width in bytes of each sample in `data`.
    pub bytes_per_sample: usize,
    /// Speaker layout for `channels`.
    pub speakers: SpeakerLayout,
    /// Number of interleaved host channels.
    pub channels: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of frames in `data`.
    pub frames: usize,
    /// Estimated capture instant of the first frame, in nanoseconds.
    pub timestamp_ns: u64,
}

impl AudioPacket {
    /// Returns the duration of this packet.
    pub fn duration(&self) -> Duration {
        frames_duration(self.frames, self.sample_rate)
    }

    /// Returns the bytes of one channel slot in one frame.
    pub fn sample_bytes(&self, frame: usize, channel: usize) -> Option<&[u8]> {
        sample_slice(&self.data, self.bytes_per_sample, self.channels, frame, channel)
    }

    /// Returns `true` if this packet carries no frames.
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

fn frames_duration(frames: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frames as f64 / f64::from(sample_rate))
}

fn sample_slice(
    data: &[u8],
    width: usize,
    channels: usize,
    frame: usize,
    channel: usize,
) -> Option<&[u8]> {
    if channel >= channels || width == 0 {
        return None;
    }
    let start = (frame * channels + channel) * width;
    data.get(start..start + width)
}
