//! Tokio mpsc channel sink implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::sink::AudioSink;
use crate::{AudioPacket, SourceAudio};

/// A sink that forwards each period to a tokio mpsc channel.
///
/// Periods are copied into an [`AudioPacket`] and sent with `try_send`, so the
/// driver thread never waits on the receiver. Packets that do not fit, or that
/// arrive after the receiver is gone, are counted as dropped.
///
/// # Allocation
///
/// Unlike the rest of the pipeline, this sink allocates on the driver thread:
/// every period costs one `Vec` and one `Arc` for the packet, and the channel
/// may grow its internal block list. That is fine for most hosts at common
/// buffer sizes. Consumers with a hard no-allocation budget should implement
/// [`AudioSink`] directly and copy out of [`SourceAudio`] into storage they
/// own.
///
/// # Example
///
/// ```
/// use route_audio::{AudioPacket, ChannelSink};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<AudioPacket>(64);
/// let sink = ChannelSink::new(tx);
///
/// // Hand the sink to a RouteSession, then receive packets:
/// // while let Some(packet) = rx.recv().await { ... }
/// ```
pub struct ChannelSink {
    name: String,
    sender: mpsc::Sender<AudioPacket>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a new channel sink with the given sender.
    ///
    /// Size the channel for a few hundred milliseconds of periods; at 256
    /// frames and 48kHz a capacity of 64 covers about 340ms.
    pub fn new(sender: mpsc::Sender<AudioPacket>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a new channel sink with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<AudioPacket>) -> Self {
        Self {
            name: name.into(),
            sender,
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of packets that could not be queued.
    pub fn dropped_packets(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AudioSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_audio(&self, audio: &SourceAudio<'_>) {
        match self.sender.try_send(audio.to_packet()) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::HostFormat;
    use crate::pipeline::SpeakerLayout;

    fn mono(data: &[u8]) -> SourceAudio<'_> {
        SourceAudio {
            data,
            format: HostFormat::Float,
            bytes_per_sample: 4,
            speakers: SpeakerLayout::Mono,
            channels: 1,
            sample_rate: 48000,
            frames: data.len() / 4,
            timestamp_ns: 42,
        }
    }

    #[tokio::test]
    async fn test_channel_sink_sends_packets() {
        let (tx, mut rx) = mpsc::channel::<AudioPacket>(10);
        let sink = ChannelSink::new(tx);

        sink.output_audio(&mono(&[0, 0, 128, 63]));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.data.as_slice(), &[0, 0, 128, 63]);
        assert_eq!(received.timestamp_ns, 42);
        assert_eq!(sink.dropped_packets(), 0);
    }

    #[tokio::test]
    async fn test_channel_sink_full_counts_drops() {
        let (tx, mut rx) = mpsc::channel::<AudioPacket>(1);
        let sink = ChannelSink::new(tx);

        sink.output_audio(&mono(&[0; 4]));
        sink.output_audio(&mono(&[1; 4]));

        assert_eq!(sink.dropped_packets(), 1);
        assert_eq!(rx.recv().await.unwrap().data.as_slice(), &[0; 4]);
    }

    #[tokio::test]
    async fn test_channel_sink_closed() {
        let (tx, rx) = mpsc::channel::<AudioPacket>(10);
        let sink = ChannelSink::new(tx);
        drop(rx);

        sink.output_audio(&mono(&[0; 4]));
        assert_eq!(sink.dropped_packets(), 1);
    }

    #[test]
    fn test_channel_sink_custom_name() {
        let (tx, _rx) = mpsc::channel::<AudioPacket>(10);
        let sink = ChannelSink::with_name("obs-mixer", tx);
        assert_eq!(sink.name(), "obs-mixer");
    }
}
