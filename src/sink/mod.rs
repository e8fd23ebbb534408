//! Sink trait and implementations for the host side of the bridge.
//!
//! An [`AudioSink`] receives every delivered period. It is called directly on
//! the driver's real-time thread, so implementations must return quickly and
//! must not block. The crate provides [`ChannelSink`], which copies periods
//! into a tokio mpsc channel.

mod channel;

pub use channel::ChannelSink;

use crate::SourceAudio;

/// Host audio sink.
///
/// # Implementation Notes
///
/// - `output_audio` runs on the driver thread: no locks that the host's
///   other threads may hold for long, no I/O
/// - `audio.data` borrows the pipeline's scratch region and is reused after
///   the call returns; copy what you need to keep
///
/// # Example
///
/// ```
/// use route_audio::{AudioSink, SourceAudio};
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// struct FrameCounter {
///     frames: AtomicU64,
/// }
///
/// impl AudioSink for FrameCounter {
///     fn name(&self) -> &str {
///         "frame-counter"
///     }
///
///     fn output_audio(&self, audio: &SourceAudio<'_>) {
///         self.frames.fetch_add(audio.frames as u64, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait AudioSink: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Receives one delivered period.
    fn output_audio(&self, audio: &SourceAudio<'_>);
}
