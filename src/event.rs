//! Lifecycle events for monitoring a source.
//!
//! Events are non-fatal notifications about what the lifecycle manager did.
//! Failures are recovered locally; these events make them observable without
//! scraping logs.

use std::sync::Arc;

/// Lifecycle events emitted by a [`RouteSession`](crate::RouteSession).
///
/// # Example
///
/// ```
/// use route_audio::SourceEvent;
///
/// fn handle_event(event: SourceEvent) {
///     match event {
///         SourceEvent::StreamOpened { device, sample_rate, buffer_frames, .. } => {
///             eprintln!("Opened {device} at {sample_rate}Hz, {buffer_frames} frames");
///         }
///         SourceEvent::StreamStarted { device } => {
///             eprintln!("Streaming from {device}");
///         }
///         SourceEvent::StreamFailed { device, error } => {
///             eprintln!("No audio from {device}: {error}");
///         }
///         SourceEvent::DeviceReset { previous, current } => {
///             eprintln!("Device changed: {previous} -> {current}");
///         }
///         SourceEvent::StreamReset { device } => {
///             eprintln!("Reopening stream on {device}");
///         }
///         SourceEvent::StreamClosed { device } => {
///             eprintln!("Closed {device}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// The driver opened a stream.
    StreamOpened {
        /// Device name.
        device: String,
        /// Device input channels captured.
        device_channels: u16,
        /// Host channel slots filled.
        host_channels: usize,
        /// Sample rate in Hz.
        sample_rate: u32,
        /// Requested period length in frames.
        buffer_frames: u32,
    },

    /// The stream started delivering periods.
    StreamStarted {
        /// Device name.
        device: String,
    },

    /// The source is left without a running stream.
    ///
    /// Nothing is retried until the next settings update.
    StreamFailed {
        /// Device name (may be empty if none was selected).
        device: String,
        /// What went wrong.
        error: crate::RouteAudioError,
    },

    /// The device changed; the driver is being reinitialized.
    DeviceReset {
        /// Device before the change.
        previous: String,
        /// Device after the change.
        current: String,
    },

    /// Stream parameters or routes changed; the stream is being reopened.
    StreamReset {
        /// Device name.
        device: String,
    },

    /// The stream was closed.
    StreamClosed {
        /// Device name.
        device: String,
    },
}

/// Callback type for receiving lifecycle events.
///
/// Register one via [`RouteSession::on_event()`](crate::RouteSession::on_event).
/// Events are emitted on the configuration thread, never from the driver
/// callback.
pub type EventCallback = Arc<dyn Fn(SourceEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use route_audio::{event_callback, SourceEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(SourceEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
