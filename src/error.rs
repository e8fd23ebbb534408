//! Error types for route-audio.
//!
//! Every driver-level failure is represented by [`RouteAudioError`]. The
//! [`RouteSession`](crate::RouteSession) recovers all of them locally: it logs
//! the error, leaves the source without a running stream, and reports the
//! failure through [`SourceEvent::StreamFailed`](crate::SourceEvent::StreamFailed).
//! Nothing here ever crosses the real-time callback boundary.

/// Errors reported by the driver binding and the settings layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteAudioError {
    /// The driver subsystem could not be initialized.
    #[error("driver initialization failed: {reason}")]
    DriverInit {
        /// Driver-provided error text.
        reason: String,
    },

    /// The driver subsystem could not be terminated cleanly.
    #[error("driver termination failed: {reason}")]
    DriverTerminate {
        /// Driver-provided error text.
        reason: String,
    },

    /// No device with the given name is known to the driver.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name that was looked up.
        name: String,
    },

    /// A device index does not refer to an enumerated device.
    #[error("device index {index} out of range ({count} devices)")]
    DeviceIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of enumerated devices.
        count: usize,
    },

    /// The requested sample format has no mapping on one side of the bridge.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// Debug rendering of the offending format.
        format: String,
    },

    /// The requested sample rate is not one the source accepts.
    #[error("sample rate {requested}Hz not supported (available: {available:?})")]
    UnsupportedSampleRate {
        /// The requested sample rate.
        requested: u32,
        /// Sample rates that are supported.
        available: Vec<u32>,
    },

    /// The driver refused to open a stream.
    #[error("could not open the stream: {reason}")]
    StreamOpen {
        /// Driver-provided error text.
        reason: String,
    },

    /// The driver opened the stream but could not start it.
    #[error("could not start the stream: {reason}")]
    StreamStart {
        /// Driver-provided error text.
        reason: String,
    },

    /// Stopping or aborting the stream failed.
    #[error("could not stop the stream: {reason}")]
    StreamStop {
        /// Driver-provided error text.
        reason: String,
    },

    /// Closing the stream failed.
    #[error("could not close the stream: {reason}")]
    StreamClose {
        /// Driver-provided error text.
        reason: String,
    },

    /// Any other error from the underlying audio library.
    #[error("audio backend error: {0}")]
    BackendError(String),

    /// A settings value is missing or outside its accepted domain.
    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting {
        /// Settings key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl RouteAudioError {
    /// Creates a backend error from any displayable driver error.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::BackendError(err.to_string())
    }

    /// Creates an invalid-setting error.
    pub fn invalid_setting(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
