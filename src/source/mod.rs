//! Driver binding seam.
//!
//! The [`Driver`] trait is the interface between the lifecycle manager and an
//! audio driver subsystem: initialize/terminate the subsystem, query devices,
//! and open a [`DriverStream`] that calls a [`PeriodHandler`] once per period.
//!
//! [`CpalDriver`] talks to real hardware through cpal (the ASIO host when the
//! `asio` feature is enabled). [`MockDriver`] is a deterministic stand-in for
//! tests.

mod device;
mod mock;

pub use device::{CpalDriver, CpalStream};
pub use mock::{DriverOp, FailPoint, MockDevice, MockDriver, MockStream};

use cpal::traits::{DeviceTrait, HostTrait};

use crate::format::DriverFormat;
use crate::pipeline::PeriodHandler;
use crate::RouteAudioError;

/// What the driver reports about one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device name, the key used by `device_id`.
    pub name: String,
    /// Number of input channels.
    pub max_input_channels: u16,
    /// Number of output channels.
    pub max_output_channels: u16,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
}

/// Parameters for opening an input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    /// Index into the driver's device list.
    pub device_index: usize,
    /// Interleaved input channels to capture (all of the device's inputs).
    pub channels: u16,
    /// Sample encoding requested from the driver.
    pub format: DriverFormat,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Requested period length in frames. The driver may substitute a
    /// granularity-compliant size.
    pub buffer_frames: u32,
}

/// Buffer sizes a device accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizeRange {
    /// Smallest size in frames.
    pub min: u32,
    /// Largest size in frames.
    pub max: u32,
    /// Size the driver prefers.
    pub preferred: u32,
    /// Step between sizes: `-1` for powers of two, `0` for `min` only,
    /// positive for linear steps.
    pub granularity: i32,
}

impl BufferSizeRange {
    /// A device that accepts exactly one size.
    pub fn fixed(frames: u32) -> Self {
        Self {
            min: frames,
            max: frames,
            preferred: frames,
            granularity: 0,
        }
    }

    /// Lists every size the device accepts, ascending.
    pub fn candidate_sizes(&self) -> Vec<u32> {
        match self.granularity {
            -1 => {
                let mut sizes = Vec::new();
                let mut size = self.min.max(1);
                while size <= self.max {
                    sizes.push(size);
                    match size.checked_mul(2) {
                        Some(next) => size = next,
                        None => break,
                    }
                }
                sizes
            }
            0 => vec![self.min],
            step if step > 0 => (self.min..=self.max)
                .step_by(step.unsigned_abs() as usize)
                .collect(),
            _ => vec![self.preferred],
        }
    }

    /// Returns `requested` if the device accepts it, otherwise the closest
    /// accepted size (the smaller one on a tie).
    pub fn snap(&self, requested: u32) -> u32 {
        self.candidate_sizes()
            .into_iter()
            .min_by_key(|size| (size.abs_diff(requested), *size))
            .unwrap_or(self.preferred)
    }
}

/// A driver subsystem.
///
/// Methods report failures with the driver's own error text; callers decide
/// whether to log, retry, or give up.
pub trait Driver {
    /// Stream handle returned by [`open_stream`](Self::open_stream).
    type Stream: DriverStream;

    /// Brings the subsystem up and snapshots the device list.
    fn initialize(&mut self) -> Result<(), RouteAudioError>;

    /// Shuts the subsystem down. Device indices are invalid afterwards.
    fn terminate(&mut self) -> Result<(), RouteAudioError>;

    /// Device names, in index order. Stable between initialize and terminate.
    fn list_devices(&self) -> Vec<String>;

    /// Describes the device at `index`.
    fn device_info(&self, index: usize) -> Result<DeviceInfo, RouteAudioError>;

    /// Buffer sizes the device at `index` accepts.
    fn buffer_size_range(&self, index: usize) -> Result<BufferSizeRange, RouteAudioError>;

    /// Opens a stopped input stream that calls `handler` once per period.
    fn open_stream(
        &mut self,
        params: &StreamParams,
        handler: Box<dyn PeriodHandler>,
    ) -> Result<Self::Stream, RouteAudioError>;
}

/// A live driver stream.
///
/// After [`close`](Self::close) returns the driver issues no further
/// callbacks.
pub trait DriverStream {
    /// Starts delivering periods.
    fn start(&mut self) -> Result<(), RouteAudioError>;

    /// Stops immediately, discarding in-flight buffers.
    fn abort(&mut self) -> Result<(), RouteAudioError>;

    /// Whether periods are currently being delivered.
    fn is_active(&self) -> bool;

    /// Releases the stream.
    fn close(self) -> Result<(), RouteAudioError>;
}

/// Looks up a device index by exact name.
///
/// The first match wins, so the result is deterministic for a given list.
pub fn resolve_device_index<S: AsRef<str>>(devices: &[S], name: &str) -> Option<usize> {
    devices.iter().position(|device| device.as_ref() == name)
}

/// Lists the input devices of the default cpal host.
///
/// # Errors
///
/// Returns an error if the audio host cannot be accessed.
pub fn list_input_devices() -> Result<Vec<String>, RouteAudioError> {
    let host = cpal::default_host();
    let devices = host.input_devices().map_err(RouteAudioError::backend)?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Gets the name of the default input device, if any.
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.name().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_device_index() {
        let devices = ["ASIO4ALL v2", "Focusrite USB ASIO", "ASIO4ALL v2"];
        assert_eq!(resolve_device_index(&devices, "Focusrite USB ASIO"), Some(1));
        assert_eq!(resolve_device_index(&devices, "ASIO4ALL v2"), Some(0));
        assert_eq!(resolve_device_index(&devices, "Missing"), None);
        assert_eq!(resolve_device_index::<&str>(&[], "Any"), None);
    }

    #[test]
    fn test_candidate_sizes_powers_of_two() {
        let range = BufferSizeRange {
            min: 64,
            max: 1024,
            preferred: 256,
            granularity: -1,
        };
        assert_eq!(range.candidate_sizes(), vec![64, 128, 256, 512, 1024]);
    }

    #[test]
    fn test_candidate_sizes_min_only() {
        let range = BufferSizeRange {
            min: 512,
            max: 2048,
            preferred: 512,
            granularity: 0,
        };
        assert_eq!(range.candidate_sizes(), vec![512]);
    }

    #[test]
    fn test_candidate_sizes_linear() {
        let range = BufferSizeRange {
            min: 96,
            max: 480,
            preferred: 192,
            granularity: 96,
        };
        assert_eq!(range.candidate_sizes(), vec![96, 192, 288, 384, 480]);
    }

    #[test]
    fn test_candidate_sizes_zero_min_terminates() {
        let range = BufferSizeRange {
            min: 0,
            max: 8,
            preferred: 4,
            granularity: -1,
        };
        assert_eq!(range.candidate_sizes(), vec![1, 2, 4, 8]);
    }

    #[test]
    fn test_snap() {
        let range = BufferSizeRange {
            min: 64,
            max: 1024,
            preferred: 256,
            granularity: -1,
        };
        assert_eq!(range.snap(256), 256);
        assert_eq!(range.snap(300), 256);
        assert_eq!(range.snap(96), 64);
        assert_eq!(range.snap(5000), 1024);
        assert_eq!(BufferSizeRange::fixed(480).snap(64), 480);
    }

    #[test]
    fn test_list_devices_doesnt_panic() {
        // This may return empty list in CI, but shouldn't panic
        let _ = list_input_devices();
    }

    #[test]
    fn test_default_device_doesnt_panic() {
        // This may return None in CI, but shouldn't panic
        let _ = default_input_device_name();
    }
}
