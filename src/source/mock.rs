//! Mock driver for testing without hardware.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{BufferSizeRange, DeviceInfo, Driver, DriverStream, StreamParams};
use crate::format::driver_bytes_per_sample;
use crate::pipeline::{split_period, DeliveryDecision, PeriodHandler, PeriodTiming};
use crate::RouteAudioError;

/// A device exposed by [`MockDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    /// Device name.
    pub name: String,
    /// Input channel count.
    pub input_channels: u16,
    /// Output channel count.
    pub output_channels: u16,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Accepted buffer sizes.
    pub buffer_sizes: BufferSizeRange,
}

impl MockDevice {
    /// A 48kHz device with `input_channels` inputs, two outputs, and
    /// power-of-two buffers from 64 to 2048 frames.
    pub fn new(name: impl Into<String>, input_channels: u16) -> Self {
        Self {
            name: name.into(),
            input_channels,
            output_channels: 2,
            default_sample_rate: 48000,
            buffer_sizes: BufferSizeRange {
                min: 64,
                max: 2048,
                preferred: 256,
                granularity: -1,
            },
        }
    }

    /// Replaces the accepted buffer sizes.
    pub fn with_buffer_sizes(mut self, buffer_sizes: BufferSizeRange) -> Self {
        self.buffer_sizes = buffer_sizes;
        self
    }
}

/// A driver operation, as recorded by [`MockDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOp {
    /// Subsystem initialized.
    Initialize,
    /// Subsystem terminated.
    Terminate,
    /// Stream `stream` opened with `params` (after buffer-size substitution).
    Open {
        /// Stream id, unique for the driver's lifetime.
        stream: u64,
        /// Parameters the stream was opened with.
        params: StreamParams,
    },
    /// Stream started.
    Start {
        /// Stream id.
        stream: u64,
    },
    /// Stream aborted.
    Abort {
        /// Stream id.
        stream: u64,
    },
    /// Stream closed.
    Close {
        /// Stream id.
        stream: u64,
    },
}

/// An operation [`MockDriver::fail_next`] can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `Driver::initialize`.
    Initialize,
    /// `Driver::terminate`.
    Terminate,
    /// `Driver::open_stream`.
    Open,
    /// `DriverStream::start`.
    Start,
    /// `DriverStream::abort`.
    Abort,
    /// `DriverStream::close`.
    Close,
}

struct OpenStream {
    id: u64,
    handler: Box<dyn PeriodHandler>,
    frame_bytes: usize,
    active: bool,
}

#[derive(Default)]
struct Shared {
    available: Vec<MockDevice>,
    devices: Vec<MockDevice>,
    initialized: bool,
    ops: Vec<DriverOp>,
    pending_failures: Vec<FailPoint>,
    next_stream: u64,
    open: Vec<OpenStream>,
}

impl Shared {
    /// Consumes a queued failure for `point`, if any.
    fn take_failure(&mut self, point: FailPoint) -> bool {
        match self.pending_failures.iter().position(|p| *p == point) {
            Some(index) => {
                self.pending_failures.remove(index);
                true
            }
            None => false,
        }
    }

    fn stream_mut(&mut self, id: u64) -> Option<&mut OpenStream> {
        self.open.iter_mut().find(|s| s.id == id)
    }
}

/// A deterministic [`Driver`] for tests.
///
/// Cloning yields another handle to the same driver, so a test can keep one
/// handle while a session owns the other. Every operation is recorded in
/// order; failures can be queued per operation; and periods are fired by
/// hand into the active stream's handler.
///
/// # Example
///
/// ```
/// use route_audio::source::{Driver, DriverOp, MockDevice, MockDriver};
///
/// let mut driver = MockDriver::new(vec![MockDevice::new("Interface", 4)]);
/// driver.initialize().unwrap();
///
/// assert_eq!(driver.list_devices(), vec!["Interface".to_string()]);
/// assert_eq!(driver.ops(), vec![DriverOp::Initialize]);
/// ```
#[derive(Clone)]
pub struct MockDriver {
    shared: Arc<Mutex<Shared>>,
}

impl MockDriver {
    /// Creates a driver exposing `devices` once initialized.
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                available: devices,
                next_stream: 1,
                ..Shared::default()
            })),
        }
    }

    /// Replaces the attached devices. Takes effect on the next initialize.
    pub fn set_devices(&self, devices: Vec<MockDevice>) {
        self.shared.lock().available = devices;
    }

    /// Makes the next call of `point` fail. Calls queue up.
    pub fn fail_next(&self, point: FailPoint) {
        self.shared.lock().pending_failures.push(point);
    }

    /// Every operation so far, in order.
    pub fn ops(&self) -> Vec<DriverOp> {
        self.shared.lock().ops.clone()
    }

    /// Forgets recorded operations.
    pub fn clear_ops(&self) {
        self.shared.lock().ops.clear();
    }

    /// Whether the subsystem is initialized.
    pub fn is_initialized(&self) -> bool {
        self.shared.lock().initialized
    }

    /// Ids of streams that are open (not yet closed).
    pub fn open_streams(&self) -> Vec<u64> {
        self.shared.lock().open.iter().map(|s| s.id).collect()
    }

    /// Id of the stream currently delivering periods, if any.
    pub fn active_stream(&self) -> Option<u64> {
        self.shared
            .lock()
            .open
            .iter()
            .find(|s| s.active)
            .map(|s| s.id)
    }

    /// Fires one period into the active stream.
    ///
    /// Buffers longer than the callback's scratch region are split the way
    /// a real driver binding splits them. Returns `None` when no stream is
    /// active; the driver never calls a stopped or closed stream.
    pub fn fire_period(&self, input: Option<&[u8]>, frames: usize) -> Option<DeliveryDecision> {
        self.fire_period_with(input, frames, PeriodTiming::default())
    }

    /// Fires one period with explicit timing flags.
    pub fn fire_period_with(
        &self,
        input: Option<&[u8]>,
        frames: usize,
        timing: PeriodTiming,
    ) -> Option<DeliveryDecision> {
        let mut shared = self.shared.lock();
        let stream = shared.open.iter_mut().find(|s| s.active)?;
        Some(split_period(
            stream.handler.as_mut(),
            input,
            frames,
            stream.frame_bytes,
            timing,
        ))
    }
}

impl Driver for MockDriver {
    type Stream = MockStream;

    fn initialize(&mut self) -> Result<(), RouteAudioError> {
        let mut shared = self.shared.lock();
        shared.ops.push(DriverOp::Initialize);
        if shared.take_failure(FailPoint::Initialize) {
            return Err(RouteAudioError::DriverInit {
                reason: "injected failure".to_string(),
            });
        }
        shared.devices = shared.available.clone();
        shared.initialized = true;
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), RouteAudioError> {
        let mut shared = self.shared.lock();
        shared.ops.push(DriverOp::Terminate);
        // Terminating tears down whatever the subsystem still holds
        shared.initialized = false;
        shared.devices.clear();
        shared.open.clear();
        if shared.take_failure(FailPoint::Terminate) {
            return Err(RouteAudioError::DriverTerminate {
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn list_devices(&self) -> Vec<String> {
        self.shared
            .lock()
            .devices
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    fn device_info(&self, index: usize) -> Result<DeviceInfo, RouteAudioError> {
        let shared = self.shared.lock();
        let device = shared
            .devices
            .get(index)
            .ok_or(RouteAudioError::DeviceIndexOutOfRange {
                index,
                count: shared.devices.len(),
            })?;
        Ok(DeviceInfo {
            name: device.name.clone(),
            max_input_channels: device.input_channels,
            max_output_channels: device.output_channels,
            default_sample_rate: device.default_sample_rate,
        })
    }

    fn buffer_size_range(&self, index: usize) -> Result<BufferSizeRange, RouteAudioError> {
        let shared = self.shared.lock();
        shared
            .devices
            .get(index)
            .map(|d| d.buffer_sizes)
            .ok_or(RouteAudioError::DeviceIndexOutOfRange {
                index,
                count: shared.devices.len(),
            })
    }

    fn open_stream(
        &mut self,
        params: &StreamParams,
        handler: Box<dyn PeriodHandler>,
    ) -> Result<MockStream, RouteAudioError> {
        let mut shared = self.shared.lock();
        if shared.take_failure(FailPoint::Open) {
            return Err(RouteAudioError::StreamOpen {
                reason: "injected failure".to_string(),
            });
        }
        if !shared.initialized {
            return Err(RouteAudioError::StreamOpen {
                reason: "driver not initialized".to_string(),
            });
        }
        let device = shared
            .devices
            .get(params.device_index)
            .ok_or(RouteAudioError::DeviceIndexOutOfRange {
                index: params.device_index,
                count: shared.devices.len(),
            })?;
        if params.channels > device.input_channels {
            return Err(RouteAudioError::StreamOpen {
                reason: format!(
                    "{} channels requested, device has {}",
                    params.channels, device.input_channels
                ),
            });
        }

        let mut params = params.clone();
        params.buffer_frames = device.buffer_sizes.snap(params.buffer_frames);

        let frame_bytes =
            usize::from(params.channels) * driver_bytes_per_sample(params.format).unwrap_or(0);
        let id = shared.next_stream;
        shared.next_stream += 1;
        shared.ops.push(DriverOp::Open { stream: id, params });
        shared.open.push(OpenStream {
            id,
            handler,
            frame_bytes,
            active: false,
        });

        Ok(MockStream {
            id,
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Stream handle returned by [`MockDriver`].
pub struct MockStream {
    id: u64,
    shared: Arc<Mutex<Shared>>,
}

impl MockStream {
    /// Stream id, as recorded in [`DriverOp`]s.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn set_active(&self, active: bool) {
        if let Some(stream) = self.shared.lock().stream_mut(self.id) {
            stream.active = active;
        }
    }
}

impl DriverStream for MockStream {
    fn start(&mut self) -> Result<(), RouteAudioError> {
        let mut shared = self.shared.lock();
        shared.ops.push(DriverOp::Start { stream: self.id });
        if shared.take_failure(FailPoint::Start) {
            return Err(RouteAudioError::StreamStart {
                reason: "injected failure".to_string(),
            });
        }
        let stream = shared
            .stream_mut(self.id)
            .ok_or_else(|| RouteAudioError::StreamStart {
                reason: "stream is no longer open".to_string(),
            })?;
        stream.active = true;
        Ok(())
    }

    fn abort(&mut self) -> Result<(), RouteAudioError> {
        let failed = {
            let mut shared = self.shared.lock();
            shared.ops.push(DriverOp::Abort { stream: self.id });
            shared.take_failure(FailPoint::Abort)
        };
        // Aborting is effective even when the driver reports an error
        self.set_active(false);
        if failed {
            return Err(RouteAudioError::StreamStop {
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.shared
            .lock()
            .open
            .iter()
            .any(|s| s.id == self.id && s.active)
    }

    fn close(self) -> Result<(), RouteAudioError> {
        let mut shared = self.shared.lock();
        shared.ops.push(DriverOp::Close { stream: self.id });
        shared.open.retain(|s| s.id != self.id);
        if shared.take_failure(FailPoint::Close) {
            return Err(RouteAudioError::StreamClose {
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}
