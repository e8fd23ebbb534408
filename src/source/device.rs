//! CPAL driver binding.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Host, HostId, SampleRate, Stream, StreamConfig, SupportedBufferSize};

use super::{BufferSizeRange, DeviceInfo, Driver, DriverStream, StreamParams};
use crate::format::{driver_bytes_per_sample, DriverFormat};
use crate::pipeline::{split_period, PeriodHandler, PeriodTiming};
use crate::RouteAudioError;

/// Preferred period when the device reports a range but no preference.
const PREFERRED_BUFFER_FRAMES: u32 = 512;

/// [`Driver`] backed by a cpal host.
///
/// [`initialize`](Driver::initialize) opens the host and snapshots its
/// devices; indices refer to that snapshot until the next initialize.
pub struct CpalDriver {
    host_id: HostId,
    host: Option<Host>,
    devices: Vec<(String, Device)>,
}

impl CpalDriver {
    /// Creates a driver for the given host. Nothing is opened until
    /// [`initialize`](Driver::initialize).
    pub fn new(host_id: HostId) -> Self {
        Self {
            host_id,
            host: None,
            devices: Vec::new(),
        }
    }

    /// Uses the ASIO host when built with the `asio` feature on Windows,
    /// otherwise the platform's default host.
    pub fn preferred() -> Self {
        #[cfg(all(windows, feature = "asio"))]
        let host_id = HostId::Asio;
        #[cfg(not(all(windows, feature = "asio")))]
        let host_id = cpal::default_host().id();
        Self::new(host_id)
    }

    /// Returns the cpal host id.
    pub fn host_id(&self) -> HostId {
        self.host_id
    }

    fn entry(&self, index: usize) -> Result<&(String, Device), RouteAudioError> {
        self.devices
            .get(index)
            .ok_or(RouteAudioError::DeviceIndexOutOfRange {
                index,
                count: self.devices.len(),
            })
    }
}

impl Driver for CpalDriver {
    type Stream = CpalStream;

    fn initialize(&mut self) -> Result<(), RouteAudioError> {
        let host = cpal::host_from_id(self.host_id).map_err(|e| RouteAudioError::DriverInit {
            reason: e.to_string(),
        })?;
        let devices = host.devices().map_err(|e| RouteAudioError::DriverInit {
            reason: e.to_string(),
        })?;

        self.devices = devices
            .map(|device| {
                let name = device.name().unwrap_or_else(|_| "unknown".to_string());
                (name, device)
            })
            .collect();
        tracing::debug!(
            host = ?self.host_id,
            devices = self.devices.len(),
            "Driver initialized"
        );
        self.host = Some(host);
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), RouteAudioError> {
        self.devices.clear();
        if self.host.take().is_none() {
            return Err(RouteAudioError::DriverTerminate {
                reason: "driver was not initialized".to_string(),
            });
        }
        Ok(())
    }

    fn list_devices(&self) -> Vec<String> {
        self.devices.iter().map(|(name, _)| name.clone()).collect()
    }

    fn device_info(&self, index: usize) -> Result<DeviceInfo, RouteAudioError> {
        let (name, device) = self.entry(index)?;
        let max_input_channels = device
            .supported_input_configs()
            .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
            .unwrap_or(0);
        let max_output_channels = device
            .supported_output_configs()
            .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
            .unwrap_or(0);
        let default_sample_rate = device
            .default_input_config()
            .map(|c| c.sample_rate().0)
            .unwrap_or(0);

        Ok(DeviceInfo {
            name: name.clone(),
            max_input_channels,
            max_output_channels,
            default_sample_rate,
        })
    }

    fn buffer_size_range(&self, index: usize) -> Result<BufferSizeRange, RouteAudioError> {
        let config = self
            .entry(index)?
            .1
            .default_input_config()
            .map_err(RouteAudioError::backend)?;

        match config.buffer_size() {
            &SupportedBufferSize::Range { min, max } => Ok(BufferSizeRange {
                min,
                max,
                preferred: PREFERRED_BUFFER_FRAMES.clamp(min, max.max(min)),
                granularity: -1,
            }),
            SupportedBufferSize::Unknown => Err(RouteAudioError::BackendError(
                "device does not report buffer sizes".to_string(),
            )),
        }
    }

    fn open_stream(
        &mut self,
        params: &StreamParams,
        mut handler: Box<dyn PeriodHandler>,
    ) -> Result<CpalStream, RouteAudioError> {
        let buffer_size = match self.buffer_size_range(params.device_index) {
            Ok(range) => {
                let frames = range.snap(params.buffer_frames);
                if frames != params.buffer_frames {
                    tracing::info!(
                        requested = params.buffer_frames,
                        substituted = frames,
                        "Driver substituted buffer size"
                    );
                }
                BufferSize::Fixed(frames)
            }
            Err(_) => BufferSize::Default,
        };
        let config = StreamConfig {
            channels: params.channels,
            sample_rate: SampleRate(params.sample_rate),
            buffer_size,
        };

        let width = driver_bytes_per_sample(params.format).ok_or_else(|| {
            RouteAudioError::UnsupportedFormat {
                format: format!("{:?}", params.format),
            }
        })?;
        let frame_bytes = usize::from(params.channels) * width;
        let (name, device) = self.entry(params.device_index)?;
        let name = name.clone();
        let error_device = name.clone();
        let stream = device
            .build_input_stream_raw(
                &config,
                params.format,
                move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                    let bytes = data.bytes();
                    let frames = bytes.len().checked_div(frame_bytes).unwrap_or(0);
                    let input = (!bytes.is_empty()).then_some(bytes);
                    split_period(
                        handler.as_mut(),
                        input,
                        frames,
                        frame_bytes,
                        PeriodTiming::default(),
                    );
                },
                move |err| {
                    tracing::error!(device = %error_device, error = %err, "Audio stream error");
                },
                None,
            )
            .map_err(|e| RouteAudioError::StreamOpen {
                reason: e.to_string(),
            })?;

        // Some hosts start streams on build; keep the trait's "opened stopped" contract
        if let Err(e) = stream.pause() {
            tracing::warn!(device = %name, error = %e, "Could not pause the new stream");
        }

        Ok(CpalStream {
            stream,
            format: params.format,
            active: false,
        })
    }
}

/// A cpal input stream.
///
/// Dropping the stream stops capture and releases the device.
pub struct CpalStream {
    stream: Stream,
    format: DriverFormat,
    active: bool,
}

impl CpalStream {
    /// Sample encoding the stream was opened with.
    pub fn format(&self) -> DriverFormat {
        self.format
    }
}

impl DriverStream for CpalStream {
    fn start(&mut self) -> Result<(), RouteAudioError> {
        self.stream.play().map_err(|e| RouteAudioError::StreamStart {
            reason: e.to_string(),
        })?;
        self.active = true;
        Ok(())
    }

    fn abort(&mut self) -> Result<(), RouteAudioError> {
        // Inactive even if pause fails: the stream is closed right after
        self.active = false;
        self.stream.pause().map_err(|e| RouteAudioError::StreamStop {
            reason: e.to_string(),
        })
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn close(self) -> Result<(), RouteAudioError> {
        drop(self.stream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_driver_has_no_devices() {
        let driver = CpalDriver::new(cpal::default_host().id());
        assert!(driver.list_devices().is_empty());
        assert!(matches!(
            driver.device_info(0),
            Err(RouteAudioError::DeviceIndexOutOfRange { index: 0, count: 0 })
        ));
    }

    #[test]
    fn test_terminate_without_initialize_fails() {
        let mut driver = CpalDriver::preferred();
        assert!(matches!(
            driver.terminate(),
            Err(RouteAudioError::DriverTerminate { .. })
        ));
    }

    // Note: Device tests require actual audio hardware and are skipped in CI
    #[test]
    #[ignore = "requires audio hardware"]
    fn test_initialize_lists_devices() {
        let mut driver = CpalDriver::preferred();
        driver.initialize().unwrap();
        for (index, name) in driver.list_devices().iter().enumerate() {
            let info = driver.device_info(index).unwrap();
            assert_eq!(&info.name, name);
            println!("{index}: {info:?}");
        }
        driver.terminate().unwrap();
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_opened_stream_starts_paused() {
        use crate::pipeline::DeliveryDecision;
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::sync::Arc;

        struct Counting(Arc<AtomicU64>);

        impl PeriodHandler for Counting {
            fn on_period(
                &mut self,
                _input: Option<&[u8]>,
                _frames: usize,
                _timing: PeriodTiming,
            ) -> DeliveryDecision {
                self.0.fetch_add(1, Ordering::Relaxed);
                DeliveryDecision::Delivered
            }
        }

        let mut driver = CpalDriver::preferred();
        driver.initialize().unwrap();
        let info = driver.device_info(0).unwrap();
        let params = StreamParams {
            device_index: 0,
            channels: info.max_input_channels,
            format: DriverFormat::F32,
            sample_rate: info.default_sample_rate,
            buffer_frames: 512,
        };
        let periods = Arc::new(AtomicU64::new(0));
        let mut stream = driver
            .open_stream(&params, Box::new(Counting(periods.clone())))
            .unwrap();
        assert!(!stream.is_active());

        stream.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));
        stream.abort().unwrap();
        stream.close().unwrap();
        assert!(periods.load(Ordering::Relaxed) > 0);
        driver.terminate().unwrap();
    }
}
