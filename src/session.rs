//! Stream lifecycle management.
//!
//! [`RouteSession`] owns one driver stream for one source. It turns settings
//! updates into the minimal driver work (nothing, a stream reset, or a full
//! device reset), and tears everything down on request. Driver failures are
//! logged and reported as [`SourceEvent::StreamFailed`]; they never escape.

use std::sync::Arc;

use crate::config::{ConfigChange, Settings, SourceSettings};
use crate::format::host_format_to_driver;
use crate::pipeline::{
    note_queue, CallbackNote, Clock, MonotonicClock, NoteReceiver, PipelineCounters,
    SpeakerLayout, StreamCallback, StreamSnapshot, NOTE_QUEUE_CAPACITY,
};
use crate::sink::AudioSink;
use crate::source::{resolve_device_index, DeviceInfo, Driver, DriverStream, StreamParams};
use crate::{event_callback, EventCallback, RouteAudioError, SourceEvent};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device is resolved.
    Unconfigured,
    /// A device is resolved but no stream is running.
    Open,
    /// A stream is running.
    Running,
    /// Torn down. Terminal.
    Closed,
}

/// Statistics about a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Periods the driver invoked the callback for.
    pub periods: u64,
    /// Buffers handed to the sink.
    pub delivered: u64,
    /// Buffers withheld by the timestamp or channel-count guard.
    pub suppressed: u64,
    /// Periods abandoned because of an internal error.
    pub dropped: u64,
    /// Callback notes discarded because the queue was full.
    pub notes_lost: u64,
    /// Streams opened over the session's lifetime.
    pub streams_opened: u64,
    /// Stream-only resets performed.
    pub stream_resets: u64,
    /// Full device resets performed.
    pub device_resets: u64,
}

/// The stream for one source, and everything it was opened with.
///
/// # Lifecycle
///
/// 1. [`new()`](Self::new) initializes the driver subsystem
/// 2. [`apply_config()`](Self::apply_config) opens and starts a stream once
///    the settings are complete, and resets it when they change
/// 3. [`teardown()`](Self::teardown) aborts, closes, and terminates; dropping
///    the session does the same
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use route_audio::config::{apply_defaults, keys, Settings};
/// use route_audio::source::{MockDevice, MockDriver};
/// use route_audio::{AudioPacket, ChannelSink, RouteSession, SessionState};
/// use tokio::sync::mpsc;
///
/// let (tx, _rx) = mpsc::channel::<AudioPacket>(64);
/// let driver = MockDriver::new(vec![MockDevice::new("Interface", 4)]);
/// let mut session = RouteSession::new(driver, Arc::new(ChannelSink::new(tx)), 2);
///
/// let mut settings = Settings::new();
/// apply_defaults(&mut settings, 2);
/// settings.set_string(keys::DEVICE_ID, "Interface");
/// settings.set_int(keys::BUFFER, 256);
/// settings.set_int(&keys::route(0), 2);
///
/// session.apply_config(&settings);
/// assert_eq!(session.state(), SessionState::Running);
///
/// session.teardown();
/// assert_eq!(session.state(), SessionState::Closed);
/// ```
pub struct RouteSession<D: Driver> {
    driver: D,
    driver_ready: bool,
    sink: Arc<dyn AudioSink>,
    clock: Arc<dyn Clock>,
    host_channels: usize,
    state: SessionState,
    current: Option<SourceSettings>,
    device: Option<DeviceInfo>,
    stream: Option<D::Stream>,
    snapshot: Option<Arc<StreamSnapshot>>,
    notes: Option<NoteReceiver>,
    counters: Arc<PipelineCounters>,
    notes_lost_logged: u64,
    streams_opened: u64,
    stream_resets: u64,
    device_resets: u64,
    event_callback: Option<EventCallback>,
}

impl<D: Driver> RouteSession<D> {
    /// Creates a session for a host with `host_channels` output slots and
    /// initializes the driver subsystem.
    ///
    /// An initialization failure is logged; the next
    /// [`apply_config`](Self::apply_config) tries again.
    pub fn new(driver: D, sink: Arc<dyn AudioSink>, host_channels: usize) -> Self {
        let mut session = Self {
            driver,
            driver_ready: false,
            sink,
            clock: Arc::new(MonotonicClock),
            host_channels,
            state: SessionState::Unconfigured,
            current: None,
            device: None,
            stream: None,
            snapshot: None,
            notes: None,
            counters: PipelineCounters::new(),
            notes_lost_logged: 0,
            streams_opened: 0,
            stream_resets: 0,
            device_resets: 0,
            event_callback: None,
        };
        session.initialize_driver();
        session
    }

    /// Creates a session whose host channel count follows `layout`.
    pub fn for_layout(driver: D, sink: Arc<dyn AudioSink>, layout: SpeakerLayout) -> Self {
        Self::new(driver, sink, layout.channel_count())
    }

    /// Replaces the clock used for buffer timestamps. Takes effect on the
    /// next stream open.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers a callback for lifecycle events.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(SourceEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(f));
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Host channel slots this session fills.
    pub fn host_channels(&self) -> usize {
        self.host_channels
    }

    /// Settings from the last [`apply_config`](Self::apply_config) that
    /// named a device.
    pub fn settings(&self) -> Option<&SourceSettings> {
        self.current.as_ref()
    }

    /// The resolved device, if any.
    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    /// What the open stream's callback reads, if a stream is open.
    pub fn snapshot(&self) -> Option<&StreamSnapshot> {
        self.snapshot.as_deref()
    }

    /// Returns the driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Returns current session statistics.
    pub fn stats(&self) -> SessionStats {
        let pipeline = self.counters.snapshot();
        SessionStats {
            periods: pipeline.periods,
            delivered: pipeline.delivered,
            suppressed: pipeline.suppressed,
            dropped: pipeline.dropped,
            notes_lost: pipeline.notes_lost,
            streams_opened: self.streams_opened,
            stream_resets: self.stream_resets,
            device_resets: self.device_resets,
        }
    }

    /// Applies a settings update.
    ///
    /// A changed device resets the driver subsystem; changed stream
    /// parameters or routes reopen the stream; unchanged settings leave a
    /// running stream alone. When no stream is running, every call is a new
    /// attempt to open one.
    pub fn apply_config(&mut self, settings: &Settings) {
        self.drain_diagnostics();
        if self.state == SessionState::Closed {
            tracing::warn!("Settings update ignored: session is torn down");
            return;
        }

        let next = SourceSettings::from_settings(settings, self.host_channels);
        if !next.has_device() {
            tracing::debug!("Device not yet set");
            return;
        }

        let change = ConfigChange::between(self.current.as_ref(), &next);
        let running = self.state == SessionState::Running;
        match change {
            ConfigChange::None if running => {
                tracing::trace!(device = %next.device_id, "Settings unchanged");
                return;
            }
            ConfigChange::None => {
                tracing::debug!(device = %next.device_id, "Retrying stream open");
            }
            ConfigChange::StreamReset => {
                if self.current.is_some() {
                    self.stream_resets += 1;
                    tracing::info!(device = %next.device_id, "Stream parameters changed, reopening");
                    self.emit(SourceEvent::StreamReset {
                        device: next.device_id.clone(),
                    });
                }
            }
            ConfigChange::DeviceReset => {
                self.device_resets += 1;
                let previous = self
                    .current
                    .as_ref()
                    .map(|c| c.device_id.clone())
                    .unwrap_or_default();
                tracing::info!(
                    previous = %previous,
                    current = %next.device_id,
                    "Device changed, resetting driver"
                );
                self.emit(SourceEvent::DeviceReset {
                    previous,
                    current: next.device_id.clone(),
                });
            }
        }

        self.close_stream();
        if change == ConfigChange::DeviceReset {
            self.reset_driver();
        }
        self.open_and_start(&next);
        self.current = Some(next);
    }

    /// Stops and releases everything.
    ///
    /// An active stream is aborted before it is closed, and the driver
    /// subsystem is terminated even if either step fails. Errors are logged.
    /// Calling this more than once is harmless.
    pub fn teardown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.drain_diagnostics();
        self.close_stream();
        if let Err(e) = self.driver.terminate() {
            tracing::error!(error = %e, "Driver termination failed");
        }
        self.driver_ready = false;
        self.device = None;
        self.state = SessionState::Closed;
        tracing::info!("Source torn down");
    }

    /// Logs and returns the notes the callback queued since the last drain.
    pub fn drain_diagnostics(&mut self) -> Vec<CallbackNote> {
        let notes = self
            .notes
            .as_mut()
            .map(NoteReceiver::drain)
            .unwrap_or_default();
        for note in &notes {
            match note {
                CallbackNote::InputOverflow => tracing::debug!("{note}"),
                _ => tracing::warn!("{note}"),
            }
        }

        let lost = self.counters.snapshot().notes_lost;
        if lost > self.notes_lost_logged {
            tracing::warn!(
                lost = lost - self.notes_lost_logged,
                "Callback diagnostics dropped: queue full"
            );
            self.notes_lost_logged = lost;
        }
        notes
    }

    fn emit(&self, event: SourceEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }

    fn fail(&self, device: &str, error: RouteAudioError) {
        self.emit(SourceEvent::StreamFailed {
            device: device.to_string(),
            error,
        });
    }

    fn initialize_driver(&mut self) {
        match self.driver.initialize() {
            Ok(()) => self.driver_ready = true,
            Err(e) => {
                tracing::error!(error = %e, "Driver initialization failed");
                self.driver_ready = false;
            }
        }
    }

    fn reset_driver(&mut self) {
        if let Err(e) = self.driver.terminate() {
            tracing::error!(error = %e, "Driver termination failed");
        }
        self.driver_ready = false;
        self.device = None;
        self.state = SessionState::Unconfigured;
        self.initialize_driver();
    }

    /// Aborts (if active) and closes the current stream.
    fn close_stream(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        if stream.is_active() {
            if let Err(e) = stream.abort() {
                tracing::warn!(error = %e, "Stream abort failed, closing anyway");
            }
        }
        if let Err(e) = stream.close() {
            tracing::error!(error = %e, "Stream close failed");
        }

        // The callback is gone; collect whatever it left behind
        self.drain_diagnostics();
        self.notes = None;
        self.snapshot = None;
        if self.state == SessionState::Running {
            self.state = SessionState::Open;
        }
        let device = self.device.as_ref().map(|d| d.name.clone()).unwrap_or_default();
        tracing::info!(device = %device, "Stream closed");
        self.emit(SourceEvent::StreamClosed { device });
    }

    fn open_and_start(&mut self, next: &SourceSettings) {
        if !self.driver_ready {
            self.initialize_driver();
        }

        let devices = self.driver.list_devices();
        let Some(index) = resolve_device_index(&devices, &next.device_id) else {
            let error = RouteAudioError::DeviceNotFound {
                name: next.device_id.clone(),
            };
            tracing::error!(error = %error, "Stream not opened");
            self.device = None;
            self.state = SessionState::Unconfigured;
            self.fail(&next.device_id, error);
            return;
        };
        let info = match self.driver.device_info(index) {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(device = %next.device_id, error = %e, "Could not query device");
                self.device = None;
                self.state = SessionState::Unconfigured;
                self.fail(&next.device_id, e);
                return;
            }
        };
        tracing::debug!(
            device = %info.name,
            inputs = info.max_input_channels,
            outputs = info.max_output_channels,
            "Device resolved"
        );
        self.device = Some(info.clone());
        self.state = SessionState::Open;

        if let Err(e) = next.validate() {
            tracing::info!(device = %info.name, reason = %e, "Stream not opened");
            self.fail(&info.name, e);
            return;
        }

        let snapshot = match StreamSnapshot::new(
            info.max_input_channels,
            self.host_channels,
            next.bit_depth,
            next.sample_rate,
            &next.routes,
        ) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                tracing::error!(device = %info.name, error = %e, "Stream not opened");
                self.fail(&info.name, e);
                return;
            }
        };
        tracing::debug!(routes = ?snapshot.routes(), "Route table built");

        let params = StreamParams {
            device_index: index,
            channels: info.max_input_channels,
            format: host_format_to_driver(next.bit_depth),
            sample_rate: next.sample_rate,
            buffer_frames: next.buffer_frames,
        };
        let (note_tx, note_rx) = note_queue(NOTE_QUEUE_CAPACITY, Arc::clone(&self.counters));
        let callback = StreamCallback::new(
            Arc::clone(&snapshot),
            Arc::clone(&self.sink),
            Arc::clone(&self.clock),
            note_tx,
            Arc::clone(&self.counters),
        );

        let mut stream = match self.driver.open_stream(&params, Box::new(callback)) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(device = %info.name, error = %e, "Could not open the stream");
                self.fail(&info.name, e);
                return;
            }
        };
        self.streams_opened += 1;
        tracing::info!(
            device = %info.name,
            sample_rate = params.sample_rate,
            buffer = params.buffer_frames,
            format = ?next.bit_depth,
            "Stream opened"
        );
        self.emit(SourceEvent::StreamOpened {
            device: info.name.clone(),
            device_channels: info.max_input_channels,
            host_channels: self.host_channels,
            sample_rate: params.sample_rate,
            buffer_frames: params.buffer_frames,
        });

        if let Err(e) = stream.start() {
            tracing::error!(device = %info.name, error = %e, "Could not start the stream");
            if let Err(close_err) = stream.close() {
                tracing::error!(error = %close_err, "Stream close failed");
            }
            self.fail(&info.name, e);
            return;
        }

        self.stream = Some(stream);
        self.snapshot = Some(snapshot);
        self.notes = Some(note_rx);
        self.state = SessionState::Running;
        tracing::info!(device = %info.name, "Stream started");
        self.emit(SourceEvent::StreamStarted { device: info.name });
    }
}

impl<D: Driver> Drop for RouteSession<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}
