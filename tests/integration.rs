//! Integration tests for route-audio.
//!
//! These drive the whole path (settings, session, driver, callback, sink)
//! against `MockDriver`. Tests that require actual audio hardware are marked
//! with `#[ignore]` and should be run manually.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use route_audio::config::{apply_defaults, keys, Settings};
use route_audio::pipeline::{CallbackNote, Clock, MAX_HOST_CHANNELS, MUTED};
use route_audio::source::{DriverOp, MockDevice, MockDriver};
use route_audio::{
    AudioPacket, ChannelSink, DeliveryDecision, HostFormat, RouteSession, SessionState,
    SourceEvent, SpeakerLayout,
};
use tokio::sync::mpsc;

const FRAMES: usize = 256;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Clock that moves forward by a fixed step on every read.
struct SteppingClock {
    now: AtomicU64,
    step: u64,
}

impl SteppingClock {
    fn period(frames: usize, sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(1_000_000_000),
            step: frames as u64 * 1_000_000_000 / u64::from(sample_rate),
        })
    }
}

impl Clock for SteppingClock {
    fn now_ns(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::SeqCst) + self.step
    }
}

fn interface(inputs: u16) -> MockDriver {
    MockDriver::new(vec![
        MockDevice::new("Interface", inputs),
        MockDevice::new("Spare", 2),
    ])
}

fn settings(device: &str, host_channels: usize, format: HostFormat, routes: &[i64]) -> Settings {
    let mut settings = Settings::new();
    apply_defaults(&mut settings, host_channels);
    settings.set_string(keys::DEVICE_ID, device);
    settings.set_int(keys::BUFFER, FRAMES as i64);
    settings.set_int(keys::BIT_DEPTH, format.as_setting());
    for (slot, route) in routes.iter().enumerate() {
        settings.set_int(&keys::route(slot), *route);
    }
    settings
}

fn session(
    driver: &MockDriver,
    host_channels: usize,
    capacity: usize,
) -> (RouteSession<MockDriver>, mpsc::Receiver<AudioPacket>) {
    let (tx, rx) = mpsc::channel::<AudioPacket>(capacity);
    let session = RouteSession::new(driver.clone(), Arc::new(ChannelSink::new(tx)), host_channels)
        .with_clock(SteppingClock::period(FRAMES, 48000));
    (session, rx)
}

/// One period of 16-bit input where device channel `c` carries `0x1000 + c`.
fn labelled_i16_period(device_channels: u16) -> Vec<u8> {
    let mut input = Vec::new();
    for _ in 0..FRAMES {
        for channel in 0..device_channels {
            input.extend_from_slice(&(0x1000 + channel).to_le_bytes());
        }
    }
    input
}

#[tokio::test]
async fn test_routes_device_channel_to_host_slot() {
    init_tracing();
    let driver = interface(4);
    let (mut session, mut rx) = session(&driver, 2, 16);
    session.apply_config(&settings("Interface", 2, HostFormat::I16, &[2, MUTED]));
    assert_eq!(session.state(), SessionState::Running);

    let mut input = Vec::new();
    for _ in 0..FRAMES {
        input.extend_from_slice(&[0xAA, 0xAA, 0xBB, 0xBB, 0x34, 0x12, 0xCC, 0xCC]);
    }

    // Warm-up period latches the anchor and is never delivered
    assert!(matches!(
        driver.fire_period(Some(&input), FRAMES),
        Some(DeliveryDecision::Suppressed(_))
    ));
    assert_eq!(
        driver.fire_period(Some(&input), FRAMES),
        Some(DeliveryDecision::Delivered)
    );

    let packet = rx.recv().await.unwrap();
    // 16-bit samples, reported to the host under the float tag
    assert_eq!(packet.format, HostFormat::Float);
    assert_eq!(packet.bytes_per_sample, 2);
    assert_eq!(packet.speakers, SpeakerLayout::Stereo);
    assert_eq!(packet.frames, FRAMES);
    assert_eq!(packet.data.len(), FRAMES * 2 * 2);
    for frame in 0..FRAMES {
        assert_eq!(packet.sample_bytes(frame, 0), Some(&[0x34u8, 0x12][..]));
        assert_eq!(packet.sample_bytes(frame, 1), Some(&[0u8, 0][..]));
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_default_float_stream_timestamps_increase() {
    let driver = interface(2);
    let (mut session, mut rx) = session(&driver, 2, 16);
    session.apply_config(&settings("Interface", 2, HostFormat::Float, &[0, 1]));

    let input = vec![0u8; FRAMES * 2 * 4];
    for _ in 0..5 {
        driver.fire_period(Some(&input), FRAMES);
    }

    let mut previous = 0;
    for _ in 0..4 {
        let packet = rx.recv().await.unwrap();
        assert_eq!(packet.format, HostFormat::Float);
        assert_eq!(packet.sample_rate, 48000);
        assert_eq!(packet.frames, FRAMES);
        assert!(packet.duration() > Duration::from_millis(5));
        assert!(packet.timestamp_ns > previous);
        previous = packet.timestamp_ns;
    }

    let stats = session.stats();
    assert_eq!(stats.periods, 5);
    assert_eq!(stats.suppressed, 1);
    assert_eq!(stats.delivered, 4);
}

#[tokio::test]
async fn test_route_change_applies_to_new_stream() {
    let driver = interface(4);
    let (mut session, mut rx) = session(&driver, 2, 16);
    let input = labelled_i16_period(4);

    session.apply_config(&settings("Interface", 2, HostFormat::I16, &[0, 1]));
    driver.fire_period(Some(&input), FRAMES);
    driver.fire_period(Some(&input), FRAMES);
    let before = rx.recv().await.unwrap();
    assert_eq!(before.sample_bytes(0, 0), Some(&0x1000u16.to_le_bytes()[..]));
    assert_eq!(before.sample_bytes(0, 1), Some(&0x1001u16.to_le_bytes()[..]));

    session.apply_config(&settings("Interface", 2, HostFormat::I16, &[3, 3]));
    assert_eq!(driver.open_streams(), vec![2]);

    // The new stream starts with a fresh anchor
    assert!(matches!(
        driver.fire_period(Some(&input), FRAMES),
        Some(DeliveryDecision::Suppressed(_))
    ));
    driver.fire_period(Some(&input), FRAMES);
    let after = rx.recv().await.unwrap();
    assert_eq!(after.sample_bytes(0, 0), Some(&0x1003u16.to_le_bytes()[..]));
    assert_eq!(after.sample_bytes(0, 1), Some(&0x1003u16.to_le_bytes()[..]));
}

#[test]
fn test_device_change_closes_first_handle_before_second_opens() {
    let driver = interface(4);
    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorded = events.clone();
    let (session, _rx) = session(&driver, 2, 4);
    let mut session = session.on_event(move |e| recorded.lock().push(e));

    session.apply_config(&settings("Interface", 2, HostFormat::Float, &[0, 1]));
    session.apply_config(&settings("Spare", 2, HostFormat::Float, &[0, 1]));

    let ops = driver.ops();
    let position = |wanted: &DriverOp| ops.iter().position(|op| op == wanted).unwrap();
    let close_first = position(&DriverOp::Close { stream: 1 });
    let terminate = position(&DriverOp::Terminate);
    let open_second = ops
        .iter()
        .position(|op| matches!(op, DriverOp::Open { stream: 2, .. }))
        .unwrap();
    assert!(close_first < terminate);
    assert!(terminate < open_second);
    assert_eq!(driver.open_streams(), vec![2]);

    assert!(events.lock().contains(&SourceEvent::DeviceReset {
        previous: "Interface".to_string(),
        current: "Spare".to_string(),
    }));
}

#[test]
fn test_shrunken_device_mutes_stale_routes() {
    let driver = interface(8);
    let (mut session, _rx) = session(&driver, 2, 4);
    session.apply_config(&settings("Interface", 2, HostFormat::Float, &[6, 1]));
    session.apply_config(&settings("Spare", 2, HostFormat::Float, &[6, 1]));

    let routes = session.snapshot().unwrap().routes().clone();
    assert_eq!(
        routes.as_slice(),
        &[route_audio::Route::Muted, route_audio::Route::Device(1)]
    );
}

#[test]
fn test_host_channel_overflow_drops_every_period() {
    let driver = interface(2);
    let (mut session, _rx) = session(&driver, MAX_HOST_CHANNELS + 1, 4);
    session.apply_config(&settings(
        "Interface",
        MAX_HOST_CHANNELS + 1,
        HostFormat::Float,
        &[0, 1],
    ));
    assert_eq!(session.state(), SessionState::Running);

    let input = vec![0u8; FRAMES * 2 * 4];
    for _ in 0..3 {
        assert!(matches!(
            driver.fire_period(Some(&input), FRAMES),
            Some(DeliveryDecision::Dropped(
                CallbackNote::ChannelLimitExceeded { .. }
            ))
        ));
    }
    assert_eq!(session.drain_diagnostics().len(), 3);
    assert_eq!(session.stats().dropped, 3);
}

#[tokio::test]
async fn test_slow_consumer_does_not_stall_stream() {
    let driver = interface(2);
    let (tx, mut rx) = mpsc::channel::<AudioPacket>(2);
    let sink = Arc::new(ChannelSink::new(tx));
    let mut session = RouteSession::new(driver.clone(), sink.clone(), 2)
        .with_clock(SteppingClock::period(FRAMES, 48000));
    session.apply_config(&settings("Interface", 2, HostFormat::Float, &[0, 1]));

    let input = vec![0u8; FRAMES * 2 * 4];
    for _ in 0..6 {
        driver.fire_period(Some(&input), FRAMES);
    }

    assert_eq!(session.stats().delivered, 5);
    assert_eq!(sink.dropped_packets(), 3);
    assert!(rx.recv().await.is_some());
    assert!(rx.recv().await.is_some());
}

#[test]
fn test_teardown_after_reconfigurations_releases_everything() {
    let driver = interface(4);
    let (mut session, _rx) = session(&driver, 2, 4);
    session.apply_config(&settings("Interface", 2, HostFormat::Float, &[0, 1]));
    session.apply_config(&settings("Interface", 2, HostFormat::I32, &[0, 1]));
    session.apply_config(&settings("Spare", 2, HostFormat::I32, &[0, 1]));

    session.teardown();

    assert!(driver.open_streams().is_empty());
    assert!(!driver.is_initialized());
    assert!(driver.fire_period(Some(&[0; 16]), 1).is_none());
    let stats = session.stats();
    assert_eq!(stats.streams_opened, 3);
    assert_eq!(stats.stream_resets, 1);
    assert_eq!(stats.device_resets, 1);
}

/// This test requires actual audio hardware and should be run manually.
#[tokio::test]
#[ignore = "requires audio hardware"]
async fn test_real_capture() {
    use route_audio::source::{CpalDriver, Driver};

    init_tracing();
    let mut lister = CpalDriver::preferred();
    lister.initialize().expect("Failed to initialize driver");
    let name = lister
        .list_devices()
        .into_iter()
        .next()
        .expect("No audio devices");
    lister.terminate().expect("Failed to terminate driver");

    let (tx, mut rx) = mpsc::channel::<AudioPacket>(64);
    let mut session = RouteSession::for_layout(
        CpalDriver::preferred(),
        Arc::new(ChannelSink::new(tx)),
        SpeakerLayout::Stereo,
    );
    session.apply_config(&settings(&name, 2, HostFormat::Float, &[0, MUTED]));

    // Capture for 1 second
    let frames = tokio::time::timeout(Duration::from_secs(1), async {
        let mut total_frames = 0;
        while let Some(packet) = rx.recv().await {
            total_frames += packet.frames;
            if total_frames > 48000 {
                break;
            }
        }
        total_frames
    })
    .await;

    session.teardown();

    if let Ok(frames) = frames {
        println!("Captured {} frames from {}", frames, name);
        assert!(frames > 0, "Should have captured some audio");
    }
}
