//! Source settings and the reconfiguration diff.
//!
//! The host stores source configuration as a flat key/value object
//! ([`Settings`]). [`SourceSettings`] is the typed view the lifecycle manager
//! works with, and [`ConfigChange::between`] classifies what an update
//! requires.

use std::collections::HashMap;

use crate::format::HostFormat;
use crate::pipeline::{MAX_HOST_CHANNELS, MUTED};
use crate::RouteAudioError;

/// Settings keys recognized by the source.
pub mod keys {
    /// Device name (string).
    pub const DEVICE_ID: &str = "device_id";
    /// Sample rate in Hz (integer).
    pub const SAMPLE_RATE: &str = "sample rate";
    /// Host sample format number (integer).
    pub const BIT_DEPTH: &str = "bit depth";
    /// Period length in frames (integer).
    pub const BUFFER: &str = "buffer";

    /// Key for host channel slot `slot` (integer: device channel or -1).
    pub fn route(slot: usize) -> String {
        format!("route {slot}")
    }
}

/// Sample rates a stream may be opened at.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [44100, 48000];

/// Default `sample rate`.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default `bit depth`.
pub const DEFAULT_BIT_DEPTH: HostFormat = HostFormat::Float;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SettingValue {
    Int(i64),
    String(String),
}

/// Host-side key/value settings object.
///
/// Explicit values shadow defaults. Reading a key that has neither yields
/// `0` or the empty string, as the host does.
///
/// # Example
///
/// ```
/// use route_audio::config::{apply_defaults, keys, Settings};
///
/// let mut settings = Settings::new();
/// apply_defaults(&mut settings, 2);
/// settings.set_string(keys::DEVICE_ID, "Focusrite USB ASIO");
/// settings.set_int(&keys::route(0), 3);
///
/// assert_eq!(settings.get_int(keys::SAMPLE_RATE), 48000);
/// assert_eq!(settings.get_int(&keys::route(1)), -1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: HashMap<String, SettingValue>,
    defaults: HashMap<String, SettingValue>,
}

impl Settings {
    /// Creates an empty settings object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an integer value.
    pub fn set_int(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), SettingValue::Int(value));
    }

    /// Sets a string value.
    pub fn set_string(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_string(), SettingValue::String(value.into()));
    }

    /// Sets the integer returned when `key` has no explicit value.
    pub fn set_default_int(&mut self, key: &str, value: i64) {
        self.defaults
            .insert(key.to_string(), SettingValue::Int(value));
    }

    /// Removes the explicit value for `key`, exposing its default again.
    pub fn erase(&mut self, key: &str) {
        self.values.remove(key);
    }

    fn lookup(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key).or_else(|| self.defaults.get(key))
    }

    /// Returns the integer for `key`, or `None` if neither a value nor a
    /// default is an integer.
    pub fn try_get_int(&self, key: &str) -> Option<i64> {
        match self.lookup(key)? {
            SettingValue::Int(value) => Some(*value),
            SettingValue::String(_) => None,
        }
    }

    /// Returns the integer for `key`, or `0`.
    pub fn get_int(&self, key: &str) -> i64 {
        self.try_get_int(key).unwrap_or(0)
    }

    /// Returns the string for `key`, or `""`.
    pub fn get_string(&self, key: &str) -> &str {
        match self.lookup(key) {
            Some(SettingValue::String(value)) => value,
            _ => "",
        }
    }
}

/// Installs the source's defaults for a host with `host_channels` slots.
///
/// `sample rate` defaults to 48000, `bit depth` to float, and every route to
/// muted.
pub fn apply_defaults(settings: &mut Settings, host_channels: usize) {
    settings.set_default_int(keys::SAMPLE_RATE, i64::from(DEFAULT_SAMPLE_RATE));
    settings.set_default_int(keys::BIT_DEPTH, DEFAULT_BIT_DEPTH.as_setting());
    for slot in 0..host_channels.min(MAX_HOST_CHANNELS) {
        settings.set_default_int(&keys::route(slot), MUTED);
    }
}

/// Typed view of the settings that drive one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    /// Device name; empty when no device is selected yet.
    pub device_id: String,
    /// Sample rate in Hz; `0` when unset or out of range.
    pub sample_rate: u32,
    /// Sample format for both sides of the bridge.
    pub bit_depth: HostFormat,
    /// Requested period length in frames; `0` when unset.
    pub buffer_frames: u32,
    /// Raw route values, one per host slot (capped at the host maximum).
    pub routes: Vec<i64>,
}

impl SourceSettings {
    /// Reads the settings for a host with `host_channels` slots.
    ///
    /// Routes without any value are muted. Out-of-range numbers become `0`,
    /// which [`validate`](Self::validate) rejects.
    pub fn from_settings(settings: &Settings, host_channels: usize) -> Self {
        let routes = (0..host_channels.min(MAX_HOST_CHANNELS))
            .map(|slot| settings.try_get_int(&keys::route(slot)).unwrap_or(MUTED))
            .collect();

        Self {
            device_id: settings.get_string(keys::DEVICE_ID).to_string(),
            sample_rate: u32::try_from(settings.get_int(keys::SAMPLE_RATE)).unwrap_or(0),
            bit_depth: HostFormat::from_setting(settings.get_int(keys::BIT_DEPTH)),
            buffer_frames: u32::try_from(settings.get_int(keys::BUFFER)).unwrap_or(0),
            routes,
        }
    }

    /// Whether a device has been selected.
    pub fn has_device(&self) -> bool {
        !self.device_id.is_empty()
    }

    /// Checks that a stream may be opened with these settings.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedSampleRate` for a rate outside
    /// [`SUPPORTED_SAMPLE_RATES`], `UnsupportedFormat` for an unknown bit depth,
    /// and `InvalidSetting` for a zero buffer size or a missing device.
    pub fn validate(&self) -> Result<(), RouteAudioError> {
        if !self.has_device() {
            return Err(RouteAudioError::invalid_setting(
                keys::DEVICE_ID,
                "no device selected",
            ));
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(RouteAudioError::UnsupportedSampleRate {
                requested: self.sample_rate,
                available: SUPPORTED_SAMPLE_RATES.to_vec(),
            });
        }
        if self.bit_depth == HostFormat::Unknown {
            return Err(RouteAudioError::UnsupportedFormat {
                format: format!("{:?}", self.bit_depth),
            });
        }
        if self.buffer_frames == 0 {
            return Err(RouteAudioError::invalid_setting(
                keys::BUFFER,
                "buffer size must be non-zero",
            ));
        }
        Ok(())
    }
}

/// What a settings update requires of the running stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    /// Nothing the stream depends on changed.
    None,
    /// Close and reopen the stream; the driver stays initialized.
    StreamReset,
    /// Close the stream, reinitialize the driver, then reopen.
    DeviceReset,
}

impl ConfigChange {
    /// Classifies the move from `current` to `next`.
    ///
    /// The first configuration (`current == None`) is a stream reset: there
    /// is no old device to tear down.
    pub fn between(current: Option<&SourceSettings>, next: &SourceSettings) -> Self {
        let Some(current) = current else {
            return Self::StreamReset;
        };
        if current.device_id != next.device_id {
            return Self::DeviceReset;
        }
        if current.sample_rate != next.sample_rate
            || current.bit_depth != next.bit_depth
            || current.buffer_frames != next.buffer_frames
            || current.routes != next.routes
        {
            return Self::StreamReset;
        }
        Self::None
    }
}
