//! Channel routing from device inputs onto host output slots.
//!
//! A [`RouteTable`] has one entry per host channel slot. Each entry either
//! names a device input channel or is [`Route::Muted`]. Entries are
//! independent: several slots may read the same device channel.

use std::fmt;

/// Hard upper bound on the number of host channel slots.
pub const MAX_HOST_CHANNELS: usize = 8;

/// Raw settings value meaning "this slot is muted".
pub const MUTED: i64 = -1;

/// Where a single host channel slot takes its samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Route {
    /// The slot stays silent.
    #[default]
    Muted,
    /// The slot copies the given device input channel.
    Device(u16),
}

impl Route {
    /// Validates a raw settings value against the device's input channel count.
    ///
    /// Values outside `[0, device_channels)` are clamped to [`Route::Muted`];
    /// the device may have been reselected with fewer channels.
    pub fn from_setting(raw: i64, device_channels: u16) -> Self {
        match u16::try_from(raw) {
            Ok(channel) if channel < device_channels => Self::Device(channel),
            _ => Self::Muted,
        }
    }

    /// Returns the raw settings value for this route.
    pub fn as_setting(self) -> i64 {
        match self {
            Self::Muted => MUTED,
            Self::Device(channel) => i64::from(channel),
        }
    }

    /// Returns the device channel index, or `None` when muted.
    #[inline]
    pub fn device_channel(self) -> Option<usize> {
        match self {
            Self::Muted => None,
            Self::Device(channel) => Some(usize::from(channel)),
        }
    }
}

/// Fixed-size mapping from host channel slot to device input channel.
///
/// Built on the configuration thread and read-only afterwards; the stream
/// callback only ever sees it inside an immutable snapshot.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RouteTable {
    slots: [Route; MAX_HOST_CHANNELS],
    len: usize,
}

impl RouteTable {
    /// Creates a table with every slot muted.
    ///
    /// `host_channels` is capped at [`MAX_HOST_CHANNELS`].
    pub fn muted(host_channels: usize) -> Self {
        Self {
            slots: [Route::Muted; MAX_HOST_CHANNELS],
            len: host_channels.min(MAX_HOST_CHANNELS),
        }
    }

    /// Number of host channel slots in the table.
    pub fn host_channels(&self) -> usize {
        self.len
    }

    /// Returns the route for a slot; slots past the end are muted.
    #[inline]
    pub fn get(&self, slot: usize) -> Route {
        if slot < self.len {
            self.slots[slot]
        } else {
            Route::Muted
        }
    }

    /// Returns the active slots.
    pub fn as_slice(&self) -> &[Route] {
        &self.slots[..self.len]
    }

    /// Returns `true` if every slot is muted.
    pub fn is_all_muted(&self) -> bool {
        self.as_slice().iter().all(|r| *r == Route::Muted)
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Builds a route table from raw per-slot settings values.
///
/// Missing entries (when `raw` is shorter than `host_slot_count`) are muted,
/// as are values outside the device's input channel range.
pub fn build_route(host_slot_count: usize, raw: &[i64], device_channels: u16) -> RouteTable {
    let mut table = RouteTable::muted(host_slot_count);
    for (slot, value) in raw.iter().take(table.len).enumerate() {
        table.slots[slot] = Route::from_setting(*value, device_channels);
    }
    table
}

/// Spatial arrangement implied by a host channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpeakerLayout {
    /// No defined layout.
    #[default]
    Unknown,
    /// 1 channel.
    Mono,
    /// 2 channels.
    Stereo,
    /// 3 channels (2.1).
    TwoPointOne,
    /// 4 channels (4.0).
    FourPointZero,
    /// 5 channels (4.1).
    FourPointOne,
    /// 6 channels (5.1).
    FivePointOne,
    /// 8 channels (7.1).
    SevenPointOne,
}

impl SpeakerLayout {
    /// Number of channels carried by this layout (0 for `Unknown`).
    pub fn channel_count(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::TwoPointOne => 3,
            Self::FourPointZero => 4,
            Self::FourPointOne => 5,
            Self::FivePointOne => 6,
            Self::SevenPointOne => 8,
        }
    }
}

/// Returns the speaker layout for a host channel count.
///
/// Seven channels have no layout in the host and map to `Unknown`, as does
/// every count above [`MAX_HOST_CHANNELS`].
pub fn speaker_layout_for(host_channels: usize) -> SpeakerLayout {
    match host_channels {
        1 => SpeakerLayout::Mono,
        2 => SpeakerLayout::Stereo,
        3 => SpeakerLayout::TwoPointOne,
        4 => SpeakerLayout::FourPointZero,
        5 => SpeakerLayout::FourPointOne,
        6 => SpeakerLayout::FivePointOne,
        8 => SpeakerLayout::SevenPointOne,
        _ => SpeakerLayout::Unknown,
    }
}
