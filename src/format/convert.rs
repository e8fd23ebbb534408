//! Driver ↔ host sample format conversion.

/// Sample format as reported and accepted by the audio driver.
pub type DriverFormat = cpal::SampleFormat;

/// Sample format in the host's audio pipeline.
///
/// Discriminants match the values stored under the `bit depth` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum HostFormat {
    /// No mapping exists. Streams are never opened with this format.
    #[default]
    Unknown = 0,
    /// 8-bit unsigned, interleaved.
    U8 = 1,
    /// 16-bit signed, interleaved.
    I16 = 2,
    /// 32-bit signed, interleaved.
    I32 = 3,
    /// 32-bit float, interleaved.
    Float = 4,
    /// 8-bit unsigned, planar.
    U8Planar = 5,
    /// 16-bit signed, planar.
    I16Planar = 6,
    /// 32-bit signed, planar.
    I32Planar = 7,
    /// 32-bit float, planar.
    FloatPlanar = 8,
}

impl HostFormat {
    /// Parses the integer stored under the `bit depth` setting.
    ///
    /// Anything outside the host numbering maps to [`HostFormat::Unknown`].
    pub fn from_setting(value: i64) -> Self {
        match value {
            1 => Self::U8,
            2 => Self::I16,
            3 => Self::I32,
            4 => Self::Float,
            5 => Self::U8Planar,
            6 => Self::I16Planar,
            7 => Self::I32Planar,
            8 => Self::FloatPlanar,
            _ => Self::Unknown,
        }
    }

    /// Returns the integer stored under the `bit depth` setting.
    pub fn as_setting(self) -> i64 {
        i64::from(self as u8)
    }

    /// Returns `true` for the planar variants.
    pub fn is_planar(self) -> bool {
        matches!(
            self,
            Self::U8Planar | Self::I16Planar | Self::I32Planar | Self::FloatPlanar
        )
    }

    /// Returns the planar variant of an interleaved format.
    pub fn planar(self) -> Self {
        match self {
            Self::U8 | Self::U8Planar => Self::U8Planar,
            Self::I16 | Self::I16Planar => Self::I16Planar,
            Self::I32 | Self::I32Planar => Self::I32Planar,
            Self::Float | Self::FloatPlanar => Self::FloatPlanar,
            Self::Unknown => Self::Unknown,
        }
    }

    /// Returns the interleaved variant of a planar format.
    pub fn packed(self) -> Self {
        match self {
            Self::U8 | Self::U8Planar => Self::U8,
            Self::I16 | Self::I16Planar => Self::I16,
            Self::I32 | Self::I32Planar => Self::I32,
            Self::Float | Self::FloatPlanar => Self::Float,
            Self::Unknown => Self::Unknown,
        }
    }
}

/// Maps a driver sample format onto the host enumeration.
///
/// Formats the host cannot carry map to [`HostFormat::Unknown`]; callers must
/// treat that as "do not open a stream with this configuration".
pub fn driver_format_to_host(format: DriverFormat) -> HostFormat {
    match format {
        DriverFormat::U8 => HostFormat::U8,
        DriverFormat::I16 => HostFormat::I16,
        DriverFormat::I32 => HostFormat::I32,
        DriverFormat::F32 => HostFormat::Float,
        _ => HostFormat::Unknown,
    }
}

/// Maps a host sample format onto the driver enumeration.
///
/// Planar variants map like their interleaved counterparts since the driver
/// always delivers interleaved frames. Unmapped formats fall back to 32-bit
/// float.
pub fn host_format_to_driver(format: HostFormat) -> DriverFormat {
    match format.packed() {
        HostFormat::U8 => DriverFormat::U8,
        HostFormat::I16 => DriverFormat::I16,
        HostFormat::I32 => DriverFormat::I32,
        _ => DriverFormat::F32,
    }
}

/// Width of one sample in bytes, or `None` for [`HostFormat::Unknown`].
pub fn bytes_per_sample(format: HostFormat) -> Option<usize> {
    match format.packed() {
        HostFormat::U8 => Some(1),
        HostFormat::I16 => Some(2),
        HostFormat::I32 | HostFormat::Float => Some(4),
        _ => None,
    }
}

/// Width of one driver sample in bytes, as seen through the host mapping.
#[inline]
pub fn driver_bytes_per_sample(format: DriverFormat) -> Option<usize> {
    bytes_per_sample(driver_format_to_host(format))
}
