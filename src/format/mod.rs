//! Sample format mapping between the driver and the host.
//!
//! The driver side speaks [`DriverFormat`] (cpal's sample format enumeration),
//! the host side speaks [`HostFormat`], which follows the host's own numbering
//! so the `bit depth` setting can be stored as a plain integer.

mod convert;

pub use convert::{
    bytes_per_sample, driver_bytes_per_sample, driver_format_to_host, host_format_to_driver,
    DriverFormat, HostFormat,
};
