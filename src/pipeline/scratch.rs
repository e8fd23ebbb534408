//! Preallocated output region reused across periods.

use crate::format::{bytes_per_sample, HostFormat};
use crate::pipeline::routing::MAX_HOST_CHANNELS;

/// Largest period (in frames) the callback will process.
///
/// Driver bindings split longer buffers with
/// [`split_period`](crate::pipeline::split_period); a longer period reaching
/// the callback directly is dropped rather than triggering an allocation on
/// the real-time thread.
pub const MAX_PERIOD_FRAMES: usize = 8192;

/// Byte buffer sized once at stream open and reused for every period.
pub struct ScratchBuffer {
    bytes: Vec<u8>,
}

impl ScratchBuffer {
    /// Allocates room for `max_frames` frames of `host_channels` samples.
    pub fn new(max_frames: usize, host_channels: usize, bytes_per_sample: usize) -> Self {
        Self {
            bytes: vec![0; max_frames * host_channels * bytes_per_sample],
        }
    }

    /// Allocates the largest region any supported format can need for
    /// `host_channels` slots.
    pub fn for_host_channels(host_channels: usize) -> Self {
        let widest = bytes_per_sample(HostFormat::Float).unwrap_or(4);
        Self::new(
            MAX_PERIOD_FRAMES,
            host_channels.min(MAX_HOST_CHANNELS),
            widest,
        )
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Returns a zero-filled slice of `len` bytes, or `None` if it does not fit.
    #[inline]
    pub fn acquire(&mut self, len: usize) -> Option<&mut [u8]> {
        let region = self.bytes.get_mut(..len)?;
        region.fill(0);
        Some(region)
    }
}
