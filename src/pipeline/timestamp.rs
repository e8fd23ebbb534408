//! Capture timestamps for delivered buffers.

use std::sync::OnceLock;
use std::time::Instant;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Source of monotonic host time in nanoseconds.
///
/// The epoch is arbitrary but fixed for the lifetime of the clock.
pub trait Clock: Send + Sync {
    /// Current monotonic time in nanoseconds.
    fn now_ns(&self) -> u64;
}

/// [`Clock`] backed by [`Instant`], counted from the first read in the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = *EPOCH.get_or_init(Instant::now);
        u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Estimates when the first frame of a period was captured.
///
/// `now_ns` is the delivery instant; the period covers `frames / sample_rate`
/// seconds of audio before it. Saturates at zero near the clock epoch.
#[inline]
pub fn capture_timestamp(now_ns: u64, frames: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return now_ns;
    }
    let period_ns = (frames as u128 * u128::from(NSEC_PER_SEC)) / u128::from(sample_rate);
    now_ns.saturating_sub(u64::try_from(period_ns).unwrap_or(u64::MAX))
}

/// Anchor latched on the first buffer of a stream.
///
/// Buffers are only delivered when their timestamp is strictly greater than
/// the anchor. The first buffer itself is therefore never delivered, which
/// absorbs the driver's warm-up period.
#[derive(Debug, Default)]
pub struct FirstTimestampMark {
    anchor: Option<u64>,
}

impl FirstTimestampMark {
    /// Creates an unlatched mark.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches the anchor if needed and reports whether `timestamp` may be delivered.
    #[inline]
    pub fn admit(&mut self, timestamp: u64) -> bool {
        let anchor = *self.anchor.get_or_insert(timestamp);
        timestamp > anchor
    }

    /// The latched anchor, if any buffer has been seen.
    pub fn anchor(&self) -> Option<u64> {
        self.anchor
    }

    /// Forgets the anchor.
    pub fn clear(&mut self) {
        self.anchor = None;
    }
}
