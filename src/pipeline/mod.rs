//! Audio pipeline components.
//!
//! Everything that runs inside the driver's period callback lives here:
//!
//! ```text
//! Driver Thread → StreamCallback → (route + timestamp) → AudioSink
//!                       └→ NoteQueue → RouteSession (logs on config thread)
//! ```
//!
//! - **Routing**: Maps device input channels onto host channel slots
//! - **Scratch**: Preallocated output region, zeroed per period
//! - **Timestamp**: Capture-time estimate and the first-buffer anchor
//! - **Diagnostics**: Lock-free note queue and atomic counters
//!
//! The callback never blocks, allocates, or logs.

mod callback;
mod diagnostics;
mod routing;
mod scratch;
mod timestamp;

pub use callback::{
    split_period, DeliveryDecision, PeriodHandler, PeriodTiming, StreamCallback, StreamSnapshot,
    SuppressReason,
};
pub use diagnostics::{
    note_queue, CallbackNote, NoteReceiver, NoteSender, PipelineCounters, PipelineStats,
    NOTE_QUEUE_CAPACITY,
};
pub use routing::{
    build_route, speaker_layout_for, Route, RouteTable, SpeakerLayout, MAX_HOST_CHANNELS, MUTED,
};
pub use scratch::{ScratchBuffer, MAX_PERIOD_FRAMES};
pub use timestamp::{capture_timestamp, Clock, FirstTimestampMark, MonotonicClock, NSEC_PER_SEC};
