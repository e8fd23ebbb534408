//! # route-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time channel routing from multi-channel audio drivers into a host
//! pipeline with a fixed, small channel count.
//!
//! A hardware interface may expose dozens of input channels. `route-audio`
//! opens one stream against it, copies a chosen subset of those channels onto
//! the host's output slots (muting the rest), stamps every period with its
//! estimated capture time, and hands the result to an [`AudioSink`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use route_audio::config::{apply_defaults, keys, Settings};
//! use route_audio::source::CpalDriver;
//! use route_audio::{AudioPacket, ChannelSink, RouteSession, SpeakerLayout};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::channel::<AudioPacket>(64);
//!
//! let mut session = RouteSession::for_layout(
//!     CpalDriver::preferred(),
//!     Arc::new(ChannelSink::new(tx)),
//!     SpeakerLayout::Stereo,
//! )
//! .on_event(|e| tracing::warn!(?e, "source event"));
//!
//! let mut settings = Settings::new();
//! apply_defaults(&mut settings, 2);
//! settings.set_string(keys::DEVICE_ID, "Focusrite USB ASIO");
//! settings.set_int(keys::BUFFER, 256);
//! settings.set_int(&keys::route(0), 4); // input 5 -> left
//! settings.set_int(&keys::route(1), 5); // input 6 -> right
//! session.apply_config(&settings);
//!
//! while let Some(packet) = rx.recv().await {
//!     // Hand to the mixer, encoder, etc.
//! }
//!
//! session.teardown();
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Driver Thread**: Calls the stream callback once per period. The
//!   callback never blocks, allocates, or logs; the [`AudioSink`] it calls
//!   decides its own budget ([`ChannelSink`] allocates one packet per period)
//! - **Configuration Thread**: Owns the [`RouteSession`]; opens, resets,
//!   and tears down streams, and logs what the callback noted
//!
//! Everything the callback reads is frozen in an immutable snapshot per
//! stream. Changing it means closing the stream and opening a new one, so the
//! callback never sees a half-applied configuration.

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Frame and channel arithmetic moves between usize, u16 and u32
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod chunk;
pub mod config;
mod error;
mod event;
pub mod format;
pub mod pipeline;
mod session;
mod sink;
pub mod source;

pub use chunk::{AudioPacket, SourceAudio, DELIVERED_FORMAT};
pub use config::{ConfigChange, Settings, SourceSettings};
pub use error::RouteAudioError;
pub use event::{event_callback, EventCallback, SourceEvent};
pub use format::{DriverFormat, HostFormat};
pub use pipeline::{
    build_route, speaker_layout_for, DeliveryDecision, PeriodHandler, Route, RouteTable,
    SpeakerLayout, StreamCallback, StreamSnapshot,
};
pub use session::{RouteSession, SessionState, SessionStats};
pub use sink::{AudioSink, ChannelSink};
pub use source::{
    default_input_device_name, list_input_devices, resolve_device_index, CpalDriver, Driver,
    DriverStream, MockDriver,
};
