//! # muse-stream
//!
//! Decoder and dejittering timestamp engine for classic
//! [Interaxon Muse](https://choosemuse.com/) headbands streaming EEG over
//! Bluetooth Low Energy.
//!
//! The headset notifies each electrode on its own GATT characteristic, 12
//! samples at a time, tagged with a 16-bit block counter. This crate turns
//! those notifications into complete 5 × 12 sample blocks stamped on the host
//! clock, with the stamps regressed against arrival times so BLE jitter does
//! not leak into sample spacing.
//!
//! ## Quick start
//!
//! ```no_run
//! use muse_stream::prelude::*;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = MuseClient::new(MuseClientConfig::default());
//!     let (notifications, handle) = client.connect().await?;
//!
//!     let (tx, mut events) = mpsc::unbounded_channel();
//!     tokio::spawn(Session::new(SessionConfig::default()).run(notifications, tx));
//!     handle.start().await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let SessionEvent::Sample(s) = event {
//!             println!("{:.3}: {:?}", s.last_timestamp(), s.channel(Electrode::Af7));
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`parse`] | Pure payload decoders for EEG, control, and telemetry notifications |
//! | [`assembler`] | Per-electrode frames → multi-channel blocks |
//! | [`gap`] | Hardware counter continuity |
//! | [`clock`] | Sample index → host clock regression |
//! | [`control`] | Control reply reassembly |
//! | [`session`] | The per-connection pipeline and its [`session::Sink`] output |
//! | [`muse_client`] | btleplug scanning, connecting, and the [`muse_client::MuseHandle`] command API |
//! | [`protocol`] | UUIDs, handles, constants, command encoding |
//! | [`types`] | Data and event types |

pub mod assembler;
pub mod clock;
pub mod control;
pub mod error;
pub mod gap;
pub mod muse_client;
pub mod parse;
pub mod protocol;
pub mod session;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    pub use crate::muse_client::{MuseClient, MuseClientConfig, MuseDevice, MuseHandle};

    pub use crate::assembler::FlushPolicy;
    pub use crate::error::DecodeError;
    pub use crate::session::{Session, SessionConfig, Sink};
    pub use crate::types::{
        Channel, CompletedSample, ControlResponse, Diagnostic, EegSample, Electrode, GapOutcome,
        RawNotification, SessionEvent, Telemetry,
    };

    pub use crate::protocol::{EEG_CHANNEL_NAMES, EEG_FREQUENCY, EEG_SAMPLES_PER_READING};
}
