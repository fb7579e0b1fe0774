//! Core library for talking to NetMD MiniDisc recorders.
//!
//! The crate is split along the layers of a session with a recorder:
//! fixed command frames and reply offsets ([`frame`]), the byte transport
//! underneath them ([`transport`]), one-request-per-call device queries
//! ([`device`]), the group mini-language kept in the disc title ([`title`]),
//! atomic group edits ([`disc`]) and the recording sequence ([`upload`]).
//! [`emulator`] provides an in-memory recorder for tests and the CLI.

pub mod config;
pub mod device;
pub mod disc;
pub mod emulator;
pub mod error;
pub mod frame;
pub mod title;
pub mod transport;
pub mod upload;

pub use config::{AppConfig, DeviceConfig, TimeoutConfig};
pub use device::{Encoding, NetMdDevice, PlaybackPosition, Protection, TrackInfo, TrackTime};
pub use disc::Disc;
pub use emulator::{DiscImage, EmulatedDevice, EmulatedTrack};
pub use error::{NetMdError, Result};
pub use title::Group;
pub use transport::Transport;
pub use upload::{Upload, UploadReport, UploadState};
