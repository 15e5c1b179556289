//! ttsspeaker - one interface over three text-to-speech backends
//!
//! Speaks text through the operating system's voices, the ElevenLabs cloud
//! API, or a local XTTS voice-cloning model. Used from an interactive
//! command-line session or a small JSON web API.

pub mod cli;
pub mod config;
pub mod error;
pub mod platform;
pub mod session;
pub mod speech;
pub mod web;

pub use error::{Result, SpeakerError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "ttsspeaker";
