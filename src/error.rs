//! Error types for ttsspeaker

use std::io;
use thiserror::Error;

/// Main error type for ttsspeaker
#[derive(Error, Debug)]
pub enum SpeakerError {
    /// A device, model, or credential could not be acquired
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Unknown TTS backend: {0}")]
    UnknownBackend(String),

    /// The cloud service rejected the credential (401/403)
    #[error("Authentication failed (HTTP {status}): {body}")]
    Auth { status: u16, body: String },

    /// The request failed or the service answered with a non-success status
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for ttsspeaker operations
pub type Result<T> = std::result::Result<T, SpeakerError>;

impl From<String> for SpeakerError {
    fn from(s: String) -> Self {
        SpeakerError::Other(s)
    }
}

impl From<&str> for SpeakerError {
    fn from(s: &str) -> Self {
        SpeakerError::Other(s.to_string())
    }
}
