//! Speech backends

// System voices via the tts crate
pub mod local;

// ElevenLabs text-to-speech API
pub mod cloud;

// XTTS voice cloning via the Coqui CLI
pub mod cloning;
