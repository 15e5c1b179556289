//! Speech providers and audio output

pub mod backends;
pub mod playback;
pub mod provider;

pub use playback::{AudioDevice, AudioPlayer, RodioPlayer};
pub use provider::{BackendKind, Provider, ProviderFactory, VoiceRequest};
