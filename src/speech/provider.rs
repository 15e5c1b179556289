//! Provider abstraction
//!
//! Gives the three backends one interface. Callers pick a [`BackendKind`],
//! ask the [`ProviderFactory`] for an instance, then list voices and speak
//! through [`Provider`] without knowing which backend sits behind it.

use super::backends::cloning::{CloningProvider, CloningSettings, VoiceCloner, XttsWorker};
use super::backends::cloud::{CloudProvider, CloudSettings, Transport, UreqTransport};
use super::backends::local::{LocalProvider, LocalSettings, NativeEngine, SpeechEngine};
use super::playback::{AudioDevice, AudioPlayer};
use crate::config::Config;
use crate::{Result, SpeakerError};
use log::{error, info};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Which synthesis backend a provider uses
///
/// Wire names follow the web page: `local`, `online`, `xtts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OS speech engine
    Local,
    /// Cloud voice API
    #[serde(rename = "online", alias = "cloud")]
    Cloud,
    /// Voice-cloning model
    #[serde(rename = "xtts", alias = "cloning")]
    Cloning,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Local, BackendKind::Cloud, BackendKind::Cloning];

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Cloud => "online",
            BackendKind::Cloning => "xtts",
        }
    }

    /// Human-readable menu label
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Local => "Local TTS (System voices)",
            BackendKind::Cloud => "Online TTS (ElevenLabs)",
            BackendKind::Cloning => "XTTS (Local AI model)",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = SpeakerError;

    /// Accepts wire names, descriptive names, and menu digits
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "local" => Ok(BackendKind::Local),
            "2" | "online" | "cloud" => Ok(BackendKind::Cloud),
            "3" | "xtts" | "cloning" => Ok(BackendKind::Cloning),
            other => Err(SpeakerError::UnknownBackend(other.to_string())),
        }
    }
}

/// Speaks text through one backend
///
/// Every call blocks until audio output has finished. The backend kind of an
/// instance never changes.
pub trait Provider: Send {
    fn kind(&self) -> BackendKind;

    /// The voice this instance is bound to, if one was selected
    fn voice(&self) -> Option<&str>;

    /// Available voice names, in a stable order
    fn list_voices(&self) -> Result<Vec<String>>;

    /// Synthesize and play `text` to completion
    fn speak(&mut self, text: &str) -> Result<()>;

    /// Set output volume (0.0 - 1.0); a no-op for backends without one
    fn set_volume(&mut self, _level: f32) -> Result<()> {
        Ok(())
    }

    /// Set speaking rate in words per minute; a no-op for backends without one
    fn set_rate(&mut self, _words_per_minute: u32) -> Result<()> {
        Ok(())
    }
}

/// Voice configuration requested at initialization
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VoiceRequest {
    pub voice_name: Option<String>,
    /// Only used by the cloning backend
    pub reference_audio: Option<PathBuf>,
}

impl VoiceRequest {
    pub fn named(voice_name: impl Into<String>) -> Self {
        Self {
            voice_name: Some(voice_name.into()),
            reference_audio: None,
        }
    }

    pub fn with_reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_audio = Some(path.into());
        self
    }
}

type EngineBuilder = dyn Fn() -> Result<Box<dyn SpeechEngine>> + Send + Sync;

type ClonerLoader = dyn Fn(&CloningSettings) -> Result<Arc<dyn VoiceCloner>> + Send + Sync;

fn native_engine() -> Result<Box<dyn SpeechEngine>> {
    Ok(Box::new(NativeEngine::new()?))
}

fn xtts_worker(settings: &CloningSettings) -> Result<Arc<dyn VoiceCloner>> {
    Ok(Arc::new(XttsWorker::load(settings)?))
}

/// Creates providers and owns the resources they share
///
/// The audio device, HTTP transport, and the cloning model are created once
/// per factory; the model is loaded on first use and then reused.
pub struct ProviderFactory {
    local: LocalSettings,
    cloud: CloudSettings,
    cloning: CloningSettings,
    device: AudioDevice,
    transport: Arc<dyn Transport>,
    engine: Arc<EngineBuilder>,
    cloner_loader: Arc<ClonerLoader>,
    cloner: OnceCell<Arc<dyn VoiceCloner>>,
}

impl ProviderFactory {
    pub fn new(local: LocalSettings, cloud: CloudSettings, cloning: CloningSettings) -> Self {
        Self {
            local,
            cloud,
            cloning,
            device: AudioDevice::system(),
            transport: Arc::new(UreqTransport::new()),
            engine: Arc::new(native_engine),
            cloner_loader: Arc::new(xtts_worker),
            cloner: OnceCell::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.local_settings(),
            config.cloud_settings(),
            config.cloning_settings(),
        )
    }

    /// Use `player` for cloud and cloning output
    pub fn with_player(mut self, player: Arc<dyn AudioPlayer>) -> Self {
        self.device = AudioDevice::new(player);
        self
    }

    /// Use `transport` for cloud requests
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Build local engines with `builder` instead of the OS engine
    pub fn with_engine<F>(mut self, builder: F) -> Self
    where
        F: Fn() -> Result<Box<dyn SpeechEngine>> + Send + Sync + 'static,
    {
        self.engine = Arc::new(builder);
        self
    }

    /// Load the cloning model with `loader` instead of the XTTS worker
    ///
    /// The loader still runs at most once per factory.
    pub fn with_cloner_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&CloningSettings) -> Result<Arc<dyn VoiceCloner>> + Send + Sync + 'static,
    {
        self.cloner_loader = Arc::new(loader);
        self.cloner = OnceCell::new();
        self
    }

    /// Use an already loaded cloning model
    pub fn with_cloner(self, cloner: Arc<dyn VoiceCloner>) -> Self {
        self.with_cloner_loader(move |_| Ok(cloner.clone()))
    }

    /// The cloning model, loading it on first use
    ///
    /// A failed load is not cached; the next request tries again.
    fn cloner(&self) -> Result<Arc<dyn VoiceCloner>> {
        self.cloner
            .get_or_try_init(|| {
                info!("Loading voice cloning model {}", self.cloning.model_name);
                (self.cloner_loader)(&self.cloning)
            })
            .cloned()
    }

    /// Create a provider of `kind` bound to the requested voice
    ///
    /// Fails with `BackendUnavailable` when the engine, model, or reference
    /// audio cannot be acquired. A missing cloud credential is not detected
    /// here.
    pub fn initialize(&self, kind: BackendKind, request: &VoiceRequest) -> Result<Box<dyn Provider>> {
        let voice = request.voice_name.as_deref();

        let provider: Result<Box<dyn Provider>> = match kind {
            BackendKind::Local => (self.engine)().and_then(|engine| {
                let provider =
                    LocalProvider::with_engine(engine, voice, self.local.clone(), self.device.clone())?;
                Ok(Box::new(provider) as Box<dyn Provider>)
            }),
            BackendKind::Cloud => Ok(Box::new(CloudProvider::new(
                voice,
                self.cloud.clone(),
                self.transport.clone(),
                self.device.clone(),
            ))),
            BackendKind::Cloning => self.cloner().and_then(|model| {
                let provider = CloningProvider::new(
                    model,
                    request.reference_audio.as_deref(),
                    self.cloning.clone(),
                    self.device.clone(),
                )?;
                Ok(Box::new(provider) as Box<dyn Provider>)
            }),
        };

        match &provider {
            Ok(_) => info!("✓ Initialized {} backend (voice: {:?})", kind, voice),
            Err(e) => error!("✗ {} backend unavailable: {}", kind, e),
        }
        provider
    }

    /// Voices offered by `kind`, via a throwaway unconfigured provider
    pub fn list_voices(&self, kind: BackendKind) -> Result<Vec<String>> {
        let provider = self.initialize(kind, &VoiceRequest::default())?;
        provider.list_voices()
    }
}
