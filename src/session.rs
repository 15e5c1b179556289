//! Session registry for the web API
//!
//! Maps a session id to an initialized provider so several callers can hold
//! different configurations at once. Each provider sits behind its own
//! mutex; playback across sessions is serialized by the shared
//! [`AudioDevice`](crate::speech::AudioDevice).

use crate::speech::{BackendKind, Provider, ProviderFactory, VoiceRequest};
use crate::{Result, SpeakerError};
use log::{debug, info};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Namespace for configuration-derived session ids
const SESSION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_1f4e_8d2a_4c3b_9a57_0e2d_5b8c_7a10);

/// How session ids are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionKeyPolicy {
    /// Same configuration, same id; the existing provider is reused
    #[default]
    Deterministic,
    /// A fresh random id and provider for every init
    Unique,
}

impl FromStr for SessionKeyPolicy {
    type Err = SpeakerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deterministic" => Ok(SessionKeyPolicy::Deterministic),
            "unique" => Ok(SessionKeyPolicy::Unique),
            other => Err(SpeakerError::Config(format!(
                "Unknown session key policy: {}",
                other
            ))),
        }
    }
}

/// Everything that identifies a session's provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionConfig {
    pub kind: BackendKind,
    pub request: VoiceRequest,
}

impl SessionConfig {
    /// Stable id for this configuration
    ///
    /// Fields are separated by a control character so ("ab", "c") and
    /// ("a", "bc") never collide.
    pub fn derived_id(&self) -> String {
        let reference = self
            .request
            .reference_audio
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!(
            "{}\u{1f}{}\u{1f}{}",
            self.kind.as_str(),
            self.request.voice_name.as_deref().unwrap_or(""),
            reference
        );
        Uuid::new_v5(&SESSION_NAMESPACE, name.as_bytes()).to_string()
    }
}

type SharedProvider = Arc<Mutex<Box<dyn Provider>>>;

fn lock_provider(provider: &SharedProvider) -> MutexGuard<'_, Box<dyn Provider>> {
    provider.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Live sessions keyed by id
pub struct SessionRegistry {
    factory: Arc<ProviderFactory>,
    policy: SessionKeyPolicy,
    sessions: Mutex<HashMap<String, SharedProvider>>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<ProviderFactory>, policy: SessionKeyPolicy) -> Self {
        Self {
            factory,
            policy,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SharedProvider>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup(&self, session_id: &str) -> Option<SharedProvider> {
        self.sessions().get(session_id).cloned()
    }

    /// Initialize a provider for `config` and register it
    ///
    /// Returns the session id. Under the deterministic policy an existing
    /// session with the same configuration is returned as is.
    pub fn init(&self, config: &SessionConfig) -> Result<String> {
        let session_id = match self.policy {
            SessionKeyPolicy::Deterministic => config.derived_id(),
            SessionKeyPolicy::Unique => Uuid::new_v4().to_string(),
        };

        if self.lookup(&session_id).is_some() {
            debug!("Reusing session {}", session_id);
            return Ok(session_id);
        }

        // Model loading can be slow; don't hold the registry lock for it
        let provider = self.factory.initialize(config.kind, &config.request)?;
        self.sessions()
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(provider)));

        info!("Registered {} session {}", config.kind, session_id);
        Ok(session_id)
    }

    /// Voices offered by `kind`; no session is created
    pub fn voices(&self, kind: BackendKind) -> Result<Vec<String>> {
        self.factory.list_voices(kind)
    }

    /// Speak through an existing session
    ///
    /// `volume` only has an effect on the local backend. An unknown id fails
    /// with `SessionNotFound` before anything is synthesized.
    pub fn speak(&self, session_id: &str, text: &str, volume: Option<f32>) -> Result<()> {
        let provider = self.lookup(session_id).ok_or(SpeakerError::SessionNotFound)?;
        let mut provider = lock_provider(&provider);

        if let Some(level) = volume {
            provider.set_volume(level)?;
        }
        provider.speak(text)
    }

    /// End a session and release its provider
    ///
    /// Waits for a speak call in progress on the session to finish. Returns
    /// the backend kind the session used.
    pub fn end(&self, session_id: &str) -> Result<BackendKind> {
        let provider = self
            .sessions()
            .remove(session_id)
            .ok_or(SpeakerError::SessionNotFound)?;
        let kind = lock_provider(&provider).kind();
        info!("Ended {} session {}", kind, session_id);
        Ok(kind)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}
