//! Cloud voice backend (ElevenLabs text-to-speech API)
//!
//! Each speak call POSTs the text to `{base_url}/{voice_id}` and plays the
//! returned MP3 from memory. Nothing is retried.

use crate::speech::playback::AudioDevice;
use crate::speech::{BackendKind, Provider};
use crate::{Result, SpeakerError};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
pub const DEFAULT_MODEL_ID: &str = "eleven_monolingual_v1";
pub const DEFAULT_VOICE_NAME: &str = "Rachel";
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

/// Ordered mapping from display name to provider voice id
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceCatalog {
    entries: Vec<(String, String)>,
    fallback_id: String,
}

impl VoiceCatalog {
    /// Build a catalog; `fallback` names the entry used for unknown voices
    ///
    /// If `fallback` isn't in the catalog, Rachel's id is used.
    pub fn new(entries: Vec<(String, String)>, fallback: &str) -> Self {
        let fallback_id = entries
            .iter()
            .find(|(name, _)| name == fallback)
            .map(|(_, id)| id.clone())
            .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string());
        Self {
            entries,
            fallback_id,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Voice id for `name`, or the fallback id
    pub fn resolve(&self, name: Option<&str>) -> &str {
        name.and_then(|wanted| {
            self.entries
                .iter()
                .find(|(n, _)| n == wanted)
                .map(|(_, id)| id.as_str())
        })
        .unwrap_or(&self.fallback_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        let entries = [
            ("Rachel", "21m00Tcm4TlvDq8ikWAM"),
            ("Domi", "AZnzlk1XvdvUeBnXmlld"),
            ("Bella", "EXAVITQu4vr4xnSDxMaL"),
            ("Antoni", "ErXwobaYiN019PkySvjV"),
        ]
        .iter()
        .map(|(n, id)| (n.to_string(), id.to_string()))
        .collect();
        Self::new(entries, DEFAULT_VOICE_NAME)
    }
}

/// Settings for the cloud backend
#[derive(Debug, Clone, PartialEq)]
pub struct CloudSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub voices: VoiceCatalog,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            stability: 0.5,
            similarity_boost: 0.5,
            voices: VoiceCatalog::default(),
        }
    }
}

/// JSON body of a synthesis request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub model_id: String,
    pub voice_settings: VoiceSettings,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

/// Status and body of an HTTP reply, whatever the status
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends synthesis requests to the service
///
/// Returns `Err` only when no HTTP response was obtained; error statuses
/// come back as an `HttpReply`.
pub trait Transport: Send + Sync {
    fn post(&self, url: &str, api_key: &str, request: &SynthesisRequest) -> Result<HttpReply>;
}

/// Blocking HTTP transport over ureq
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn read_body(response: ureq::Response) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|e| SpeakerError::Transport(format!("Failed to read response: {}", e)))?;
    Ok(body)
}

impl Transport for UreqTransport {
    fn post(&self, url: &str, api_key: &str, request: &SynthesisRequest) -> Result<HttpReply> {
        debug!("POST {}", url);
        let result = self
            .agent
            .post(url)
            .set("Accept", "audio/mpeg")
            .set("xi-api-key", api_key)
            .send_json(request);

        match result {
            Ok(response) => {
                let status = response.status();
                Ok(HttpReply {
                    status,
                    body: read_body(response)?,
                })
            }
            Err(ureq::Error::Status(status, response)) => Ok(HttpReply {
                status,
                body: read_body(response)?,
            }),
            Err(ureq::Error::Transport(e)) => Err(SpeakerError::Transport(e.to_string())),
        }
    }
}

/// Provider speaking through the cloud API
pub struct CloudProvider {
    settings: CloudSettings,
    voice_name: Option<String>,
    voice_id: String,
    transport: Arc<dyn Transport>,
    device: AudioDevice,
}

impl CloudProvider {
    /// Bind a provider to `voice_name`
    ///
    /// A missing API key is not an error here; the service rejects the
    /// first request instead.
    pub fn new(
        voice_name: Option<&str>,
        settings: CloudSettings,
        transport: Arc<dyn Transport>,
        device: AudioDevice,
    ) -> Self {
        if settings.api_key.as_deref().map_or(true, str::is_empty) {
            warn!("No cloud API key configured; requests will be rejected");
        }

        let voice_id = settings.voices.resolve(voice_name).to_string();
        info!("Cloud voice {:?} -> {}", voice_name, voice_id);

        Self {
            voice_name: voice_name.map(str::to_string),
            voice_id,
            settings,
            transport,
            device,
        }
    }

    /// Full request URL for the bound voice
    pub fn url(&self) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), self.voice_id)
    }

    fn request(&self, text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            model_id: self.settings.model_id.clone(),
            voice_settings: VoiceSettings {
                stability: self.settings.stability,
                similarity_boost: self.settings.similarity_boost,
            },
        }
    }

    /// Fetch synthesized audio without playing it
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let api_key = self.settings.api_key.as_deref().unwrap_or("");
        let reply = self.transport.post(&self.url(), api_key, &self.request(text))?;

        match reply.status {
            200 => Ok(reply.body),
            401 | 403 => Err(SpeakerError::Auth {
                status: reply.status,
                body: String::from_utf8_lossy(&reply.body).into_owned(),
            }),
            status => Err(SpeakerError::Transport(format!(
                "HTTP {}: {}",
                status,
                String::from_utf8_lossy(&reply.body)
            ))),
        }
    }
}

impl Provider for CloudProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    fn voice(&self) -> Option<&str> {
        self.voice_name.as_deref()
    }

    fn list_voices(&self) -> Result<Vec<String>> {
        Ok(self.settings.voices.names())
    }

    fn speak(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        let held = self.device.exclusive();
        let audio = self.synthesize(text).map_err(|e| {
            error!("Cloud TTS error: {}", e);
            e
        })?;
        debug!("Received {} bytes of audio", audio.len());
        self.device.play_bytes(&held, audio)
    }
}
