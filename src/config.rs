//! Configuration management
//!
//! Settings live in an INI file (`~/.ttsspeaker.cfg`) and are read once at
//! start-up. The cloud API key may also come from `ELEVENLABS_API_KEY`,
//! which wins over the file.

use crate::session::SessionKeyPolicy;
use crate::speech::backends::cloning::{self, CloningSettings};
use crate::speech::backends::cloud::{self, CloudSettings, VoiceCatalog};
use crate::speech::backends::local::{self, LocalSettings};
use crate::{Result, SpeakerError};
use ini::Ini;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Environment variable holding the cloud API key
pub const API_KEY_ENV: &str = "ELEVENLABS_API_KEY";

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:5000";

/// Settings for the web API
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub address: String,
    pub session_keys: SessionKeyPolicy,
}

/// Application configuration
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Where the file was loaded from, if anywhere
    path: Option<PathBuf>,

    /// Key from the environment, overriding `[cloud] api_key`
    env_api_key: Option<String>,
}

impl Config {
    /// Load `~/.ttsspeaker.cfg`, creating it with defaults if missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            info!("Config file not found, creating default at {:?}", path);
            Self::default_ini()
                .write_to_file(&path)
                .map_err(|e| SpeakerError::IniParse(format!("Failed to write config: {}", e)))?;
        }
        Self::load_from(&path)
    }

    /// Load a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let ini = Ini::load_from_file(path)
            .map_err(|e| SpeakerError::IniParse(format!("Failed to load config: {}", e)))?;

        Ok(Self {
            ini,
            path: Some(path.to_path_buf()),
            env_api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
        })
    }

    /// Build from already parsed INI, ignoring the environment
    pub fn from_ini(ini: Ini) -> Self {
        Self {
            ini,
            path: None,
            env_api_key: None,
        }
    }

    /// Get config file path (~/.ttsspeaker.cfg)
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ttsspeaker.cfg")
    }

    /// Where the config was read from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create default configuration
    pub fn default_ini() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("local"))
            .set("rate", local::DEFAULT_RATE_WPM.to_string())
            .set("volume", "1.0");

        ini.with_section(Some("cloud"))
            .set("api_key", "")
            .set("base_url", cloud::DEFAULT_BASE_URL)
            .set("model_id", cloud::DEFAULT_MODEL_ID)
            .set("stability", "0.5")
            .set("similarity_boost", "0.5")
            .set("default_voice", cloud::DEFAULT_VOICE_NAME);

        ini.with_section(Some("voices"))
            .set("Rachel", "21m00Tcm4TlvDq8ikWAM")
            .set("Domi", "AZnzlk1XvdvUeBnXmlld")
            .set("Bella", "EXAVITQu4vr4xnSDxMaL")
            .set("Antoni", "ErXwobaYiN019PkySvjV");

        ini.with_section(Some("cloning"))
            .set("python", cloning::DEFAULT_PYTHON)
            .set("model_name", cloning::DEFAULT_MODEL_NAME)
            .set("language", cloning::DEFAULT_LANGUAGE);

        ini.with_section(Some("server"))
            .set("address", DEFAULT_ADDRESS)
            .set("session_keys", "deterministic");

        ini
    }

    /// Get a string value; empty values count as missing
    pub fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get_from(Some(section), key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.parsed(section, key).unwrap_or(default)
    }

    /// Get an unsigned integer value from config
    pub fn get_u32(&self, section: &str, key: &str, default: u32) -> u32 {
        self.parsed(section, key).unwrap_or(default)
    }

    fn parsed<T: std::str::FromStr>(&self, section: &str, key: &str) -> Option<T> {
        let raw = self.get_string(section, key)?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid [{}] {} = {:?}", section, key, raw);
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    /// Cloud API key, environment first
    pub fn api_key(&self) -> Option<String> {
        self.env_api_key
            .clone()
            .or_else(|| self.get_string("cloud", "api_key"))
    }

    /// Voice catalog from `[voices]`, in file order
    pub fn voice_catalog(&self) -> VoiceCatalog {
        let default_voice = self
            .get_string("cloud", "default_voice")
            .unwrap_or_else(|| cloud::DEFAULT_VOICE_NAME.to_string());

        let entries: Vec<(String, String)> = match self.ini.section(Some("voices")) {
            Some(section) => section
                .iter()
                .map(|(name, id)| (name.to_string(), id.trim().to_string()))
                .filter(|(_, id)| !id.is_empty())
                .collect(),
            None => Vec::new(),
        };

        if entries.is_empty() {
            debug!("No [voices] configured, using built-in catalog");
            return VoiceCatalog::default();
        }
        VoiceCatalog::new(entries, &default_voice)
    }

    pub fn local_settings(&self) -> LocalSettings {
        let defaults = LocalSettings::default();
        LocalSettings {
            rate: self.get_u32("local", "rate", defaults.rate),
            volume: self.get_float("local", "volume", defaults.volume),
        }
    }

    pub fn cloud_settings(&self) -> CloudSettings {
        let defaults = CloudSettings::default();
        CloudSettings {
            api_key: self.api_key(),
            base_url: self.get_string("cloud", "base_url").unwrap_or(defaults.base_url),
            model_id: self.get_string("cloud", "model_id").unwrap_or(defaults.model_id),
            stability: self.get_float("cloud", "stability", defaults.stability),
            similarity_boost: self.get_float("cloud", "similarity_boost", defaults.similarity_boost),
            voices: self.voice_catalog(),
        }
    }

    pub fn cloning_settings(&self) -> CloningSettings {
        let defaults = CloningSettings::default();
        CloningSettings {
            python: self.get_string("cloning", "python").unwrap_or(defaults.python),
            model_name: self.get_string("cloning", "model_name").unwrap_or(defaults.model_name),
            language: self.get_string("cloning", "language").unwrap_or(defaults.language),
            temp_dir: self.get_string("cloning", "temp_dir").map(PathBuf::from),
        }
    }

    pub fn server_settings(&self) -> ServerSettings {
        let session_keys = self
            .parsed("server", "session_keys")
            .unwrap_or_default();
        ServerSettings {
            address: self
                .get_string("server", "address")
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            session_keys,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_ini(Self::default_ini())
    }
}
