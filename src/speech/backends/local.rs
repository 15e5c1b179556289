//! System voice backend using the tts crate
//!
//! The `tts` crate gives a unified interface to:
//! - Speech Dispatcher on Linux
//! - AVFoundation on macOS
//! - WinRT/SAPI on Windows
//!
//! The OS engine is reached through [`SpeechEngine`] so voice selection and
//! volume handling can be exercised without an audio stack.

use crate::speech::playback::AudioDevice;
use crate::speech::{BackendKind, Provider};
use crate::{Result, SpeakerError};
use log::{debug, error, info, warn};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use tts::Tts as TtsCrate;

/// Speaking rate used when nothing else is configured
pub const DEFAULT_RATE_WPM: u32 = 150;

/// Rate the engines treat as "normal" speed
const NORMAL_RATE_WPM: f32 = 200.0;

/// Poll interval for engines without utterance callbacks
const SPEAKING_POLL: Duration = Duration::from_millis(100);

/// Settings for the local backend
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSettings {
    /// Words per minute
    pub rate: u32,
    /// 0.0 - 1.0
    pub volume: f32,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE_WPM,
            volume: 1.0,
        }
    }
}

/// Operations the local provider needs from an OS speech engine
pub trait SpeechEngine: Send {
    /// Names of the installed voices, in enumeration order
    fn voice_names(&self) -> Result<Vec<String>>;

    /// Switch to the voice at `index` in [`SpeechEngine::voice_names`]
    fn select_voice(&mut self, index: usize) -> Result<()>;

    /// Set speaking rate in words per minute
    fn set_rate(&mut self, words_per_minute: u32) -> Result<()>;

    /// Set volume (0.0 - 1.0)
    fn set_volume(&mut self, level: f32) -> Result<()>;

    /// Speak `text` and return once the engine reports the utterance ended
    fn speak_to_end(&mut self, text: &str) -> Result<()>;
}

/// Find the first voice whose name contains `wanted`
///
/// Matching is a plain substring test, so "Zira" picks
/// "Microsoft Zira Desktop". A blank name matches nothing.
pub fn pick_voice(voices: &[String], wanted: &str) -> Option<usize> {
    if wanted.trim().is_empty() {
        return None;
    }
    voices.iter().position(|name| name.contains(wanted))
}

/// Map words per minute onto the engine's native rate range
fn rate_to_native(words_per_minute: u32, min: f32, normal: f32, max: f32) -> f32 {
    let native = normal * (words_per_minute as f32 / NORMAL_RATE_WPM);
    native.clamp(min, max)
}

/// Map a 0.0 - 1.0 level onto the engine's native volume range
fn volume_to_native(level: f32, min: f32, max: f32) -> f32 {
    min + (max - min) * level
}

/// Clamp a requested volume into 0.0 - 1.0
///
/// Non-finite input maps to full volume.
pub fn clamp_volume(level: f32) -> f32 {
    if !level.is_finite() {
        warn!("Ignoring non-finite volume {}, using 1.0", level);
        return 1.0;
    }
    if !(0.0..=1.0).contains(&level) {
        warn!("Volume {} out of range, clamping", level);
    }
    level.clamp(0.0, 1.0)
}

/// OS speech engine via the tts crate
pub struct NativeEngine {
    tts: TtsCrate,

    /// Voices as enumerated at creation, matching `voice_names` order
    voices: Vec<tts::Voice>,

    /// Utterance-end notifications, when the platform supports them
    finished: Option<Receiver<()>>,
}

impl NativeEngine {
    /// Initialize the platform TTS engine
    pub fn new() -> Result<Self> {
        debug!("Creating native TTS engine");

        let tts = TtsCrate::default().map_err(|e| {
            SpeakerError::BackendUnavailable(format!("Failed to initialize TTS: {}", e))
        })?;

        let features = tts.supported_features();
        let voices = if features.voice {
            tts.voices()
                .map_err(|e| SpeakerError::Synthesis(format!("Failed to get voices: {}", e)))?
        } else {
            warn!("Voice enumeration not supported on this platform");
            Vec::new()
        };

        let finished = if features.utterance_callbacks {
            let (tx, rx) = mpsc::channel();
            tts.on_utterance_end(Some(Box::new(move |_utterance| {
                let _ = tx.send(());
            })))
            .map_err(|e| SpeakerError::Synthesis(format!("Failed to register callback: {}", e)))?;
            Some(rx)
        } else {
            None
        };

        debug!("Native TTS engine created with {} voices", voices.len());

        Ok(Self {
            tts,
            voices,
            finished,
        })
    }

    fn wait_until_done(&self) -> Result<()> {
        if let Some(rx) = &self.finished {
            return rx.recv().map_err(|_| {
                SpeakerError::Synthesis("Speech engine stopped reporting progress".to_string())
            });
        }

        if !self.tts.supported_features().is_speaking {
            warn!("Engine cannot report completion; returning immediately");
            return Ok(());
        }

        while self
            .tts
            .is_speaking()
            .map_err(|e| SpeakerError::Synthesis(format!("Failed to query engine: {}", e)))?
        {
            std::thread::sleep(SPEAKING_POLL);
        }
        Ok(())
    }
}

impl SpeechEngine for NativeEngine {
    fn voice_names(&self) -> Result<Vec<String>> {
        Ok(self.voices.iter().map(|v| v.name()).collect())
    }

    fn select_voice(&mut self, index: usize) -> Result<()> {
        let voice = self.voices.get(index).ok_or_else(|| {
            SpeakerError::Synthesis(format!(
                "Voice index {} out of range (have {} voices)",
                index,
                self.voices.len()
            ))
        })?;

        debug!("Selecting voice: {}", voice.name());
        self.tts
            .set_voice(voice)
            .map_err(|e| SpeakerError::Synthesis(format!("Failed to set voice: {}", e)))
    }

    fn set_rate(&mut self, words_per_minute: u32) -> Result<()> {
        if !self.tts.supported_features().rate {
            warn!("Rate control not supported on this platform");
            return Ok(());
        }

        let native = rate_to_native(
            words_per_minute,
            self.tts.min_rate(),
            self.tts.normal_rate(),
            self.tts.max_rate(),
        );
        debug!("Setting rate to {} wpm (native {})", words_per_minute, native);
        self.tts
            .set_rate(native)
            .map_err(|e| SpeakerError::Synthesis(format!("Failed to set rate: {}", e)))?;
        Ok(())
    }

    fn set_volume(&mut self, level: f32) -> Result<()> {
        if !self.tts.supported_features().volume {
            warn!("Volume control not supported on this platform");
            return Ok(());
        }

        let native = volume_to_native(level, self.tts.min_volume(), self.tts.max_volume());
        self.tts
            .set_volume(native)
            .map_err(|e| SpeakerError::Synthesis(format!("Failed to set volume: {}", e)))?;
        Ok(())
    }

    fn speak_to_end(&mut self, text: &str) -> Result<()> {
        // Drop notifications left over from an earlier utterance
        if let Some(rx) = &self.finished {
            while rx.try_recv().is_ok() {}
        }

        self.tts.speak(text, false).map_err(|e| {
            error!("Failed to speak: {}", e);
            SpeakerError::Synthesis(format!("Speak failed: {}", e))
        })?;

        self.wait_until_done()
    }
}

/// Provider speaking through an OS voice
pub struct LocalProvider {
    engine: Box<dyn SpeechEngine>,

    /// Name of the voice picked at creation; `None` is the engine default
    voice: Option<String>,

    settings: LocalSettings,

    device: AudioDevice,
}

impl LocalProvider {
    /// Create a provider over an engine, selecting `voice_name` if given
    ///
    /// An unmatched voice name silently keeps the engine default.
    pub fn with_engine(
        mut engine: Box<dyn SpeechEngine>,
        voice_name: Option<&str>,
        settings: LocalSettings,
        device: AudioDevice,
    ) -> Result<Self> {
        let mut voice = None;

        if let Some(wanted) = voice_name.filter(|name| !name.trim().is_empty()) {
            let names = engine.voice_names()?;
            match pick_voice(&names, wanted) {
                Some(idx) => {
                    engine.select_voice(idx)?;
                    info!("Selected local voice {:?}", names[idx]);
                    voice = Some(names[idx].clone());
                }
                None => debug!("No voice matches {:?}, keeping engine default", wanted),
            }
        }

        let volume = clamp_volume(settings.volume);
        engine.set_rate(settings.rate)?;
        engine.set_volume(volume)?;

        Ok(Self {
            engine,
            voice,
            settings: LocalSettings { volume, ..settings },
            device,
        })
    }

    #[cfg(test)]
    fn settings(&self) -> &LocalSettings {
        &self.settings
    }
}

impl Provider for LocalProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    fn list_voices(&self) -> Result<Vec<String>> {
        self.engine.voice_names()
    }

    fn speak(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        debug!("Speaking locally: {}", text);
        let _held = self.device.exclusive();
        self.engine.speak_to_end(text)
    }

    fn set_volume(&mut self, level: f32) -> Result<()> {
        let level = clamp_volume(level);
        self.engine.set_volume(level)?;
        self.settings.volume = level;
        Ok(())
    }

    fn set_rate(&mut self, words_per_minute: u32) -> Result<()> {
        self.engine.set_rate(words_per_minute)?;
        self.settings.rate = words_per_minute;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::speech::playback::AudioPlayer;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// What a [`FakeEngine`] was asked to do
    #[derive(Debug, Default)]
    pub(crate) struct EngineLog {
        pub selected: Option<usize>,
        pub rate: Option<u32>,
        pub volume: Option<f32>,
        pub spoken: Vec<String>,
    }

    pub(crate) struct FakeEngine {
        pub voices: Vec<String>,
        pub log: Arc<Mutex<EngineLog>>,
    }

    impl FakeEngine {
        pub(crate) fn new(voices: &[&str]) -> (Self, Arc<Mutex<EngineLog>>) {
            let log = Arc::new(Mutex::new(EngineLog::default()));
            let engine = Self {
                voices: voices.iter().map(|v| v.to_string()).collect(),
                log: log.clone(),
            };
            (engine, log)
        }
    }

    impl SpeechEngine for FakeEngine {
        fn voice_names(&self) -> Result<Vec<String>> {
            Ok(self.voices.clone())
        }

        fn select_voice(&mut self, index: usize) -> Result<()> {
            self.log.lock().unwrap().selected = Some(index);
            Ok(())
        }

        fn set_rate(&mut self, words_per_minute: u32) -> Result<()> {
            self.log.lock().unwrap().rate = Some(words_per_minute);
            Ok(())
        }

        fn set_volume(&mut self, level: f32) -> Result<()> {
            self.log.lock().unwrap().volume = Some(level);
            Ok(())
        }

        fn speak_to_end(&mut self, text: &str) -> Result<()> {
            self.log.lock().unwrap().spoken.push(text.to_string());
            Ok(())
        }
    }

    struct SilentPlayer;

    impl AudioPlayer for SilentPlayer {
        fn play_bytes(&self, _audio: Vec<u8>) -> Result<()> {
            Ok(())
        }
        fn play_file(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn device() -> AudioDevice {
        AudioDevice::new(Arc::new(SilentPlayer))
    }

    const WINDOWS_VOICES: [&str; 2] = ["Microsoft David Desktop", "Microsoft Zira Desktop"];

    #[test]
    fn test_pick_voice_substring() {
        let voices: Vec<String> = WINDOWS_VOICES.iter().map(|v| v.to_string()).collect();
        assert_eq!(pick_voice(&voices, "Zira"), Some(1));
        assert_eq!(pick_voice(&voices, "Microsoft"), Some(0));
        assert_eq!(pick_voice(&voices, "Nonexistent"), None);
        assert_eq!(pick_voice(&voices, ""), None);
        assert_eq!(pick_voice(&voices, "  "), None);
    }

    #[test]
    fn test_blank_voice_name_keeps_default() {
        for blank in ["", "   "] {
            let (engine, log) = FakeEngine::new(&WINDOWS_VOICES);
            let provider = LocalProvider::with_engine(
                Box::new(engine),
                Some(blank),
                LocalSettings::default(),
                device(),
            )
            .unwrap();

            assert_eq!(provider.voice(), None);
            assert_eq!(log.lock().unwrap().selected, None);
        }
    }

    #[test]
    fn test_selects_matching_voice() {
        let (engine, log) = FakeEngine::new(&WINDOWS_VOICES);
        let provider =
            LocalProvider::with_engine(Box::new(engine), Some("Zira"), LocalSettings::default(), device())
                .unwrap();

        assert_eq!(provider.voice(), Some("Microsoft Zira Desktop"));
        assert_eq!(log.lock().unwrap().selected, Some(1));
    }

    #[test]
    fn test_unknown_voice_keeps_default() {
        let (engine, log) = FakeEngine::new(&WINDOWS_VOICES);
        let provider = LocalProvider::with_engine(
            Box::new(engine),
            Some("Nonexistent"),
            LocalSettings::default(),
            device(),
        )
        .unwrap();

        assert_eq!(provider.voice(), None);
        assert_eq!(log.lock().unwrap().selected, None);
    }

    #[test]
    fn test_defaults_applied_on_creation() {
        let (engine, log) = FakeEngine::new(&WINDOWS_VOICES);
        let _provider =
            LocalProvider::with_engine(Box::new(engine), None, LocalSettings::default(), device())
                .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.rate, Some(150));
        assert_eq!(log.volume, Some(1.0));
    }

    #[test]
    fn test_set_volume_clamps() {
        let (engine, log) = FakeEngine::new(&WINDOWS_VOICES);
        let mut provider =
            LocalProvider::with_engine(Box::new(engine), None, LocalSettings::default(), device())
                .unwrap();

        provider.set_volume(0.25).unwrap();
        assert_eq!(log.lock().unwrap().volume, Some(0.25));
        assert_eq!(provider.settings().volume, 0.25);

        provider.set_volume(3.0).unwrap();
        assert_eq!(log.lock().unwrap().volume, Some(1.0));

        provider.set_volume(f32::NAN).unwrap();
        assert_eq!(log.lock().unwrap().volume, Some(1.0));
    }

    #[test]
    fn test_speak_and_empty_text() {
        let (engine, log) = FakeEngine::new(&WINDOWS_VOICES);
        let mut provider =
            LocalProvider::with_engine(Box::new(engine), None, LocalSettings::default(), device())
                .unwrap();

        provider.speak("").unwrap();
        provider.speak("Hello there").unwrap();
        assert_eq!(log.lock().unwrap().spoken, vec!["Hello there".to_string()]);
    }

    #[test]
    fn test_list_voices_in_engine_order() {
        let (engine, _log) = FakeEngine::new(&WINDOWS_VOICES);
        let provider =
            LocalProvider::with_engine(Box::new(engine), None, LocalSettings::default(), device())
                .unwrap();
        assert_eq!(provider.list_voices().unwrap(), WINDOWS_VOICES.to_vec());
    }

    #[test]
    fn test_rate_conversion() {
        // Engine with normal=1.0 in range 0.5..=2.0
        assert_eq!(rate_to_native(200, 0.5, 1.0, 2.0), 1.0);
        assert_eq!(rate_to_native(150, 0.5, 1.0, 2.0), 0.75);
        assert_eq!(rate_to_native(1000, 0.5, 1.0, 2.0), 2.0);
        assert_eq!(rate_to_native(0, 0.5, 1.0, 2.0), 0.5);
    }

    #[test]
    fn test_volume_conversion() {
        assert_eq!(volume_to_native(0.0, 0.0, 1.0), 0.0);
        assert_eq!(volume_to_native(0.5, 0.0, 1.0), 0.5);
        assert_eq!(volume_to_native(1.0, 0.0, 100.0), 100.0);
    }

    #[test]
    fn test_create_native_engine() {
        // May fail without speech-dispatcher or in CI
        match NativeEngine::new() {
            Ok(engine) => println!("✓ Native engine with {:?}", engine.voice_names()),
            Err(e) => println!("⚠ TTS initialization failed (may be expected in CI): {}", e),
        }
    }
}
