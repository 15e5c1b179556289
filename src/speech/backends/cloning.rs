//! Voice-cloning backend (Coqui XTTS)
//!
//! The model lives in a long-running Python worker that loads it once and
//! then answers one JSON request per line. Synthesis writes a WAV into a
//! scoped temporary file which is played and then removed, on success and
//! failure alike. When a reference recording is supplied the model imitates
//! that speaker.

use crate::platform::{find_executable, ComputeDevice};
use crate::speech::playback::AudioDevice;
use crate::speech::{BackendKind, Provider};
use crate::{Result, SpeakerError};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

/// Python interpreter with the Coqui `TTS` package installed
pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_MODEL_NAME: &str = "tts_models/multilingual/multi-dataset/xtts_v2";
pub const DEFAULT_LANGUAGE: &str = "en";

/// The only voice this backend exposes
pub const DEFAULT_VOICE: &str = "default";

const WORKER_SCRIPT: &str = include_str!("xtts_worker.py");

/// Settings for the cloning backend
#[derive(Debug, Clone, PartialEq)]
pub struct CloningSettings {
    /// Python interpreter (name on PATH or full path)
    pub python: String,
    pub model_name: String,
    /// Synthesis language code
    pub language: String,
    /// Where temporary WAV files go; system temp dir when `None`
    pub temp_dir: Option<PathBuf>,
}

impl Default for CloningSettings {
    fn default() -> Self {
        Self {
            python: DEFAULT_PYTHON.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            temp_dir: None,
        }
    }
}

/// One synthesis request for a [`VoiceCloner`]
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CloneJob<'a> {
    pub text: &'a str,
    /// WAV file to write
    #[serde(rename = "out_path")]
    pub output: &'a Path,
    /// Recording of the speaker to imitate
    #[serde(rename = "speaker_wav")]
    pub reference: Option<&'a Path>,
    pub language: &'a str,
}

/// A loaded voice-cloning model
pub trait VoiceCloner: Send + Sync {
    fn synthesize_to_file(&self, job: &CloneJob<'_>) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct WorkerReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

struct WorkerPipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerPipes {
    fn read_reply(&mut self) -> Result<()> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| SpeakerError::Synthesis(format!("Cloning worker read failed: {}", e)))?;
        if n == 0 {
            return Err(SpeakerError::Synthesis("Cloning worker exited".to_string()));
        }

        let reply: WorkerReply = serde_json::from_str(line.trim()).map_err(|e| {
            SpeakerError::Synthesis(format!("Unreadable reply from cloning worker: {}", e))
        })?;
        if reply.ok {
            Ok(())
        } else {
            Err(SpeakerError::Synthesis(
                reply.error.unwrap_or_else(|| "unknown worker error".to_string()),
            ))
        }
    }

    fn request(&mut self, job: &CloneJob<'_>) -> Result<()> {
        let line = serde_json::to_string(job)
            .map_err(|e| SpeakerError::Synthesis(format!("Unencodable request: {}", e)))?;
        writeln!(self.stdin, "{}", line)
            .and_then(|()| self.stdin.flush())
            .map_err(|e| SpeakerError::Synthesis(format!("Cloning worker stopped: {}", e)))?;
        self.read_reply()
    }
}

/// XTTS held in memory by a Python worker process
///
/// The worker is killed when this value is dropped.
pub struct XttsWorker {
    child: Mutex<Child>,
    pipes: Mutex<WorkerPipes>,
}

impl XttsWorker {
    /// Start the worker and wait until the model has loaded
    ///
    /// Blocks through the first-run model download. Any failure to start
    /// the interpreter or load the model is `BackendUnavailable`.
    pub fn load(settings: &CloningSettings) -> Result<Self> {
        let python = find_executable(&settings.python).ok_or_else(|| {
            SpeakerError::BackendUnavailable(format!(
                "Python interpreter '{}' not found (XTTS needs: pip install TTS)",
                settings.python
            ))
        })?;
        let device = ComputeDevice::detect();
        info!(
            "Loading cloning model {} on {} via {:?}",
            settings.model_name, device, python
        );

        let worker = Self::spawn(worker_command(&python, &settings.model_name, device))?;
        info!("✓ Cloning model {} ready", settings.model_name);
        Ok(worker)
    }

    fn spawn(mut command: Command) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                SpeakerError::BackendUnavailable(format!("Failed to start cloning worker: {}", e))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SpeakerError::BackendUnavailable(
                "Cloning worker has no pipes".to_string(),
            ));
        };

        let worker = Self {
            child: Mutex::new(child),
            pipes: Mutex::new(WorkerPipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
        };

        // The first reply reports the model load
        worker
            .pipes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read_reply()
            .map_err(|e| match e {
                SpeakerError::Synthesis(msg) => {
                    SpeakerError::BackendUnavailable(format!("Cloning model failed to load: {}", msg))
                }
                other => other,
            })?;
        Ok(worker)
    }
}

/// `python -u -c <worker> <model> <device>`
fn worker_command(python: &Path, model_name: &str, device: ComputeDevice) -> Command {
    let mut command = Command::new(python);
    command
        .arg("-u")
        .arg("-c")
        .arg(WORKER_SCRIPT)
        .arg(model_name)
        .arg(device.to_string());
    command
}

impl VoiceCloner for XttsWorker {
    fn synthesize_to_file(&self, job: &CloneJob<'_>) -> Result<()> {
        debug!("Cloning worker request for {} chars", job.text.len());
        self.pipes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .request(job)
    }
}

impl Drop for XttsWorker {
    fn drop(&mut self) {
        let child = self.child.get_mut().unwrap_or_else(PoisonError::into_inner);
        let _ = child.kill();
        let _ = child.wait();
        debug!("Stopped cloning worker");
    }
}

/// Provider speaking through the cloning model
pub struct CloningProvider {
    model: Arc<dyn VoiceCloner>,
    reference: Option<PathBuf>,
    settings: CloningSettings,
    device: AudioDevice,
}

impl CloningProvider {
    /// Bind the shared model to an optional reference recording
    pub fn new(
        model: Arc<dyn VoiceCloner>,
        reference: Option<&Path>,
        settings: CloningSettings,
        device: AudioDevice,
    ) -> Result<Self> {
        if let Some(path) = reference {
            if !path.is_file() {
                return Err(SpeakerError::BackendUnavailable(format!(
                    "Reference audio not found: {}",
                    path.display()
                )));
            }
            info!("Cloning voice from {}", path.display());
        }

        Ok(Self {
            model,
            reference: reference.map(Path::to_path_buf),
            settings,
            device,
        })
    }

    fn temp_file(&self) -> Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ttsspeaker-").suffix(".wav");
        let file = match &self.settings.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file)
    }
}

impl Provider for CloningProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloning
    }

    fn voice(&self) -> Option<&str> {
        Some(DEFAULT_VOICE)
    }

    fn list_voices(&self) -> Result<Vec<String>> {
        Ok(vec![DEFAULT_VOICE.to_string()])
    }

    fn speak(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        let held = self.device.exclusive();

        // Removed when dropped, whichever way this function returns
        let artifact = self.temp_file()?;
        let job = CloneJob {
            text,
            output: artifact.path(),
            reference: self.reference.as_deref(),
            language: &self.settings.language,
        };

        self.model.synthesize_to_file(&job).map_err(|e| {
            error!("Cloning TTS error: {}", e);
            e
        })?;
        self.device.play_file(&held, artifact.path())
    }
}
