//! Audio output shared by every provider
//!
//! There is exactly one output device per process. Providers receive a
//! clone of the same [`AudioDevice`] and hold its lock for the whole of a
//! speak call, so two sessions never play over each other.

use crate::{Result, SpeakerError};
use log::debug;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Something that can play encoded audio to completion
pub trait AudioPlayer: Send + Sync {
    /// Play an in-memory encoded clip (MP3, WAV, ...) and block until done
    fn play_bytes(&self, audio: Vec<u8>) -> Result<()>;

    /// Play an encoded audio file and block until done
    fn play_file(&self, path: &Path) -> Result<()>;
}

/// Plays through the default output device with rodio
///
/// The stream is opened per clip and released as soon as the sink drains.
#[derive(Debug, Default)]
pub struct RodioPlayer;

impl RodioPlayer {
    pub fn new() -> Self {
        Self
    }

    /// Open the default output without rodio's stderr notice on drop
    fn open_output() -> Result<rodio::OutputStream> {
        let mut stream = rodio::OutputStreamBuilder::open_default_stream()
            .map_err(|e| SpeakerError::BackendUnavailable(format!("No audio output: {}", e)))?;
        stream.log_on_drop(false);
        Ok(stream)
    }

    fn play_source<R>(&self, reader: R) -> Result<()>
    where
        R: std::io::Read + std::io::Seek + Send + Sync + 'static,
    {
        let stream = Self::open_output()?;
        let sink = rodio::Sink::connect_new(stream.mixer());
        let source = rodio::Decoder::new(reader)
            .map_err(|e| SpeakerError::Playback(format!("Failed to decode audio: {}", e)))?;

        sink.append(source);
        // Returns when the sink signals it has drained
        sink.sleep_until_end();
        drop(stream);

        Ok(())
    }
}

impl AudioPlayer for RodioPlayer {
    fn play_bytes(&self, audio: Vec<u8>) -> Result<()> {
        debug!("Playing {} bytes of audio", audio.len());
        self.play_source(Cursor::new(audio))
    }

    fn play_file(&self, path: &Path) -> Result<()> {
        debug!("Playing audio file {:?}", path);
        let file = File::open(path)?;
        self.play_source(BufReader::new(file))
    }
}

/// The process-wide audio output
///
/// Cloning is cheap: clones share the player and the lock.
#[derive(Clone)]
pub struct AudioDevice {
    player: Arc<dyn AudioPlayer>,
    lock: Arc<Mutex<()>>,
}

impl AudioDevice {
    pub fn new(player: Arc<dyn AudioPlayer>) -> Self {
        Self {
            player,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Device backed by the system's default output
    pub fn system() -> Self {
        Self::new(Arc::new(RodioPlayer::new()))
    }

    /// Take exclusive use of the output until the guard drops
    ///
    /// A panic in a previous holder does not leave the device unusable.
    pub fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Play bytes with the device already held by the caller
    pub fn play_bytes(&self, _held: &MutexGuard<'_, ()>, audio: Vec<u8>) -> Result<()> {
        self.player.play_bytes(audio)
    }

    /// Play a file with the device already held by the caller
    pub fn play_file(&self, _held: &MutexGuard<'_, ()>, path: &Path) -> Result<()> {
        self.player.play_file(path)
    }
}

impl std::fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDevice").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Counts concurrent plays and remembers the highest overlap
    #[derive(Default)]
    struct OverlapPlayer {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl AudioPlayer for OverlapPlayer {
        fn play_bytes(&self, _audio: Vec<u8>) -> Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        fn play_file(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_exclusive_serializes_playback() {
        let player = Arc::new(OverlapPlayer::default());
        let device = AudioDevice::new(player.clone());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let device = device.clone();
                thread::spawn(move || {
                    let held = device.exclusive();
                    device.play_bytes(&held, vec![0; 4]).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(player.max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_poisoned_lock_recovers() {
        let device = AudioDevice::new(Arc::new(OverlapPlayer::default()));
        let poisoner = device.clone();
        let _ = thread::spawn(move || {
            let _held = poisoner.exclusive();
            panic!("holder crashed");
        })
        .join();

        let held = device.exclusive();
        assert!(device.play_bytes(&held, Vec::new()).is_ok());
    }

    #[test]
    fn test_rodio_rejects_garbage() {
        // Fails either at device open (headless CI) or at decode; never panics
        let player = RodioPlayer::new();
        assert!(player.play_bytes(b"not audio".to_vec()).is_err());
    }

    #[test]
    fn test_open_output_without_device() {
        // Headless hosts report unavailability instead of panicking
        match RodioPlayer::open_output() {
            Ok(stream) => drop(stream),
            Err(e) => assert!(matches!(e, SpeakerError::BackendUnavailable(_))),
        }
    }
}
