//! Web API tests over a real socket
//!
//! The server runs on an ephemeral port; requests go through ureq on the
//! blocking pool.

use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use ttsspeaker::session::{SessionKeyPolicy, SessionRegistry};
use ttsspeaker::speech::backends::cloning::{CloneJob, CloningSettings, VoiceCloner};
use ttsspeaker::speech::backends::cloud::CloudSettings;
use ttsspeaker::speech::backends::local::{LocalSettings, SpeechEngine};
use ttsspeaker::speech::{AudioPlayer, ProviderFactory};
use ttsspeaker::Result;

#[derive(Default)]
struct CountingPlayer {
    plays: AtomicUsize,
}

impl AudioPlayer for CountingPlayer {
    fn play_bytes(&self, _audio: Vec<u8>) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn play_file(&self, _path: &Path) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct QuietEngine {
    spoken: Arc<AtomicUsize>,
}

impl SpeechEngine for QuietEngine {
    fn voice_names(&self) -> Result<Vec<String>> {
        Ok(vec![
            "Microsoft David Desktop".to_string(),
            "Microsoft Zira Desktop".to_string(),
        ])
    }
    fn select_voice(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }
    fn set_rate(&mut self, _words_per_minute: u32) -> Result<()> {
        Ok(())
    }
    fn set_volume(&mut self, _level: f32) -> Result<()> {
        Ok(())
    }
    fn speak_to_end(&mut self, _text: &str) -> Result<()> {
        self.spoken.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct SilentCloner;

impl VoiceCloner for SilentCloner {
    fn synthesize_to_file(&self, job: &CloneJob<'_>) -> Result<()> {
        std::fs::write(job.output, b"RIFF....WAVE")?;
        Ok(())
    }
}

struct TestServer {
    base: String,
    spoken: Arc<AtomicUsize>,
}

async fn start() -> TestServer {
    let spoken = Arc::new(AtomicUsize::new(0));
    let counter = spoken.clone();
    let factory = ProviderFactory::new(
        LocalSettings::default(),
        CloudSettings::default(),
        CloningSettings::default(),
    )
    .with_player(Arc::new(CountingPlayer::default()))
    .with_cloner(Arc::new(SilentCloner))
    .with_engine(move || {
        Ok(Box::new(QuietEngine {
            spoken: counter.clone(),
        }) as Box<dyn SpeechEngine>)
    });
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(factory),
        SessionKeyPolicy::Deterministic,
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, ttsspeaker::web::router(registry))
            .await
            .unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        spoken,
    }
}

/// POST JSON and return (status, body) for any status
async fn post(url: String, body: Value) -> (u16, Value) {
    tokio::task::spawn_blocking(move || {
        let response = match ureq::post(&url).send_json(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(e) => panic!("request failed: {}", e),
        };
        let status = response.status();
        (status, response.into_json().unwrap())
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_init_and_speak_round_trip() {
    let server = start().await;

    let (status, first) = post(
        format!("{}/api/init_tts", server.base),
        json!({ "tts_type": "local", "voice_name": "Zira" }),
    )
    .await;
    assert_eq!(status, 200);
    let (_, second) = post(
        format!("{}/api/init_tts", server.base),
        json!({ "tts_type": "local", "voice_name": "Zira" }),
    )
    .await;
    assert_eq!(first["session_id"], second["session_id"]);

    let (status, body) = post(
        format!("{}/api/speak", server.base),
        json!({ "session_id": first["session_id"], "text": "Hello", "volume": 0.7 }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "success" }));
    assert_eq!(server.spoken.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_speak_unknown_session() {
    let server = start().await;

    let (status, body) = post(
        format!("{}/api/speak", server.base),
        json!({ "session_id": "12345", "text": "Hello" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "error", "message": "Session not found" }));
    assert_eq!(server.spoken.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_voices_per_backend() {
    let server = start().await;

    let (_, local) = post(
        format!("{}/api/get_voices", server.base),
        json!({ "tts_type": "local" }),
    )
    .await;
    assert_eq!(
        local,
        json!({ "voices": ["Microsoft David Desktop", "Microsoft Zira Desktop"] })
    );

    let (_, cloning) = post(
        format!("{}/api/get_voices", server.base),
        json!({ "tts_type": "xtts" }),
    )
    .await;
    assert_eq!(cloning, json!({ "voices": ["default"] }));

    let (status, unknown) = post(
        format!("{}/api/get_voices", server.base),
        json!({ "tts_type": "espeak" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(unknown["status"], "error");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_page_served() {
    let server = start().await;
    let url = format!("{}/", server.base);

    let page = tokio::task::spawn_blocking(move || ureq::get(&url).call().unwrap().into_string().unwrap())
        .await
        .unwrap();
    assert!(page.contains("/static/js/main.js"));
}
