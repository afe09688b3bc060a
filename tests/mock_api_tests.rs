//! Remote transcription tests against a local mock HTTP server.
//!
//! No real API keys or network access are needed.

use async_trait::async_trait;
use scriptsync::config::RemoteApi;
use scriptsync::transcribe::{RemoteApiProvider, TranscribedWord, Transcriber};
use scriptsync::{
    AttemptOutcome, AudioAsset, CancelToken, MediaProbe, Result, Script, SyncError, TierId,
    TierOrchestrator, TierPolicy,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_wav(dir: &TempDir, name: &str, seconds: f64) -> PathBuf {
    let path = dir.path().join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..(seconds * 16000.0) as usize {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

fn openai(server: &MockServer) -> RemoteApiProvider {
    RemoteApiProvider::new(RemoteApi::OpenAi, "test-key".to_string())
        .with_base_url(format!("{}/v1", server.uri()))
        .with_language("ja".to_string())
        .with_backoff(Duration::from_millis(10))
}

fn openai_words() -> serde_json::Value {
    json!({
        "task": "transcribe",
        "language": "japanese",
        "duration": 3.0,
        "text": "こんにちは はい",
        "words": [
            {"word": "こんにちは", "start": 0.1, "end": 1.2},
            {"word": "はい", "start": 1.6, "end": 2.4}
        ]
    })
}

// ============================================================================
// OpenAI dialect
// ============================================================================

mod openai_tests {
    use super::*;

    #[tokio::test]
    async fn test_success_returns_words() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_words()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "a.wav", 3.0));

        let words = openai(&server)
            .transcribe(&audio, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "こんにちは");
        assert_eq!(words[1].start, 1.6);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key", "type": "invalid_request_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "a.wav", 1.0));

        let result = openai(&server).transcribe(&audio, &CancelToken::new()).await;
        match result {
            Err(SyncError::TranscriptionUnavailable(msg)) => assert!(msg.contains("401")),
            other => panic!("unexpected result: {:?}", other.map(|w| w.len())),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_words()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "a.wav", 1.0));

        let words = openai(&server)
            .transcribe(&audio, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(words.len(), 2);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "a.wav", 1.0));

        let result = openai(&server)
            .with_max_retries(3)
            .transcribe(&audio, &CancelToken::new())
            .await;
        assert!(matches!(result, Err(SyncError::TranscriptionUnavailable(_))));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(openai_words())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "a.wav", 1.0));

        let result = openai(&server)
            .with_timeout(Duration::from_millis(200))
            .with_max_retries(1)
            .transcribe(&audio, &CancelToken::new())
            .await;
        assert!(matches!(result, Err(SyncError::TranscriptionTimeout(_))));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(openai_words())
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "a.wav", 1.0));
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = openai(&server).transcribe(&audio, &cancel).await;
        assert!(matches!(result, Err(SyncError::TranscriptionTimeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected_before_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_words()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let big = dir.path().join("big.mp3");
        std::fs::File::create(&big)
            .unwrap()
            .set_len(26 * 1024 * 1024)
            .unwrap();

        let result = openai(&server)
            .transcribe(&AudioAsset::new(big), &CancelToken::new())
            .await;
        match result {
            Err(SyncError::TranscriptionUnavailable(msg)) => assert!(msg.contains("too large")),
            other => panic!("unexpected result: {:?}", other.map(|w| w.len())),
        }
    }
}

// ============================================================================
// ElevenLabs dialect
// ============================================================================

mod elevenlabs_tests {
    use super::*;

    #[tokio::test]
    async fn test_uses_xi_api_key_and_filters_words() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/speech-to-text"))
            .and(header("xi-api-key", "eleven-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "language_code": "jpn",
                "language_probability": 0.98,
                "text": "はい そうです",
                "words": [
                    {"text": "はい", "start": 0.2, "end": 0.5, "type": "word", "logprob": -0.1},
                    {"text": " ", "start": 0.5, "end": 0.6, "type": "spacing"},
                    {"text": "そうです", "start": 0.6, "end": 1.3, "type": "word"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "a.wav", 1.5));

        let provider = RemoteApiProvider::new(RemoteApi::ElevenLabs, "eleven-key".to_string())
            .with_base_url(format!("{}/v1", server.uri()));
        assert_eq!(provider.name(), "ElevenLabs Speech-to-Text");

        let words = provider
            .transcribe(&audio, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(words.len(), 2);
        assert!(words[0].confidence < 1.0 && words[0].confidence > 0.8);
        assert_eq!(words[1].text, "そうです");
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("xi-api-key"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "a.wav", 1.0));

        let result = RemoteApiProvider::new(RemoteApi::ElevenLabs, "bad".to_string())
            .with_base_url(format!("{}/v1", server.uri()))
            .with_backoff(Duration::from_millis(10))
            .transcribe(&audio, &CancelToken::new())
            .await;
        assert!(matches!(result, Err(SyncError::TranscriptionUnavailable(_))));
    }
}

// ============================================================================
// Orchestrator with a remote tier
// ============================================================================

mod orchestrator_tests {
    use super::*;

    /// Local tier that always hears the script correctly.
    struct LocalWords(Vec<TranscribedWord>);

    #[async_trait]
    impl Transcriber for LocalWords {
        async fn transcribe(
            &self,
            _audio: &AudioAsset,
            _cancel: &CancelToken,
        ) -> Result<Vec<TranscribedWord>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "Local words"
        }

        fn tier(&self) -> TierId {
            TierId::LocalModel
        }
    }

    fn local_word(text: &str, start: f64, end: f64) -> TranscribedWord {
        TranscribedWord {
            text: text.to_string(),
            start,
            end,
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn test_remote_tier_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_words()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "episode.wav", 3.0));
        let script = Script::from_pairs([("男性", "こんにちは"), ("女性", "はい")]).unwrap();

        let orchestrator =
            TierOrchestrator::new(Arc::new(MediaProbe)).with_provider(Arc::new(openai(&server)));
        let timeline = orchestrator
            .synchronize(&script, &audio, &TierPolicy::remote_only(), None)
            .await
            .unwrap();

        assert_eq!(timeline.tier_used, TierId::RemoteApi);
        assert_eq!(timeline.segments[0].start, 0.0);
        assert!((timeline.segments[0].end - 1.2).abs() < 1e-9);
        assert!((timeline.segments[1].start - 1.6).abs() < 1e-9);
        assert!((timeline.segments[1].end - 3.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_slow_remote_tier_respects_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(openai_words())
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "episode.wav", 3.0));
        let script = Script::from_pairs([("男性", "こんにちは"), ("女性", "はい")]).unwrap();

        let orchestrator =
            TierOrchestrator::new(Arc::new(MediaProbe)).with_provider(Arc::new(openai(&server)));
        let started = Instant::now();
        let report = orchestrator
            .synchronize_with_report(
                &script,
                &audio,
                &TierPolicy::remote_only(),
                Some(Duration::from_millis(300)),
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.tier_used(), TierId::Estimate);
        assert_eq!(report.attempts[0].tier, TierId::RemoteApi);
    }

    #[tokio::test]
    async fn test_remote_timeout_falls_through_to_local_tier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(openai_words())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = AudioAsset::new(write_wav(&dir, "episode.wav", 3.0));
        let script = Script::from_pairs([("男性", "こんにちは"), ("女性", "はい")]).unwrap();

        let remote = openai(&server)
            .with_timeout(Duration::from_millis(200))
            .with_max_retries(2);
        let local = LocalWords(vec![
            local_word("こんにちは", 0.2, 1.1),
            local_word("はい", 1.7, 2.5),
        ]);
        let orchestrator = TierOrchestrator::new(Arc::new(MediaProbe))
            .with_provider(Arc::new(remote))
            .with_provider(Arc::new(local));

        let started = Instant::now();
        let report = orchestrator
            .synchronize_with_report(
                &script,
                &audio,
                &TierPolicy::remote_first(),
                None,
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(report.tier_used(), TierId::LocalModel);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].tier, TierId::RemoteApi);
        assert!(matches!(report.attempts[0].outcome, AttemptOutcome::TimedOut(_)));
        assert_eq!(report.attempts[1].tier, TierId::LocalModel);
        assert_eq!(report.attempts[1].outcome, AttemptOutcome::Accepted);
        assert!((report.timeline.segments[1].start - 1.7).abs() < 1e-9);
    }
}
