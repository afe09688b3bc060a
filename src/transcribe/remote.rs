use crate::audio::AudioAsset;
use crate::cancel::CancelToken;
use crate::config::RemoteApi;
use crate::error::{Result, SyncError};
use crate::timeline::TierId;
use crate::transcribe::{sanitize_words, TranscribedWord, Transcriber};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";

/// Maximum upload size accepted by either API (25 MB).
const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

/// Base delay for exponential backoff.
const BASE_DELAY: Duration = Duration::from_millis(1000);

/// Failure of a single HTTP attempt.
enum AttemptError {
    /// Network errors, 429 and 5xx.
    Retryable(SyncError),
    /// Authentication and other client errors; retrying cannot help.
    Fatal(SyncError),
}

/// Hosted speech-to-text with word timestamps.
pub struct RemoteApiProvider {
    client: reqwest::Client,
    api: RemoteApi,
    api_key: String,
    base_url: String,
    model: String,
    language: Option<String>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl RemoteApiProvider {
    pub fn new(api: RemoteApi, api_key: String) -> Self {
        let (base_url, model) = match api {
            RemoteApi::OpenAi => (OPENAI_BASE_URL, "whisper-1"),
            RemoteApi::ElevenLabs => (ELEVENLABS_BASE_URL, "scribe_v1"),
        };
        Self {
            client: reqwest::Client::new(),
            api,
            api_key,
            base_url: base_url.to_string(),
            model: model.to_string(),
            language: None,
            timeout: Duration::from_secs(120),
            max_retries: 3,
            backoff: BASE_DELAY,
        }
    }

    /// Point at a different host, e.g. a proxy or a test server.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Set the source language (ISO 639-1 code).
    pub fn with_language(mut self, language: String) -> Self {
        self.language = Some(language);
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total number of attempts, at least one.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn endpoint(&self) -> String {
        match self.api {
            RemoteApi::OpenAi => format!("{}/audio/transcriptions", self.base_url),
            RemoteApi::ElevenLabs => format!("{}/speech-to-text", self.base_url),
        }
    }

    fn build_form(&self, bytes: Vec<u8>, audio: &AudioAsset) -> Result<Form> {
        let file_name = audio
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        let file_part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(audio.mime_type())?;

        let form = match self.api {
            RemoteApi::OpenAi => {
                let mut form = Form::new()
                    .part("file", file_part)
                    .text("model", self.model.clone())
                    .text("response_format", "verbose_json")
                    .text("timestamp_granularities[]", "word");
                if let Some(ref lang) = self.language {
                    form = form.text("language", lang.clone());
                }
                form
            }
            RemoteApi::ElevenLabs => {
                let mut form = Form::new()
                    .part("file", file_part)
                    .text("model_id", self.model.clone())
                    .text("timestamps_granularity", "word");
                if let Some(ref lang) = self.language {
                    form = form.text("language_code", lang.clone());
                }
                form
            }
        };
        Ok(form)
    }

    async fn call_api(&self, form: Form) -> std::result::Result<Vec<TranscribedWord>, AttemptError> {
        let request = self.client.post(self.endpoint()).timeout(self.timeout);
        let request = match self.api {
            RemoteApi::OpenAi => request.header("Authorization", format!("Bearer {}", self.api_key)),
            RemoteApi::ElevenLabs => request.header("xi-api-key", &self.api_key),
        };

        let response = request
            .multipart(form)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(network_error(e)))?;

        let status = response.status();
        debug!("{} response status: {}", self.name(), status);

        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| AttemptError::Retryable(network_error(e)))?;
            debug!("{} response: {}", self.name(), truncate(&body, 500));
            return self
                .parse_response(&body)
                .map_err(AttemptError::Fatal);
        }

        let error_body = response.text().await.unwrap_or_default();
        let error = SyncError::TranscriptionUnavailable(format!(
            "{} error ({}): {}",
            self.name(),
            status,
            truncate(&error_body, 300)
        ));

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(AttemptError::Retryable(error))
        } else {
            Err(AttemptError::Fatal(error))
        }
    }

    /// Retry loop; the form is rebuilt for every attempt.
    async fn transcribe_with_retry(
        &self,
        audio: &AudioAsset,
        bytes: &[u8],
        cancel: &CancelToken,
    ) -> Result<Vec<TranscribedWord>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = self.backoff * 2u32.pow(attempt - 1);
                debug!("Retry attempt {} after {:?} delay", attempt, delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(cancelled()),
                }
            }
            cancel.checkpoint()?;

            let form = self.build_form(bytes.to_vec(), audio)?;
            let outcome = tokio::select! {
                outcome = self.call_api(form) => outcome,
                _ = cancel.cancelled() => return Err(cancelled()),
            };

            match outcome {
                Ok(words) => return Ok(words),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) => {
                    warn!("Attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SyncError::TranscriptionUnavailable("no attempts made".to_string())
        }))
    }

    fn parse_response(&self, body: &str) -> Result<Vec<TranscribedWord>> {
        match self.api {
            RemoteApi::OpenAi => parse_openai(body),
            RemoteApi::ElevenLabs => parse_elevenlabs(body),
        }
    }
}

#[async_trait]
impl Transcriber for RemoteApiProvider {
    async fn transcribe(
        &self,
        audio: &AudioAsset,
        cancel: &CancelToken,
    ) -> Result<Vec<TranscribedWord>> {
        cancel.checkpoint()?;
        debug!("Transcribing {} with {}", audio.path().display(), self.name());

        let metadata = fs::metadata(audio.path()).await?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(SyncError::TranscriptionUnavailable(format!(
                "File too large for {}: {} bytes (max {} bytes)",
                self.name(),
                metadata.len(),
                MAX_FILE_SIZE
            )));
        }

        let bytes = fs::read(audio.path()).await?;
        let words = self.transcribe_with_retry(audio, &bytes, cancel).await?;
        debug!("{} returned {} words", self.name(), words.len());

        Ok(sanitize_words(words))
    }

    fn name(&self) -> &'static str {
        match self.api {
            RemoteApi::OpenAi => "OpenAI Whisper API",
            RemoteApi::ElevenLabs => "ElevenLabs Speech-to-Text",
        }
    }

    fn tier(&self) -> TierId {
        TierId::RemoteApi
    }
}

fn cancelled() -> SyncError {
    SyncError::TranscriptionTimeout("remote transcription cancelled".to_string())
}

fn network_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::TranscriptionTimeout(format!("request timed out: {}", e))
    } else {
        SyncError::TranscriptionUnavailable(format!("request failed: {}", e))
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn parse_openai(body: &str) -> Result<Vec<TranscribedWord>> {
    let response: OpenAiResponse = serde_json::from_str(body)?;

    if let Some(words) = response.words.filter(|w| !w.is_empty()) {
        return Ok(words
            .into_iter()
            .map(|w| TranscribedWord {
                text: w.word.trim().to_string(),
                start: w.start,
                end: w.end,
                confidence: 1.0,
            })
            .collect());
    }

    // Without word granularity fall back to coarse segments.
    Ok(response
        .segments
        .unwrap_or_default()
        .into_iter()
        .map(|s| TranscribedWord {
            text: s.text.trim().to_string(),
            start: s.start,
            end: s.end,
            confidence: s.avg_logprob.map(f64::exp).unwrap_or(1.0),
        })
        .collect())
}

fn parse_elevenlabs(body: &str) -> Result<Vec<TranscribedWord>> {
    let response: ElevenLabsResponse = serde_json::from_str(body)?;

    Ok(response
        .words
        .into_iter()
        .filter(|w| w.kind.as_deref().unwrap_or("word") == "word")
        .map(|w| TranscribedWord {
            text: w.text.trim().to_string(),
            start: w.start,
            end: w.end,
            confidence: w.logprob.map(f64::exp).unwrap_or(1.0),
        })
        .collect())
}

// API response types

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    words: Option<Vec<OpenAiWord>>,
    #[serde(default)]
    segments: Option<Vec<OpenAiSegment>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiWord {
    word: String,
    start: f64,
    end: f64,
}

#[derive(Debug, Deserialize)]
struct OpenAiSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ElevenLabsResponse {
    #[serde(default)]
    words: Vec<ElevenLabsWord>,
}

#[derive(Debug, Deserialize)]
struct ElevenLabsWord {
    text: String,
    start: f64,
    end: f64,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    logprob: Option<f64>,
}
