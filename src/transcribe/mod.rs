pub mod local;
pub mod remote;
pub mod whisper_cpp;
#[cfg(feature = "whisper-rs")]
pub mod whisper_rs;

pub use local::{LocalModelProvider, ModelCache, ModelLoader, SpeechModel};
pub use remote::RemoteApiProvider;
pub use whisper_cpp::{WhisperCliLoader, WhisperCliModel};

use crate::audio::AudioAsset;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::timeline::TierId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A recognized word with its position in the audio, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribedWord {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Recognizer confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Converts an audio asset into time-ordered words.
///
/// An empty result is a legitimate outcome (silence, nothing recognized) and
/// is not an error.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &AudioAsset,
        cancel: &CancelToken,
    ) -> Result<Vec<TranscribedWord>>;
    fn name(&self) -> &'static str;
    fn tier(&self) -> TierId;
}

/// Stand-in for a tier that has no credentials or model configured.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    tier: TierId,
    reason: String,
}

impl UnavailableProvider {
    pub fn new(tier: TierId, reason: impl Into<String>) -> Self {
        Self {
            tier,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Transcriber for UnavailableProvider {
    async fn transcribe(
        &self,
        _audio: &AudioAsset,
        _cancel: &CancelToken,
    ) -> Result<Vec<TranscribedWord>> {
        Err(SyncError::TranscriptionUnavailable(self.reason.clone()))
    }

    fn name(&self) -> &'static str {
        "Unavailable"
    }

    fn tier(&self) -> TierId {
        self.tier
    }
}

/// Drop malformed words, clamp confidences and order by start time.
pub fn sanitize_words(words: Vec<TranscribedWord>) -> Vec<TranscribedWord> {
    let before = words.len();
    let mut words: Vec<TranscribedWord> = words
        .into_iter()
        .filter(|w| w.start.is_finite() && w.end.is_finite() && w.start <= w.end)
        .map(|mut w| {
            w.confidence = if w.confidence.is_finite() {
                w.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            w
        })
        .collect();
    words.sort_by(|a, b| a.start.total_cmp(&b.start));

    if words.len() != before {
        debug!("Dropped {} malformed words", before - words.len());
    }
    words
}

/// Model loader selected by build features.
pub fn default_model_loader(config: &Config) -> Arc<dyn ModelLoader> {
    #[cfg(feature = "whisper-rs")]
    {
        Arc::new(whisper_rs::WhisperRsLoader::new(
            config.local.resolved_models_dir(),
        ))
    }
    #[cfg(not(feature = "whisper-rs"))]
    {
        Arc::new(WhisperCliLoader::new(
            config.local.cli_binary.clone(),
            config.local.resolved_models_dir(),
        ))
    }
}

/// Build the local model tier from configuration.
pub fn create_local_provider(config: &Config, cache: Arc<ModelCache>) -> Arc<dyn Transcriber> {
    if !config.local.enabled {
        return Arc::new(UnavailableProvider::new(
            TierId::LocalModel,
            "local transcription disabled",
        ));
    }
    Arc::new(LocalModelProvider::new(
        cache,
        config.local.model_size,
        config.language.clone(),
    ))
}

/// Build the remote API tier from configuration.
pub fn create_remote_provider(config: &Config) -> Arc<dyn Transcriber> {
    let Some(api_key) = config.remote_api_key() else {
        return Arc::new(UnavailableProvider::new(
            TierId::RemoteApi,
            format!("no API key configured for {}", config.remote.api),
        ));
    };

    let mut provider = RemoteApiProvider::new(config.remote.api, api_key.to_string())
        .with_language(config.language.clone())
        .with_timeout(config.remote.timeout())
        .with_max_retries(config.remote.max_retries);
    if let Some(ref url) = config.remote.base_url {
        provider = provider.with_base_url(url.clone());
    }
    if let Some(ref model) = config.remote.model {
        provider = provider.with_model(model.clone());
    }
    Arc::new(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64, confidence: f64) -> TranscribedWord {
        TranscribedWord {
            text: text.to_string(),
            start,
            end,
            confidence,
        }
    }

    #[test]
    fn test_sanitize_orders_and_filters() {
        let words = sanitize_words(vec![
            word("b", 1.0, 1.5, 0.9),
            word("bad", 2.0, 1.0, 0.9),
            word("a", 0.0, 0.5, 1.7),
            word("nan", f64::NAN, 1.0, 0.5),
        ]);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "a");
        assert_eq!(words[0].confidence, 1.0);
        assert_eq!(words[1].text, "b");
    }

    #[tokio::test]
    async fn test_unavailable_provider() {
        let provider = UnavailableProvider::new(TierId::RemoteApi, "no key");
        let result = provider
            .transcribe(&AudioAsset::new("/tmp/a.wav"), &CancelToken::new())
            .await;
        assert!(matches!(
            result,
            Err(SyncError::TranscriptionUnavailable(_))
        ));
        assert_eq!(provider.tier(), TierId::RemoteApi);
    }

    #[test]
    fn test_remote_factory_without_key_is_unavailable() {
        let config = Config::default();
        let provider = create_remote_provider(&config);
        assert_eq!(provider.name(), "Unavailable");
        assert_eq!(provider.tier(), TierId::RemoteApi);
    }

    #[test]
    fn test_remote_factory_with_key() {
        let mut config = Config::default();
        config.openai_api_key = Some("sk-test".to_string());
        let provider = create_remote_provider(&config);
        assert_eq!(provider.name(), "OpenAI Whisper API");
    }

    #[test]
    fn test_local_factory_respects_disable() {
        let mut config = Config::default();
        config.local.enabled = false;
        let cache = Arc::new(ModelCache::new(default_model_loader(&config)));
        let provider = create_local_provider(&config, cache);
        assert_eq!(provider.name(), "Unavailable");
        assert_eq!(provider.tier(), TierId::LocalModel);
    }
}
