use crate::audio::AudioAsset;
use crate::cancel::CancelToken;
use crate::config::ModelSize;
use crate::error::{Result, SyncError};
use crate::timeline::TierId;
use crate::transcribe::{sanitize_words, TranscribedWord, Transcriber};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// A loaded speech recognition model. Must tolerate concurrent calls.
#[async_trait]
pub trait SpeechModel: Send + Sync {
    async fn transcribe(&self, audio: &Path, language: &str) -> Result<Vec<TranscribedWord>>;
    fn description(&self) -> String;
}

/// Loads model weights for a given size.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, size: ModelSize) -> Result<Arc<dyn SpeechModel>>;
}

type Slot = Arc<OnceCell<Arc<dyn SpeechModel>>>;

/// Lazily loaded models keyed by size.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<ModelSize, Slot>>,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the model for `size`, loading it on first use.
    ///
    /// Concurrent callers for the same size wait for a single load. A failed
    /// load leaves the slot empty so a later request can try again.
    pub async fn get(&self, size: ModelSize) -> Result<Arc<dyn SpeechModel>> {
        let slot = self.slot(size);
        let model = slot
            .get_or_try_init(|| async {
                info!("Loading whisper model '{}' (first use)", size);
                let started = Instant::now();
                let model = self.loader.load(size).await?;
                info!(
                    "Loaded {} in {:.2}s",
                    model.description(),
                    started.elapsed().as_secs_f64()
                );
                Ok::<_, SyncError>(model)
            })
            .await?;
        Ok(Arc::clone(model))
    }

    pub fn is_loaded(&self, size: ModelSize) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&size)
            .is_some_and(|slot| slot.initialized())
    }

    /// Release every cached model. In-flight calls keep their own `Arc`.
    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.is_empty() {
            debug!("Releasing {} cached model slot(s)", slots.len());
        }
        slots.clear();
    }

    fn slot(&self, size: ModelSize) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(size).or_default())
    }
}

/// Transcription through a locally loaded whisper model.
pub struct LocalModelProvider {
    cache: Arc<ModelCache>,
    size: ModelSize,
    language: String,
}

impl LocalModelProvider {
    pub fn new(cache: Arc<ModelCache>, size: ModelSize, language: String) -> Self {
        Self {
            cache,
            size,
            language,
        }
    }

    pub fn model_size(&self) -> ModelSize {
        self.size
    }
}

#[async_trait]
impl Transcriber for LocalModelProvider {
    async fn transcribe(
        &self,
        audio: &AudioAsset,
        cancel: &CancelToken,
    ) -> Result<Vec<TranscribedWord>> {
        cancel.checkpoint()?;
        let model = self.cache.get(self.size).await?;
        cancel.checkpoint()?;

        debug!("Transcribing {} with {}", audio.path().display(), model.description());

        // Dropping the inference future on cancellation discards partial output.
        let words = tokio::select! {
            words = model.transcribe(audio.path(), &self.language) => words?,
            _ = cancel.cancelled() => {
                return Err(SyncError::TranscriptionTimeout(
                    "local transcription cancelled".to_string(),
                ));
            }
        };

        Ok(sanitize_words(words))
    }

    fn name(&self) -> &'static str {
        "Local Whisper"
    }

    fn tier(&self) -> TierId {
        TierId::LocalModel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedModel;

    #[async_trait]
    impl SpeechModel for FixedModel {
        async fn transcribe(&self, _audio: &Path, _language: &str) -> Result<Vec<TranscribedWord>> {
            Ok(vec![TranscribedWord {
                text: "はい".to_string(),
                start: 0.1,
                end: 0.4,
                confidence: 0.9,
            }])
        }

        fn description(&self) -> String {
            "fixed".to_string()
        }
    }

    struct SlowModel;

    #[async_trait]
    impl SpeechModel for SlowModel {
        async fn transcribe(&self, _audio: &Path, _language: &str) -> Result<Vec<TranscribedWord>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        fn description(&self) -> String {
            "slow".to_string()
        }
    }

    struct CountingLoader {
        loads: AtomicUsize,
        fail_first: bool,
        slow: bool,
    }

    impl CountingLoader {
        fn new() -> Self {
            Self {
                loads: AtomicUsize::new(0),
                fail_first: false,
                slow: false,
            }
        }
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load(&self, _size: ModelSize) -> Result<Arc<dyn SpeechModel>> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && n == 0 {
                return Err(SyncError::TranscriptionUnavailable("no weights".to_string()));
            }
            if self.slow {
                Ok(Arc::new(SlowModel))
            } else {
                Ok(Arc::new(FixedModel))
            }
        }
    }

    #[tokio::test]
    async fn test_cache_loads_once_under_concurrency() {
        let loader = Arc::new(CountingLoader::new());
        let cache = Arc::new(ModelCache::new(loader.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(ModelSize::Base).await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(cache.is_loaded(ModelSize::Base));
        assert!(!cache.is_loaded(ModelSize::Small));
    }

    #[tokio::test]
    async fn test_cache_keys_by_size_and_clears() {
        let loader = Arc::new(CountingLoader::new());
        let cache = ModelCache::new(loader.clone());

        cache.get(ModelSize::Tiny).await.unwrap();
        cache.get(ModelSize::Large).await.unwrap();
        cache.get(ModelSize::Tiny).await.unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(!cache.is_loaded(ModelSize::Tiny));
        cache.get(ModelSize::Tiny).await.unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let loader = Arc::new(CountingLoader {
            fail_first: true,
            ..CountingLoader::new()
        });
        let cache = ModelCache::new(loader.clone());

        assert!(cache.get(ModelSize::Base).await.is_err());
        assert!(!cache.is_loaded(ModelSize::Base));
        assert!(cache.get(ModelSize::Base).await.is_ok());
    }

    #[tokio::test]
    async fn test_provider_returns_model_words() {
        let cache = Arc::new(ModelCache::new(Arc::new(CountingLoader::new())));
        let provider = LocalModelProvider::new(cache, ModelSize::Base, "ja".to_string());

        let words = provider
            .transcribe(&AudioAsset::new("/tmp/x.wav"), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(provider.tier(), TierId::LocalModel);
    }

    #[tokio::test]
    async fn test_provider_honors_cancellation() {
        let loader = Arc::new(CountingLoader {
            slow: true,
            ..CountingLoader::new()
        });
        let cache = Arc::new(ModelCache::new(loader));
        let provider = LocalModelProvider::new(cache, ModelSize::Base, "ja".to_string());
        let cancel = CancelToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = provider
            .transcribe(&AudioAsset::new("/tmp/x.wav"), &cancel)
            .await;
        assert!(matches!(result, Err(SyncError::TranscriptionTimeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
