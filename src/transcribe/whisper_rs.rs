//! In-process inference through whisper.cpp bindings.

use crate::audio::extract::SPEECH_SAMPLE_RATE;
use crate::audio::{convert_to_speech_wav, read_pcm_mono};
use crate::config::ModelSize;
use crate::error::{Result, SyncError};
use crate::transcribe::{ModelLoader, SpeechModel, TranscribedWord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

fn engine_error(e: impl std::fmt::Display) -> SyncError {
    SyncError::TranscriptionUnavailable(format!("whisper: {}", e))
}

pub struct WhisperRsLoader {
    models_dir: PathBuf,
}

impl WhisperRsLoader {
    pub fn new(models_dir: PathBuf) -> Self {
        Self { models_dir }
    }
}

#[async_trait]
impl ModelLoader for WhisperRsLoader {
    async fn load(&self, size: ModelSize) -> Result<Arc<dyn SpeechModel>> {
        let model_path = self.models_dir.join(size.ggml_file_name());
        if !model_path.is_file() {
            return Err(SyncError::TranscriptionUnavailable(format!(
                "whisper model not found: {}",
                model_path.display()
            )));
        }

        let path = model_path.clone();
        let context = tokio::task::spawn_blocking(move || {
            let path = path.to_string_lossy().into_owned();
            WhisperContext::new_with_params(&path, WhisperContextParameters::default())
                .map_err(engine_error)
        })
        .await
        .map_err(engine_error)??;

        Ok(Arc::new(WhisperRsModel {
            context: Arc::new(context),
            model_path,
        }))
    }
}

/// A loaded whisper context. Each call creates its own decoding state.
pub struct WhisperRsModel {
    context: Arc<WhisperContext>,
    model_path: PathBuf,
}

#[async_trait]
impl SpeechModel for WhisperRsModel {
    async fn transcribe(&self, audio: &Path, language: &str) -> Result<Vec<TranscribedWord>> {
        let context = Arc::clone(&self.context);
        let audio = audio.to_path_buf();
        let language = language.to_string();

        tokio::task::spawn_blocking(move || run_inference(&context, &audio, &language))
            .await
            .map_err(engine_error)?
    }

    fn description(&self) -> String {
        format!("whisper-rs ({})", self.model_path.display())
    }
}

fn load_samples(audio: &Path) -> Result<Vec<f32>> {
    if let Ok((samples, rate)) = read_pcm_mono(audio) {
        if rate == SPEECH_SAMPLE_RATE {
            return Ok(samples);
        }
    }

    let temp_dir = tempfile::tempdir()?;
    let wav_path = temp_dir.path().join("input.wav");
    convert_to_speech_wav(audio, &wav_path).map_err(engine_error)?;
    let (samples, _) = read_pcm_mono(&wav_path)?;
    Ok(samples)
}

fn run_inference(
    context: &WhisperContext,
    audio: &Path,
    language: &str,
) -> Result<Vec<TranscribedWord>> {
    let samples = load_samples(audio)?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_language(Some(language));
    params.set_token_timestamps(true);
    params.set_split_on_word(true);
    params.set_max_len(1);
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    let mut state = context.create_state().map_err(engine_error)?;
    state.full(params, &samples).map_err(engine_error)?;

    let n_segments = state.full_n_segments().map_err(engine_error)?;
    let mut words = Vec::with_capacity(n_segments.max(0) as usize);

    for i in 0..n_segments {
        let text = state.full_get_segment_text(i).map_err(engine_error)?;
        let text = text.trim();
        if text.is_empty() || text.starts_with('[') {
            continue;
        }

        // Segment times are in centiseconds.
        let t0 = state.full_get_segment_t0(i).map_err(engine_error)?;
        let t1 = state.full_get_segment_t1(i).map_err(engine_error)?;

        let n_tokens = state.full_n_tokens(i).map_err(engine_error)?;
        let mut probs = Vec::new();
        for j in 0..n_tokens {
            let token = state.full_get_token_text(i, j).unwrap_or_default();
            if token.starts_with("[_") {
                continue;
            }
            if let Ok(p) = state.full_get_token_prob(i, j) {
                probs.push(p as f64);
            }
        }
        let confidence = if probs.is_empty() {
            1.0
        } else {
            probs.iter().sum::<f64>() / probs.len() as f64
        };

        words.push(TranscribedWord {
            text: text.to_string(),
            start: t0 as f64 / 100.0,
            end: t1 as f64 / 100.0,
            confidence,
        });
    }

    Ok(words)
}
