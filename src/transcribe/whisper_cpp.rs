//! Local inference through the whisper.cpp command line tool.

use crate::audio::extract::SPEECH_SAMPLE_RATE;
use crate::audio::{convert_to_speech_wav, AudioAsset};
use crate::config::ModelSize;
use crate::error::{Result, SyncError};
use crate::transcribe::{ModelLoader, SpeechModel, TranscribedWord};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

/// Resolves `ggml-*.bin` weights on disk and checks the CLI is runnable.
pub struct WhisperCliLoader {
    binary: String,
    models_dir: PathBuf,
}

impl WhisperCliLoader {
    pub fn new(binary: String, models_dir: PathBuf) -> Self {
        Self { binary, models_dir }
    }

    pub fn model_path(&self, size: ModelSize) -> PathBuf {
        self.models_dir.join(size.ggml_file_name())
    }
}

#[async_trait]
impl ModelLoader for WhisperCliLoader {
    async fn load(&self, size: ModelSize) -> Result<Arc<dyn SpeechModel>> {
        let model_path = self.model_path(size);
        if !model_path.is_file() {
            return Err(SyncError::TranscriptionUnavailable(format!(
                "whisper model not found: {}",
                model_path.display()
            )));
        }

        let status = Command::new(&self.binary)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                SyncError::TranscriptionUnavailable(format!(
                    "whisper binary '{}' not runnable: {}",
                    self.binary, e
                ))
            })?;
        debug!("{} --help exited with {}", self.binary, status);

        Ok(Arc::new(WhisperCliModel {
            binary: self.binary.clone(),
            model_path,
        }))
    }
}

/// One whisper.cpp model; every call spawns a fresh process.
pub struct WhisperCliModel {
    binary: String,
    model_path: PathBuf,
}

impl WhisperCliModel {
    pub fn new(binary: String, model_path: PathBuf) -> Self {
        Self { binary, model_path }
    }
}

#[async_trait]
impl SpeechModel for WhisperCliModel {
    async fn transcribe(&self, audio: &Path, language: &str) -> Result<Vec<TranscribedWord>> {
        let temp_dir = tempfile::tempdir()?;

        let wav_path = prepare_input(audio, temp_dir.path()).await?;

        let output_stem = temp_dir.path().join("out");
        let output = Command::new(&self.binary)
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(&wav_path)
            .args(["-l", language, "-ml", "1", "-sow", "-ojf", "-np", "-of"])
            .arg(&output_stem)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SyncError::TranscriptionUnavailable(format!("whisper-cli: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("whisper-cli failed: {}", stderr.trim());
            return Err(SyncError::TranscriptionUnavailable(format!(
                "whisper-cli exited with {}",
                output.status
            )));
        }

        let json = tokio::fs::read_to_string(output_stem.with_extension("json")).await?;
        parse_cli_output(&json)
    }

    fn description(&self) -> String {
        format!("whisper.cpp ({})", self.model_path.display())
    }
}

/// whisper.cpp only reads 16 kHz mono WAV; anything else goes through ffmpeg.
async fn prepare_input(audio: &Path, work_dir: &Path) -> Result<PathBuf> {
    if is_speech_wav(audio) {
        return Ok(audio.to_path_buf());
    }

    let input = audio.to_path_buf();
    let target = work_dir.join("input.wav");
    let output = target.clone();
    tokio::task::spawn_blocking(move || convert_to_speech_wav(&input, &output))
        .await
        .map_err(|e| SyncError::TranscriptionUnavailable(format!("conversion task: {}", e)))?
        .map_err(|e| SyncError::TranscriptionUnavailable(e.to_string()))?;
    Ok(target)
}

fn is_speech_wav(path: &Path) -> bool {
    if AudioAsset::new(path).extension().as_deref() != Some("wav") {
        return false;
    }
    hound::WavReader::open(path)
        .map(|r| {
            let spec = r.spec();
            spec.sample_rate == SPEECH_SAMPLE_RATE
                && spec.channels == 1
                && spec.sample_format == hound::SampleFormat::Int
                && spec.bits_per_sample == 16
        })
        .unwrap_or(false)
}

/// Parse `-ojf` output produced with `-ml 1`, where each entry is one word.
pub fn parse_cli_output(json: &str) -> Result<Vec<TranscribedWord>> {
    let parsed: CliOutput = serde_json::from_str(json)?;

    let words = parsed
        .transcription
        .into_iter()
        .filter_map(|entry| {
            let text = entry.text.trim().to_string();
            if text.is_empty() || text.starts_with('[') {
                return None;
            }

            let probs: Vec<f64> = entry
                .tokens
                .iter()
                .filter(|t| !t.text.starts_with("[_"))
                .map(|t| t.p)
                .collect();
            let confidence = if probs.is_empty() {
                1.0
            } else {
                probs.iter().sum::<f64>() / probs.len() as f64
            };

            Some(TranscribedWord {
                text,
                start: entry.offsets.from as f64 / 1000.0,
                end: entry.offsets.to as f64 / 1000.0,
                confidence,
            })
        })
        .collect();

    Ok(words)
}

#[derive(Debug, Deserialize)]
struct CliOutput {
    #[serde(default)]
    transcription: Vec<CliEntry>,
}

#[derive(Debug, Deserialize)]
struct CliEntry {
    text: String,
    offsets: CliOffsets,
    #[serde(default)]
    tokens: Vec<CliToken>,
}

#[derive(Debug, Deserialize)]
struct CliOffsets {
    from: u64,
    to: u64,
}

#[derive(Debug, Deserialize)]
struct CliToken {
    text: String,
    #[serde(default)]
    p: f64,
}
