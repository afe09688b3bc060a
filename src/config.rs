use crate::align::AlignerConfig;
use crate::chunks::ChunkTimingConfig;
use crate::error::{Result, SyncError};
use crate::estimate::EstimatorConfig;
use crate::orchestrator::TierPolicy;
use crate::validate::GateConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Remote transcription API dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteApi {
    #[default]
    OpenAi,
    ElevenLabs,
}

impl std::fmt::Display for RemoteApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteApi::OpenAi => write!(f, "openai"),
            RemoteApi::ElevenLabs => write!(f, "elevenlabs"),
        }
    }
}

impl std::str::FromStr for RemoteApi {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "whisper" => Ok(RemoteApi::OpenAi),
            "elevenlabs" => Ok(RemoteApi::ElevenLabs),
            _ => Err(format!(
                "Unknown remote API: {}. Use 'openai' or 'elevenlabs'",
                s
            )),
        }
    }
}

/// Local whisper model size, smallest/fastest to largest/most accurate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }

    /// whisper.cpp ggml weights file name for this size.
    pub fn ggml_file_name(&self) -> String {
        match self {
            ModelSize::Large => "ggml-large-v3.bin".to_string(),
            other => format!("ggml-{}.bin", other.as_str()),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(format!(
                "Unknown model size: {}. Use tiny, base, small, medium or large",
                s
            )),
        }
    }
}

/// Output format for synchronized timelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Srt,
    Vtt,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "srt" => Ok(OutputFormat::Srt),
            "vtt" => Ok(OutputFormat::Vtt),
            _ => Err(format!(
                "Unknown format: {}. Use 'json', 'srt', or 'vtt'",
                s
            )),
        }
    }
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Srt => "srt",
            OutputFormat::Vtt => "vtt",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub enabled: bool,
    pub model_size: ModelSize,
    /// Directory holding ggml weight files.
    pub models_dir: Option<PathBuf>,
    /// whisper.cpp command line binary.
    pub cli_binary: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_size: ModelSize::default(),
            models_dir: None,
            cli_binary: "whisper-cli".to_string(),
        }
    }
}

impl LocalConfig {
    pub fn resolved_models_dir(&self) -> PathBuf {
        self.models_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scriptsync")
                .join("models")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub api: RemoteApi,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api: RemoteApi::default(),
            base_url: None,
            model: None,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause inserted between different speakers by the estimator (seconds).
    pub inter_speaker_pause: f64,
    /// Minimum estimated segment duration (seconds).
    pub min_segment_duration: f64,
    /// Minimum fraction of utterances that must be anchored by matched words.
    pub coverage_threshold: f64,
    /// Allowed distance between the last segment end and the audio duration (seconds).
    pub duration_tolerance: f64,
    /// Similarity needed for an utterance to claim a run of words.
    pub min_match_score: f64,
    /// Silence between per-utterance audio chunks (seconds).
    pub chunk_pause: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            inter_speaker_pause: 0.2,
            min_segment_duration: 0.3,
            coverage_threshold: 0.7,
            duration_tolerance: 0.25,
            min_match_score: 0.5,
            chunk_pause: 0.3,
        }
    }
}

impl TimingConfig {
    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            inter_speaker_pause: self.inter_speaker_pause,
            min_segment_duration: self.min_segment_duration,
        }
    }

    pub fn gate(&self) -> GateConfig {
        GateConfig {
            coverage_threshold: self.coverage_threshold,
            duration_tolerance: self.duration_tolerance,
            ..GateConfig::default()
        }
    }

    pub fn chunk_timing(&self) -> ChunkTimingConfig {
        ChunkTimingConfig {
            pause: self.chunk_pause,
            max_overrun: self.duration_tolerance,
        }
    }

    pub fn aligner(&self) -> AlignerConfig {
        AlignerConfig {
            min_match_score: self.min_match_score,
            ..AlignerConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    /// Transcription language code.
    pub language: String,
    pub tier_policy: TierPolicy,
    /// Wall-clock budget for all tier attempts of one request.
    pub deadline_secs: Option<u64>,
    /// Concurrent requests in batch mode.
    pub concurrency: usize,
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    pub timing: TimingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            elevenlabs_api_key: None,
            language: "ja".to_string(),
            tier_policy: TierPolicy::default(),
            deadline_secs: Some(600),
            concurrency: 2,
            local: LocalConfig::default(),
            remote: RemoteConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    SyncError::Config(format!("{}: {e}", config_path.display()))
                })?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Override values from environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            self.elevenlabs_api_key = Some(key);
        }
        if let Ok(api) = std::env::var("SCRIPTSYNC_REMOTE_API") {
            if let Ok(a) = api.parse() {
                self.remote.api = a;
            }
        }
        if let Ok(url) = std::env::var("SCRIPTSYNC_REMOTE_BASE_URL") {
            self.remote.base_url = Some(url);
        }
        if let Ok(policy) = std::env::var("SCRIPTSYNC_TIER_POLICY") {
            if let Ok(p) = policy.parse() {
                self.tier_policy = p;
            }
        }
        if let Ok(enabled) = std::env::var("USE_WHISPER_STT") {
            self.local.enabled = matches!(
                enabled.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Ok(size) = std::env::var("WHISPER_MODEL_SIZE") {
            if let Ok(s) = size.parse() {
                self.local.model_size = s;
            }
        }
        if let Ok(dir) = std::env::var("WHISPER_MODELS_DIR") {
            self.local.models_dir = Some(PathBuf::from(dir));
        }
        if let Ok(binary) = std::env::var("WHISPER_CLI") {
            self.local.cli_binary = binary;
        }
        if let Ok(language) = std::env::var("SCRIPTSYNC_LANGUAGE") {
            self.language = language;
        }
        if let Ok(deadline) = std::env::var("SCRIPTSYNC_DEADLINE_SECS") {
            if let Ok(d) = deadline.parse() {
                self.deadline_secs = Some(d);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;

        if !(0.0..=1.0).contains(&timing.coverage_threshold) {
            return Err(SyncError::Config(
                "coverage_threshold must be between 0 and 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&timing.min_match_score) {
            return Err(SyncError::Config(
                "min_match_score must be between 0 and 1".to_string(),
            ));
        }
        if timing.inter_speaker_pause < 0.0 || timing.min_segment_duration < 0.0 {
            return Err(SyncError::Config(
                "pause and minimum segment duration must not be negative".to_string(),
            ));
        }
        if timing.chunk_pause < 0.0 {
            return Err(SyncError::Config(
                "chunk_pause must not be negative".to_string(),
            ));
        }
        if timing.duration_tolerance < 0.0 {
            return Err(SyncError::Config(
                "duration_tolerance must not be negative".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(SyncError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }
        if self.remote.timeout_secs == 0 {
            return Err(SyncError::Config(
                "Remote timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// API key for the configured remote dialect, if any.
    pub fn remote_api_key(&self) -> Option<&str> {
        match self.remote.api {
            RemoteApi::OpenAi => self.openai_api_key.as_deref(),
            RemoteApi::ElevenLabs => self.elevenlabs_api_key.as_deref(),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("scriptsync").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_api_parsing() {
        assert_eq!("openai".parse::<RemoteApi>().unwrap(), RemoteApi::OpenAi);
        assert_eq!(
            "ElevenLabs".parse::<RemoteApi>().unwrap(),
            RemoteApi::ElevenLabs
        );
        assert!("gemini".parse::<RemoteApi>().is_err());
    }

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("TINY".parse::<ModelSize>().unwrap(), ModelSize::Tiny);
        assert_eq!("large".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert!("huge".parse::<ModelSize>().is_err());
        assert_eq!(ModelSize::Base.ggml_file_name(), "ggml-base.bin");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("srt".parse::<OutputFormat>().unwrap(), OutputFormat::Srt);
        assert_eq!("vtt".parse::<OutputFormat>().unwrap(), OutputFormat::Vtt);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("txt".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.language, "ja");
        assert_eq!(config.local.model_size, ModelSize::Base);
        assert_eq!(config.tier_policy, TierPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.timing.coverage_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.timing.chunk_pause = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            language = "en"
            tier_policy = "skip-remote"

            [timing]
            inter_speaker_pause = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(config.language, "en");
        assert_eq!(config.tier_policy, TierPolicy::skip_remote());
        assert!((config.timing.inter_speaker_pause - 0.3).abs() < 1e-9);
        assert!((config.timing.coverage_threshold - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_remote_api_key_follows_dialect() {
        let mut config = Config::default();
        config.openai_api_key = Some("sk-test".to_string());
        assert_eq!(config.remote_api_key(), Some("sk-test"));

        config.remote.api = RemoteApi::ElevenLabs;
        assert_eq!(config.remote_api_key(), None);
    }
}
