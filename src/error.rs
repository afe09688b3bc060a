use crate::validate::Rejection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transcription unavailable: {0}")]
    TranscriptionUnavailable(String),

    #[error("Transcription timed out: {0}")]
    TranscriptionTimeout(String),

    #[error("Alignment rejected: {0}")]
    AlignmentRejected(Rejection),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Errors no tier can recover from; everything else falls through to the next tier.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::InvalidAudio(_) | SyncError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
