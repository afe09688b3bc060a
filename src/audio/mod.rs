pub mod extract;
pub mod probe;

pub use extract::{check_ffmpeg, convert_to_speech_wav, ffprobe_duration, read_pcm_mono};
pub use probe::{wav_duration, DurationProbe, MediaProbe};

use std::path::{Path, PathBuf};

/// A finalized speech track handed over by the synthesis stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAsset {
    pub path: PathBuf,
    /// Directory of per-utterance `chunk_NNNN.wav` files the track was
    /// assembled from, when the synthesis stage kept them.
    pub chunk_dir: Option<PathBuf>,
}

impl AudioAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_dir: None,
        }
    }

    pub fn with_chunks(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chunk_dir = Some(dir.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chunk_dir(&self) -> Option<&Path> {
        self.chunk_dir.as_deref()
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    pub fn mime_type(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("flac") => "audio/flac",
            Some("ogg") => "audio/ogg",
            Some("webm") => "audio/webm",
            _ => "application/octet-stream",
        }
    }
}

/// Metadata about a decoded audio file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioMetadata {
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(AudioAsset::new("/tmp/a.WAV").mime_type(), "audio/wav");
        assert_eq!(AudioAsset::new("/tmp/a.mp3").mime_type(), "audio/mpeg");
        assert_eq!(
            AudioAsset::new("/tmp/a").mime_type(),
            "application/octet-stream"
        );
    }
}
