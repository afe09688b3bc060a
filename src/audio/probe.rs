use std::path::Path;

use hound::WavReader;
use tracing::debug;

use crate::error::{Result, SyncError};

use super::{ffprobe_duration, AudioAsset, AudioMetadata};

/// Measures the authoritative duration of an audio asset.
pub trait DurationProbe: Send + Sync {
    fn probe(&self, audio: &AudioAsset) -> Result<f64>;
}

/// Probe WAV files in-process and everything else through FFprobe.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaProbe;

impl DurationProbe for MediaProbe {
    fn probe(&self, audio: &AudioAsset) -> Result<f64> {
        let path = audio.path();
        if !path.exists() {
            return Err(SyncError::InvalidAudio(format!(
                "audio file not found: {}",
                path.display()
            )));
        }

        let duration = if audio.extension().as_deref() == Some("wav") {
            match wav_duration(path) {
                Ok(meta) => meta.duration,
                Err(e) => {
                    debug!("WAV header probe failed ({e}), trying FFprobe");
                    ffprobe_duration(path)?
                }
            }
        } else {
            ffprobe_duration(path)?
        };

        if !duration.is_finite() || duration <= 0.0 {
            return Err(SyncError::InvalidAudio(format!(
                "audio has no measurable duration: {}",
                path.display()
            )));
        }

        debug!("Probed {}: {:.3}s", path.display(), duration);
        Ok(duration)
    }
}

/// Read duration and format from a WAV header.
pub fn wav_duration(path: &Path) -> Result<AudioMetadata> {
    let reader = WavReader::open(path)
        .map_err(|e| SyncError::InvalidAudio(format!("Failed to open WAV file: {e}")))?;

    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(SyncError::InvalidAudio(
            "WAV header reports a zero sample rate".to_string(),
        ));
    }

    // `duration()` counts frames (samples per channel).
    let frames = reader.duration();
    Ok(AudioMetadata {
        duration: frames as f64 / spec.sample_rate as f64,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}
