use std::path::Path;
use std::process::Command;

use hound::WavReader;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

use super::AudioMetadata;

/// Sample rate expected by whisper models.
pub const SPEECH_SAMPLE_RATE: u32 = 16000;

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map_err(|e| {
            SyncError::InvalidAudio(format!(
                "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(SyncError::InvalidAudio("FFmpeg check failed".to_string()));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// Get container duration in seconds using FFprobe.
pub fn ffprobe_duration(input: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .map_err(|e| SyncError::InvalidAudio(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SyncError::InvalidAudio(format!("FFprobe failed: {stderr}")));
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    duration_str.trim().parse::<f64>().map_err(|e| {
        SyncError::InvalidAudio(format!(
            "Failed to parse duration '{}': {e}",
            duration_str.trim()
        ))
    })
}

/// Convert any audio file to mono 16-bit PCM WAV at 16kHz for speech recognition.
pub fn convert_to_speech_wav(input: &Path, output: &Path) -> Result<AudioMetadata> {
    check_ffmpeg()?;

    if !input.exists() {
        return Err(SyncError::InvalidAudio(format!(
            "audio file not found: {}",
            input.display()
        )));
    }

    info!("Resampling {} for speech recognition", input.display());

    let status = Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(input)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
        .arg(output)
        .status()
        .map_err(|e| SyncError::InvalidAudio(format!("Failed to run FFmpeg: {e}")))?;

    if !status.success() || !output.exists() {
        return Err(SyncError::InvalidAudio(
            "FFmpeg audio conversion failed".to_string(),
        ));
    }

    super::wav_duration(output)
}

/// Decode a WAV file into mono `f32` samples in `[-1, 1]`.
///
/// Multi-channel audio is averaged down to one channel.
pub fn read_pcm_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = WavReader::open(path)
        .map_err(|e| SyncError::InvalidAudio(format!("Failed to open WAV file: {e}")))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>(),
    }
    .map_err(|e| SyncError::InvalidAudio(format!("Failed to decode WAV samples: {e}")))?;

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok((mono, spec.sample_rate))
}
