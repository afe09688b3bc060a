use crate::audio::{AudioAsset, DurationProbe};
use crate::error::{Result, SyncError};
use crate::script::Utterance;
use crate::timeline::{Segment, SegmentOrigin, TierId, Timeline};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

static CHUNK_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"chunk_(\d+)\.wav$").expect("Invalid regex"));

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkTimingConfig {
    /// Silence the synthesis stage put between consecutive chunks (seconds).
    pub pause: f64,
    /// How far the laid-out chunks may run past the final audio (seconds).
    pub max_overrun: f64,
}

impl Default for ChunkTimingConfig {
    fn default() -> Self {
        Self {
            pause: 0.3,
            max_overrun: 0.25,
        }
    }
}

/// Times each utterance from its own synthesized chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkTimer {
    config: ChunkTimingConfig,
}

impl ChunkTimer {
    pub fn new(config: ChunkTimingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkTimingConfig {
        &self.config
    }

    /// Lay the chunks in `dir` end to end, one per utterance.
    ///
    /// Every failure is reported as `TranscriptionUnavailable` so the caller
    /// can move on to the next tier.
    pub fn measure(
        &self,
        probe: &dyn DurationProbe,
        dir: &Path,
        utterances: &[Utterance],
        total_duration: f64,
    ) -> Result<Timeline> {
        let files = find_chunk_files(dir)?;
        if files.len() != utterances.len() {
            return Err(SyncError::TranscriptionUnavailable(format!(
                "{} chunks in {} for {} utterances",
                files.len(),
                dir.display(),
                utterances.len()
            )));
        }

        let mut segments = Vec::with_capacity(files.len());
        let mut cursor = 0.0;

        for (utterance, file) in utterances.iter().zip(&files) {
            let duration = probe
                .probe(&AudioAsset::new(file.as_path()))
                .map_err(|e| {
                    SyncError::TranscriptionUnavailable(format!("chunk {}: {}", file.display(), e))
                })?;
            debug!("Chunk {} lasts {:.3}s", file.display(), duration);

            segments.push(Segment {
                utterance_index: utterance.index,
                start: cursor,
                end: cursor + duration,
                source_tier: TierId::ChunkDurations,
                origin: SegmentOrigin::Measured,
                score: 1.0,
            });
            cursor += duration + self.config.pause;
        }

        let laid_out = segments.last().map_or(0.0, |s| s.end);
        if laid_out > total_duration + self.config.max_overrun {
            return Err(SyncError::TranscriptionUnavailable(format!(
                "chunks run to {:.2}s but the audio lasts {:.2}s",
                laid_out, total_duration
            )));
        }
        for seg in &mut segments {
            seg.start = seg.start.min(total_duration);
            seg.end = seg.end.min(total_duration);
        }

        info!(
            "Measured {} chunks covering {:.2}s of {:.2}s",
            segments.len(),
            laid_out,
            total_duration
        );

        Ok(Timeline {
            segments,
            total_duration,
            tier_used: TierId::ChunkDurations,
        })
    }
}

/// WAV chunks in `dir`, ordered by their `chunk_NNNN` index. Files without
/// an index follow in name order.
pub fn find_chunk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        SyncError::TranscriptionUnavailable(format!(
            "cannot read chunk directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut files: Vec<(Option<u64>, PathBuf)> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
        })
        .map(|path| {
            let index = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| CHUNK_NAME.captures(n))
                .and_then(|c| c[1].parse().ok());
            (index, path)
        })
        .collect();

    if files.is_empty() {
        return Err(SyncError::TranscriptionUnavailable(format!(
            "no WAV chunks found in {}",
            dir.display()
        )));
    }

    files.sort_by(|(a_index, a_path), (b_index, b_path)| match (a_index, b_index) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a_path.cmp(b_path),
    });

    Ok(files.into_iter().map(|(_, path)| path).collect())
}
