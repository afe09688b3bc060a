use crate::script::Utterance;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strategy for producing a candidate timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierId {
    /// Durations of per-utterance audio chunks laid end to end.
    ChunkDurations,
    LocalModel,
    RemoteApi,
    Estimate,
}

impl TierId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierId::ChunkDurations => "chunk_durations",
            TierId::LocalModel => "local_model",
            TierId::RemoteApi => "remote_api",
            TierId::Estimate => "estimate",
        }
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a segment's boundaries were derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOrigin {
    /// Boundaries come from transcribed words matched to the utterance.
    Matched,
    /// No words matched, but at least one neighbour did.
    Interpolated,
    /// No words matched and neither neighbour matched either.
    Unanchored,
    /// Proportional estimate without transcription.
    Estimated,
    /// Measured from the utterance's own audio chunk.
    Measured,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub utterance_index: usize,
    pub start: f64,
    pub end: f64,
    pub source_tier: TierId,
    pub origin: SegmentOrigin,
    /// Alignment similarity in `[0, 1]`; zero for segments without matched words.
    pub score: f64,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub segments: Vec<Segment>,
    pub total_duration: f64,
    pub tier_used: TierId,
}

impl Timeline {
    /// Fraction of segments whose boundaries came from matched words or
    /// measured chunks.
    pub fn coverage(&self) -> f64 {
        if self.segments.is_empty() {
            return 0.0;
        }
        let matched = self
            .segments
            .iter()
            .filter(|s| matches!(s.origin, SegmentOrigin::Matched | SegmentOrigin::Measured))
            .count();
        matched as f64 / self.segments.len() as f64
    }

    /// Serialize into the handoff form consumed by the rendering stage.
    pub fn to_document(&self, utterances: &[Utterance]) -> TimelineDocument {
        let segments = self
            .segments
            .iter()
            .filter_map(|seg| {
                utterances.get(seg.utterance_index).map(|u| TimelineRecord {
                    utterance_index: seg.utterance_index,
                    speaker: u.speaker.to_string(),
                    text: u.text.clone(),
                    start_sec: seg.start,
                    end_sec: seg.end,
                })
            })
            .collect();

        TimelineDocument {
            total_duration: self.total_duration,
            tier_used: self.tier_used,
            segments,
        }
    }
}

/// One utterance in the persisted timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineRecord {
    pub utterance_index: usize,
    pub speaker: String,
    pub text: String,
    pub start_sec: f64,
    pub end_sec: f64,
}

/// Persisted timeline, in utterance order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineDocument {
    pub total_duration: f64,
    pub tier_used: TierId,
    pub segments: Vec<TimelineRecord>,
}

impl TimelineDocument {
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;

    fn segment(index: usize, start: f64, end: f64, origin: SegmentOrigin) -> Segment {
        Segment {
            utterance_index: index,
            start,
            end,
            source_tier: TierId::RemoteApi,
            origin,
            score: 0.0,
        }
    }

    #[test]
    fn test_coverage_counts_matched_only() {
        let timeline = Timeline {
            segments: vec![
                segment(0, 0.0, 1.0, SegmentOrigin::Matched),
                segment(1, 1.0, 2.0, SegmentOrigin::Interpolated),
                segment(2, 2.0, 3.0, SegmentOrigin::Matched),
                segment(3, 3.0, 4.0, SegmentOrigin::Matched),
            ],
            total_duration: 4.0,
            tier_used: TierId::RemoteApi,
        };
        assert!((timeline.coverage() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_document_shape() {
        let script = Script::from_pairs([("M", "おはよう"), ("F", "はい")]).unwrap();
        let timeline = Timeline {
            segments: vec![
                segment(0, 0.0, 1.5, SegmentOrigin::Estimated),
                segment(1, 1.7, 3.0, SegmentOrigin::Estimated),
            ],
            total_duration: 3.0,
            tier_used: TierId::Estimate,
        };

        let doc = timeline.to_document(script.utterances());
        let json = doc.to_json().unwrap();
        assert!(json.contains("\"tier_used\": \"estimate\""));
        assert!(json.contains("\"start_sec\": 1.7"));
        assert!(json.contains("\"speaker\": \"F\""));

        let back: TimelineDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
