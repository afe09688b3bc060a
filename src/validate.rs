use crate::timeline::{SegmentOrigin, TierId, Timeline};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateConfig {
    /// Minimum fraction of segments backed by matched words.
    pub coverage_threshold: f64,
    /// Allowed distance between the last segment end and the audio duration (seconds).
    pub duration_tolerance: f64,
    /// Slack for floating point comparisons (seconds).
    pub epsilon: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.70,
            duration_tolerance: 0.25,
            epsilon: 0.001,
        }
    }
}

/// Why a candidate timeline was not accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    EmptyTimeline,
    SegmentCount { expected: usize, actual: usize },
    IndexMismatch { position: usize, found: usize },
    NonFinite { index: usize },
    NegativeStart { start: f64 },
    Inverted { index: usize, start: f64, end: f64 },
    Overlap { index: usize, end: f64, next_start: f64 },
    BeyondDuration { end: f64, total: f64 },
    Unanchored { index: usize },
    LowCoverage { coverage: f64, threshold: f64 },
    DurationMismatch { end: f64, total: f64, tolerance: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::EmptyTimeline => write!(f, "timeline has no segments"),
            Rejection::SegmentCount { expected, actual } => {
                write!(f, "expected {} segments, got {}", expected, actual)
            }
            Rejection::IndexMismatch { position, found } => write!(
                f,
                "segment at position {} refers to utterance {}",
                position, found
            ),
            Rejection::NonFinite { index } => {
                write!(f, "segment {} has a non-finite timestamp", index)
            }
            Rejection::NegativeStart { start } => {
                write!(f, "first segment starts before zero ({:.3}s)", start)
            }
            Rejection::Inverted { index, start, end } => write!(
                f,
                "segment {} ends before it starts ({:.3}s > {:.3}s)",
                index, start, end
            ),
            Rejection::Overlap {
                index,
                end,
                next_start,
            } => write!(
                f,
                "segment {} ends at {:.3}s after the next starts at {:.3}s",
                index, end, next_start
            ),
            Rejection::BeyondDuration { end, total } => write!(
                f,
                "last segment ends at {:.3}s past audio duration {:.3}s",
                end, total
            ),
            Rejection::Unanchored { index } => write!(
                f,
                "segment {} has no matched neighbours to anchor it",
                index
            ),
            Rejection::LowCoverage {
                coverage,
                threshold,
            } => write!(
                f,
                "matched coverage {:.0}% below threshold {:.0}%",
                coverage * 100.0,
                threshold * 100.0
            ),
            Rejection::DurationMismatch {
                end,
                total,
                tolerance,
            } => write!(
                f,
                "last segment ends at {:.3}s, more than {:.3}s from audio duration {:.3}s",
                end, tolerance, total
            ),
        }
    }
}

/// Accepts or rejects candidate timelines.
#[derive(Debug, Clone, Default)]
pub struct ValidationGate {
    config: GateConfig,
}

impl ValidationGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Check structure, then coverage and anchoring, then total duration.
    pub fn validate(
        &self,
        timeline: &Timeline,
        total_duration: f64,
        utterance_count: usize,
    ) -> Result<(), Rejection> {
        self.check_structure(timeline, total_duration, utterance_count)?;
        if timeline.tier_used != TierId::Estimate {
            self.check_coverage(timeline)?;
        }
        self.check_duration(timeline, total_duration)
    }

    /// Invariants every timeline must satisfy, whatever tier produced it.
    pub fn check_structure(
        &self,
        timeline: &Timeline,
        total_duration: f64,
        utterance_count: usize,
    ) -> Result<(), Rejection> {
        let eps = self.config.epsilon;
        let segments = &timeline.segments;

        if segments.is_empty() {
            return Err(Rejection::EmptyTimeline);
        }
        if segments.len() != utterance_count {
            return Err(Rejection::SegmentCount {
                expected: utterance_count,
                actual: segments.len(),
            });
        }

        for (position, seg) in segments.iter().enumerate() {
            if seg.utterance_index != position {
                return Err(Rejection::IndexMismatch {
                    position,
                    found: seg.utterance_index,
                });
            }
            if !seg.start.is_finite() || !seg.end.is_finite() {
                return Err(Rejection::NonFinite { index: position });
            }
            if seg.start > seg.end + eps {
                return Err(Rejection::Inverted {
                    index: position,
                    start: seg.start,
                    end: seg.end,
                });
            }
        }

        for (index, pair) in segments.windows(2).enumerate() {
            if pair[0].end > pair[1].start + eps {
                return Err(Rejection::Overlap {
                    index,
                    end: pair[0].end,
                    next_start: pair[1].start,
                });
            }
        }

        if segments[0].start < -eps {
            return Err(Rejection::NegativeStart {
                start: segments[0].start,
            });
        }

        let last_end = segments[segments.len() - 1].end;
        if last_end > total_duration + eps {
            return Err(Rejection::BeyondDuration {
                end: last_end,
                total: total_duration,
            });
        }

        Ok(())
    }

    fn check_coverage(&self, timeline: &Timeline) -> Result<(), Rejection> {
        let coverage = timeline.coverage();
        if coverage + f64::EPSILON < self.config.coverage_threshold {
            return Err(Rejection::LowCoverage {
                coverage,
                threshold: self.config.coverage_threshold,
            });
        }

        if let Some(seg) = timeline
            .segments
            .iter()
            .find(|s| s.origin == SegmentOrigin::Unanchored)
        {
            return Err(Rejection::Unanchored {
                index: seg.utterance_index,
            });
        }
        Ok(())
    }

    fn check_duration(&self, timeline: &Timeline, total_duration: f64) -> Result<(), Rejection> {
        let Some(last) = timeline.segments.last() else {
            return Err(Rejection::EmptyTimeline);
        };
        if (last.end - total_duration).abs() > self.config.duration_tolerance + self.config.epsilon {
            return Err(Rejection::DurationMismatch {
                end: last.end,
                total: total_duration,
                tolerance: self.config.duration_tolerance,
            });
        }
        Ok(())
    }
}
