use crate::align::normalize::content_length;
use crate::script::Utterance;
use crate::timeline::{Segment, SegmentOrigin, TierId, Timeline};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    /// Gap inserted between consecutive utterances of different speakers (seconds).
    pub inter_speaker_pause: f64,
    /// Minimum duration of any segment (seconds).
    pub min_segment_duration: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            inter_speaker_pause: 0.2,
            min_segment_duration: 0.3,
        }
    }
}

/// Proportional fallback tier. Never fails on non-empty input.
#[derive(Debug, Clone, Default)]
pub struct TimingEstimator {
    config: EstimatorConfig,
}

impl TimingEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn estimate(&self, utterances: &[Utterance], total_duration: f64) -> Timeline {
        let total = if total_duration.is_finite() {
            total_duration.max(0.0)
        } else {
            0.0
        };
        let n = utterances.len();

        let turn_changes = utterances
            .windows(2)
            .filter(|pair| pair[0].speaker != pair[1].speaker)
            .count();

        // With too little audio the floor itself has to give.
        let floor = self
            .config
            .min_segment_duration
            .max(0.0)
            .min(if n > 0 { total / n as f64 } else { 0.0 });
        let pause = if turn_changes == 0 {
            0.0
        } else {
            let spare = (total - n as f64 * floor).max(0.0);
            self.config
                .inter_speaker_pause
                .max(0.0)
                .min(spare / turn_changes as f64)
        };
        let speech_total = (total - pause * turn_changes as f64).max(0.0);

        let weights: Vec<f64> = utterances
            .iter()
            .map(|u| content_length(&u.text).max(1) as f64)
            .collect();
        let durations = allocate(&weights, speech_total, floor);

        debug!(
            "Estimated {} segments over {:.3}s ({} turn changes, pause {:.3}s)",
            n, total, turn_changes, pause
        );

        let mut segments = Vec::with_capacity(n);
        let mut cursor = 0.0;
        for (i, (utterance, duration)) in utterances.iter().zip(&durations).enumerate() {
            if i > 0 && utterances[i - 1].speaker != utterance.speaker {
                cursor += pause;
            }
            let start = cursor.min(total);
            let end = if i + 1 == n {
                total
            } else {
                (cursor + duration).min(total)
            };
            segments.push(Segment {
                utterance_index: utterance.index,
                start,
                end: end.max(start),
                source_tier: TierId::Estimate,
                origin: SegmentOrigin::Estimated,
                score: 0.0,
            });
            cursor += duration;
        }

        Timeline {
            segments,
            total_duration: total,
            tier_used: TierId::Estimate,
        }
    }
}

/// Split `total` by `weights`, then lift anything under `floor` by borrowing
/// from segments in proportion to how far they sit above it.
fn allocate(weights: &[f64], total: f64, floor: f64) -> Vec<f64> {
    let weight_sum: f64 = weights.iter().sum();
    if weights.is_empty() || weight_sum <= 0.0 {
        return vec![0.0; weights.len()];
    }

    let mut durations: Vec<f64> = weights.iter().map(|w| total * w / weight_sum).collect();

    // Each pass lifts every short segment; borrowing by surplus cannot push a
    // donor below the floor, so this settles in a pass or two.
    for _ in 0..weights.len() {
        let deficit: f64 = durations
            .iter()
            .filter(|&&d| d < floor)
            .map(|d| floor - d)
            .sum();
        if deficit <= f64::EPSILON {
            break;
        }
        let surplus: f64 = durations
            .iter()
            .filter(|&&d| d > floor)
            .map(|d| d - floor)
            .sum();
        if surplus <= 0.0 {
            break;
        }

        let take = (deficit / surplus).min(1.0);
        for d in durations.iter_mut() {
            if *d < floor {
                *d = floor;
            } else if *d > floor {
                *d -= (*d - floor) * take;
            }
        }
    }

    durations
}
