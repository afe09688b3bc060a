pub mod distance;
pub mod normalize;

use crate::script::Utterance;
use crate::timeline::{Segment, SegmentOrigin, TierId, Timeline};
use crate::transcribe::TranscribedWord;
use distance::IncrementalDistance;
use normalize::{content_length, detect_mode, normalize, strip_annotations, tokenize, TokenMode};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct AlignerConfig {
    /// Similarity needed to claim a run of words.
    pub min_match_score: f64,
    /// Similarity at which later, disjoint starts are no longer tried.
    pub good_score: f64,
    /// Similarity at which the search for a better start stops.
    pub excellent_score: f64,
    /// Start positions tried past the cursor, before adding pending text length.
    pub base_lookahead: usize,
    /// Longest candidate run relative to the utterance, in tokens.
    pub max_span_ratio: f64,
    /// Window size for scripts without word separators.
    pub char_window: usize,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            min_match_score: 0.5,
            good_score: 0.65,
            excellent_score: 0.95,
            base_lookahead: 24,
            max_span_ratio: 2.0,
            char_window: 1,
        }
    }
}

/// A transcribed word reduced to comparable tokens.
#[derive(Debug)]
struct PreparedWord {
    tokens: Vec<String>,
    start: f64,
    end: f64,
}

/// A run of prepared words claimed by one utterance.
#[derive(Debug, Clone, Copy)]
struct Claim {
    first: usize,
    last: usize,
    score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SequenceAligner {
    config: AlignerConfig,
}

impl SequenceAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    /// Build a candidate timeline from transcribed words.
    ///
    /// Always returns one segment per utterance; acceptance is left to the
    /// validation gate.
    pub fn align(
        &self,
        utterances: &[Utterance],
        words: &[TranscribedWord],
        total_duration: f64,
        tier: TierId,
    ) -> Timeline {
        let mode = detect_mode(
            utterances.iter().map(|u| u.text.as_str()),
            self.config.char_window,
        );
        let targets: Vec<Vec<String>> = utterances
            .iter()
            .map(|u| tokenize(&normalize(&u.text), mode))
            .collect();
        let prepared = prepare_words(words, mode);

        debug!(
            "Aligning {} utterances against {} usable words ({:?})",
            utterances.len(),
            prepared.len(),
            mode
        );

        let claims = self.claim_runs(&targets, &prepared);
        let segments = build_segments(utterances, &claims, &prepared, total_duration, tier);

        let timeline = Timeline {
            segments,
            total_duration,
            tier_used: tier,
        };

        info!(
            "Aligned {}/{} utterances from {} words (coverage {:.0}%)",
            claims.iter().filter(|c| c.is_some()).count(),
            utterances.len(),
            prepared.len(),
            timeline.coverage() * 100.0
        );

        timeline
    }

    fn claim_runs(&self, targets: &[Vec<String>], words: &[PreparedWord]) -> Vec<Option<Claim>> {
        let mut claims = Vec::with_capacity(targets.len());
        let mut cursor = 0;
        // Tokens of utterances that found no words since the last claim. Their
        // words may still sit between the cursor and the next match.
        let mut pending = 0;

        for (index, target) in targets.iter().enumerate() {
            if target.is_empty() {
                claims.push(None);
                continue;
            }

            let lookahead = self.config.base_lookahead + pending;
            match self.best_run(target, words, cursor, lookahead) {
                Some(claim) if claim.score >= self.config.min_match_score => {
                    debug!(
                        "Utterance {} claimed words {}..={} (score {:.2})",
                        index, claim.first, claim.last, claim.score
                    );
                    cursor = claim.last + 1;
                    pending = 0;
                    claims.push(Some(claim));
                }
                best => {
                    debug!(
                        "Utterance {} unmatched (best score {:.2})",
                        index,
                        best.map_or(0.0, |c| c.score)
                    );
                    pending += target.len();
                    claims.push(None);
                }
            }
        }

        claims
    }

    /// Highest-scoring run starting within `lookahead` words of `cursor`.
    ///
    /// Once some start reaches `good_score`, only starts inside that run are
    /// still tried, so a later repeat of the phrase can never win over a good
    /// match near the cursor. Earlier starts win ties.
    fn best_run(
        &self,
        target: &[String],
        words: &[PreparedWord],
        cursor: usize,
        lookahead: usize,
    ) -> Option<Claim> {
        let max_tokens = (target.len() as f64 * self.config.max_span_ratio).ceil() as usize;
        let mut last_start = cursor.saturating_add(lookahead).min(words.len());
        let mut best: Option<Claim> = None;
        let mut narrowed = false;

        let mut first = cursor;
        while first < last_start {
            let mut dist = IncrementalDistance::new(target);

            for (last, word) in words.iter().enumerate().skip(first) {
                for token in &word.tokens {
                    dist.push(token);
                }

                let score = dist.similarity();
                if best.map_or(true, |b| score > b.score) {
                    best = Some(Claim { first, last, score });
                }
                if dist.consumed() >= max_tokens {
                    break;
                }
            }

            if let Some(b) = best {
                if b.score >= self.config.excellent_score {
                    break;
                }
                if !narrowed && b.score >= self.config.good_score {
                    last_start = last_start.min(b.last + 1);
                    narrowed = true;
                }
            }
            first += 1;
        }

        best
    }
}

fn prepare_words(words: &[TranscribedWord], mode: TokenMode) -> Vec<PreparedWord> {
    let mut prepared: Vec<PreparedWord> = words
        .iter()
        .filter(|w| w.start.is_finite() && w.end.is_finite() && w.start <= w.end)
        .filter_map(|w| {
            let tokens = tokenize(&normalize(&strip_annotations(&w.text)), mode);
            (!tokens.is_empty()).then(|| PreparedWord {
                tokens,
                start: w.start.max(0.0),
                end: w.end.max(0.0),
            })
        })
        .collect();

    prepared.sort_by(|a, b| a.start.total_cmp(&b.start));
    prepared
}

fn build_segments(
    utterances: &[Utterance],
    claims: &[Option<Claim>],
    words: &[PreparedWord],
    total: f64,
    tier: TierId,
) -> Vec<Segment> {
    let count = utterances.len();
    let clamp = |t: f64| t.clamp(0.0, total);

    let mut bounds: Vec<Option<(f64, f64)>> = claims
        .iter()
        .map(|c| c.map(|c| (clamp(words[c.first].start), clamp(words[c.last].end))))
        .collect();

    // Word timestamps may overlap across a boundary; the earlier run yields.
    let mut previous: Option<usize> = None;
    for i in 0..count {
        if let Some((start, _)) = bounds[i] {
            if let Some(p) = previous {
                if let Some((p_start, p_end)) = bounds[p] {
                    bounds[p] = Some((p_start, p_end.min(start).max(p_start)));
                }
            }
            previous = Some(i);
        }
    }

    // Leading and trailing silence belong to the outermost segments.
    if let Some(Some((_, end))) = bounds.first().copied() {
        bounds[0] = Some((0.0, end));
    }
    if let Some(Some((start, _))) = bounds.last().copied() {
        bounds[count - 1] = Some((start, total));
    }

    let mut segments: Vec<Segment> = Vec::with_capacity(count);
    let mut i = 0;
    while i < count {
        if let (Some((start, end)), Some(claim)) = (bounds[i], claims[i]) {
            segments.push(Segment {
                utterance_index: utterances[i].index,
                start,
                end,
                source_tier: tier,
                origin: SegmentOrigin::Matched,
                score: claim.score,
            });
            i += 1;
            continue;
        }

        // Unmatched run [i, run_end): spread over the gap between anchors.
        let run_end = (i..count).find(|&j| claims[j].is_some()).unwrap_or(count);
        let gap_start = segments.last().map_or(0.0, |s| s.end);
        let gap_end = if run_end < count {
            bounds[run_end].map_or(total, |(s, _)| s)
        } else {
            total
        }
        .max(gap_start);

        let weights: Vec<f64> = (i..run_end)
            .map(|j| content_length(&utterances[j].text).max(1) as f64)
            .collect();
        let weight_sum: f64 = weights.iter().sum();
        let mut cursor = gap_start;

        for (offset, j) in (i..run_end).enumerate() {
            let share = (gap_end - gap_start) * weights[offset] / weight_sum;
            let end = if j + 1 == run_end { gap_end } else { cursor + share };
            let anchored = (j > 0 && claims[j - 1].is_some())
                || (j + 1 < count && claims[j + 1].is_some());

            segments.push(Segment {
                utterance_index: utterances[j].index,
                start: cursor,
                end,
                source_tier: tier,
                origin: if anchored {
                    SegmentOrigin::Interpolated
                } else {
                    SegmentOrigin::Unanchored
                },
                score: 0.0,
            });
            cursor = end;
        }

        i = run_end;
    }

    // Final clamp keeps every boundary inside [0, total] and ordered.
    let mut floor = 0.0;
    for seg in &mut segments {
        seg.start = clamp(seg.start.max(floor));
        seg.end = clamp(seg.end.max(seg.start));
        floor = seg.end;
    }

    segments
}
