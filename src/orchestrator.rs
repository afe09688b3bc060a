use crate::align::SequenceAligner;
use crate::audio::{AudioAsset, DurationProbe, MediaProbe};
use crate::chunks::ChunkTimer;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::estimate::TimingEstimator;
use crate::script::{Script, Utterance};
use crate::timeline::{TierId, Timeline};
use crate::transcribe::{
    create_local_provider, create_remote_provider, default_model_loader, ModelCache,
    TranscribedWord, Transcriber,
};
use crate::validate::{Rejection, ValidationGate};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Ordered transcription tiers to attempt. Estimation always runs last and
/// chunk timing runs first whenever the audio carries chunks, so neither is
/// listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TierPolicy {
    tiers: Vec<TierId>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::full()
    }
}

impl TierPolicy {
    /// Custom order. Estimation, chunk timing and repeats are dropped.
    pub fn new(tiers: impl IntoIterator<Item = TierId>) -> Self {
        let mut ordered = Vec::new();
        for tier in tiers {
            let implicit = matches!(tier, TierId::Estimate | TierId::ChunkDurations);
            if !implicit && !ordered.contains(&tier) {
                ordered.push(tier);
            }
        }
        Self { tiers: ordered }
    }

    /// Local model, then remote API.
    pub fn full() -> Self {
        Self::new([TierId::LocalModel, TierId::RemoteApi])
    }

    pub fn skip_remote() -> Self {
        Self::new([TierId::LocalModel])
    }

    pub fn local_only() -> Self {
        Self::skip_remote()
    }

    pub fn remote_only() -> Self {
        Self::new([TierId::RemoteApi])
    }

    pub fn remote_first() -> Self {
        Self::new([TierId::RemoteApi, TierId::LocalModel])
    }

    pub fn estimate_only() -> Self {
        Self::new([])
    }

    pub fn tiers(&self) -> &[TierId] {
        &self.tiers
    }
}

impl fmt::Display for TierPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tiers.as_slice() {
            [TierId::LocalModel, TierId::RemoteApi] => write!(f, "full"),
            [TierId::LocalModel] => write!(f, "local-only"),
            [TierId::RemoteApi] => write!(f, "remote-only"),
            [TierId::RemoteApi, TierId::LocalModel] => write!(f, "remote-first"),
            [] => write!(f, "estimate-only"),
            tiers => {
                let names: Vec<&str> = tiers.iter().map(|t| t.as_str()).collect();
                write!(f, "{}", names.join(","))
            }
        }
    }
}

impl std::str::FromStr for TierPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(Self::full()),
            "skip-remote" => Ok(Self::skip_remote()),
            "local-only" => Ok(Self::local_only()),
            "remote-only" => Ok(Self::remote_only()),
            "remote-first" => Ok(Self::remote_first()),
            "estimate-only" => Ok(Self::estimate_only()),
            list => {
                let tiers = list
                    .split(',')
                    .map(|name| match name.trim() {
                        "local" | "local_model" => Ok(TierId::LocalModel),
                        "remote" | "remote_api" => Ok(TierId::RemoteApi),
                        "estimate" => Ok(TierId::Estimate),
                        other => Err(format!(
                            "Unknown tier policy '{}'. Use full, skip-remote, local-only, \
                             remote-only, remote-first, estimate-only or a list such as \
                             'remote,local'",
                            other
                        )),
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Self::new(tiers))
            }
        }
    }
}

impl TryFrom<String> for TierPolicy {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TierPolicy> for String {
    fn from(policy: TierPolicy) -> Self {
        policy.to_string()
    }
}

/// How one tier attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Accepted,
    Rejected(Rejection),
    Unavailable(String),
    TimedOut(String),
    Failed(String),
    Skipped(String),
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Accepted => write!(f, "accepted"),
            AttemptOutcome::Rejected(reason) => write!(f, "rejected: {}", reason),
            AttemptOutcome::Unavailable(reason) => write!(f, "unavailable: {}", reason),
            AttemptOutcome::TimedOut(reason) => write!(f, "timed out: {}", reason),
            AttemptOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            AttemptOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

impl From<SyncError> for AttemptOutcome {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::TranscriptionUnavailable(reason) => AttemptOutcome::Unavailable(reason),
            SyncError::TranscriptionTimeout(reason) => AttemptOutcome::TimedOut(reason),
            SyncError::AlignmentRejected(reason) => AttemptOutcome::Rejected(reason),
            other => AttemptOutcome::Failed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TierAttempt {
    pub tier: TierId,
    pub provider: String,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
    /// Words returned by the provider, if it returned any.
    pub words: Option<usize>,
}

/// Accepted timeline plus the path taken to reach it.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub timeline: Timeline,
    pub attempts: Vec<TierAttempt>,
    pub total_time: Duration,
}

impl SyncReport {
    pub fn tier_used(&self) -> TierId {
        self.timeline.tier_used
    }

    /// True when no transcription tier was accepted.
    pub fn fell_back(&self) -> bool {
        self.timeline.tier_used == TierId::Estimate
    }
}

/// One request in a batch.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub script: Script,
    pub audio: AudioAsset,
    pub policy: TierPolicy,
    pub deadline: Option<Duration>,
}

/// Drives a request through the configured tiers.
pub struct TierOrchestrator {
    probe: Arc<dyn DurationProbe>,
    providers: HashMap<TierId, Arc<dyn Transcriber>>,
    chunk_timer: ChunkTimer,
    aligner: SequenceAligner,
    estimator: TimingEstimator,
    gate: ValidationGate,
    model_cache: Option<Arc<ModelCache>>,
    show_progress: bool,
}

impl Default for TierOrchestrator {
    fn default() -> Self {
        Self::new(Arc::new(MediaProbe))
    }
}

impl TierOrchestrator {
    /// Orchestrator with no transcription providers; every request estimates.
    pub fn new(probe: Arc<dyn DurationProbe>) -> Self {
        Self {
            probe,
            providers: HashMap::new(),
            chunk_timer: ChunkTimer::default(),
            aligner: SequenceAligner::default(),
            estimator: TimingEstimator::default(),
            gate: ValidationGate::default(),
            model_cache: None,
            show_progress: false,
        }
    }

    /// Wire up providers, timing parameters and the model cache from configuration.
    pub fn from_config(config: &Config) -> Self {
        let cache = Arc::new(ModelCache::new(default_model_loader(config)));
        let mut orchestrator = Self::new(Arc::new(MediaProbe))
            .with_chunk_timer(ChunkTimer::new(config.timing.chunk_timing()))
            .with_aligner(SequenceAligner::new(config.timing.aligner()))
            .with_estimator(TimingEstimator::new(config.timing.estimator()))
            .with_gate(ValidationGate::new(config.timing.gate()))
            .with_provider(create_local_provider(config, Arc::clone(&cache)))
            .with_provider(create_remote_provider(config));
        orchestrator.model_cache = Some(cache);
        orchestrator
    }

    /// Register a provider for its tier, replacing any previous one.
    pub fn with_provider(mut self, provider: Arc<dyn Transcriber>) -> Self {
        self.providers.insert(provider.tier(), provider);
        self
    }

    pub fn with_chunk_timer(mut self, chunk_timer: ChunkTimer) -> Self {
        self.chunk_timer = chunk_timer;
        self
    }

    pub fn with_aligner(mut self, aligner: SequenceAligner) -> Self {
        self.aligner = aligner;
        self
    }

    pub fn with_estimator(mut self, estimator: TimingEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_gate(mut self, gate: ValidationGate) -> Self {
        self.gate = gate;
        self
    }

    /// Enable or disable the batch progress bar.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn model_cache(&self) -> Option<&Arc<ModelCache>> {
        self.model_cache.as_ref()
    }

    /// Release cached models.
    pub fn shutdown(&self) {
        if let Some(ref cache) = self.model_cache {
            cache.clear();
        }
    }

    /// Produce an accepted timeline for `script` against `audio`.
    ///
    /// Only `InvalidAudio` and `InvalidInput` are returned as errors; every
    /// tier failure falls through to the next tier and finally to estimation.
    pub async fn synchronize(
        &self,
        script: &Script,
        audio: &AudioAsset,
        policy: &TierPolicy,
        deadline: Option<Duration>,
    ) -> Result<Timeline> {
        let report = self
            .synchronize_with_report(script, audio, policy, deadline, &CancelToken::new())
            .await?;
        Ok(report.timeline)
    }

    /// Like [`synchronize`](Self::synchronize), also recording every attempt.
    ///
    /// Cancelling `cancel` aborts the in-flight transcription and skips the
    /// remaining transcription tiers; an estimated timeline is still returned.
    pub async fn synchronize_with_report(
        &self,
        script: &Script,
        audio: &AudioAsset,
        policy: &TierPolicy,
        deadline: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<SyncReport> {
        let started = Instant::now();
        let expires_at = deadline.map(|d| tokio::time::Instant::now() + d);

        if script.is_empty() {
            return Err(SyncError::InvalidInput(
                "script contains no utterances".to_string(),
            ));
        }
        let utterances = script.utterances();

        let total_duration = self.probe_duration(audio).await?;
        info!(
            "Synchronizing {} utterances against {:.2}s of audio (policy {})",
            utterances.len(),
            total_duration,
            policy
        );

        let mut attempts = Vec::new();

        if let Some(dir) = audio.chunk_dir() {
            let attempt_started = Instant::now();
            info!("Trying tier {} ({})", TierId::ChunkDurations, dir.display());

            let measured = self
                .measure_chunks(dir, utterances, total_duration)
                .await;
            let (outcome, candidate) = match measured {
                Ok(candidate) => {
                    let outcome = self.judge(&candidate, total_duration, utterances.len());
                    (outcome, Some(candidate))
                }
                Err(e) => {
                    warn!("Tier {} failed: {}", TierId::ChunkDurations, e);
                    (AttemptOutcome::from(e), None)
                }
            };
            let accepted = outcome == AttemptOutcome::Accepted;

            attempts.push(TierAttempt {
                tier: TierId::ChunkDurations,
                provider: CHUNK_PROVIDER.to_string(),
                outcome,
                elapsed: attempt_started.elapsed(),
                words: None,
            });

            if let Some(timeline) = candidate.filter(|_| accepted) {
                info!("Accepted {} timeline", TierId::ChunkDurations);
                return Ok(SyncReport {
                    timeline,
                    attempts,
                    total_time: started.elapsed(),
                });
            }
        }

        for &tier in policy.tiers() {
            let attempt_started = Instant::now();
            let Some(provider) = self.providers.get(&tier) else {
                debug!("No provider registered for tier {}", tier);
                attempts.push(TierAttempt {
                    tier,
                    provider: "none".to_string(),
                    outcome: AttemptOutcome::Unavailable("no provider registered".to_string()),
                    elapsed: Duration::ZERO,
                    words: None,
                });
                continue;
            };

            if cancel.is_cancelled() {
                attempts.push(skipped(tier, provider.name(), "request cancelled"));
                continue;
            }
            if expires_at.is_some_and(|at| tokio::time::Instant::now() >= at) {
                attempts.push(skipped(tier, provider.name(), "deadline exceeded"));
                continue;
            }

            info!("Trying tier {} ({})", tier, provider.name());
            let words = self
                .run_attempt(provider.as_ref(), audio, expires_at, cancel)
                .await;
            let elapsed = attempt_started.elapsed();

            let words = match words {
                Ok(words) => words,
                Err(e) => {
                    warn!("Tier {} failed after {:.2}s: {}", tier, elapsed.as_secs_f64(), e);
                    attempts.push(TierAttempt {
                        tier,
                        provider: provider.name().to_string(),
                        outcome: e.into(),
                        elapsed,
                        words: None,
                    });
                    continue;
                }
            };

            let candidate = self
                .aligner
                .align(utterances, &words, total_duration, tier);
            let outcome = self.judge(&candidate, total_duration, utterances.len());
            let accepted = outcome == AttemptOutcome::Accepted;

            attempts.push(TierAttempt {
                tier,
                provider: provider.name().to_string(),
                outcome,
                elapsed: attempt_started.elapsed(),
                words: Some(words.len()),
            });

            if accepted {
                info!(
                    "Accepted {} timeline (coverage {:.0}%)",
                    tier,
                    candidate.coverage() * 100.0
                );
                return Ok(SyncReport {
                    timeline: candidate,
                    attempts,
                    total_time: started.elapsed(),
                });
            }
        }

        let attempt_started = Instant::now();
        let timeline = self.estimator.estimate(utterances, total_duration);
        if let Err(rejection) = self
            .gate
            .check_structure(&timeline, total_duration, utterances.len())
        {
            warn!("Estimated timeline failed structural checks: {}", rejection);
        }
        info!("Using estimated timing for {} utterances", utterances.len());

        attempts.push(TierAttempt {
            tier: TierId::Estimate,
            provider: "Proportional estimate".to_string(),
            outcome: AttemptOutcome::Accepted,
            elapsed: attempt_started.elapsed(),
            words: None,
        });

        Ok(SyncReport {
            timeline,
            attempts,
            total_time: started.elapsed(),
        })
    }

    /// Run independent requests concurrently; results keep input order.
    pub async fn synchronize_batch(
        &self,
        jobs: Vec<SyncJob>,
        concurrency: usize,
        cancel: &CancelToken,
    ) -> Vec<Result<SyncReport>> {
        let total_jobs = jobs.len();
        if total_jobs == 0 {
            return Vec::new();
        }

        info!(
            "Synchronizing {} jobs with {} concurrent requests",
            total_jobs, concurrency
        );

        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(total_jobs as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut futures = FuturesUnordered::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let sem = semaphore.clone();
            let pb = progress_bar.clone();

            futures.push(async move {
                // The semaphore is never closed, so a permit always arrives.
                let _permit = sem.acquire().await.ok();
                let result = self
                    .synchronize_with_report(
                        &job.script,
                        &job.audio,
                        &job.policy,
                        job.deadline,
                        cancel,
                    )
                    .await;

                if let Some(ref pb) = pb {
                    pb.inc(1);
                }
                match &result {
                    Ok(report) => debug!("Job {} finished with tier {}", index, report.tier_used()),
                    Err(e) => warn!("Job {} failed: {}", index, e),
                }
                (index, result)
            });
        }

        let mut results = Vec::with_capacity(total_jobs);
        while let Some(result) = futures.next().await {
            results.push(result);
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Synchronization complete");
        }

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Gate a candidate; a rejection becomes an `AlignmentRejected` outcome.
    fn judge(&self, candidate: &Timeline, total_duration: f64, count: usize) -> AttemptOutcome {
        match self.gate.validate(candidate, total_duration, count) {
            Ok(()) => AttemptOutcome::Accepted,
            Err(rejection) => {
                warn!("Tier {} candidate rejected: {}", candidate.tier_used, rejection);
                SyncError::AlignmentRejected(rejection).into()
            }
        }
    }

    async fn measure_chunks(
        &self,
        dir: &Path,
        utterances: &[Utterance],
        total_duration: f64,
    ) -> Result<Timeline> {
        let probe = Arc::clone(&self.probe);
        let timer = self.chunk_timer.clone();
        let dir = dir.to_path_buf();
        let utterances = utterances.to_vec();
        tokio::task::spawn_blocking(move || {
            timer.measure(&*probe, &dir, &utterances, total_duration)
        })
        .await
        .map_err(|e| {
            SyncError::TranscriptionUnavailable(format!("chunk measurement aborted: {}", e))
        })?
    }

    async fn probe_duration(&self, audio: &AudioAsset) -> Result<f64> {
        let probe = Arc::clone(&self.probe);
        let asset = audio.clone();
        tokio::task::spawn_blocking(move || probe.probe(&asset))
            .await
            .map_err(|e| SyncError::InvalidAudio(format!("duration probe aborted: {}", e)))?
    }

    /// One transcription attempt bounded by the deadline and the request token.
    ///
    /// On expiry the attempt's own token is cancelled and its future dropped,
    /// so nothing it produced reaches the aligner.
    async fn run_attempt(
        &self,
        provider: &dyn Transcriber,
        audio: &AudioAsset,
        expires_at: Option<tokio::time::Instant>,
        cancel: &CancelToken,
    ) -> Result<Vec<TranscribedWord>> {
        let attempt = CancelToken::new();

        tokio::select! {
            words = provider.transcribe(audio, &attempt) => words,
            _ = wait_until(expires_at) => {
                attempt.cancel();
                Err(SyncError::TranscriptionTimeout("deadline exceeded".to_string()))
            }
            _ = cancel.cancelled() => {
                attempt.cancel();
                Err(SyncError::TranscriptionTimeout("request cancelled".to_string()))
            }
        }
    }
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

const CHUNK_PROVIDER: &str = "Chunk durations";

fn skipped(tier: TierId, provider: &str, reason: &str) -> TierAttempt {
    debug!("Skipping tier {}: {}", tier, reason);
    TierAttempt {
        tier,
        provider: provider.to_string(),
        outcome: AttemptOutcome::Skipped(reason.to_string()),
        elapsed: Duration::ZERO,
        words: None,
    }
}

/// Print a human-readable summary of one request.
pub fn print_summary(report: &SyncReport, output: Option<&Path>) {
    let timeline = &report.timeline;

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                   Timing Synchronization Complete             ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    if let Some(path) = output {
        println!("  Output:     {}", path.display());
    }
    println!("  Segments:   {}", timeline.segments.len());
    println!("  Tier used:  {}", timeline.tier_used);
    println!("  Duration:   {:.1}s audio", timeline.total_duration);
    if !report.fell_back() {
        println!("  Coverage:   {:.0}%", timeline.coverage() * 100.0);
    }
    println!();
    println!("  Attempts:");
    for attempt in &report.attempts {
        let words = attempt
            .words
            .map(|n| format!(", {} words", n))
            .unwrap_or_default();
        println!(
            "    {:<15} {:.2}s{}  {}",
            attempt.tier.as_str(),
            attempt.elapsed.as_secs_f64(),
            words,
            attempt.outcome
        );
    }
    println!();
    println!("  Total:      {:.2}s", report.total_time.as_secs_f64());
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
