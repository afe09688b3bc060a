use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scriptsync::config::{Config, ModelSize, OutputFormat, RemoteApi};
use scriptsync::subtitle::{create_formatter, WrapConfig};
use scriptsync::{
    print_summary, AudioAsset, CancelToken, Script, SyncJob, SyncReport, TierOrchestrator,
    TierPolicy,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "scriptsync")]
#[command(version, about = "Synchronize dialogue scripts with synthesized speech")]
#[command(long_about = "Produce per-utterance start/end times for a dialogue script against its \
    finished audio track, using a local whisper model, a remote speech-to-text API, or \
    proportional estimation as a last resort.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronize one script against one audio file
    Sync {
        /// Script JSON: an array of {speaker, text} or {"dialogues": [...]}
        script: PathBuf,

        /// Finished speech audio
        audio: PathBuf,

        /// Output file (defaults to the audio name with the format's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory of per-utterance chunk_NNNN.wav files the audio was built from
        #[arg(long)]
        chunks: Option<PathBuf>,

        #[command(flatten)]
        options: SyncOptions,
    },
    /// Synchronize every entry of a JSON manifest
    Batch {
        /// Manifest: an array of {script, audio, output?, policy?, chunks?}
        manifest: PathBuf,

        /// Number of concurrent requests
        #[arg(short, long)]
        concurrency: Option<usize>,

        #[command(flatten)]
        options: SyncOptions,
    },
}

#[derive(Args)]
struct SyncOptions {
    /// Output format: json, srt, vtt
    #[arg(short, long, default_value = "json")]
    format: String,

    /// Tier policy: full, skip-remote, local-only, remote-only, remote-first,
    /// estimate-only, or a list such as "remote,local"
    #[arg(short, long)]
    policy: Option<String>,

    /// Deadline in seconds across all tier attempts (0 disables)
    #[arg(short, long)]
    deadline: Option<u64>,

    /// Local whisper model size: tiny, base, small, medium, large
    #[arg(short, long)]
    model_size: Option<String>,

    /// Remote API: openai, elevenlabs
    #[arg(short, long)]
    remote: Option<String>,

    /// Transcription language code (e.g., ja, en)
    #[arg(short, long)]
    language: Option<String>,

    /// Characters per subtitle line for srt/vtt output
    #[arg(long, default_value = "20")]
    chars_per_line: usize,

    /// Skip the summary printout
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    script: PathBuf,
    audio: PathBuf,
    #[serde(default)]
    output: Option<PathBuf>,
    #[serde(default)]
    policy: Option<TierPolicy>,
    #[serde(default)]
    chunks: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn derive_output_path(audio: &Path, format: &OutputFormat) -> PathBuf {
    let stem = audio.file_stem().unwrap_or_default();
    let mut output = audio.to_path_buf();
    output.set_file_name(format!("{}.{}", stem.to_string_lossy(), format.extension()));
    output
}

/// Apply command-line overrides on top of file and environment configuration.
fn apply_options(config: &mut Config, options: &SyncOptions) -> Result<()> {
    if let Some(ref policy) = options.policy {
        config.tier_policy = policy.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(deadline) = options.deadline {
        config.deadline_secs = (deadline > 0).then_some(deadline);
    }
    if let Some(ref size) = options.model_size {
        config.local.model_size = size
            .parse::<ModelSize>()
            .map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(ref api) = options.remote {
        config.remote.api = api
            .parse::<RemoteApi>()
            .map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(ref language) = options.language {
        config.language = language.clone();
    }
    Ok(())
}

fn write_output(
    report: &SyncReport,
    script: &Script,
    output: &Path,
    format: OutputFormat,
    wrap: WrapConfig,
) -> Result<()> {
    let document = report.timeline.to_document(script.utterances());
    let formatter = create_formatter(format, wrap);
    std::fs::write(output, formatter.format(&document))
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn run_sync(
    orchestrator: &TierOrchestrator,
    config: &Config,
    script_path: &Path,
    audio: AudioAsset,
    output: Option<PathBuf>,
    options: &SyncOptions,
    cancel: &CancelToken,
) -> Result<()> {
    let format: OutputFormat = options
        .format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let output = output.unwrap_or_else(|| derive_output_path(audio.path(), &format));

    let script = Script::load(script_path)
        .with_context(|| format!("Failed to load script {}", script_path.display()))?;

    info!("Script:   {} ({} utterances)", script_path.display(), script.len());
    info!("Audio:    {}", audio.path().display());
    if let Some(dir) = audio.chunk_dir() {
        info!("Chunks:   {}", dir.display());
    }
    info!("Output:   {}", output.display());
    info!("Policy:   {}", config.tier_policy);

    let pb = spinner("Synchronizing...".to_string());
    let result = orchestrator
        .synchronize_with_report(&script, &audio, &config.tier_policy, config.deadline(), cancel)
        .await;
    pb.finish_and_clear();

    let report = result.context("Synchronization failed")?;
    let wrap = WrapConfig {
        chars_per_line: options.chars_per_line.max(1),
        ..WrapConfig::default()
    };
    write_output(&report, &script, &output, format, wrap)?;

    if !options.quiet {
        print_summary(&report, Some(&output));
    }
    Ok(())
}

async fn run_batch(
    orchestrator: TierOrchestrator,
    config: &Config,
    manifest: &Path,
    options: &SyncOptions,
    cancel: &CancelToken,
) -> Result<()> {
    let format: OutputFormat = options
        .format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let wrap = WrapConfig {
        chars_per_line: options.chars_per_line.max(1),
        ..WrapConfig::default()
    };

    let contents = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&contents).context("Malformed manifest")?;

    // Relative paths in the manifest are resolved against its directory.
    let base = manifest.parent().unwrap_or_else(|| Path::new("."));
    let mut jobs = Vec::with_capacity(entries.len());
    let mut outputs = Vec::with_capacity(entries.len());
    for entry in entries {
        let script_path = base.join(&entry.script);
        let audio_path = base.join(&entry.audio);
        let script = Script::load(&script_path)
            .with_context(|| format!("Failed to load script {}", script_path.display()))?;
        let output = entry
            .output
            .map(|o| base.join(o))
            .unwrap_or_else(|| derive_output_path(&audio_path, &format));

        let mut audio = AudioAsset::new(audio_path);
        if let Some(chunks) = entry.chunks {
            audio = audio.with_chunks(base.join(chunks));
        }

        outputs.push((output, script.clone()));
        jobs.push(SyncJob {
            script,
            audio,
            policy: entry.policy.unwrap_or_else(|| config.tier_policy.clone()),
            deadline: config.deadline(),
        });
    }

    let orchestrator = orchestrator.with_progress(true);
    let results = orchestrator
        .synchronize_batch(jobs, config.concurrency, cancel)
        .await;

    let mut failed = 0;
    for (result, (output, script)) in results.into_iter().zip(outputs) {
        match result {
            Ok(report) => {
                write_output(&report, &script, &output, format, wrap)?;
                if !options.quiet {
                    print_summary(&report, Some(&output));
                }
            }
            Err(e) => {
                warn!("{}: {}", output.display(), e);
                failed += 1;
            }
        }
    }

    orchestrator.shutdown();
    if failed > 0 {
        anyhow::bail!("{} batch job(s) failed", failed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = Config::load().context("Failed to load configuration")?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, abandoning in-flight transcription");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    match cli.command {
        Command::Sync {
            script,
            audio,
            output,
            chunks,
            options,
        } => {
            apply_options(&mut config, &options)?;
            config.validate().context("Configuration validation failed")?;

            let orchestrator = TierOrchestrator::from_config(&config);
            let result = run_sync(
                &orchestrator,
                &config,
                &script,
                match chunks {
                    Some(dir) => AudioAsset::new(audio).with_chunks(dir),
                    None => AudioAsset::new(audio),
                },
                output,
                &options,
                &cancel,
            )
            .await;
            orchestrator.shutdown();
            result
        }
        Command::Batch {
            manifest,
            concurrency,
            options,
        } => {
            apply_options(&mut config, &options)?;
            if let Some(c) = concurrency {
                config.concurrency = c;
            }
            config.validate().context("Configuration validation failed")?;

            let orchestrator = TierOrchestrator::from_config(&config);
            run_batch(orchestrator, &config, &manifest, &options, &cancel).await
        }
    }
}
