//! Clip generation worker binary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vclip_analysis::StatusFn;
use vclip_media::{probe_metadata, EnvironmentCapabilities, ProgressFn};
use vclip_models::{
    AiProvider, AnalysisSettings, BatchClip, ClipOptions, ClipRequest, CropRect, OutputFormat, ProviderStatus,
    QualityTier, TargetAspect,
};
use vclip_worker::{BatchScheduler, ClipGenerationService, SourceAnalyzer, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "vclip-worker", version, about = "Viral clip generation and multi-model analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print source metadata as JSON
    Probe {
        /// Source video file
        input: PathBuf,
    },
    /// Generate one clip
    Generate(GenerateArgs),
    /// Generate every clip listed in a JSON file
    Batch(BatchArgs),
    /// Ask AI providers for viral moments and print the consensus
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output container (mp4, webm)
    #[arg(long, default_value = "mp4")]
    format: OutputFormat,

    /// Quality tier (high, medium, low)
    #[arg(long, default_value = "medium")]
    quality: QualityTier,

    /// Target aspect ratio (original, 16:9, 9:16, 1:1)
    #[arg(long, default_value = "original")]
    aspect: TargetAspect,

    /// Crop rectangle in source pixels: x,y,width,height
    #[arg(long)]
    crop: Option<CropRect>,
}

impl OutputArgs {
    fn options(&self) -> ClipOptions {
        ClipOptions {
            format: self.format,
            quality: self.quality,
            aspect_ratio: self.aspect,
            crop: self.crop,
        }
    }
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Source video file
    input: PathBuf,

    /// Start time in seconds
    #[arg(short, long)]
    start: f64,

    /// End time in seconds
    #[arg(short, long)]
    end: f64,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Source video file
    input: PathBuf,

    /// JSON array of {"start_time", "end_time", "options"} entries
    #[arg(long)]
    clips: PathBuf,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Source video file
    input: PathBuf,

    /// Providers to query (default: every provider with an API key)
    #[arg(long, value_delimiter = ',')]
    providers: Vec<AiProvider>,

    /// Maximum clips requested from each provider
    #[arg(long, default_value_t = 4)]
    max_clips: usize,

    /// Platform the clips are meant for
    #[arg(long)]
    platform: Option<String>,

    /// Extra instructions appended to the prompt
    #[arg(long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();
    info!(?config, "Starting vclip-worker");

    match cli.command {
        Commands::Probe { input } => {
            let metadata = probe_metadata(&input).await?;
            print_json(&metadata)?;
        }
        Commands::Generate(args) => {
            let service = ClipGenerationService::from_config(&config, EnvironmentCapabilities::detect());
            let request = ClipRequest::new(args.input, args.start, args.end).with_options(args.output.options());
            let on_progress: ProgressFn = Arc::new(|percent: u8| info!(percent, "Clip progress"));

            let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received shutdown signal, cancelling");
                    cancel_tx.send_replace(true);
                }
            });

            let result = service
                .generate_clip_with_cancel(request, Some(on_progress), cancel_rx)
                .await?;
            print_json(&result)?;
        }
        Commands::Batch(args) => {
            let raw = tokio::fs::read_to_string(&args.clips)
                .await
                .with_context(|| format!("failed to read {}", args.clips.display()))?;
            let clips: Vec<BatchClip> = serde_json::from_str(&raw).context("invalid clips file")?;

            let service = ClipGenerationService::from_config(&config, EnvironmentCapabilities::detect());
            let scheduler = BatchScheduler::from_config(service, &config);
            let on_progress: ProgressFn = Arc::new(|percent: u8| info!(percent, "Batch progress"));

            let report = scheduler.run(&args.input, &clips, Some(on_progress)).await;
            print_json(&report)?;
        }
        Commands::Analyze(args) => {
            let analyzer = SourceAnalyzer::from_config(&config)?;
            let settings = AnalysisSettings {
                max_clips: args.max_clips,
                target_platform: args.platform,
                custom_prompt: args.prompt,
                ..Default::default()
            };
            let on_status: StatusFn = Arc::new(|provider: AiProvider, status: ProviderStatus| {
                info!(provider = %provider, status = ?status, "Provider status");
            });

            let analysis = analyzer
                .analyze(&args.input, &args.providers, settings, Some(on_status))
                .await?;
            print_json(&analysis)?;
        }
    }

    Ok(())
}

/// Human-readable output by default, JSON with `LOG_FORMAT=json`.
fn init_tracing() -> Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vclip=info".parse()?);

    // Logs go to stderr so stdout carries only the JSON result
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
