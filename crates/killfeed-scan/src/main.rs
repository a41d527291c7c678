use std::path::Path;
use std::process::ExitCode;

use killfeed_scan::analyze_video;
use killfeed_scan::backend::display_available_backends;
use killfeed_scan::batch::discover_videos;
use killfeed_scan::cli::{CliSources, Command, RunOptions, parse_cli};
use killfeed_scan::pipeline::Shutdown;
use killfeed_scan::report::render_summary;
use killfeed_scan::settings::{EffectiveSettings, resolve_settings};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "KILLFEED_LOG";

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let (cli, sources) = parse_cli();

    match cli.command {
        Command::Backends => {
            display_available_backends();
            ExitCode::SUCCESS
        }
        Command::Analyze { video, options } => {
            let Some(settings) = prepare(&options, &sources) else {
                return ExitCode::FAILURE;
            };
            let shutdown = Shutdown::on_ctrl_c();
            match analyze_video(&video, &settings, &shutdown).await {
                Ok(report) => {
                    print!("{}", render_summary(&report));
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    tracing::error!(video = %video.display(), %err, "analysis failed");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Batch { folder, options } => {
            let Some(settings) = prepare(&options, &sources) else {
                return ExitCode::FAILURE;
            };
            run_batch(&folder, &settings).await
        }
    }
}

fn prepare(options: &RunOptions, sources: &CliSources) -> Option<EffectiveSettings> {
    init_tracing(options.verbose);
    match resolve_settings(options, sources) {
        Ok(settings) => {
            if let Some(path) = settings.config_path.as_ref() {
                tracing::debug!(path = %path.display(), "loaded configuration file");
            }
            Some(settings)
        }
        Err(err) => {
            tracing::error!(%err, "invalid configuration");
            None
        }
    }
}

async fn run_batch(folder: &Path, settings: &EffectiveSettings) -> ExitCode {
    let videos = match discover_videos(folder, &settings.video_extensions) {
        Ok(videos) => videos,
        Err(err) => {
            tracing::error!(folder = %folder.display(), %err, "failed to list videos");
            return ExitCode::FAILURE;
        }
    };
    if videos.is_empty() {
        tracing::warn!(folder = %folder.display(), "no video files found");
        return ExitCode::SUCCESS;
    }
    tracing::info!(count = videos.len(), "found video files to process");

    let shutdown = Shutdown::on_ctrl_c();
    let mut processed = 0usize;
    let mut failures = 0usize;
    for video in &videos {
        if shutdown.is_requested() {
            tracing::warn!("batch interrupted, skipping remaining videos");
            break;
        }
        tracing::info!(video = %video.display(), "processing");
        processed += 1;
        match analyze_video(video, settings, &shutdown).await {
            Ok(report) => print!("{}", render_summary(&report)),
            Err(err) => {
                failures += 1;
                tracing::error!(video = %video.display(), %err, "skipping video");
            }
        }
    }

    tracing::info!(processed, failures, "batch processing complete");
    ExitCode::SUCCESS
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
