use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use killfeed_decoder::{Backend, Configuration, FrameError};

use crate::pipeline::{self, PipelineConfig, PipelineError, Shutdown, VideoReport};
use crate::settings::EffectiveSettings;

const BACKEND_ENV: &str = "KILLFEED_BACKEND";

#[derive(Clone)]
pub struct ExecutionPlan {
    pub config: Configuration,
    pub backend_locked: bool,
    pub pipeline: PipelineConfig,
}

impl ExecutionPlan {
    /// Decoder choice: `--backend`/`[decoder].backend` first, then
    /// `KILLFEED_BACKEND`, then the first compiled backend. An explicit choice
    /// disables fallback.
    pub fn for_video(
        input: &Path,
        video_id: &str,
        settings: &EffectiveSettings,
    ) -> Result<Self, FrameError> {
        let env_backend_present = std::env::var(BACKEND_ENV).is_ok();
        let mut config = Configuration::from_env()?;
        let backend_override = settings
            .decoder
            .backend
            .as_deref()
            .map(parse_backend)
            .transpose()?;
        if let Some(backend) = backend_override {
            config.backend = backend;
        }
        if let Some(capacity) = settings.decoder.channel_capacity.and_then(NonZeroUsize::new) {
            config.channel_capacity = Some(capacity);
        }
        config.input = Some(input.to_path_buf());

        Ok(Self {
            config,
            backend_locked: backend_override.is_some() || env_backend_present,
            pipeline: PipelineConfig::from_settings(settings, video_id),
        })
    }
}

pub async fn run(plan: ExecutionPlan, shutdown: &Shutdown) -> Result<VideoReport, PipelineError> {
    let ExecutionPlan {
        config,
        backend_locked,
        pipeline,
    } = plan;

    let available = Configuration::available_backends();
    if available.is_empty() {
        return Err(FrameError::configuration(
            "no decoding backend available; rebuild with a backend feature such as \"backend-ffmpeg\"",
        )
        .into());
    }
    if !available.contains(&config.backend) {
        return Err(FrameError::unsupported(config.backend.as_str()).into());
    }

    let mut attempt_config = config;
    let mut tried = Vec::new();

    loop {
        if !tried.contains(&attempt_config.backend) {
            tried.push(attempt_config.backend);
        }

        let provider_started = Instant::now();
        let provider = match attempt_config.create_provider() {
            Ok(provider) => {
                tracing::info!(
                    backend = %attempt_config.backend,
                    elapsed = ?provider_started.elapsed(),
                    "initialized decoder backend"
                );
                provider
            }
            Err(err) => {
                if !backend_locked
                    && let Some(next) = select_next_backend(&available, &tried)
                {
                    tracing::warn!(
                        failed = %attempt_config.backend,
                        %err,
                        %next,
                        "backend failed to initialize; trying next"
                    );
                    attempt_config.backend = next;
                    continue;
                }
                return Err(err.into());
            }
        };

        match pipeline::run_pipeline(provider, &pipeline, shutdown).await {
            Ok(mut report) => {
                report.backend = Some(attempt_config.backend.as_str().to_string());
                return Ok(report);
            }
            Err((err, processed)) => {
                if processed == 0
                    && !backend_locked
                    && err.is_source_failure()
                    && let Some(next) = select_next_backend(&available, &tried)
                {
                    tracing::warn!(
                        failed = %attempt_config.backend,
                        %err,
                        %next,
                        "backend failed to decode; trying next"
                    );
                    attempt_config.backend = next;
                    continue;
                }
                return Err(err);
            }
        }
    }
}

pub fn available_backend_names() -> Vec<&'static str> {
    Configuration::available_backends()
        .iter()
        .map(Backend::as_str)
        .collect()
}

pub fn display_available_backends() {
    let names = available_backend_names();
    if names.is_empty() {
        println!("available backends: (none compiled)");
    } else {
        println!("available backends: {}", names.join(", "));
    }
}

pub fn parse_backend(value: &str) -> Result<Backend, FrameError> {
    Backend::from_str(value)
}

fn select_next_backend(available: &[Backend], tried: &[Backend]) -> Option<Backend> {
    available
        .iter()
        .copied()
        .find(|backend| !tried.contains(backend))
}
