//! Killfeed scanning application.
//!
//! A video is decoded by a [`killfeed_decoder`] backend, sampled, searched for
//! killfeed boxes and indexed into events, which are exported as CSV/JSON
//! together with planned clip windows.

use std::path::Path;

pub mod backend;
pub mod batch;
pub mod cli;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod settings;
pub mod stage;

use backend::ExecutionPlan;
use output::Exporter;
use pipeline::{PipelineError, Shutdown, VideoReport};
use settings::EffectiveSettings;

/// Indexes one video and writes its exports.
pub async fn analyze_video(
    input: &Path,
    settings: &EffectiveSettings,
    shutdown: &Shutdown,
) -> Result<VideoReport, PipelineError> {
    let video_id = batch::video_id(input);
    let plan = ExecutionPlan::for_video(input, &video_id, settings)?;
    let mut report = backend::run(plan, shutdown).await?;

    let exporter = Exporter::new(settings.export.clone());
    report.outputs = exporter
        .export(&report.video_id, &report.events, report.clips.as_deref())
        .await?;
    Ok(report)
}
