use std::time::{Duration, Instant};

use killfeed_decoder::{DynFrameSource, FrameError};
use killfeed_detector::{BoxDetector, DetectionError};
use killfeed_indexer::{
    ClipWindow, ClippingConfig, ConfigurationError, Event, EventIndexer, FrameDetections,
    GroupingConfig, StreamOrderingError, plan,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::StreamExt;

use crate::output::{OutputError, RoiDumper, WrittenFile};
use crate::settings::{DetectionSettings, EffectiveSettings, ImageDumpSettings};
use crate::stage::StreamBundle;
use crate::stage::detection::{BoxDetectionStage, DetectionStageError};
use crate::stage::progress::Progress;
use crate::stage::sampler::FrameSampler;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("frame source failed: {0}")]
    Source(#[from] FrameError),
    #[error("box detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Ordering(#[from] StreamOrderingError),
    #[error("failed to write output: {0}")]
    Output(#[from] OutputError),
    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Failures that another decoding backend might not hit.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, PipelineError::Source(_))
    }
}

impl From<DetectionStageError> for PipelineError {
    fn from(err: DetectionStageError) -> Self {
        match err {
            DetectionStageError::Source(err) => PipelineError::Source(err),
            DetectionStageError::Detection(err) => PipelineError::Detection(err),
            DetectionStageError::Worker(message) => PipelineError::Worker(message),
        }
    }
}

/// Stop request shared by every video of a run.
///
/// A dropped trigger never fires, so [`Shutdown::never`] simply waits forever.
#[derive(Debug, Clone)]
pub struct Shutdown {
    signal: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn channel() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown { signal: rx })
    }

    pub fn never() -> Self {
        Self::channel().1
    }

    /// Fires on the first Ctrl-C.
    pub fn on_ctrl_c() -> Self {
        let (tx, shutdown) = Self::channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing current video");
                let _ = tx.send(true);
            }
        });
        shutdown
    }

    pub fn is_requested(&self) -> bool {
        *self.signal.borrow()
    }

    pub async fn requested(&mut self) {
        loop {
            if *self.signal.borrow_and_update() {
                return;
            }
            if self.signal.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Clone)]
pub struct PipelineConfig {
    pub video_id: String,
    pub detection: DetectionSettings,
    pub grouping: GroupingConfig,
    pub clipping: ClippingConfig,
    pub image_dump: Option<ImageDumpSettings>,
}

impl PipelineConfig {
    pub fn from_settings(settings: &EffectiveSettings, video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            detection: settings.detection.clone(),
            grouping: settings.grouping.clone(),
            clipping: settings.clipping.clone(),
            image_dump: settings.image_dump.clone(),
        }
    }
}

/// Outcome of indexing one video.
#[derive(Debug, Clone)]
pub struct VideoReport {
    pub video_id: String,
    pub backend: Option<String>,
    pub events: Vec<Event>,
    /// `None` when clip planning is disabled.
    pub clips: Option<Vec<ClipWindow>>,
    pub frames_sampled: u64,
    pub detections: u64,
    pub video_duration: Option<f64>,
    pub interrupted: bool,
    pub elapsed: Duration,
    pub outputs: Vec<WrittenFile>,
}

/// Samples, detects and indexes one video.
///
/// On failure the error is paired with the number of frames that were
/// indexed before it, so callers can tell a backend that never produced a
/// frame from one that failed midway.
pub async fn run_pipeline(
    provider: DynFrameSource,
    config: &PipelineConfig,
    shutdown: &Shutdown,
) -> Result<VideoReport, (PipelineError, u64)> {
    let started = Instant::now();
    let metadata = provider.metadata();
    let total_frames = metadata.calculate_total_frames();
    let sample_fps = config.detection.sample_fps;

    let detector = BoxDetector::new(config.detection.options.clone()).map_err(failed(0))?;
    let mut indexer = EventIndexer::new(config.video_id.clone(), config.grouping.clone())
        .map_err(failed(0))?;

    tracing::info!(
        video_id = %config.video_id,
        source_fps = ?metadata.valid_fps(),
        duration = ?metadata.duration_seconds(),
        total_frames = ?total_frames,
        sample_fps,
        empty_frame_tolerance = config.grouping.empty_frame_tolerance(sample_fps),
        "starting killfeed scan"
    );

    let dumper = match config.image_dump.as_ref() {
        Some(dump) => {
            tokio::fs::create_dir_all(&dump.dir)
                .await
                .map_err(|err| OutputError::io(&dump.dir, err))
                .map_err(failed(0))?;
            Some(RoiDumper::new(dump.clone()))
        }
        None => None,
    };

    let source = StreamBundle::new(provider.into_stream(), total_frames);
    let sampled = FrameSampler::new(sample_fps, metadata.valid_fps()).attach(source);
    let detected = BoxDetectionStage::new(detector, dumper).attach(sampled);
    let progress = Progress::new(config.video_id.clone());
    let tally = progress.tally();
    let StreamBundle { mut stream, .. } = progress.attach(detected);

    let mut shutdown = shutdown.clone();
    let mut events = Vec::new();
    let mut interrupted = false;

    loop {
        let item = tokio::select! {
            biased;
            _ = shutdown.requested() => {
                interrupted = true;
                break;
            }
            item = stream.next() => item,
        };
        let Some(item) = item else {
            break;
        };

        let processed = indexer.frames_seen();
        let sample = item.map_err(failed(processed))?;
        let frame = FrameDetections::new(
            sample.sample.frame_index(),
            sample.sample.timestamp_seconds(),
            sample.detections,
        );
        if let Some(event) = indexer.push(frame).map_err(failed(processed))? {
            tally.record_closed(1);
            events.push(event);
        }
        tally.set_open(indexer.is_open());
    }
    drop(stream);

    let frames_sampled = indexer.frames_seen();
    let detections = indexer.detections_seen();
    events.extend(indexer.finish());

    let video_duration = metadata.duration_seconds();
    let clips = config
        .clipping
        .enabled
        .then(|| plan(&events, &config.clipping, video_duration));

    let elapsed = started.elapsed();
    tracing::info!(
        video_id = %config.video_id,
        frames_sampled,
        detections,
        events = events.len(),
        clips = ?clips.as_ref().map(Vec::len),
        interrupted,
        elapsed = ?elapsed,
        "killfeed scan finished"
    );

    Ok(VideoReport {
        video_id: config.video_id.clone(),
        backend: None,
        events,
        clips,
        frames_sampled,
        detections,
        video_duration,
        interrupted,
        elapsed,
        outputs: Vec::new(),
    })
}

fn failed<E: Into<PipelineError>>(processed: u64) -> impl FnOnce(E) -> (PipelineError, u64) {
    move |err| (err.into(), processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use killfeed_decoder::backends::mock::{MockProvider, MockScript, ScriptedEntry};
    use killfeed_detector::DetectionOptions;
    use killfeed_indexer::EventTag;

    fn config(clipping: bool) -> PipelineConfig {
        PipelineConfig {
            video_id: "mock".into(),
            detection: DetectionSettings {
                options: DetectionOptions::default(),
                sample_fps: 3.0,
            },
            grouping: GroupingConfig::default(),
            clipping: ClippingConfig {
                enabled: clipping,
                ..ClippingConfig::default()
            },
            image_dump: None,
        }
    }

    fn provider(script: MockScript) -> DynFrameSource {
        Box::new(MockProvider::new(script, None))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn default_script_yields_kill_then_multi_kill() {
        let report = run_pipeline(provider(MockScript::default()), &config(true), &Shutdown::never())
            .await
            .unwrap();
        assert!(!report.interrupted);
        assert_eq!(report.frames_sampled, 30);
        let tags: Vec<EventTag> = report.events.iter().map(|e| e.tag).collect();
        assert_eq!(tags, vec![EventTag::Kill, EventTag::MultiKill]);
        let clips = report.clips.unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].label(), "KILLx2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_clipping_reports_no_clips() {
        let report = run_pipeline(provider(MockScript::default()), &config(false), &Shutdown::never())
            .await
            .unwrap();
        assert!(report.clips.is_none());
        assert_eq!(report.events.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn entry_visible_at_the_end_is_closed_on_finish() {
        let script = MockScript {
            frame_count: 60,
            entries: vec![ScriptedEntry::new(1.2, 10.0)],
            ..MockScript::default()
        };
        let report = run_pipeline(provider(script), &config(false), &Shutdown::never())
            .await
            .unwrap();
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].start_frame, 40);
        assert_eq!(report.events[0].end_frame, 50);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn requested_shutdown_stops_before_indexing() {
        let (trigger, shutdown) = Shutdown::channel();
        trigger.send(true).unwrap();
        assert!(shutdown.is_requested());
        let report = run_pipeline(provider(MockScript::default()), &config(true), &shutdown)
            .await
            .unwrap();
        assert!(report.interrupted);
        assert_eq!(report.frames_sampled, 0);
        assert!(report.events.is_empty());
        assert_eq!(report.clips.map(|clips| clips.len()), Some(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_grouping_fails_before_reading_frames() {
        let mut config = config(false);
        config.grouping.grouping_delta_t = 0.0;
        let (err, processed) = run_pipeline(provider(MockScript::default()), &config, &Shutdown::never())
            .await
            .unwrap_err();
        assert_eq!(processed, 0);
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(!err.is_source_failure());
    }
}
