use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{StreamExt, stream::unfold};
use killfeed_detector::{BoxDetection, BoxDetector, DetectionError};
use killfeed_types::FrameError;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task;

use super::StreamBundle;
use super::sampler::{SampledFrame, SamplerResult};
use crate::output::RoiDumper;

const DETECTION_CHANNEL_CAPACITY: usize = 2;

pub type DetectionSampleResult = Result<DetectionSample, DetectionStageError>;

pub struct DetectionSample {
    pub sample: SampledFrame,
    pub detections: Vec<BoxDetection>,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum DetectionStageError {
    #[error("frame source failed: {0}")]
    Source(#[from] FrameError),
    #[error("box detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("detection worker failed: {0}")]
    Worker(String),
}

/// Runs the box detector over each sampled frame on the blocking pool.
pub struct BoxDetectionStage {
    detector: Arc<BoxDetector>,
    dumper: Option<RoiDumper>,
}

impl BoxDetectionStage {
    pub fn new(detector: BoxDetector, dumper: Option<RoiDumper>) -> Self {
        Self {
            detector: Arc::new(detector),
            dumper,
        }
    }

    pub fn attach(self, input: StreamBundle<SamplerResult>) -> StreamBundle<DetectionSampleResult> {
        let StreamBundle {
            stream,
            total_frames,
        } = input;

        let (tx, rx) = mpsc::channel::<DetectionSampleResult>(DETECTION_CHANNEL_CAPACITY);
        let detector = self.detector;
        let dumper = self.dumper;

        tokio::spawn(async move {
            let mut upstream = stream;

            while let Some(item) = upstream.next().await {
                let result = match item {
                    Ok(sample) => detect_sample(&detector, sample).await,
                    Err(err) => Err(DetectionStageError::Source(err)),
                };
                let failed = result.is_err();

                if let (Ok(sample), Some(dumper)) = (&result, dumper.as_ref()) {
                    dump_sample(&detector, dumper, sample).await;
                }

                if tx.send(result).await.is_err() || failed {
                    break;
                }
            }
        });

        let stream = Box::pin(unfold(rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_frames)
    }
}

async fn detect_sample(detector: &Arc<BoxDetector>, sample: SampledFrame) -> DetectionSampleResult {
    let detector = Arc::clone(detector);
    let frame = sample.frame_handle();
    let frame_index = sample.frame_index();
    let timestamp = sample.timestamp_seconds();
    let started = Instant::now();

    let detections = task::spawn_blocking(move || detector.detect(&frame, frame_index, timestamp))
        .await
        .map_err(|err| DetectionStageError::Worker(err.to_string()))??;

    Ok(DetectionSample {
        sample,
        detections,
        elapsed: started.elapsed(),
    })
}

async fn dump_sample(detector: &BoxDetector, dumper: &RoiDumper, sample: &DetectionSample) {
    if sample.detections.is_empty() {
        return;
    }
    let frame = sample.sample.frame_handle();
    let Ok(roi) = detector.resolve_roi(frame.width(), frame.height()) else {
        return;
    };
    let frame_index = sample.sample.frame_index();
    if let Err(err) = dumper
        .write(frame, roi, &sample.detections, frame_index)
        .await
    {
        tracing::warn!(frame_index, %err, "failed to dump detection crop");
    }
}
