use std::sync::Arc;
use std::time::Duration;

use futures_util::{StreamExt, stream::unfold};
use killfeed_types::{FrameError, FrameResult, LumaFrame};
use tokio::sync::mpsc;

use super::StreamBundle;

const SAMPLER_CHANNEL_CAPACITY: usize = 2;
const FALLBACK_FPS: f64 = 30.0;
const EPSILON: f64 = 1e-6;

pub type SamplerResult = Result<SampledFrame, FrameError>;

/// A frame selected for detection, with its resolved position in the video.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    frame_index: u64,
    timestamp_seconds: f64,
    frame: Arc<LumaFrame>,
}

impl SampledFrame {
    pub fn frame(&self) -> &LumaFrame {
        self.frame.as_ref()
    }

    pub fn frame_handle(&self) -> Arc<LumaFrame> {
        Arc::clone(&self.frame)
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn timestamp_seconds(&self) -> f64 {
        self.timestamp_seconds
    }
}

pub struct FrameSampler {
    sample_fps: f64,
    source_fps: Option<f64>,
}

impl FrameSampler {
    /// `source_fps` is the container's frame rate when known; it switches the
    /// sampler from timestamp cadence to a fixed frame stride.
    pub fn new(sample_fps: f64, source_fps: Option<f64>) -> Self {
        Self {
            sample_fps,
            source_fps: source_fps.filter(|fps| fps.is_finite() && *fps > 0.0),
        }
    }

    pub fn attach(self, input: StreamBundle<FrameResult<LumaFrame>>) -> StreamBundle<SamplerResult> {
        let StreamBundle {
            stream,
            total_frames,
        } = input;

        let (tx, rx) = mpsc::channel::<SamplerResult>(SAMPLER_CHANNEL_CAPACITY);
        let mut worker = SamplerWorker::new(self.sample_fps, self.source_fps);

        tokio::spawn(async move {
            let mut upstream = stream;

            while let Some(maybe_frame) = upstream.next().await {
                match maybe_frame {
                    Ok(frame) => {
                        let Some(sample) = worker.handle_frame(frame) else {
                            continue;
                        };
                        if tx.send(Ok(sample)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                }
            }
        });

        let stream = Box::pin(unfold(rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_frames)
    }
}

struct SamplerWorker {
    processed: u64,
    source_fps: Option<f64>,
    schedule: SampleSchedule,
}

impl SamplerWorker {
    fn new(sample_fps: f64, source_fps: Option<f64>) -> Self {
        let schedule = SampleSchedule::new(sample_fps, source_fps);
        tracing::debug!(?schedule, "frame sampler configured");
        Self {
            processed: 0,
            source_fps,
            schedule,
        }
    }

    fn handle_frame(&mut self, frame: LumaFrame) -> Option<SampledFrame> {
        self.processed = self.processed.saturating_add(1);
        let frame_index = frame
            .frame_index()
            .unwrap_or_else(|| self.processed.saturating_sub(1));
        let timestamp_seconds = resolve_timestamp(frame.timestamp(), frame_index, self.source_fps);

        if !self.schedule.should_sample(frame_index, timestamp_seconds) {
            return None;
        }
        Some(SampledFrame {
            frame_index,
            timestamp_seconds,
            frame: Arc::new(frame),
        })
    }
}

fn resolve_timestamp(timestamp: Option<Duration>, frame_index: u64, fps: Option<f64>) -> f64 {
    match timestamp {
        Some(ts) => ts.as_secs_f64(),
        None => frame_index as f64 / fps.unwrap_or(FALLBACK_FPS),
    }
}

#[derive(Debug)]
enum SampleSchedule {
    /// Every `stride`-th decoded frame, counted from frame zero.
    Stride { stride: u64 },
    /// One frame per `interval` seconds of media time.
    Cadence { interval: f64, next_due: Option<f64> },
}

impl SampleSchedule {
    fn new(sample_fps: f64, source_fps: Option<f64>) -> Self {
        match source_fps {
            Some(fps) => Self::Stride {
                stride: ((fps / sample_fps).floor() as u64).max(1),
            },
            None => Self::Cadence {
                interval: 1.0 / sample_fps,
                next_due: None,
            },
        }
    }

    fn should_sample(&mut self, frame_index: u64, timestamp_seconds: f64) -> bool {
        match self {
            Self::Stride { stride } => frame_index % *stride == 0,
            Self::Cadence { interval, next_due } => {
                let due = next_due.unwrap_or(timestamp_seconds);
                if timestamp_seconds + EPSILON < due {
                    return false;
                }
                let missed = ((timestamp_seconds - due) / *interval).floor().max(0.0);
                *next_due = Some(due + (missed + 1.0) * *interval);
                true
            }
        }
    }
}
