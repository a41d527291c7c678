use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures_util::{StreamExt, stream::unfold};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use super::StreamBundle;
use super::detection::{DetectionSample, DetectionSampleResult};

const PROGRESS_CHANNEL_CAPACITY: usize = 4;

/// Event counters the indexing loop updates for the progress line.
#[derive(Debug, Default)]
pub struct EventTally {
    closed: AtomicU64,
    open: AtomicBool,
}

impl EventTally {
    pub fn record_closed(&self, count: u64) {
        self.closed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Relaxed);
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}

pub struct Progress {
    label: String,
    tally: Arc<EventTally>,
}

impl Progress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tally: Arc::new(EventTally::default()),
        }
    }

    pub fn tally(&self) -> Arc<EventTally> {
        Arc::clone(&self.tally)
    }

    pub fn attach(
        self,
        input: StreamBundle<DetectionSampleResult>,
    ) -> StreamBundle<DetectionSampleResult> {
        let StreamBundle {
            stream,
            total_frames,
        } = input;

        let (tx, rx) = mpsc::channel::<DetectionSampleResult>(PROGRESS_CHANNEL_CAPACITY);
        let mut monitor = ProgressMonitor::new(self.label, total_frames, self.tally);

        tokio::spawn(async move {
            let mut upstream = stream;

            while let Some(event) = upstream.next().await {
                monitor.observe(&event);
                if tx.send(event).await.is_err() {
                    monitor.abandon_if_needed();
                    return;
                }
            }

            monitor.finish_if_needed();
        });

        let stream = Box::pin(unfold(rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_frames)
    }
}

struct ProgressMonitor {
    bar: ProgressBar,
    total_frames: Option<u64>,
    tally: Arc<EventTally>,
    samples_seen: u64,
    detections_seen: u64,
    media_seconds: f64,
    started: Instant,
    finished: bool,
    avg_detection_ms: Option<f64>,
}

impl ProgressMonitor {
    fn new(label: String, total_frames: Option<u64>, tally: Arc<EventTally>) -> Self {
        let bar = match total_frames {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(bar_style());
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(spinner_style());
                bar
            }
        };
        bar.set_prefix(label);

        Self {
            bar,
            total_frames,
            tally,
            samples_seen: 0,
            detections_seen: 0,
            media_seconds: 0.0,
            started: Instant::now(),
            finished: false,
            avg_detection_ms: None,
        }
    }

    fn observe(&mut self, event: &DetectionSampleResult) {
        match event {
            Ok(sample) => self.observe_sample(sample),
            Err(err) => self.fail_with_reason(&err.to_string()),
        }
    }

    fn observe_sample(&mut self, sample: &DetectionSample) {
        self.samples_seen = self.samples_seen.saturating_add(1);
        self.detections_seen = self
            .detections_seen
            .saturating_add(sample.detections.len() as u64);
        self.media_seconds = sample.sample.timestamp_seconds();

        let frame_index = sample.sample.frame_index();
        match self.total_frames {
            Some(total) => self
                .bar
                .set_position(frame_index.saturating_add(1).min(total)),
            None => self.bar.set_position(frame_index.saturating_add(1)),
        }
        self.observe_detection_time(sample.elapsed);
        self.update_message();
    }

    fn observe_detection_time(&mut self, elapsed: Duration) {
        let millis = elapsed.as_secs_f64() * 1000.0;
        let alpha = 0.1;
        self.avg_detection_ms = Some(match self.avg_detection_ms {
            Some(current) => (1.0 - alpha) * current + alpha * millis,
            None => millis,
        });
    }

    fn update_message(&self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            format!("{:.2}x", self.media_seconds / elapsed)
        } else {
            "--x".to_string()
        };
        let det = self
            .avg_detection_ms
            .map(|value| format!("{value:.1} ms"))
            .unwrap_or_else(|| "-- ms".to_string());
        let open = if self.tally.is_open() { " (+1 open)" } else { "" };
        self.bar.set_message(format!(
            "{} samples • {} boxes • {} events{open} • det {det} • {speed}",
            self.samples_seen,
            self.detections_seen,
            self.tally.closed(),
        ));
    }

    fn fail_with_reason(&mut self, reason: &str) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.bar.abandon_with_message(format!(
            "failed after {} samples: {reason}",
            self.samples_seen
        ));
    }

    fn abandon_if_needed(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.bar.abandon_with_message(format!(
            "stopped after {} samples",
            self.samples_seen
        ));
    }

    fn finish_if_needed(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(total) = self.total_frames {
            self.bar.set_position(total);
        }
        self.bar.finish_with_message(format!(
            "{} samples • {} boxes",
            self.samples_seen, self.detections_seen
        ));
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {bar:40.cyan/blue} {percent:>3.bold}% {pos:>6}/{len:<6} [{elapsed_precise:.dim}<{eta_precise:.dim}] {msg:.yellow}",
    )
    .expect("invalid progress bar template")
    .progress_chars("█▉▊▋▌▍▎▏ ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {spinner:.cyan.bold} [{elapsed_precise:.dim}] {pos:>6}f {msg:.yellow}",
    )
    .expect("invalid progress spinner template")
    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_tracks_closed_and_open_events() {
        let tally = EventTally::default();
        assert_eq!(tally.closed(), 0);
        assert!(!tally.is_open());
        tally.record_closed(2);
        tally.set_open(true);
        assert_eq!(tally.closed(), 2);
        assert!(tally.is_open());
    }

    #[test]
    fn progress_templates_parse() {
        let _ = bar_style();
        let _ = spinner_style();
    }
}
