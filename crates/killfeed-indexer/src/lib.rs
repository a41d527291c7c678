//! Temporal indexing of killfeed detections.
//!
//! Per-frame detections flow through the [`DetectionAccumulator`], which
//! enforces frame ordering, into the [`EventGrouper`], which closes events on
//! temporal gaps and tags them. [`planner::plan`] then turns finalized events
//! into clip windows.

pub mod accumulator;
pub mod config;
pub mod grouper;
pub mod planner;
pub mod tagging;

use thiserror::Error;

pub use accumulator::{DetectionAccumulator, FrameDetections, StreamOrderingError};
pub use config::{AmbiguousTagPolicy, ClippingConfig, GroupingConfig};
pub use grouper::EventGrouper;
pub use killfeed_types::{ClipWindow, ConfigurationError, Event, EventTag, TagSummary};
pub use planner::plan;
pub use tagging::classify;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Ordering(#[from] StreamOrderingError),
}

/// Accumulator and grouper for one video, driven one sampled frame at a time.
#[derive(Debug)]
pub struct EventIndexer {
    accumulator: DetectionAccumulator,
    grouper: EventGrouper,
}

impl EventIndexer {
    pub fn new(
        video_id: impl Into<String>,
        config: GroupingConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            accumulator: DetectionAccumulator::new(),
            grouper: EventGrouper::new(video_id, config),
        })
    }

    /// Feeds one frame. Returns the event this frame closed, if any.
    pub fn push(&mut self, frame: FrameDetections) -> Result<Option<Event>, StreamOrderingError> {
        let frame = self.accumulator.accept(frame)?;
        Ok(self.grouper.observe(&frame))
    }

    /// Ends the stream, closing any open event.
    pub fn finish(mut self) -> Option<Event> {
        self.grouper.finish()
    }

    pub fn is_open(&self) -> bool {
        self.grouper.is_open()
    }

    pub fn frames_seen(&self) -> u64 {
        self.accumulator.frames_seen()
    }

    pub fn detections_seen(&self) -> u64 {
        self.accumulator.detections_seen()
    }
}

/// Indexes a complete, ordered sequence of frames.
pub fn index_frames<I>(
    video_id: &str,
    config: GroupingConfig,
    frames: I,
) -> Result<Vec<Event>, IndexerError>
where
    I: IntoIterator<Item = FrameDetections>,
{
    let mut indexer = EventIndexer::new(video_id, config)?;
    let mut events = Vec::new();
    for frame in frames {
        events.extend(indexer.push(frame)?);
    }
    events.extend(indexer.finish());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use killfeed_types::{BoxDetection, PixelRect};

    fn single_box(frame_index: u64, t: f64) -> FrameDetections {
        FrameDetections::new(
            frame_index,
            t,
            vec![BoxDetection {
                frame_index,
                timestamp_seconds: t,
                bbox: PixelRect::new(180, 290, 40, 16),
                area: 640,
                stack_slot: 0,
                confidence: 0.8,
            }],
        )
    }

    fn window(seconds: f64) -> GroupingConfig {
        GroupingConfig {
            grouping_delta_t: seconds,
            ..GroupingConfig::default()
        }
    }

    #[test]
    fn scenario_three_quick_detections_form_multi_kill() {
        let frames = [
            single_box(0, 0.0),
            single_box(10, 0.33),
            single_box(20, 0.67),
        ];
        let events = index_frames("match", window(1.0), frames).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].box_count, 3);
        assert_eq!(events[0].tag, EventTag::MultiKill);
    }

    #[test]
    fn scenario_far_apart_detections_form_two_kills() {
        let frames = [single_box(0, 0.0), single_box(300, 10.0)];
        let events = index_frames("match", window(1.0), frames).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.tag == EventTag::Kill));
    }

    #[test]
    fn scenario_close_events_share_one_clip() {
        let frames = [single_box(30, 1.0), single_box(120, 4.0)];
        let events = index_frames("match", window(1.0), frames).unwrap();
        assert_eq!(events.len(), 2);
        let windows = plan(&events, &ClippingConfig::default(), None);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].window_start, 0.0);
        assert_eq!(windows[0].window_end, 6.0);
    }

    #[test]
    fn out_of_order_frame_aborts_indexing() {
        let frames = [single_box(10, 0.33), single_box(5, 0.16)];
        let err = index_frames("match", GroupingConfig::default(), frames).unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Ordering(StreamOrderingError {
                previous: 10,
                received: 5
            })
        ));
    }

    #[test]
    fn invalid_grouping_config_is_rejected() {
        let err = EventIndexer::new("match", window(-1.0)).unwrap_err();
        assert!(matches!(err, ConfigurationError::NonPositive { .. }));
    }

    #[test]
    fn finishing_mid_event_returns_it() {
        let mut indexer = EventIndexer::new("match", GroupingConfig::default()).unwrap();
        assert!(indexer.push(single_box(0, 0.0)).unwrap().is_none());
        assert!(indexer.push(single_box(10, 0.33)).unwrap().is_none());
        assert!(indexer.is_open());
        assert_eq!(indexer.frames_seen(), 2);
        assert_eq!(indexer.detections_seen(), 2);
        let event = indexer.finish().unwrap();
        assert_eq!(event.box_count, 2);
        assert_eq!(event.tag, EventTag::Kill);
    }
}
