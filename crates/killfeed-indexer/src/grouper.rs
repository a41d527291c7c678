use killfeed_types::{BoxDetection, Event};

use crate::accumulator::FrameDetections;
use crate::config::GroupingConfig;
use crate::tagging::classify;

#[derive(Debug, Clone, PartialEq)]
struct OpenEvent {
    start_frame: u64,
    end_frame: u64,
    start_time: f64,
    last_detection_time: f64,
    box_count: u32,
    stack_slot_min: u32,
    stack_slot_max: u32,
    confidence: f64,
}

impl OpenEvent {
    fn seed(frame: &FrameDetections) -> Self {
        let mut open = Self {
            start_frame: frame.frame_index,
            end_frame: frame.frame_index,
            start_time: frame.timestamp_seconds,
            last_detection_time: frame.timestamp_seconds,
            box_count: 0,
            stack_slot_min: u32::MAX,
            stack_slot_max: 0,
            confidence: 0.0,
        };
        open.fold_boxes(&frame.boxes);
        open
    }

    fn absorb(&mut self, frame: &FrameDetections) {
        self.end_frame = frame.frame_index;
        self.last_detection_time = frame.timestamp_seconds;
        self.fold_boxes(&frame.boxes);
    }

    fn fold_boxes(&mut self, boxes: &[BoxDetection]) {
        for detection in boxes {
            self.box_count += 1;
            self.confidence += (detection.confidence - self.confidence) / f64::from(self.box_count);
            self.stack_slot_min = self.stack_slot_min.min(detection.stack_slot);
            self.stack_slot_max = self.stack_slot_max.max(detection.stack_slot);
        }
    }

    fn finalize(self, video_id: &str, config: &GroupingConfig) -> Event {
        Event {
            video_id: video_id.to_string(),
            start_frame: self.start_frame,
            end_frame: self.end_frame,
            start_time: self.start_time,
            end_time: self.last_detection_time,
            box_count: self.box_count,
            stack_slot_min: self.stack_slot_min,
            stack_slot_max: self.stack_slot_max,
            tag: classify(self.box_count, config),
            confidence: self.confidence.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
enum GrouperState {
    #[default]
    Idle,
    Open(OpenEvent),
}

/// Folds per-frame detections into events using a temporal gap rule.
///
/// An event stays open while consecutive detections are at most
/// `grouping_delta_t` seconds apart. Empty frames inside that window are
/// tolerated; the first empty frame past it closes the event.
#[derive(Debug)]
pub struct EventGrouper {
    video_id: String,
    config: GroupingConfig,
    state: GrouperState,
}

impl EventGrouper {
    pub fn new(video_id: impl Into<String>, config: GroupingConfig) -> Self {
        Self {
            video_id: video_id.into(),
            config,
            state: GrouperState::Idle,
        }
    }

    pub fn config(&self) -> &GroupingConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, GrouperState::Open(_))
    }

    /// Advances the state machine by one frame, returning an event if one was closed.
    pub fn observe(&mut self, frame: &FrameDetections) -> Option<Event> {
        let delta = self.config.grouping_delta_t;
        let (next, finalized) = match std::mem::take(&mut self.state) {
            GrouperState::Idle if frame.is_empty() => (GrouperState::Idle, None),
            GrouperState::Idle => (GrouperState::Open(OpenEvent::seed(frame)), None),
            GrouperState::Open(mut open) => {
                let gap = frame.timestamp_seconds - open.last_detection_time;
                match (frame.is_empty(), gap <= delta) {
                    (true, true) => (GrouperState::Open(open), None),
                    (true, false) => (GrouperState::Idle, Some(self.close(open))),
                    (false, true) => {
                        open.absorb(frame);
                        (GrouperState::Open(open), None)
                    }
                    (false, false) => (
                        GrouperState::Open(OpenEvent::seed(frame)),
                        Some(self.close(open)),
                    ),
                }
            }
        };
        self.state = next;
        finalized
    }

    /// Closes any open event. Used at stream end and on cancellation.
    pub fn finish(&mut self) -> Option<Event> {
        match std::mem::take(&mut self.state) {
            GrouperState::Idle => None,
            GrouperState::Open(open) => Some(self.close(open)),
        }
    }

    fn close(&self, open: OpenEvent) -> Event {
        let event = open.finalize(&self.video_id, &self.config);
        tracing::debug!(
            video_id = %event.video_id,
            start = event.start_time,
            end = event.end_time,
            boxes = event.box_count,
            tag = %event.tag,
            "event finalized"
        );
        event
    }
}
