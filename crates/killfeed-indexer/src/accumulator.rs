use killfeed_types::BoxDetection;
use thiserror::Error;

/// Detections found in one sampled frame. `boxes` is empty when nothing was found.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDetections {
    pub frame_index: u64,
    pub timestamp_seconds: f64,
    pub boxes: Vec<BoxDetection>,
}

impl FrameDetections {
    pub fn new(frame_index: u64, timestamp_seconds: f64, boxes: Vec<BoxDetection>) -> Self {
        Self {
            frame_index,
            timestamp_seconds,
            boxes,
        }
    }

    pub fn empty(frame_index: u64, timestamp_seconds: f64) -> Self {
        Self::new(frame_index, timestamp_seconds, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "frame {received} delivered after frame {previous}; sampled frames must arrive in increasing order"
)]
pub struct StreamOrderingError {
    pub previous: u64,
    pub received: u64,
}

/// Gatekeeper between the detector and the grouper: admits one frame at a
/// time and rejects anything that is not strictly newer than its predecessor.
#[derive(Debug, Default)]
pub struct DetectionAccumulator {
    last_frame: Option<u64>,
    frames: u64,
    detections: u64,
}

impl DetectionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(
        &mut self,
        frame: FrameDetections,
    ) -> Result<FrameDetections, StreamOrderingError> {
        if let Some(previous) = self.last_frame
            && frame.frame_index <= previous
        {
            return Err(StreamOrderingError {
                previous,
                received: frame.frame_index,
            });
        }
        self.last_frame = Some(frame.frame_index);
        self.frames += 1;
        self.detections += frame.boxes.len() as u64;
        Ok(frame)
    }

    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames
    }

    pub fn detections_seen(&self) -> u64 {
        self.detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increasing_frames_pass_through_unchanged() {
        let mut accumulator = DetectionAccumulator::new();
        let frame = FrameDetections::empty(0, 0.0);
        assert_eq!(accumulator.accept(frame.clone()).unwrap(), frame);
        accumulator.accept(FrameDetections::empty(10, 0.33)).unwrap();
        assert_eq!(accumulator.last_frame(), Some(10));
        assert_eq!(accumulator.frames_seen(), 2);
    }

    #[test]
    fn repeated_frame_is_rejected() {
        let mut accumulator = DetectionAccumulator::new();
        accumulator.accept(FrameDetections::empty(5, 0.2)).unwrap();
        let err = accumulator.accept(FrameDetections::empty(5, 0.2)).unwrap_err();
        assert_eq!(
            err,
            StreamOrderingError {
                previous: 5,
                received: 5
            }
        );
    }

    #[test]
    fn backwards_frame_is_rejected_and_state_kept() {
        let mut accumulator = DetectionAccumulator::new();
        accumulator.accept(FrameDetections::empty(20, 0.6)).unwrap();
        assert!(accumulator.accept(FrameDetections::empty(10, 0.3)).is_err());
        assert_eq!(accumulator.last_frame(), Some(20));
        assert_eq!(accumulator.frames_seen(), 1);
    }
}
