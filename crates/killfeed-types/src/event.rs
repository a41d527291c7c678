use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ConfigurationError, PixelRect};

/// One candidate killfeed entry found inside the region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxDetection {
    pub frame_index: u64,
    pub timestamp_seconds: f64,
    pub bbox: PixelRect,
    pub area: u64,
    /// Rank among the boxes of the same frame, 0 nearest the anchor edge.
    pub stack_slot: u32,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventTag {
    Kill,
    MultiKill,
    Unknown,
}

impl EventTag {
    pub const ALL: [EventTag; 3] = [EventTag::Kill, EventTag::MultiKill, EventTag::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::Kill => "KILL",
            EventTag::MultiKill => "MULTI_KILL",
            EventTag::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventTag {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "KILL" => Ok(EventTag::Kill),
            "MULTI_KILL" | "MULTIKILL" => Ok(EventTag::MultiKill),
            "UNKNOWN" => Ok(EventTag::Unknown),
            _ => Err(ConfigurationError::invalid(format!(
                "unknown event tag '{s}' (expected KILL, MULTI_KILL or UNKNOWN)"
            ))),
        }
    }
}

/// A finalized group of detections. Immutable once produced by the grouper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub video_id: String,
    pub start_frame: u64,
    pub end_frame: u64,
    pub start_time: f64,
    pub end_time: f64,
    pub box_count: u32,
    pub stack_slot_min: u32,
    pub stack_slot_max: u32,
    #[serde(rename = "tag_guess")]
    pub tag: EventTag,
    pub confidence: f64,
}

impl Event {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}
