use serde::{Deserialize, Serialize};

use crate::{Event, EventTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TagSummary {
    Single {
        tag: EventTag,
    },
    Composite {
        dominant: EventTag,
        cluster_size: usize,
    },
}

impl TagSummary {
    /// Summarizes a cluster. Clusters sharing one tag collapse to that tag;
    /// mixed clusters keep the most frequent one, ties resolved in favor of
    /// the tag seen first.
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first = events.first()?;
        if events.iter().all(|event| event.tag == first.tag) {
            return Some(TagSummary::Single { tag: first.tag });
        }
        let mut counts: Vec<(EventTag, usize)> = Vec::with_capacity(EventTag::ALL.len());
        for event in events {
            match counts.iter_mut().find(|(tag, _)| *tag == event.tag) {
                Some((_, count)) => *count += 1,
                None => counts.push((event.tag, 1)),
            }
        }
        let mut dominant = counts[0];
        for candidate in &counts[1..] {
            if candidate.1 > dominant.1 {
                dominant = *candidate;
            }
        }
        Some(TagSummary::Composite {
            dominant: dominant.0,
            cluster_size: events.len(),
        })
    }

    pub fn dominant(&self) -> EventTag {
        match self {
            TagSummary::Single { tag } => *tag,
            TagSummary::Composite { dominant, .. } => *dominant,
        }
    }
}

/// A span of the source video covering one or more clustered events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipWindow {
    pub events: Vec<Event>,
    pub window_start: f64,
    pub window_end: f64,
    pub tag_summary: TagSummary,
}

impl ClipWindow {
    pub fn duration(&self) -> f64 {
        self.window_end - self.window_start
    }

    /// `KILL` for a lone event, `MULTI_KILLx3` for a cluster of three.
    pub fn label(&self) -> String {
        let tag = self.tag_summary.dominant().as_str();
        match self.events.len() {
            0 | 1 => tag.to_string(),
            count => format!("{tag}x{count}"),
        }
    }

    /// Suggested output name (without extension) for the extracted clip.
    pub fn file_stem(&self, video_id: &str, index: usize) -> String {
        let whole_seconds = self.window_start.max(0.0).trunc() as u64;
        format!(
            "{video_id}_{index:03}_{}_{whole_seconds:04}s",
            self.label()
        )
    }
}
