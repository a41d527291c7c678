use killfeed_types::{ClipWindow, Event, TagSummary};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct EventsDocument<'a> {
    pub video_id: &'a str,
    pub total_events: usize,
    pub events: &'a [Event],
}

impl<'a> EventsDocument<'a> {
    pub(crate) fn new(video_id: &'a str, events: &'a [Event]) -> Self {
        Self {
            video_id,
            total_events: events.len(),
            events,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ClipsDocument<'a> {
    pub video_id: &'a str,
    pub total_clips: usize,
    pub clips: Vec<ClipRecord<'a>>,
}

/// One planned clip as handed to the external extractor.
#[derive(Debug, Serialize)]
pub(crate) struct ClipRecord<'a> {
    pub index: usize,
    pub label: String,
    pub file_stem: String,
    pub window_start: f64,
    pub window_end: f64,
    pub tag_summary: &'a TagSummary,
    pub event_count: usize,
    pub events: &'a [Event],
}

impl<'a> ClipsDocument<'a> {
    pub(crate) fn new(video_id: &'a str, windows: &'a [ClipWindow]) -> Self {
        let clips = windows
            .iter()
            .enumerate()
            .map(|(index, window)| ClipRecord {
                index,
                label: window.label(),
                file_stem: window.file_stem(video_id, index),
                window_start: window.window_start,
                window_end: window.window_end,
                tag_summary: &window.tag_summary,
                event_count: window.events.len(),
                events: &window.events,
            })
            .collect();
        Self {
            video_id,
            total_clips: windows.len(),
            clips,
        }
    }
}
