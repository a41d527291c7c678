use std::fmt::Write as _;
use std::path::Path;

use killfeed_types::Event;
use tokio::fs;

use crate::output::error::OutputError;

const HEADER: [&str; 10] = [
    "video_id",
    "start_frame",
    "end_frame",
    "start_time",
    "end_time",
    "box_count",
    "stack_slot_min",
    "stack_slot_max",
    "tag_guess",
    "confidence",
];

/// Renders events as CSV with CRLF line endings and minimal quoting.
pub(crate) fn render_events(events: &[Event]) -> String {
    let mut out = String::new();
    push_row(&mut out, HEADER.iter().map(|s| s.to_string()));
    for event in events {
        push_row(
            &mut out,
            [
                event.video_id.clone(),
                event.start_frame.to_string(),
                event.end_frame.to_string(),
                format!("{:?}", event.start_time),
                format!("{:?}", event.end_time),
                event.box_count.to_string(),
                event.stack_slot_min.to_string(),
                event.stack_slot_max.to_string(),
                event.tag.as_str().to_string(),
                format!("{:?}", event.confidence),
            ],
        );
    }
    out
}

pub(crate) async fn write_events(path: &Path, events: &[Event]) -> Result<(), OutputError> {
    fs::write(path, render_events(events))
        .await
        .map_err(|err| OutputError::io(path, err))
}

fn push_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    for (idx, field) in fields.into_iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            let _ = write!(out, "\"{}\"", field.replace('"', "\"\""));
        } else {
            out.push_str(&field);
        }
    }
    out.push_str("\r\n");
}
