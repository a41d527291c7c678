use std::collections::BTreeMap;
use std::fmt::Write;

use killfeed_types::EventTag;

use crate::pipeline::VideoReport;

/// Plain-text summary of one video, printed to stdout after each run.
pub fn render_summary(report: &VideoReport) -> String {
    let mut rows: Vec<(String, String)> = Vec::new();

    if let Some(backend) = report.backend.as_deref() {
        rows.push(("Backend".into(), backend.to_string()));
    }
    rows.push(("Frames Sampled".into(), report.frames_sampled.to_string()));
    rows.push(("Detections".into(), report.detections.to_string()));
    rows.push(("Total Events".into(), report.events.len().to_string()));

    if !report.events.is_empty() {
        let span = report
            .events
            .iter()
            .map(|event| event.end_time)
            .fold(0.0_f64, f64::max);
        rows.push((
            "Total Duration".into(),
            format!("{span:.2} seconds ({:.2} minutes)", span / 60.0),
        ));
        for (tag, count) in tag_counts(report) {
            rows.push((format!("{tag} Events"), count.to_string()));
        }
    }

    if let Some(clips) = report.clips.as_ref() {
        rows.push(("Clips".into(), clips.len().to_string()));
        for (index, clip) in clips.iter().enumerate() {
            rows.push((
                format!("Clip {index}"),
                format!(
                    "{} {:.2}s - {:.2}s",
                    clip.label(),
                    clip.window_start,
                    clip.window_end
                ),
            ));
        }
    }

    for file in &report.outputs {
        rows.push((file.kind.to_string(), file.path.display().to_string()));
    }
    rows.push(("Elapsed".into(), format!("{:.2?}", report.elapsed)));
    if report.interrupted {
        rows.push(("Interrupted".into(), "yes".into()));
    }

    let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut out = String::new();
    let _ = writeln!(out, "Events Summary: {}", report.video_id);
    for (key, value) in rows {
        let _ = writeln!(out, "  {key:<width$}  {value}");
    }
    if report.events.is_empty() {
        let _ = writeln!(out, "  no events detected");
    }
    out
}

/// Tag counts, most frequent first.
fn tag_counts(report: &VideoReport) -> Vec<(EventTag, usize)> {
    let mut counts: BTreeMap<EventTag, usize> = BTreeMap::new();
    for event in &report.events {
        *counts.entry(event.tag).or_default() += 1;
    }
    let mut counts: Vec<(EventTag, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
