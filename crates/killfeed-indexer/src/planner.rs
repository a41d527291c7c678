use killfeed_types::{ClipWindow, Event, TagSummary};

use crate::config::ClippingConfig;

/// Derives clip windows from finalized events.
///
/// Events failing the confidence, box-count or tag filters are dropped. The
/// rest are clustered in a single pass in start-time order: an event joins
/// the current cluster when it starts within `cluster_threshold_seconds` of
/// the latest end seen in that cluster. Clusters are never re-merged, so
/// padded windows of neighbouring clusters may overlap.
///
/// `video_duration` clamps window ends when known. The `enabled` flag is the
/// caller's concern.
pub fn plan(
    events: &[Event],
    config: &ClippingConfig,
    video_duration: Option<f64>,
) -> Vec<ClipWindow> {
    let mut kept: Vec<&Event> = events.iter().filter(|e| passes_filters(e, config)).collect();
    kept.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let threshold = config.cluster_threshold_seconds;
    let mut clusters: Vec<Vec<Event>> = Vec::new();
    let mut cluster_end = f64::NEG_INFINITY;
    for event in kept {
        if let Some(cluster) = clusters.last_mut()
            && event.start_time - cluster_end <= threshold
        {
            cluster.push(event.clone());
            cluster_end = cluster_end.max(event.end_time);
            continue;
        }
        clusters.push(vec![event.clone()]);
        cluster_end = event.end_time;
    }

    let mut windows: Vec<ClipWindow> = clusters
        .into_iter()
        .filter_map(|cluster| window_for(cluster, config, video_duration))
        .collect();

    if let Some(cap) = config.clip_cap() {
        windows.truncate(cap);
    }
    windows
}

fn passes_filters(event: &Event, config: &ClippingConfig) -> bool {
    event.confidence >= config.min_confidence
        && event.box_count >= config.min_box_count
        && config.allows(event.tag)
}

fn window_for(
    events: Vec<Event>,
    config: &ClippingConfig,
    video_duration: Option<f64>,
) -> Option<ClipWindow> {
    let tag_summary = TagSummary::from_events(&events)?;
    let earliest = events
        .iter()
        .map(|e| e.start_time)
        .fold(f64::INFINITY, f64::min);
    let latest = events
        .iter()
        .map(|e| e.end_time)
        .fold(f64::NEG_INFINITY, f64::max);

    let window_start = (earliest - config.pre_padding_seconds).max(0.0);
    let mut window_end = latest + config.post_padding_seconds;
    if let Some(duration) = video_duration.filter(|d| d.is_finite() && *d >= 0.0) {
        window_end = window_end.min(duration);
    }
    Some(ClipWindow {
        events,
        window_start,
        window_end: window_end.max(window_start),
        tag_summary,
    })
}
