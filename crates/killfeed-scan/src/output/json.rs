use std::path::Path;

use killfeed_types::{ClipWindow, Event};
use tokio::fs;

use crate::output::error::OutputError;
use crate::output::types::{ClipsDocument, EventsDocument};

pub(crate) async fn write_events(
    path: &Path,
    video_id: &str,
    events: &[Event],
    pretty: bool,
) -> Result<(), OutputError> {
    write_json(path, &EventsDocument::new(video_id, events), pretty).await
}

pub(crate) async fn write_clips(
    path: &Path,
    video_id: &str,
    windows: &[ClipWindow],
    pretty: bool,
) -> Result<(), OutputError> {
    write_json(path, &ClipsDocument::new(video_id, windows), pretty).await
}

async fn write_json<T>(path: &Path, data: &T, pretty: bool) -> Result<(), OutputError>
where
    T: serde::Serialize + ?Sized,
{
    let encoded = if pretty {
        serde_json::to_vec_pretty(data)?
    } else {
        serde_json::to_vec(data)?
    };
    fs::write(path, encoded)
        .await
        .map_err(|err| OutputError::io(path, err))
}
