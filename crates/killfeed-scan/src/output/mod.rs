mod csv;
mod error;
mod image;
mod json;
mod types;

use std::fmt;
use std::path::PathBuf;

use killfeed_types::{ClipWindow, Event};
use tokio::fs;

use crate::settings::ExportSettings;

pub use error::OutputError;
pub use self::image::RoiDumper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Csv,
    EventsJson,
    ClipsJson,
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportKind::Csv => "CSV",
            ExportKind::EventsJson => "JSON",
            ExportKind::ClipsJson => "Clips",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub kind: ExportKind,
    pub path: PathBuf,
}

/// Writes the per-video event and clip exports into the output directory.
pub struct Exporter {
    settings: ExportSettings,
}

impl Exporter {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }

    /// `clips` is `None` when clip planning is disabled. An empty event list
    /// writes nothing.
    pub async fn export(
        &self,
        video_id: &str,
        events: &[Event],
        clips: Option<&[ClipWindow]>,
    ) -> Result<Vec<WrittenFile>, OutputError> {
        let mut written = Vec::new();
        if events.is_empty() {
            tracing::warn!(video_id, "no events to export");
            return Ok(written);
        }

        let dir = &self.settings.output_dir;
        fs::create_dir_all(dir)
            .await
            .map_err(|err| OutputError::io(dir, err))?;
        let pretty = self.settings.pretty_json;

        if self.settings.csv {
            let path = dir.join(format!("{video_id}_events.csv"));
            csv::write_events(&path, events).await?;
            written.push(WrittenFile {
                kind: ExportKind::Csv,
                path,
            });
        }

        if self.settings.json {
            let path = dir.join(format!("{video_id}_events.json"));
            json::write_events(&path, video_id, events, pretty).await?;
            written.push(WrittenFile {
                kind: ExportKind::EventsJson,
                path,
            });
        }

        if let Some(clips) = clips {
            let path = dir.join(format!("{video_id}_clips.json"));
            json::write_clips(&path, video_id, clips, pretty).await?;
            written.push(WrittenFile {
                kind: ExportKind::ClipsJson,
                path,
            });
        }

        for file in &written {
            tracing::info!(kind = %file.kind, path = %file.path.display(), "export written");
        }
        Ok(written)
    }
}
