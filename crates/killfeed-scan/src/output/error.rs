use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum OutputError {
    Io { path: PathBuf, source: io::Error },
    Encode(image::ImageError),
    Json(serde_json::Error),
    Worker(String),
}

impl OutputError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        OutputError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            OutputError::Io { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Io { path, source } => {
                write!(f, "cannot write {}: {source}", path.display())
            }
            OutputError::Encode(err) => write!(f, "crop encoding failed: {err}"),
            OutputError::Json(err) => write!(f, "JSON serialization failed: {err}"),
            OutputError::Worker(message) => write!(f, "output worker failed: {message}"),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Io { source, .. } => Some(source),
            OutputError::Encode(err) => Some(err),
            OutputError::Json(err) => Some(err),
            OutputError::Worker(_) => None,
        }
    }
}

impl From<image::ImageError> for OutputError {
    fn from(err: image::ImageError) -> Self {
        OutputError::Encode(err)
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(err: serde_json::Error) -> Self {
        OutputError::Json(err)
    }
}
