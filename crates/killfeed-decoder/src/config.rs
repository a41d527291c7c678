use std::env;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;

#[cfg(feature = "backend-ffmpeg")]
use std::sync::OnceLock;

use crate::core::{DynFrameSource, FrameError, FrameResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mock,
    Ffmpeg,
}

impl FromStr for Backend {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Backend::Mock),
            "ffmpeg" => Ok(Backend::Ffmpeg),
            other => Err(FrameError::configuration(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Mock => "mock",
            Backend::Ffmpeg => "ffmpeg",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn compiled_backends() -> Vec<Backend> {
    let mut backends = Vec::new();
    #[cfg(feature = "backend-ffmpeg")]
    {
        if ffmpeg_runtime_available() {
            backends.push(Backend::Ffmpeg);
        }
    }
    backends.push(Backend::Mock);
    backends
}

#[cfg(feature = "backend-ffmpeg")]
fn ffmpeg_runtime_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| match ffmpeg_next::init() {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%err, "ffmpeg backend disabled: failed to initialize libraries");
            false
        }
    })
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    pub input: Option<PathBuf>,
    pub channel_capacity: Option<NonZeroUsize>,
}

impl Default for Configuration {
    fn default() -> Self {
        let backend = compiled_backends()
            .into_iter()
            .next()
            .unwrap_or(Backend::Mock);
        Self {
            backend,
            input: None,
            channel_capacity: None,
        }
    }
}

impl Configuration {
    pub fn from_env() -> FrameResult<Self> {
        let mut config = Configuration::default();
        if let Ok(backend) = env::var("KILLFEED_BACKEND") {
            config.backend = Backend::from_str(&backend)?;
        }
        if let Ok(path) = env::var("KILLFEED_INPUT") {
            config.input = Some(PathBuf::from(path));
        }
        if let Ok(capacity) = env::var("KILLFEED_CHANNEL_CAPACITY") {
            config.channel_capacity = Some(parse_capacity(&capacity)?);
        }
        Ok(config)
    }

    pub fn available_backends() -> Vec<Backend> {
        compiled_backends()
    }

    pub fn create_provider(&self) -> FrameResult<DynFrameSource> {
        let channel_capacity = self.channel_capacity.map(NonZeroUsize::get);
        tracing::debug!(backend = %self.backend, input = ?self.input, "creating frame source");

        match self.backend {
            Backend::Mock => crate::backends::mock::boxed_mock(channel_capacity),
            Backend::Ffmpeg => {
                #[cfg(feature = "backend-ffmpeg")]
                {
                    let path = self.input.clone().ok_or_else(|| {
                        FrameError::configuration("ffmpeg backend requires an input path")
                    })?;
                    return crate::backends::ffmpeg::boxed_ffmpeg(path, channel_capacity);
                }
                #[cfg(not(feature = "backend-ffmpeg"))]
                {
                    return Err(FrameError::unsupported("ffmpeg"));
                }
            }
        }
    }
}

fn parse_capacity(raw: &str) -> FrameResult<NonZeroUsize> {
    let parsed: usize = raw.trim().parse().map_err(|_| {
        FrameError::configuration(format!(
            "failed to parse KILLFEED_CHANNEL_CAPACITY='{raw}' as a positive integer"
        ))
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| {
        FrameError::configuration("KILLFEED_CHANNEL_CAPACITY must be greater than zero")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_round_trip() {
        for backend in [Backend::Mock, Backend::Ffmpeg] {
            assert_eq!(backend.as_str().parse::<Backend>().unwrap(), backend);
        }
        assert_eq!(" FFmpeg ".parse::<Backend>().unwrap(), Backend::Ffmpeg);
        assert!("vlc".parse::<Backend>().is_err());
    }

    #[test]
    fn mock_backend_is_always_compiled() {
        assert!(Configuration::available_backends().contains(&Backend::Mock));
    }

    #[test]
    fn capacity_must_be_positive() {
        assert_eq!(parse_capacity("16").unwrap().get(), 16);
        assert!(parse_capacity("0").is_err());
        assert!(parse_capacity("lots").is_err());
    }

    #[cfg(not(feature = "backend-ffmpeg"))]
    #[test]
    fn ffmpeg_backend_unsupported_without_feature() {
        let config = Configuration {
            backend: Backend::Ffmpeg,
            input: Some(PathBuf::from("match.mp4")),
            channel_capacity: None,
        };
        assert!(matches!(
            config.create_provider(),
            Err(FrameError::Unsupported { backend: "ffmpeg" })
        ));
    }
}
