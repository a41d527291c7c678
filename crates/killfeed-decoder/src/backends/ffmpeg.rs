#![cfg(feature = "backend-ffmpeg")]

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg::util::error::{EAGAIN, EWOULDBLOCK};
use ffmpeg_next as ffmpeg;
use tokio::sync::mpsc;

use crate::core::{
    DynFrameSource, FrameError, FrameResult, FrameSource, FrameStream, LumaFrame, VideoMetadata,
    spawn_stream_from_channel,
};

const BACKEND_NAME: &str = "ffmpeg";
const DEFAULT_CHANNEL_CAPACITY: usize = 8;

pub struct FfmpegProvider {
    input: PathBuf,
    metadata: VideoMetadata,
    channel_capacity: usize,
}

impl FfmpegProvider {
    pub fn open<P: AsRef<Path>>(path: P, channel_capacity: Option<usize>) -> FrameResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input file {} does not exist", path.display()),
            )));
        }
        ffmpeg::init().map_err(|err| FrameError::backend_failure(BACKEND_NAME, err.to_string()))?;
        let metadata = probe_metadata(path)?;
        tracing::debug!(path = %path.display(), ?metadata, "opened ffmpeg input");
        Ok(Self {
            input: path.to_path_buf(),
            metadata,
            channel_capacity: channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY),
        })
    }

    fn decode_loop(&self, tx: &mpsc::Sender<FrameResult<LumaFrame>>) -> FrameResult<()> {
        let mut ictx = ffmpeg::format::input(&self.input).map_err(backend_error)?;
        let input_stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| FrameError::backend_failure(BACKEND_NAME, "no video stream found"))?;
        let stream_index = input_stream.index();
        let time_base = input_stream.time_base();

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(backend_error)?;
        let mut decoder = context.decoder().video().map_err(backend_error)?;

        let mut scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::pixel::Pixel::GRAY8,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::FAST_BILINEAR,
        )
        .map_err(backend_error)?;

        let mut decoded = ffmpeg::util::frame::Video::empty();
        let mut converted = ffmpeg::util::frame::Video::empty();
        let mut next_index: u64 = 0;
        let mut receiver_open = true;

        let mut drain = |decoder: &mut ffmpeg::decoder::Video| -> FrameResult<bool> {
            loop {
                match decoder.receive_frame(&mut decoded) {
                    Ok(()) => {
                        scaler.run(&decoded, &mut converted).map_err(backend_error)?;
                        converted.set_pts(decoded.timestamp().or(decoded.pts()));
                        let frame = frame_from_converted(&converted, time_base)?
                            .with_frame_index(Some(next_index));
                        next_index += 1;
                        if tx.blocking_send(Ok(frame)).is_err() {
                            return Ok(false);
                        }
                    }
                    Err(err) => {
                        if is_retryable_error(&err) || matches!(err, ffmpeg::Error::Eof) {
                            return Ok(true);
                        }
                        return Err(backend_error(err));
                    }
                }
            }
        };

        for (stream, packet) in ictx.packets() {
            if stream.index() != stream_index {
                continue;
            }
            if let Err(err) = decoder.send_packet(&packet)
                && !is_retryable_error(&err)
            {
                return Err(backend_error(err));
            }
            receiver_open = drain(&mut decoder)?;
            if !receiver_open {
                break;
            }
        }

        if receiver_open {
            decoder.send_eof().map_err(backend_error)?;
            drain(&mut decoder)?;
        }
        Ok(())
    }
}

impl FrameSource for FfmpegProvider {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let provider = *self;
        let capacity = provider.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| {
            if let Err(err) = provider.decode_loop(&tx) {
                let _ = tx.blocking_send(Err(err));
            }
        })
    }
}

fn probe_metadata(path: &Path) -> FrameResult<VideoMetadata> {
    let ictx = ffmpeg::format::input(&path).map_err(backend_error)?;
    let stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| FrameError::backend_failure(BACKEND_NAME, "no video stream found"))?;

    let rate = stream.avg_frame_rate();
    let fps = (rate.denominator() != 0)
        .then(|| f64::from(rate))
        .filter(|fps| fps.is_finite() && *fps > 0.0);

    let duration = if stream.duration() > 0 {
        Some(stream.duration() as f64 * f64::from(stream.time_base()))
    } else if ictx.duration() > 0 {
        Some(ictx.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE))
    } else {
        None
    };

    let parameters = stream.parameters();
    let (width, height) = ffmpeg::codec::context::Context::from_parameters(parameters)
        .and_then(|context| context.decoder().video())
        .map(|video| (Some(video.width()), Some(video.height())))
        .unwrap_or((None, None));

    let total_frames = u64::try_from(stream.frames()).ok().filter(|n| *n > 0);

    Ok(VideoMetadata {
        duration: duration
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
            .map(Duration::from_secs_f64),
        fps,
        width,
        height,
        total_frames,
    })
}

fn frame_from_converted(
    frame: &ffmpeg::util::frame::Video,
    time_base: ffmpeg::Rational,
) -> FrameResult<LumaFrame> {
    let plane = frame.data(0);
    let stride = frame.stride(0);
    let width = frame.width();
    let height = frame.height();
    let mut buffer = Vec::with_capacity(stride * height as usize);
    for row in 0..height as usize {
        let offset = row * stride;
        buffer.extend_from_slice(&plane[offset..offset + stride]);
    }
    let timestamp = frame.pts().and_then(|pts| {
        let seconds = pts as f64 * f64::from(time_base);
        (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
    });
    LumaFrame::from_owned(width, height, stride, timestamp, buffer)
}

fn backend_error(err: ffmpeg::Error) -> FrameError {
    FrameError::backend_failure(BACKEND_NAME, err.to_string())
}

fn is_retryable_error(error: &ffmpeg::Error) -> bool {
    matches!(
        error,
        ffmpeg::Error::Other { errno }
            if *errno == EAGAIN || *errno == EWOULDBLOCK
    )
}

pub fn boxed_ffmpeg<P: AsRef<Path>>(
    path: P,
    channel_capacity: Option<usize>,
) -> FrameResult<DynFrameSource> {
    Ok(Box::new(FfmpegProvider::open(path, channel_capacity)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_returns_error() {
        let result = FfmpegProvider::open("/tmp/killfeed-nonexistent-file.mp4", None);
        assert!(result.is_err());
    }
}
