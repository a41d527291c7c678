//! Synthetic frame source that renders a scripted killfeed.
//!
//! Frames are dark with bright entries stacked from the right edge of the
//! default region of interest: the newest entry sits rightmost and older
//! entries are pushed left.

use std::time::Duration;

use tokio::sync::mpsc::Sender;

use crate::core::{
    DynFrameSource, FrameResult, FrameSource, FrameStream, LumaFrame, VideoMetadata,
    spawn_stream_from_channel,
};

pub const BACKGROUND_LUMA: u8 = 24;
pub const ENTRY_LUMA: u8 = 235;
pub const ENTRY_WIDTH: u32 = 40;
pub const ENTRY_HEIGHT: u32 = 16;
const ENTRY_GAP: u32 = 8;
const ANCHOR_RIGHT: u32 = 216;
const ENTRY_TOP: u32 = 290;

/// Visibility interval of one killfeed entry, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedEntry {
    pub appear: f64,
    pub vanish: f64,
}

impl ScriptedEntry {
    pub fn new(appear: f64, vanish: f64) -> Self {
        Self { appear, vanish }
    }

    fn visible_at(&self, seconds: f64) -> bool {
        self.appear <= seconds && seconds < self.vanish
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockScript {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    pub entries: Vec<ScriptedEntry>,
}

impl Default for MockScript {
    /// Ten seconds at 30 fps: a lone kill around 1s, then three entries
    /// arriving in quick succession around 5s.
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            fps: 30.0,
            frame_count: 300,
            entries: vec![
                ScriptedEntry::new(0.95, 1.2),
                ScriptedEntry::new(4.95, 5.7),
                ScriptedEntry::new(5.25, 5.7),
                ScriptedEntry::new(5.55, 5.7),
            ],
        }
    }
}

impl MockScript {
    /// Pixel rectangle `(x, y, width, height)` of the entry drawn at `slot`,
    /// or `None` once the stack runs off the left edge.
    pub fn slot_rect(slot: u32) -> Option<(u32, u32, u32, u32)> {
        let right = slot
            .checked_mul(ENTRY_WIDTH + ENTRY_GAP)
            .and_then(|offset| ANCHOR_RIGHT.checked_sub(offset))?;
        let left = right.checked_sub(ENTRY_WIDTH)?;
        Some((left, ENTRY_TOP, ENTRY_WIDTH, ENTRY_HEIGHT))
    }

    fn render(&self, index: u64) -> FrameResult<LumaFrame> {
        let seconds = index as f64 / self.fps;
        let stride = self.width as usize;
        let mut buffer = vec![BACKGROUND_LUMA; stride * self.height as usize];

        // Entries are indistinguishable, so only the count decides what is drawn.
        let visible = self
            .entries
            .iter()
            .filter(|entry| entry.visible_at(seconds))
            .count();

        let slots = (0..visible as u32).map_while(Self::slot_rect);
        for (x, y, w, h) in slots {
            for row in y..(y + h).min(self.height) {
                let start = row as usize * stride + x as usize;
                let end = (start + w as usize).min((row as usize + 1) * stride);
                buffer[start..end].fill(ENTRY_LUMA);
            }
        }

        let timestamp = Some(Duration::from_secs_f64(seconds));
        LumaFrame::from_owned(self.width, self.height, stride, timestamp, buffer)
            .map(|frame| frame.with_frame_index(Some(index)))
    }
}

pub struct MockProvider {
    script: MockScript,
    channel_capacity: usize,
}

impl MockProvider {
    const DEFAULT_CHANNEL_CAPACITY: usize = 8;

    pub fn new(script: MockScript, channel_capacity: Option<usize>) -> Self {
        Self {
            script,
            channel_capacity: channel_capacity
                .unwrap_or(Self::DEFAULT_CHANNEL_CAPACITY)
                .max(1),
        }
    }

    fn emit_frames(&self, tx: Sender<FrameResult<LumaFrame>>) {
        for index in 0..self.script.frame_count {
            if tx.is_closed() {
                break;
            }
            if tx.blocking_send(self.script.render(index)).is_err() {
                break;
            }
        }
    }
}

impl FrameSource for MockProvider {
    fn metadata(&self) -> VideoMetadata {
        let script = &self.script;
        VideoMetadata {
            duration: Some(Duration::from_secs_f64(
                script.frame_count as f64 / script.fps,
            )),
            fps: Some(script.fps),
            width: Some(script.width),
            height: Some(script.height),
            total_frames: Some(script.frame_count),
        }
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let provider = *self;
        let capacity = provider.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| {
            provider.emit_frames(tx);
        })
    }
}

pub fn boxed_mock(channel_capacity: Option<usize>) -> FrameResult<DynFrameSource> {
    Ok(Box::new(MockProvider::new(
        MockScript::default(),
        channel_capacity,
    )))
}
