//! Synthetic test pattern source
//!
//! Eight vertical colour bars that scroll by a few pixels per frame, enough to
//! see tearing or stalls at a glance without a video file.

use std::time::Duration;

use anyhow::Result;

use crate::frame::{FrameBuffer, FrameSize, PixelFormat};
use crate::pipeline::{Caps, FrameSource};

/// SMPTE-like bar colours, left to right
const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Horizontal scroll per frame in pixels
const SCROLL_STEP: u32 = 4;

pub struct TestPatternSource {
    size: FrameSize,
    format: PixelFormat,
    fps: f64,
    /// Stop after this many frames; endless when `None`
    limit: Option<u64>,
    position: u64,
}

impl TestPatternSource {
    pub fn new(size: FrameSize, fps: f64) -> Self {
        Self {
            size,
            format: PixelFormat::BGRX,
            fps,
            limit: None,
            position: 0,
        }
    }

    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Index of the next frame to render
    pub fn frame_index(&self) -> u64 {
        self.position
    }

    fn frame_time(&self, index: u64) -> Duration {
        if self.fps > 0.0 {
            Duration::from_secs_f64(index as f64 / self.fps)
        } else {
            Duration::ZERO
        }
    }

    fn render(&self, index: u64) -> Result<FrameBuffer> {
        let width = self.size.width as u64;
        let offset = (index * SCROLL_STEP as u64) % width.max(1);
        let bar_width = (width / BARS.len() as u64).max(1);

        let mut row = Vec::with_capacity(self.size.width as usize * PixelFormat::BYTES_PER_PIXEL);
        for x in 0..width {
            let bar = (((x + offset) % width) / bar_width).min(BARS.len() as u64 - 1);
            row.extend_from_slice(&self.format.pack(BARS[bar as usize]));
        }

        let pixels = row.repeat(self.size.height as usize);
        Ok(FrameBuffer::new(self.size, self.format, pixels)?)
    }
}

impl FrameSource for TestPatternSource {
    fn describe(&self) -> String {
        match self.limit {
            Some(limit) => format!("test pattern {} @ {:.1}fps, {} frames", self.size, self.fps, limit),
            None => format!("test pattern {} @ {:.1}fps", self.size, self.fps),
        }
    }

    fn caps(&self) -> Caps {
        Caps::raw_video(self.size, self.format)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<FrameBuffer>> {
        if self.limit.is_some_and(|limit| self.position >= limit) {
            return Ok(None);
        }
        let frame = self.render(self.position)?;
        self.position += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let index = (position.as_secs_f64() * self.fps.max(0.0)).round() as u64;
        self.position = match self.limit {
            Some(limit) => index.min(limit),
            None => index,
        };
        Ok(())
    }

    fn position(&self) -> Duration {
        self.frame_time(self.position.saturating_sub(1))
    }

    fn duration(&self) -> Option<Duration> {
        self.limit.map(|limit| self.frame_time(limit))
    }
}
