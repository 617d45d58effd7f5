//! Video file decoder
//!
//! Decodes the best video stream of a file with FFmpeg and converts every
//! picture to 32-bit BGRX at its native size.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use ffmpeg::format::input;
use ffmpeg::format::Pixel;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as Scaler, Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg_next as ffmpeg;

use crate::frame::{FrameBuffer, FrameSize, PixelFormat};
use crate::pipeline::{Caps, FrameSource};

/// Frame rate assumed when the container does not declare one
const FALLBACK_FPS: f64 = 30.0;

/// Container-level timestamps are in microseconds
const CONTAINER_TIME_BASE: f64 = 1_000_000.0;

/// [`FrameSource`] reading a video file
pub struct FileSource {
    path: PathBuf,
    input_ctx: ffmpeg::format::context::Input,
    video_stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    /// Converts decoded pictures to BGRX
    scaler: Scaler,
    size: FrameSize,
    fps: f64,
    /// Seconds per stream timestamp tick
    time_base: f64,
    duration: Option<Duration>,
    /// Presentation time of the last returned picture
    position: Duration,
    /// Pictures before this time are decoded but not returned
    seek_target: Option<Duration>,
    packets_exhausted: bool,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Video file not found: {}", path.display());
        }

        // Safe to call more than once
        ffmpeg::init().context("Failed to initialize FFmpeg")?;

        let input_ctx = input(&path)
            .with_context(|| format!("Failed to open video file {}", path.display()))?;

        let video_stream = input_ctx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| anyhow::anyhow!("No video stream found in {}", path.display()))?;
        let video_stream_index = video_stream.index();
        let time_base = f64::from(video_stream.time_base());

        let rate = video_stream.rate();
        let fps = if rate.1 != 0 && rate.0 > 0 {
            rate.0 as f64 / rate.1 as f64
        } else {
            FALLBACK_FPS
        };

        let context_decoder =
            ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
                .context("Failed to create decoder context")?;
        let decoder = context_decoder
            .decoder()
            .video()
            .context("Failed to create video decoder")?;

        let size = FrameSize::new(decoder.width(), decoder.height());
        if size.is_empty() {
            anyhow::bail!("Video stream in {} has no dimensions", path.display());
        }

        info!(
            "Opened video: {} @ {:.1}fps, format: {:?}",
            size,
            fps,
            decoder.format()
        );

        let duration = (input_ctx.duration() > 0)
            .then(|| Duration::from_secs_f64(input_ctx.duration() as f64 / CONTAINER_TIME_BASE));

        let scaler = Scaler::get(
            decoder.format(),
            size.width,
            size.height,
            Pixel::BGRZ,
            size.width,
            size.height,
            Flags::BILINEAR,
        )
        .context("Failed to create scaler")?;

        Ok(Self {
            path: path.to_path_buf(),
            input_ctx,
            video_stream_index,
            decoder,
            scaler,
            size,
            fps,
            time_base,
            duration,
            position: Duration::ZERO,
            seek_target: None,
            packets_exhausted: false,
        })
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// Pull the next decoded picture, feeding packets as needed
    fn decode_next(&mut self) -> Result<Option<VideoFrame>> {
        let mut decoded = VideoFrame::empty();
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return Ok(Some(decoded));
        }

        if self.packets_exhausted {
            return Ok(None);
        }

        loop {
            match self.input_ctx.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.video_stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        warn!("Skipping undecodable packet: {}", e);
                        continue;
                    }
                    if self.decoder.receive_frame(&mut decoded).is_ok() {
                        return Ok(Some(decoded));
                    }
                }
                None => {
                    // Drain what the decoder still holds
                    self.packets_exhausted = true;
                    self.decoder.send_eof().context("Failed to flush decoder")?;
                    if self.decoder.receive_frame(&mut decoded).is_ok() {
                        return Ok(Some(decoded));
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn presentation_time(&self, decoded: &VideoFrame) -> Option<Duration> {
        let ticks = decoded.timestamp().or_else(|| decoded.pts())?;
        let secs = ticks as f64 * self.time_base;
        (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
    }

    fn convert(&mut self, decoded: &VideoFrame) -> Result<FrameBuffer> {
        let mut converted = VideoFrame::empty();
        self.scaler
            .run(decoded, &mut converted)
            .context("Failed to convert frame")?;

        let data = converted.data(0);
        let stride = converted.stride(0);
        let row_bytes = self.size.width as usize * PixelFormat::BYTES_PER_PIXEL;
        let height = self.size.height as usize;

        let pixels = if stride == row_bytes {
            data[..row_bytes * height].to_vec()
        } else {
            // Strip row padding
            let mut pixels = Vec::with_capacity(row_bytes * height);
            for y in 0..height {
                let row_start = y * stride;
                pixels.extend_from_slice(&data[row_start..row_start + row_bytes]);
            }
            pixels
        };

        Ok(FrameBuffer::new(self.size, PixelFormat::BGRX, pixels)?)
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        format!("{} ({} @ {:.1}fps)", self.path.display(), self.size, self.fps)
    }

    fn caps(&self) -> Caps {
        Caps::raw_video(self.size, PixelFormat::BGRX)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<FrameBuffer>> {
        loop {
            let Some(decoded) = self.decode_next()? else {
                return Ok(None);
            };
            let time = self.presentation_time(&decoded);

            // Seeking lands on the previous keyframe; skip up to the target
            if let (Some(target), Some(time)) = (self.seek_target, time) {
                if time < target {
                    continue;
                }
            }
            self.seek_target = None;

            if let Some(time) = time {
                self.position = time;
            }
            return self.convert(&decoded).map(Some);
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.seek(Duration::ZERO)
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let target = i64::try_from(position.as_micros()).unwrap_or(i64::MAX);
        self.input_ctx
            .seek(target, ..target)
            .with_context(|| format!("Failed to seek to {:?}", position))?;
        self.decoder.flush();
        self.packets_exhausted = false;
        self.position = position;
        self.seek_target = (!position.is_zero()).then_some(position);
        debug!("Seeked {} to {:?}", self.path.display(), position);
        Ok(())
    }

    fn position(&self) -> Duration {
        self.position
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}
