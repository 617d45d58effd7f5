//! Video module
//!
//! Frame sources (synthetic test pattern, FFmpeg file decoding) and the
//! playback controller.
//!
//! # Usage
//!
//! ```rust,ignore
//! let source = video::open_source(&config.source, &base_dir)?;
//! let mut player = VideoPlayer::new(sink);
//! player.set_source(source, config.autoplay)?;
//! player.play_pause();
//! ```

#[cfg(feature = "ffmpeg")]
mod decoder;
mod player;
mod test_pattern;

use std::path::Path;

use anyhow::Result;

use crate::config::SourceConfig;
use crate::frame::FrameSize;
use crate::pipeline::FrameSource;

#[cfg(feature = "ffmpeg")]
pub use decoder::FileSource;
pub use player::{PlayerStatus, VideoPlayer};
pub use test_pattern::TestPatternSource;

/// Build the frame source described by `config`
pub fn open_source(config: &SourceConfig, base_dir: &Path) -> Result<Box<dyn FrameSource>> {
    match config {
        SourceConfig::TestPattern {
            width,
            height,
            fps,
            frames,
        } => {
            let size = FrameSize::new(*width, *height);
            if size.is_empty() {
                anyhow::bail!("Test pattern needs a non-zero size, got {}", size);
            }
            let mut source = TestPatternSource::new(size, *fps);
            if let Some(frames) = frames {
                source = source.with_limit(*frames);
            }
            Ok(Box::new(source))
        }
        SourceConfig::File { path } => open_file(&crate::config::resolve_path(path, base_dir)),
    }
}

#[cfg(feature = "ffmpeg")]
fn open_file(path: &Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FileSource::open(path)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_file(path: &Path) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "Cannot play {}: built without the `ffmpeg` feature",
        path.display()
    )
}
