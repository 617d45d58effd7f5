//! Video player
//!
//! Transport controller tying one frame source to the frame sink. Owns the
//! pipeline; the sink is shared with the pipeline thread.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::frame::FrameSize;
use crate::pipeline::{FrameSource, Pipeline, PipelineCallbacks, PipelineState};
use crate::sink::{FrameSink, SinkState, SinkStats};

/// Snapshot of the playback state for status displays
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    pub sink_state: SinkState,
    /// `None` when no source is loaded
    pub pipeline: Option<PipelineState>,
    pub stats: SinkStats,
    pub size: Option<FrameSize>,
    pub source: Option<String>,
    /// Presentation time of the last delivered frame
    pub position: Option<Duration>,
    /// Total length of the source, if known
    pub duration: Option<Duration>,
}

pub struct VideoPlayer {
    sink: Arc<FrameSink>,
    pipeline: Option<Pipeline>,
}

impl VideoPlayer {
    pub fn new(sink: Arc<FrameSink>) -> Self {
        Self { sink, pipeline: None }
    }

    pub fn sink(&self) -> &Arc<FrameSink> {
        &self.sink
    }

    /// Replace the current source and start streaming it
    ///
    /// The previous pipeline is stopped before the sink is reset, so its
    /// thread never delivers into the new stream.
    pub fn set_source(&mut self, source: Box<dyn FrameSource>, autoplay: bool) -> Result<()> {
        self.clear();
        self.sink.reset();

        let callbacks: Arc<dyn PipelineCallbacks> = self.sink.clone();
        self.pipeline = Some(Pipeline::spawn(source, callbacks, autoplay)?);
        Ok(())
    }

    /// Stop and drop the current pipeline
    pub fn clear(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
    }

    pub fn has_source(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn pipeline_state(&self) -> Option<PipelineState> {
        self.pipeline.as_ref().map(Pipeline::state)
    }

    pub fn is_playing(&self) -> bool {
        self.pipeline_state() == Some(PipelineState::Playing)
    }

    pub fn play(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.play();
        }
    }

    pub fn pause(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.pause();
        }
    }

    /// Toggle playback; a finished or halted stream starts over
    pub fn play_pause(&self) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        match pipeline.state() {
            PipelineState::Playing => {
                pipeline.pause();
            }
            PipelineState::Finished | PipelineState::Halted => {
                pipeline.restart();
                pipeline.play();
            }
            PipelineState::Paused | PipelineState::Stopped => {
                pipeline.play();
            }
        }
    }

    /// Rewind to the first frame, keeping the play/pause state
    ///
    /// The pipeline thread flushes the sink before prerolling again.
    pub fn restart(&self) {
        if let Some(pipeline) = &self.pipeline {
            info!("Restarting {}", pipeline.description());
            pipeline.restart();
        }
    }

    /// Jump to `position`, keeping the play/pause state
    pub fn seek(&self, position: Duration) {
        if let Some(pipeline) = &self.pipeline {
            let position = match pipeline.progress().duration {
                Some(duration) => position.min(duration),
                None => position,
            };
            info!("Seeking {} to {:?}", pipeline.description(), position);
            pipeline.seek(position);
        }
    }

    /// Pause and rewind to the first frame
    pub fn stop(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.pause();
            pipeline.restart();
        }
    }

    pub fn status(&self) -> PlayerStatus {
        let progress = self.pipeline.as_ref().map(Pipeline::progress);
        PlayerStatus {
            sink_state: self.sink.state(),
            pipeline: progress.map(|p| p.state),
            stats: self.sink.stats(),
            size: self.sink.negotiated_size(),
            source: self.pipeline.as_ref().map(|p| p.description().to_string()),
            position: progress.map(|p| p.position),
            duration: progress.and_then(|p| p.duration),
        }
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameSlot;
    use crate::scheduler::Scheduler;
    use crate::video::TestPatternSource;
    use std::time::Instant;

    fn player() -> VideoPlayer {
        let slot = Arc::new(FrameSlot::new());
        VideoPlayer::new(Arc::new(FrameSink::new(slot, Scheduler::detached())))
    }

    fn pattern(frames: u64) -> Box<dyn FrameSource> {
        Box::new(TestPatternSource::new(FrameSize::new(32, 16), 500.0).with_limit(frames))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_player_without_source() {
        let player = player();
        player.play_pause();
        player.restart();
        let status = player.status();
        assert_eq!(status.sink_state, SinkState::Idle);
        assert_eq!(status.pipeline, None);
        assert_eq!(status.position, None);
        assert!(!player.has_source());
    }

    #[test]
    fn test_paused_source_shows_first_frame() {
        let mut player = player();
        player.set_source(pattern(100), false).unwrap();

        assert!(wait_for(|| player.status().stats.accepted == 1));
        let status = player.status();
        assert_eq!(status.sink_state, SinkState::Streaming);
        assert_eq!(status.pipeline, Some(PipelineState::Paused));
        assert_eq!(status.size, Some(FrameSize::new(32, 16)));
        assert!(status.source.is_some());
    }

    #[test]
    fn test_play_to_end_then_start_over() {
        let mut player = player();
        player.set_source(pattern(5), true).unwrap();

        assert!(wait_for(|| player.pipeline_state() == Some(PipelineState::Finished)));
        assert_eq!(player.status().sink_state, SinkState::EndOfStream);
        assert_eq!(player.status().stats.accepted, 5);

        player.play_pause();
        assert!(wait_for(|| player.status().stats.accepted == 10));
        assert!(wait_for(|| player.status().sink_state == SinkState::EndOfStream));
    }

    #[test]
    fn test_stop_rewinds_and_pauses() {
        let mut player = player();
        player.set_source(pattern(u64::MAX), true).unwrap();
        assert!(wait_for(|| player.status().stats.accepted > 3));

        player.stop();
        assert!(wait_for(|| player.pipeline_state() == Some(PipelineState::Paused)));
        // Let the re-preroll of the first frame land
        std::thread::sleep(Duration::from_millis(30));
        let settled = player.status().stats.accepted;
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(player.status().stats.accepted, settled);
        assert_eq!(player.status().sink_state, SinkState::Streaming);
    }

    #[test]
    fn test_seek_while_paused() {
        let mut player = player();
        // 500 fps, 1 second long
        player.set_source(pattern(500), false).unwrap();
        assert!(wait_for(|| player.status().stats.accepted == 1));
        assert_eq!(player.status().duration, Some(Duration::from_secs(1)));
        assert_eq!(player.status().position, Some(Duration::ZERO));

        player.seek(Duration::from_millis(500));
        assert!(wait_for(|| player.status().position == Some(Duration::from_millis(500))));
        assert_eq!(player.status().stats.accepted, 2);
        assert_eq!(player.pipeline_state(), Some(PipelineState::Paused));
        assert_eq!(player.status().sink_state, SinkState::Streaming);
    }

    #[test]
    fn test_seek_past_end_finishes() {
        let mut player = player();
        player.set_source(pattern(10), false).unwrap();
        assert!(wait_for(|| player.status().stats.accepted == 1));

        player.seek(Duration::from_secs(60));
        player.play();
        assert!(wait_for(|| player.pipeline_state() == Some(PipelineState::Finished)));
        assert_eq!(player.status().sink_state, SinkState::EndOfStream);
    }

    #[test]
    fn test_replacing_source_with_other_size_fails_negotiation() {
        let mut player = player();
        player.set_source(pattern(1), true).unwrap();
        assert!(wait_for(|| player.status().sink_state == SinkState::EndOfStream));

        let other = Box::new(TestPatternSource::new(FrameSize::new(8, 8), 500.0));
        player.set_source(other, true).unwrap();
        assert!(wait_for(|| player.pipeline_state() == Some(PipelineState::Halted)));
        assert_eq!(player.status().sink_state, SinkState::Error);
        assert_eq!(player.status().size, Some(FrameSize::new(32, 16)));
    }
}
