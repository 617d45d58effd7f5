//! Pipeline worker
//!
//! Runs a [`FrameSource`] on its own thread and feeds the registered callbacks:
//! the first picture as preroll (even while paused), then buffers paced at the
//! source frame rate. A non-ok flow status halts streaming until a restart or
//! seek.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::callbacks::{PipelineCallbacks, Sample};
use super::caps::Caps;
use super::source::FrameSource;

/// Fallback pacing when a source reports no usable frame rate
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(40);

/// Commands sent to the pipeline thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineCommand {
    Play,
    Pause,
    /// Flush, rewind the source and preroll again
    Restart,
    /// Flush, reposition the source and preroll again
    Seek(Duration),
    Stop,
}

/// Streaming state of the pipeline thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Paused,
    Playing,
    /// The sink refused a buffer or the source failed
    Halted,
    /// Source exhausted, end of stream sent
    Finished,
    /// Thread has exited
    Stopped,
}

impl PipelineState {
    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineState::Paused => "Paused",
            PipelineState::Playing => "Playing",
            PipelineState::Halted => "Halted",
            PipelineState::Finished => "Finished",
            PipelineState::Stopped => "Stopped",
        }
    }
}

/// State the worker publishes for status displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineProgress {
    pub state: PipelineState,
    /// Presentation time of the last delivered frame
    pub position: Duration,
    /// Total length, `None` for endless sources
    pub duration: Option<Duration>,
}

/// Handle to a running pipeline thread
///
/// Dropping the handle stops the thread and waits for it, so the callbacks
/// are never invoked after the pipeline is gone.
pub struct Pipeline {
    commands: Sender<PipelineCommand>,
    progress: Arc<Mutex<PipelineProgress>>,
    worker: Option<JoinHandle<()>>,
    description: String,
}

impl Pipeline {
    /// Start streaming `source` into `callbacks`
    pub fn spawn(
        source: Box<dyn FrameSource>,
        callbacks: Arc<dyn PipelineCallbacks>,
        autoplay: bool,
    ) -> Result<Self> {
        let description = source.describe();
        let (commands, rx) = unbounded();
        let progress = Arc::new(Mutex::new(PipelineProgress {
            duration: source.duration(),
            ..Default::default()
        }));

        let worker = Worker::new(source, callbacks, rx, progress.clone(), autoplay);
        let handle = std::thread::Builder::new()
            .name("pipeline".to_string())
            .spawn(move || worker.run())
            .context("Failed to spawn pipeline thread")?;

        info!("Pipeline started: {} (autoplay: {})", description, autoplay);

        Ok(Self {
            commands,
            progress,
            worker: Some(handle),
            description,
        })
    }

    pub fn play(&self) -> bool {
        self.send(PipelineCommand::Play)
    }

    pub fn pause(&self) -> bool {
        self.send(PipelineCommand::Pause)
    }

    pub fn restart(&self) -> bool {
        self.send(PipelineCommand::Restart)
    }

    pub fn seek(&self, position: Duration) -> bool {
        self.send(PipelineCommand::Seek(position))
    }

    pub fn send(&self, command: PipelineCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn state(&self) -> PipelineState {
        self.progress.lock().state
    }

    pub fn progress(&self) -> PipelineProgress {
        *self.progress.lock()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = self.commands.send(PipelineCommand::Stop);
            if handle.join().is_err() {
                error!("Pipeline thread panicked");
            }
            info!("Pipeline stopped: {}", self.description);
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    source: Box<dyn FrameSource>,
    callbacks: Arc<dyn PipelineCallbacks>,
    commands: Receiver<PipelineCommand>,
    progress: Arc<Mutex<PipelineProgress>>,
    caps: Caps,
    interval: Duration,
    playing: bool,
    prerolled: bool,
    halted: bool,
    finished: bool,
}

impl Worker {
    fn new(
        source: Box<dyn FrameSource>,
        callbacks: Arc<dyn PipelineCallbacks>,
        commands: Receiver<PipelineCommand>,
        progress: Arc<Mutex<PipelineProgress>>,
        autoplay: bool,
    ) -> Self {
        let caps = source.caps();
        let interval = frame_interval(source.fps());
        Self {
            source,
            callbacks,
            commands,
            progress,
            caps,
            interval,
            playing: autoplay,
            prerolled: false,
            halted: false,
            finished: false,
        }
    }

    fn run(mut self) {
        let mut next_due = Instant::now();

        loop {
            self.publish_progress();

            let command = if self.wants_frame() {
                let wait = next_due.saturating_duration_since(Instant::now());
                match self.commands.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match self.commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };

            match command {
                Some(PipelineCommand::Stop) => break,
                Some(command) => {
                    debug!("Pipeline command: {:?}", command);
                    // Redundant commands keep the current pacing
                    if self.apply(command) {
                        next_due = Instant::now();
                    }
                }
                None => {
                    self.push_next();
                    next_due += self.interval;
                    // Running late: resume from now instead of bursting
                    let now = Instant::now();
                    if next_due < now {
                        next_due = now;
                    }
                }
            }
        }

        self.progress.lock().state = PipelineState::Stopped;
        debug!("Pipeline worker exiting");
    }

    fn wants_frame(&self) -> bool {
        !self.halted && !self.finished && (self.playing || !self.prerolled)
    }

    /// Apply a command; true when the next frame is due right away
    fn apply(&mut self, command: PipelineCommand) -> bool {
        match command {
            PipelineCommand::Play => !std::mem::replace(&mut self.playing, true),
            PipelineCommand::Pause => {
                self.playing = false;
                false
            }
            PipelineCommand::Restart => {
                self.reposition(None);
                true
            }
            PipelineCommand::Seek(position) => {
                self.reposition(Some(position));
                true
            }
            PipelineCommand::Stop => false,
        }
    }

    /// Flush, then rewind (`None`) or seek, and preroll again
    fn reposition(&mut self, target: Option<Duration>) {
        self.callbacks.flush();
        self.prerolled = false;
        self.finished = false;
        self.halted = false;

        let result = match target {
            Some(position) => self.source.seek(position),
            None => self.source.rewind(),
        };
        if let Err(e) = result {
            error!("Failed to reposition {}: {:#}", self.source.describe(), e);
            self.halted = true;
            return;
        }
        self.caps = self.source.caps();

        match target {
            Some(position) => info!("Pipeline seeked to {:?}", position),
            None => info!("Pipeline restarted"),
        }
    }

    fn push_next(&mut self) {
        let sample = match self.source.next_frame() {
            Ok(Some(buffer)) => Some(Sample::new(buffer, self.caps.clone())),
            Ok(None) => {
                info!("Pipeline reached end of stream");
                self.finished = true;
                self.callbacks.eos();
                return;
            }
            Err(e) => {
                error!("Failed to pull frame from {}: {:#}", self.source.describe(), e);
                None
            }
        };

        let status = if self.prerolled {
            self.callbacks.new_buffer(sample)
        } else {
            self.prerolled = true;
            self.callbacks.new_preroll(sample)
        };

        if !status.is_ok() {
            warn!("Pipeline halted, sink returned {}", status);
            self.halted = true;
        }
    }

    fn publish_progress(&self) {
        let state = if self.halted {
            PipelineState::Halted
        } else if self.finished {
            PipelineState::Finished
        } else if self.playing {
            PipelineState::Playing
        } else {
            PipelineState::Paused
        };
        let mut progress = self.progress.lock();
        progress.state = state;
        progress.position = self.source.position();
        progress.duration = self.source.duration();
    }
}

fn frame_interval(fps: f64) -> Duration {
    if fps.is_finite() && fps > 0.0 {
        Duration::from_secs_f64(1.0 / fps)
    } else {
        DEFAULT_FRAME_INTERVAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameBuffer, FrameSize, PixelFormat};
    use crate::pipeline::FlowStatus;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Preroll,
        Buffer,
        PullFailure,
        Eos,
        Flush,
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
        refuse_buffers: AtomicBool,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }

        fn count(&self, event: Event) -> usize {
            self.events().iter().filter(|e| **e == event).count()
        }
    }

    impl PipelineCallbacks for Recorder {
        fn eos(&self) {
            self.events.lock().push(Event::Eos);
        }

        fn new_preroll(&self, sample: Option<Sample>) -> FlowStatus {
            let event = if sample.is_some() { Event::Preroll } else { Event::PullFailure };
            self.events.lock().push(event);
            FlowStatus::Ok
        }

        fn new_buffer(&self, sample: Option<Sample>) -> FlowStatus {
            if sample.is_none() {
                self.events.lock().push(Event::PullFailure);
                return FlowStatus::Error;
            }
            self.events.lock().push(Event::Buffer);
            if self.refuse_buffers.load(Ordering::SeqCst) {
                FlowStatus::Unexpected
            } else {
                FlowStatus::Ok
            }
        }

        fn flush(&self) {
            self.events.lock().push(Event::Flush);
        }
    }

    /// Produces `total` frames, failing at `fail_at` if set
    struct CountingSource {
        total: u32,
        fail_at: Option<u32>,
        fps: f64,
        position: u32,
    }

    impl CountingSource {
        fn boxed(total: u32, fail_at: Option<u32>) -> Box<dyn FrameSource> {
            Self::paced(total, fail_at, 1000.0)
        }

        fn paced(total: u32, fail_at: Option<u32>, fps: f64) -> Box<dyn FrameSource> {
            Box::new(Self {
                total,
                fail_at,
                fps,
                position: 0,
            })
        }
    }

    impl FrameSource for CountingSource {
        fn describe(&self) -> String {
            format!("counting source ({} frames)", self.total)
        }

        fn caps(&self) -> Caps {
            Caps::raw_video(FrameSize::new(2, 2), PixelFormat::BGRX)
        }

        fn fps(&self) -> f64 {
            self.fps
        }

        fn next_frame(&mut self) -> Result<Option<FrameBuffer>> {
            if Some(self.position) == self.fail_at {
                anyhow::bail!("decode error at frame {}", self.position);
            }
            if self.position >= self.total {
                return Ok(None);
            }
            let shade = self.position as u8;
            self.position += 1;
            Ok(Some(FrameBuffer::solid(
                FrameSize::new(2, 2),
                PixelFormat::BGRX,
                [shade, shade, shade],
            )?))
        }

        fn rewind(&mut self) -> Result<()> {
            self.position = 0;
            Ok(())
        }

        fn seek(&mut self, position: Duration) -> Result<()> {
            let frame = (position.as_secs_f64() * self.fps).round() as u32;
            self.position = frame.min(self.total);
            Ok(())
        }

        fn position(&self) -> Duration {
            Duration::from_secs_f64(self.position.saturating_sub(1) as f64 / self.fps)
        }

        fn duration(&self) -> Option<Duration> {
            Some(Duration::from_secs_f64(self.total as f64 / self.fps))
        }
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
    fn test_autoplay_streams_to_end() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = Pipeline::spawn(CountingSource::boxed(5, None), recorder.clone(), true).unwrap();

        assert!(wait_for(|| pipeline.state() == PipelineState::Finished));
        assert_eq!(
            recorder.events(),
            vec![
                Event::Preroll,
                Event::Buffer,
                Event::Buffer,
                Event::Buffer,
                Event::Buffer,
                Event::Eos
            ]
        );
    }

    #[test]
    fn test_paused_pipeline_only_prerolls() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = Pipeline::spawn(CountingSource::boxed(5, None), recorder.clone(), false).unwrap();

        assert!(wait_for(|| recorder.count(Event::Preroll) == 1));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(recorder.events(), vec![Event::Preroll]);
        assert_eq!(pipeline.state(), PipelineState::Paused);

        assert!(pipeline.play());
        assert!(wait_for(|| pipeline.state() == PipelineState::Finished));
        assert_eq!(recorder.count(Event::Buffer), 4);
    }

    #[test]
    fn test_repeated_play_keeps_frame_pacing() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = Pipeline::spawn(CountingSource::paced(100, None, 1.0), recorder.clone(), true).unwrap();
        assert!(wait_for(|| recorder.count(Event::Preroll) == 1));

        // Play while already playing must not pull the next frame early
        for _ in 0..20 {
            assert!(pipeline.play());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(recorder.count(Event::Buffer), 0);

        // Neither does pausing
        assert!(pipeline.pause());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(recorder.events(), vec![Event::Preroll]);
    }

    #[test]
    fn test_seek_flushes_and_prerolls_at_target() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = Pipeline::spawn(CountingSource::paced(100, None, 100.0), recorder.clone(), false).unwrap();
        assert!(wait_for(|| recorder.count(Event::Preroll) == 1));
        assert_eq!(pipeline.progress().duration, Some(Duration::from_secs(1)));

        assert!(pipeline.seek(Duration::from_millis(500)));
        assert!(wait_for(|| recorder.count(Event::Preroll) == 2));
        assert_eq!(recorder.events(), vec![Event::Preroll, Event::Flush, Event::Preroll]);

        // Frame 50 was delivered, still paused
        assert!(wait_for(|| pipeline.progress().position == Duration::from_millis(500)));
        assert_eq!(pipeline.state(), PipelineState::Paused);
    }

    #[test]
    fn test_seek_leaves_finished_state() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = Pipeline::spawn(CountingSource::paced(10, None, 1000.0), recorder.clone(), true).unwrap();
        assert!(wait_for(|| pipeline.state() == PipelineState::Finished));

        assert!(pipeline.seek(Duration::from_millis(5)));
        assert!(wait_for(|| pipeline.state() == PipelineState::Finished && recorder.count(Event::Eos) == 2));
        // Frames 5..10 after the seek: one preroll and four buffers
        assert_eq!(recorder.count(Event::Buffer), 9 + 4);
    }

    #[test]
    fn test_refused_buffer_halts_until_restart() {
        let recorder = Arc::new(Recorder::default());
        recorder.refuse_buffers.store(true, Ordering::SeqCst);
        let pipeline = Pipeline::spawn(CountingSource::boxed(50, None), recorder.clone(), true).unwrap();

        assert!(wait_for(|| pipeline.state() == PipelineState::Halted));
        assert_eq!(recorder.events(), vec![Event::Preroll, Event::Buffer]);

        recorder.refuse_buffers.store(false, Ordering::SeqCst);
        assert!(pipeline.restart());
        assert!(wait_for(|| pipeline.state() == PipelineState::Finished));

        let events = recorder.events();
        assert_eq!(&events[2..4], &[Event::Flush, Event::Preroll]);
        assert_eq!(events.last(), Some(&Event::Eos));
    }

    #[test]
    fn test_source_error_is_a_pull_failure() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = Pipeline::spawn(CountingSource::boxed(10, Some(3)), recorder.clone(), true).unwrap();

        assert!(wait_for(|| pipeline.state() == PipelineState::Halted));
        assert_eq!(
            recorder.events(),
            vec![Event::Preroll, Event::Buffer, Event::Buffer, Event::PullFailure]
        );
    }

    #[test]
    fn test_no_callbacks_after_drop() {
        let recorder = Arc::new(Recorder::default());
        let pipeline =
            Pipeline::spawn(CountingSource::boxed(u32::MAX, None), recorder.clone(), true).unwrap();
        assert!(wait_for(|| recorder.count(Event::Buffer) > 3));

        drop(pipeline);
        let seen = recorder.events().len();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(recorder.events().len(), seen);
        // The worker released its reference to the callbacks
        assert_eq!(Arc::strong_count(&recorder), 1);
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(25.0), Duration::from_millis(40));
        assert_eq!(frame_interval(0.0), DEFAULT_FRAME_INTERVAL);
        assert_eq!(frame_interval(f64::NAN), DEFAULT_FRAME_INTERVAL);
    }
}
