//! Viewer application
//!
//! Implements the egui App trait: paints the render surface in the central
//! panel, transport controls and status below it, and serves IPC commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use egui::{Color32, Key, RichText, Vec2};
use tracing::{error, info, warn};

use framesink::config::ViewerConfig;
use framesink::frame::{FrameSize, FrameSlot};
use framesink::ipc::{error_codes, start_ipc_server, ControlCommand, IpcMessage, IpcReceiver, IpcSender};
use framesink::pipeline::PipelineState;
use framesink::scheduler::{self, Waker};
use framesink::sink::FrameSink;
use framesink::surface::{area_from_egui, EguiCanvas, FrameTexture, RenderSurface, SurfaceStats};
use framesink::video::{open_source, PlayerStatus, VideoPlayer};

/// How often status updates go out over IPC
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// Height reserved below the video for the controls panel
const CONTROLS_HEIGHT: f32 = 84.0;

/// Jump distance of the arrow keys
const SEEK_STEP: Duration = Duration::from_secs(5);

/// Largest window the viewer grows to when fitting the video
const MAX_VIDEO_AREA: Vec2 = Vec2::new(1600.0, 900.0);

pub struct ViewerApp {
    config: ViewerConfig,
    /// Base directory for relative paths
    base_dir: PathBuf,

    surface: RenderSurface,
    texture: FrameTexture,
    player: VideoPlayer,

    /// Window resized to the negotiated video size
    sized_to_video: bool,
    /// Last user-facing message (snapshot saved, errors)
    message: Option<String>,
    /// Slider position in seconds while the user drags it
    seek_drag: Option<f64>,

    ipc_rx: Option<IpcReceiver>,
    ipc_tx: Option<IpcSender>,
    last_status: Instant,
}

impl ViewerApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: ViewerConfig,
        base_dir: PathBuf,
        use_stdio: bool,
    ) -> Self {
        let ctx = cc.egui_ctx.clone();
        let waker: Waker = Arc::new(move || ctx.request_repaint());

        let slot = Arc::new(FrameSlot::new());
        let (scheduler, repaints) = scheduler::channel(Some(waker.clone()));
        let sink = Arc::new(FrameSink::new(slot.clone(), scheduler));
        let surface = RenderSurface::new(slot, repaints, config.background_rgb());
        let player = VideoPlayer::new(sink);

        let (ipc_rx, ipc_tx) = match start_ipc_server(use_stdio, Some(waker)) {
            Some((rx, tx)) => {
                info!("IPC server started");
                (Some(rx), Some(tx))
            }
            None => (None, None),
        };

        let mut app = Self {
            config,
            base_dir,
            surface,
            texture: FrameTexture::new(),
            player,
            sized_to_video: false,
            message: None,
            seek_drag: None,
            ipc_rx,
            ipc_tx,
            last_status: Instant::now(),
        };

        app.load_source();

        info!("Viewer initialized, base directory: {:?}", app.base_dir);
        app
    }

    fn load_source(&mut self) {
        let source = match open_source(&self.config.source, &self.base_dir) {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to open source: {:#}", e);
                self.report_error(error_codes::SOURCE_FAILED, format!("{:#}", e));
                return;
            }
        };
        if let Err(e) = self.player.set_source(source, self.config.autoplay) {
            error!("Failed to start pipeline: {:#}", e);
            self.report_error(error_codes::INTERNAL_ERROR, format!("{:#}", e));
        }
    }

    /// Handle IPC messages
    fn handle_ipc_messages(&mut self, ctx: &egui::Context) {
        let messages: Vec<IpcMessage> = match &self.ipc_rx {
            Some(rx) => std::iter::from_fn(|| rx.try_recv()).collect(),
            None => return,
        };

        for msg in messages {
            match msg {
                IpcMessage::Control(cmd) => self.apply_control(cmd),
                IpcMessage::SaveSnapshot { path } => {
                    let path = path.map(|p| framesink::config::resolve_path(&p, &self.base_dir));
                    self.save_snapshot(path);
                }
                IpcMessage::Seek { position_ms } => {
                    self.player.seek(Duration::from_millis(position_ms));
                }
                IpcMessage::Shutdown => {
                    info!("Received shutdown command");
                    self.player.clear();
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
                other => warn!("Ignoring unexpected IPC message: {:?}", other),
            }
        }
    }

    fn apply_control(&mut self, cmd: ControlCommand) {
        match cmd {
            ControlCommand::Play => {
                // Finished or halted streams start over
                if matches!(
                    self.player.pipeline_state(),
                    Some(PipelineState::Finished | PipelineState::Halted)
                ) {
                    self.player.play_pause();
                } else {
                    self.player.play();
                }
            }
            ControlCommand::Pause => self.player.pause(),
            ControlCommand::Restart => self.player.restart(),
            ControlCommand::Stop => self.player.stop(),
        }
    }

    fn save_snapshot(&mut self, path: Option<PathBuf>) {
        let path = path.unwrap_or_else(|| self.config.snapshot_path(&self.base_dir));
        match write_snapshot(&self.surface, &path) {
            Ok(size) => {
                self.message = Some(format!("Saved {} snapshot to {}", size, path.display()));
                if let Some(tx) = &self.ipc_tx {
                    tx.send(IpcMessage::SnapshotSaved {
                        path: path.display().to_string(),
                    });
                }
            }
            Err(e) => {
                warn!("Snapshot failed: {:#}", e);
                self.report_error(error_codes::SNAPSHOT_FAILED, format!("{:#}", e));
            }
        }
    }

    fn report_error(&mut self, code: i32, message: String) {
        if let Some(tx) = &self.ipc_tx {
            tx.send(IpcMessage::error(code, message.clone()));
        }
        self.message = Some(message);
    }

    /// Send state update via IPC
    fn send_status_update(&mut self, ctx: &egui::Context) {
        let Some(tx) = &self.ipc_tx else {
            return;
        };
        if self.last_status.elapsed() >= STATUS_INTERVAL {
            let status = self.player.status();
            tx.send(IpcMessage::status_update(&status, self.surface.stats().dropped));
            self.last_status = Instant::now();
        }
        ctx.request_repaint_after(STATUS_INTERVAL);
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        let (toggle, snapshot, back, forward) = ctx.input(|i| {
            (
                i.key_pressed(Key::Space),
                i.key_pressed(Key::S),
                i.key_pressed(Key::ArrowLeft),
                i.key_pressed(Key::ArrowRight),
            )
        });
        if toggle {
            self.player.play_pause();
        }
        if snapshot {
            self.save_snapshot(None);
        }
        if back || forward {
            let position = self.player.status().position.unwrap_or_default();
            let target = if forward {
                position + SEEK_STEP
            } else {
                position.saturating_sub(SEEK_STEP)
            };
            self.player.seek(target);
        }
    }

    /// Grow or shrink the window once the video size is known
    fn fit_window_to_video(&mut self, ctx: &egui::Context) {
        if self.sized_to_video {
            return;
        }
        if let Some(size) = self.surface.preferred_size() {
            let inner = window_size_for(size, MAX_VIDEO_AREA);
            info!("Resizing window to {:?} for {} video", inner, size);
            ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(inner));
            self.sized_to_video = true;
        }
    }

    fn controls_ui(&mut self, ui: &mut egui::Ui) {
        let status = self.player.status();

        ui.horizontal(|ui| {
            let label = if self.player.is_playing() { "Pause" } else { "Play" };
            if ui
                .add_enabled(self.player.has_source(), egui::Button::new(label))
                .clicked()
            {
                self.player.play_pause();
            }
            if ui
                .add_enabled(self.player.has_source(), egui::Button::new("Restart"))
                .clicked()
            {
                self.player.restart();
            }
            if ui.button("Save Snapshot").clicked() {
                self.save_snapshot(None);
            }

            if let Some(source) = &status.source {
                ui.label(RichText::new(source).color(Color32::GRAY).small());
            }
        });

        ui.horizontal(|ui| self.seek_ui(ui, &status));

        ui.label(
            RichText::new(status_line(&status, &self.surface.stats()))
                .color(Color32::GRAY)
                .small(),
        );
        if let Some(message) = &self.message {
            ui.label(RichText::new(message).color(Color32::LIGHT_GRAY).small());
        }
    }

    /// Seek slider and position text; sources without a length only show the position
    fn seek_ui(&mut self, ui: &mut egui::Ui, status: &PlayerStatus) {
        let position = status.position.unwrap_or_default();
        let Some(duration) = status.duration.filter(|d| !d.is_zero()) else {
            self.seek_drag = None;
            ui.label(RichText::new(format_time(position)).monospace());
            return;
        };

        let mut secs = self.seek_drag.unwrap_or(position.as_secs_f64());
        let response = ui.add(egui::Slider::new(&mut secs, 0.0..=duration.as_secs_f64()).show_value(false));
        if response.dragged() {
            self.seek_drag = Some(secs);
        }
        if response.drag_stopped() || (response.changed() && !response.dragged()) {
            self.seek_drag = None;
            self.player.seek(Duration::try_from_secs_f64(secs).unwrap_or_default());
        }

        ui.label(
            RichText::new(format!("{} / {}", format_time(position), format_time(duration))).monospace(),
        );
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_ipc_messages(ctx);
        self.handle_keys(ctx);
        self.fit_window_to_video(ctx);

        egui::TopBottomPanel::bottom("controls")
            .exact_height(CONTROLS_HEIGHT)
            .show(ctx, |ui| self.controls_ui(ui));

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let rect = ui.max_rect();
                let painter = ui.painter_at(rect);
                let mut canvas = EguiCanvas::new(&painter, &mut self.texture);
                self.surface.on_repaint(&mut canvas, area_from_egui(rect));
            });

        self.send_status_update(ctx);
    }
}

fn write_snapshot(surface: &RenderSurface, path: &Path) -> Result<FrameSize> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create snapshot directory {}", dir.display()))?;
    }
    surface
        .save_snapshot(path)
        .with_context(|| format!("Failed to save snapshot {}", path.display()))
}

/// Status text shown under the controls
fn status_line(status: &PlayerStatus, surface: &SurfaceStats) -> String {
    let size = status
        .size
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let pipeline = status.pipeline.map(|p| p.display_name()).unwrap_or("No source");
    format!(
        "Sink: {} | Pipeline: {} | Size: {} | Frames: {} | Dropped: {} | Rejected: {}",
        status.sink_state.display_name(),
        pipeline,
        size,
        status.stats.accepted,
        surface.dropped,
        status.stats.rejected
    )
}

/// `m:ss`, or `h:mm:ss` from one hour on
fn format_time(time: Duration) -> String {
    let total = time.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Window inner size showing `frame` at 1:1, scaled down to fit `max`
fn window_size_for(frame: FrameSize, max: Vec2) -> Vec2 {
    let video = Vec2::new(frame.width as f32, frame.height as f32);
    let scale = (max.x / video.x).min(max.y / video.y).min(1.0);
    Vec2::new((video.x * scale).round(), (video.y * scale).round() + CONTROLS_HEIGHT)
}
