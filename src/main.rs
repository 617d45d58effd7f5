//! Frame sink viewer
//!
//! Plays a test pattern or a video file through the frame sink and paints it
//! in an egui window. Supports standalone use or remote control over
//! stdin/stdout.

mod app;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use app::ViewerApp;
use framesink::config::{SourceConfig, ViewerConfig};
use framesink::frame::FrameSize;

/// Frame sink viewer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON viewer configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Video file to play instead of the configured source
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Play a test pattern of this size, e.g. 1280x720
    #[arg(long, value_name = "WxH", conflicts_with = "input")]
    pattern: Option<FrameSize>,

    /// Test pattern frame rate
    #[arg(long)]
    fps: Option<f64>,

    /// Use stdin/stdout for IPC communication
    #[arg(long)]
    stdio: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries IPC messages, logs go to stderr
    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Frame sink viewer starting...");

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from: {:?}", path);
            ViewerConfig::load_from_file(path)?
        }
        None => ViewerConfig::default(),
    };
    apply_overrides(&mut config, &args);
    info!("Source: {:?}", config.source);

    let base_dir = args
        .config
        .as_ref()
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    info!("Base directory: {:?}", base_dir);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(config.window_size)
            .with_min_inner_size([320.0, 240.0])
            .with_title("Frame Sink Viewer"),
        ..Default::default()
    };

    let use_stdio = args.stdio;
    eframe::run_native(
        "Frame Sink Viewer",
        native_options,
        Box::new(move |cc| Ok(Box::new(ViewerApp::new(cc, config, base_dir, use_stdio)))),
    )
    .map_err(|e| anyhow::anyhow!("eframe error: {}", e))
    .context("Viewer exited with an error")?;

    Ok(())
}

/// Command-line flags take precedence over the config file
fn apply_overrides(config: &mut ViewerConfig, args: &Args) {
    if let Some(input) = &args.input {
        // Absolute so it does not resolve against the config directory
        let path = std::path::absolute(input).unwrap_or_else(|_| input.clone());
        config.source = SourceConfig::File {
            path: path.display().to_string(),
        };
    }

    if let Some(size) = args.pattern {
        let fps = match config.source {
            SourceConfig::TestPattern { fps, .. } => fps,
            SourceConfig::File { .. } => 30.0,
        };
        config.source = SourceConfig::test_pattern(size, fps);
    }

    if let Some(new_fps) = args.fps {
        match &mut config.source {
            SourceConfig::TestPattern { fps, .. } => *fps = new_fps,
            SourceConfig::File { .. } => tracing::warn!("--fps only applies to the test pattern"),
        }
    }
}
