//! Viewer configuration
//!
//! JSON file read at startup; every field has a default so a partial file (or
//! none at all) works. Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use image::Rgb;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::frame::FrameSize;
use crate::utils::color::parse_hex_color;

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Synthetic colour bars
    TestPattern {
        #[serde(default = "default_pattern_width")]
        width: u32,
        #[serde(default = "default_pattern_height")]
        height: u32,
        #[serde(default = "default_fps")]
        fps: f64,
        /// Frame limit, endless when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames: Option<u64>,
    },
    /// Video file, relative paths resolve against the config directory
    File { path: String },
}

fn default_pattern_width() -> u32 {
    640
}

fn default_pattern_height() -> u32 {
    360
}

fn default_fps() -> f64 {
    30.0
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::TestPattern {
            width: default_pattern_width(),
            height: default_pattern_height(),
            fps: default_fps(),
            frames: None,
        }
    }
}

impl SourceConfig {
    pub fn test_pattern(size: FrameSize, fps: f64) -> Self {
        SourceConfig::TestPattern {
            width: size.width,
            height: size.height,
            fps,
            frames: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub source: SourceConfig,

    /// Fill behind and around the video, "#RRGGBB"
    #[serde(default = "default_background_color")]
    pub background_color: String,

    /// Directory snapshots are written to
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    /// Initial window inner size in points
    #[serde(default = "default_window_size")]
    pub window_size: [f32; 2],

    /// Start playing right after preroll
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
}

fn default_background_color() -> String {
    "#000000".to_string()
}

fn default_snapshot_dir() -> String {
    "snapshots".to_string()
}

fn default_window_size() -> [f32; 2] {
    [800.0, 520.0]
}

fn default_autoplay() -> bool {
    true
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            background_color: default_background_color(),
            snapshot_dir: default_snapshot_dir(),
            window_size: default_window_size(),
            autoplay: default_autoplay(),
        }
    }
}

impl ViewerConfig {
    /// Load from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: ViewerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Background colour, black when the configured value is not valid hex
    pub fn background_rgb(&self) -> Rgb<u8> {
        match parse_hex_color(&self.background_color) {
            Some((r, g, b)) => Rgb([r, g, b]),
            None => {
                warn!("Invalid background color '{}', using black", self.background_color);
                Rgb([0, 0, 0])
            }
        }
    }

    /// Timestamped PNG path inside the snapshot directory
    pub fn snapshot_path(&self, base_dir: &Path) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        resolve_path(&self.snapshot_dir, base_dir).join(format!("snapshot-{}.png", millis))
    }
}

/// Resolve a possibly relative path against `base_dir`
pub fn resolve_path(file_path: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
