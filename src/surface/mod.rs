//! Surface module
//!
//! The UI-thread side of frame delivery: painting, layout and snapshots.

mod egui_canvas;
mod layout;
mod render_surface;
mod snapshot;

pub use egui_canvas::{area_from_egui, EguiCanvas, FrameTexture};
pub use layout::{fit_centered, Rect};
pub use render_surface::{Canvas, PaintOutcome, RenderSurface, SurfaceStats};
pub use snapshot::{SnapshotError, Snapshotter};
