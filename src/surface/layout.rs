//! Surface geometry

use crate::frame::FrameSize;

/// Integer pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Scale `frame` to fit inside `area` keeping its aspect ratio, centered
///
/// The scaled size touches the area on one axis; the leftover space on the
/// other axis is split evenly (odd pixels go to the right/bottom).
pub fn fit_centered(frame: FrameSize, area: Rect) -> Rect {
    if frame.is_empty() || area.is_empty() {
        return Rect::new(area.x, area.y, 0, 0);
    }

    let fw = frame.width as i64;
    let fh = frame.height as i64;
    let aw = area.width as i64;
    let ah = area.height as i64;

    // Width we would get by filling the full height
    let width_at_full_height = ah * fw / fh;
    let (width, height) = if width_at_full_height <= aw {
        (width_at_full_height, ah)
    } else {
        (aw, aw * fh / fw)
    };

    let width = width as i32;
    let height = height as i32;
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}
