//! egui drawing backend
//!
//! Uploads frames into one reused texture and paints it with an egui painter.

use egui::{Color32, ColorImage, Painter, Pos2, TextureHandle, TextureId, TextureOptions, Vec2};
use image::Rgb;

use crate::frame::{FrameBuffer, PixelFormat, WeakFrameBuffer};

use super::layout::Rect;
use super::render_surface::Canvas;

/// Texture that follows the frames drawn through an [`EguiCanvas`]
#[derive(Default)]
pub struct FrameTexture {
    texture: Option<TextureHandle>,
    /// Frame currently uploaded, so repaints of the same frame skip the upload
    uploaded: Option<WeakFrameBuffer>,
}

impl FrameTexture {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_current(&self, frame: &FrameBuffer) -> bool {
        self.uploaded
            .as_ref()
            .and_then(WeakFrameBuffer::upgrade)
            .is_some_and(|uploaded| FrameBuffer::ptr_eq(&uploaded, frame))
    }

    fn upload(&mut self, ctx: &egui::Context, frame: &FrameBuffer) -> TextureId {
        if self.is_current(frame) {
            if let Some(texture) = &self.texture {
                return texture.id();
            }
        }

        let image = color_image(frame);
        let id = match &mut self.texture {
            Some(texture) => {
                texture.set(image, TextureOptions::LINEAR);
                texture.id()
            }
            None => {
                let texture = ctx.load_texture("video-frame", image, TextureOptions::LINEAR);
                let id = texture.id();
                self.texture = Some(texture);
                id
            }
        };
        self.uploaded = Some(frame.downgrade());
        id
    }
}

/// Convert a frame into egui's pixel representation
fn color_image(frame: &FrameBuffer) -> ColorImage {
    let format = frame.format();
    let pixels = frame
        .pixels()
        .chunks_exact(PixelFormat::BYTES_PER_PIXEL)
        .map(|px| {
            let [r, g, b] = format.pixel_rgb(px);
            Color32::from_rgb(r, g, b)
        })
        .collect();

    ColorImage {
        size: [frame.width() as usize, frame.height() as usize],
        pixels,
    }
}

/// [`Canvas`] over an egui painter
pub struct EguiCanvas<'a> {
    painter: &'a Painter,
    texture: &'a mut FrameTexture,
}

impl<'a> EguiCanvas<'a> {
    pub fn new(painter: &'a Painter, texture: &'a mut FrameTexture) -> Self {
        Self { painter, texture }
    }
}

impl Canvas for EguiCanvas<'_> {
    fn fill(&mut self, rect: Rect, color: Rgb<u8>) {
        let [r, g, b] = color.0;
        self.painter
            .rect_filled(to_egui(rect), 0.0, Color32::from_rgb(r, g, b));
    }

    fn draw_frame(&mut self, rect: Rect, frame: &FrameBuffer) {
        let texture_id = self.texture.upload(self.painter.ctx(), frame);
        let uv = egui::Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(1.0, 1.0));
        self.painter
            .image(texture_id, to_egui(rect), uv, Color32::WHITE);
    }
}

/// Convert an egui layout rectangle to surface coordinates
pub fn area_from_egui(rect: egui::Rect) -> Rect {
    Rect::new(
        rect.min.x.round() as i32,
        rect.min.y.round() as i32,
        rect.width().round() as i32,
        rect.height().round() as i32,
    )
}

fn to_egui(rect: Rect) -> egui::Rect {
    egui::Rect::from_min_size(
        Pos2::new(rect.x as f32, rect.y as f32),
        Vec2::new(rect.width as f32, rect.height as f32),
    )
}
