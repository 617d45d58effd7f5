//! Frame buffer module
//!
//! An immutable, reference-counted decoded picture. Cloning a [`FrameBuffer`]
//! acquires another reference to the same pixel storage; dropping a handle
//! releases it. The storage is freed when the last handle goes away.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use image::RgbImage;
use thiserror::Error;

/// Errors raised while constructing frames
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Zero width or height
    #[error("frame has no pixels ({0})")]
    Empty(FrameSize),

    /// Pixel storage does not match the declared dimensions
    #[error("frame {size} needs {expected} bytes, got {actual}")]
    SizeMismatch {
        size: FrameSize,
        expected: usize,
        actual: usize,
    },

    /// Dimension string could not be parsed
    #[error("invalid frame size '{0}', expected WIDTHxHEIGHT")]
    ParseSize(String),
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for FrameSize {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| FrameError::ParseSize(s.to_string()))?;
        let width = w.trim().parse().map_err(|_| FrameError::ParseSize(s.to_string()))?;
        let height = h.trim().parse().map_err(|_| FrameError::ParseSize(s.to_string()))?;
        let size = FrameSize::new(width, height);
        if size.is_empty() {
            return Err(FrameError::Empty(size));
        }
        Ok(size)
    }
}

/// 32-bit packed RGB layout
///
/// Each pixel is one 32-bit word stored big-endian; the masks select the
/// red, green and blue bits of that word. The remaining byte is padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
}

impl PixelFormat {
    pub const BYTES_PER_PIXEL: usize = 4;
    pub const BITS_PER_PIXEL: u32 = 32;

    /// Memory order B, G, R, x (the native 0xffRRGGBB word on little-endian hosts)
    pub const BGRX: PixelFormat = PixelFormat {
        red_mask: 0x0000_ff00,
        green_mask: 0x00ff_0000,
        blue_mask: 0xff00_0000,
    };

    /// Memory order R, G, B, x
    pub const RGBX: PixelFormat = PixelFormat {
        red_mask: 0xff00_0000,
        green_mask: 0x00ff_0000,
        blue_mask: 0x0000_ff00,
    };

    pub const fn new(red_mask: u32, green_mask: u32, blue_mask: u32) -> Self {
        Self {
            red_mask,
            green_mask,
            blue_mask,
        }
    }

    /// Extract the 8-bit channels of a packed word
    pub fn unpack(&self, word: u32) -> [u8; 3] {
        [
            channel(word, self.red_mask),
            channel(word, self.green_mask),
            channel(word, self.blue_mask),
        ]
    }

    /// Pack 8-bit channels into the four bytes of one pixel
    pub fn pack(&self, rgb: [u8; 3]) -> [u8; 4] {
        let word = place(rgb[0], self.red_mask)
            | place(rgb[1], self.green_mask)
            | place(rgb[2], self.blue_mask);
        word.to_be_bytes()
    }

    /// Decode one pixel from its four bytes
    pub fn pixel_rgb(&self, px: &[u8]) -> [u8; 3] {
        self.unpack(u32::from_be_bytes([px[0], px[1], px[2], px[3]]))
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::BGRX
    }
}

fn channel(word: u32, mask: u32) -> u8 {
    if mask == 0 {
        return 0;
    }
    ((word & mask) >> mask.trailing_zeros()) as u8
}

fn place(value: u8, mask: u32) -> u32 {
    if mask == 0 {
        return 0;
    }
    ((value as u32) << mask.trailing_zeros()) & mask
}

struct FrameData {
    size: FrameSize,
    format: PixelFormat,
    pixels: Box<[u8]>,
}

/// Shared handle to one decoded picture
///
/// The pixel data is never mutated after construction, so any number of
/// threads may read it through their own handle.
#[derive(Clone)]
pub struct FrameBuffer {
    inner: Arc<FrameData>,
}

impl FrameBuffer {
    /// Wrap tightly packed pixel rows (`width * 4` bytes per row)
    pub fn new(size: FrameSize, format: PixelFormat, pixels: Vec<u8>) -> Result<Self, FrameError> {
        if size.is_empty() {
            return Err(FrameError::Empty(size));
        }

        let expected = size.pixel_count() * PixelFormat::BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(FrameError::SizeMismatch {
                size,
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            inner: Arc::new(FrameData {
                size,
                format,
                pixels: pixels.into_boxed_slice(),
            }),
        })
    }

    /// Build a frame filled with a single color
    pub fn solid(size: FrameSize, format: PixelFormat, rgb: [u8; 3]) -> Result<Self, FrameError> {
        let px = format.pack(rgb);
        let pixels = px.repeat(size.pixel_count());
        Self::new(size, format, pixels)
    }

    /// Take another reference to the same picture
    pub fn acquire(&self) -> FrameBuffer {
        self.clone()
    }

    /// Give this reference back
    pub fn release(self) {
        drop(self);
    }

    pub fn width(&self) -> u32 {
        self.inner.size.width
    }

    pub fn height(&self) -> u32 {
        self.inner.size.height
    }

    pub fn size(&self) -> FrameSize {
        self.inner.size
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.inner.size.width as usize * PixelFormat::BYTES_PER_PIXEL
    }

    /// Raw pixel bytes, valid for as long as this handle lives
    pub fn pixels(&self) -> &[u8] {
        &self.inner.pixels
    }

    /// RGB value at (x, y)
    pub fn pixel_rgb(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * PixelFormat::BYTES_PER_PIXEL;
        Some(self.inner.format.pixel_rgb(&self.inner.pixels[offset..offset + 4]))
    }

    /// Number of live handles to this picture
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Observe the picture without keeping it alive
    pub fn downgrade(&self) -> WeakFrameBuffer {
        WeakFrameBuffer(Arc::downgrade(&self.inner))
    }

    /// True when both handles refer to the same picture
    pub fn ptr_eq(a: &FrameBuffer, b: &FrameBuffer) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Deep copy into an independently owned RGB image
    pub fn to_rgb_image(&self) -> RgbImage {
        let format = self.inner.format;
        let mut rgb = Vec::with_capacity(self.inner.size.pixel_count() * 3);
        for px in self.inner.pixels.chunks_exact(PixelFormat::BYTES_PER_PIXEL) {
            rgb.extend_from_slice(&format.pixel_rgb(px));
        }
        // Length is width * height * 3 by construction
        RgbImage::from_raw(self.width(), self.height(), rgb)
            .unwrap_or_else(|| RgbImage::new(self.width(), self.height()))
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("size", &self.inner.size)
            .field("format", &self.inner.format)
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Non-owning reference to a [`FrameBuffer`]
#[derive(Clone)]
pub struct WeakFrameBuffer(Weak<FrameData>);

impl WeakFrameBuffer {
    pub fn upgrade(&self) -> Option<FrameBuffer> {
        self.0.upgrade().map(|inner| FrameBuffer { inner })
    }

    /// True once every handle has been dropped and the pixels are freed
    pub fn is_released(&self) -> bool {
        self.0.strong_count() == 0
    }
}
