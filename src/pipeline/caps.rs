//! Stream capabilities
//!
//! A media type plus named fields. A field is fixed when it holds exactly one
//! value; ranges and lists are still open to negotiation.

use std::collections::BTreeMap;
use std::fmt;

use crate::frame::{FrameSize, PixelFormat};

/// Media type of raw packed RGB video
pub const RAW_RGB: &str = "video/x-raw-rgb";

/// Value of one caps field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapsValue {
    Int(i32),
    IntRange { min: i32, max: i32 },
    Str(String),
    List(Vec<CapsValue>),
}

impl CapsValue {
    pub fn is_fixed(&self) -> bool {
        match self {
            CapsValue::Int(_) | CapsValue::Str(_) => true,
            CapsValue::IntRange { min, max } => min == max,
            CapsValue::List(values) => values.len() == 1 && values[0].is_fixed(),
        }
    }
}

impl fmt::Display for CapsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsValue::Int(v) => write!(f, "(int){}", v),
            CapsValue::IntRange { min, max } => write!(f, "(int)[ {}, {} ]", min, max),
            CapsValue::Str(s) => write!(f, "(string){}", s),
            CapsValue::List(values) => {
                write!(f, "{{ ")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, " }}")
            }
        }
    }
}

/// Capability description of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    media_type: String,
    fields: BTreeMap<String, CapsValue>,
}

impl Caps {
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, name: impl Into<String>, value: CapsValue) -> Self {
        self.set_field(name, value);
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: CapsValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn remove_field(&mut self, name: &str) -> Option<CapsValue> {
        self.fields.remove(name)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Integer value of a fixed field
    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.fields.get(name)? {
            CapsValue::Int(v) => Some(*v),
            CapsValue::IntRange { min, max } if min == max => Some(*min),
            _ => None,
        }
    }

    /// True when no field is left open
    pub fn is_fixed(&self) -> bool {
        self.fields.values().all(CapsValue::is_fixed)
    }

    /// Fixed caps describing raw frames of `size` in `format`
    pub fn raw_video(size: FrameSize, format: PixelFormat) -> Self {
        Self::sink_template(format)
            .with_field("width", CapsValue::Int(clamp_dimension(size.width)))
            .with_field("height", CapsValue::Int(clamp_dimension(size.height)))
    }

    /// Caps accepted by the sink: fixed layout, any dimensions
    pub fn sink_template(format: PixelFormat) -> Self {
        Caps::new(RAW_RGB)
            .with_field("bpp", CapsValue::Int(PixelFormat::BITS_PER_PIXEL as i32))
            .with_field("depth", CapsValue::Int(24))
            .with_field("endianness", CapsValue::Int(4321))
            .with_field("red_mask", CapsValue::Int(format.red_mask as i32))
            .with_field("green_mask", CapsValue::Int(format.green_mask as i32))
            .with_field("blue_mask", CapsValue::Int(format.blue_mask as i32))
            .with_field("width", CapsValue::IntRange { min: 1, max: i32::MAX })
            .with_field("height", CapsValue::IntRange { min: 1, max: i32::MAX })
    }

    /// Width and height, when both are present, fixed and positive
    pub fn frame_size(&self) -> Option<FrameSize> {
        let width = self.get_int("width")?;
        let height = self.get_int("height")?;
        if width <= 0 || height <= 0 {
            return None;
        }
        Some(FrameSize::new(width as u32, height as u32))
    }

    /// Channel masks, when all three are declared
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        Some(PixelFormat::new(
            self.get_int("red_mask")? as u32,
            self.get_int("green_mask")? as u32,
            self.get_int("blue_mask")? as u32,
        ))
    }
}

fn clamp_dimension(value: u32) -> i32 {
    value.min(i32::MAX as u32) as i32
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.media_type)?;
        for (name, value) in &self.fields {
            write!(f, ", {}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_video_is_fixed() {
        let caps = Caps::raw_video(FrameSize::new(64, 48), PixelFormat::BGRX);
        assert!(caps.is_fixed());
        assert_eq!(caps.media_type(), RAW_RGB);
        assert_eq!(caps.frame_size(), Some(FrameSize::new(64, 48)));
        assert_eq!(caps.pixel_format(), Some(PixelFormat::BGRX));
    }

    #[test]
    fn test_template_is_not_fixed() {
        let caps = Caps::sink_template(PixelFormat::BGRX);
        assert!(!caps.is_fixed());
        assert_eq!(caps.frame_size(), None);
    }

    #[test]
    fn test_single_value_range_and_list_count_as_fixed() {
        let caps = Caps::new(RAW_RGB)
            .with_field("width", CapsValue::IntRange { min: 10, max: 10 })
            .with_field("format", CapsValue::List(vec![CapsValue::Str("rgb".into())]));
        assert!(caps.is_fixed());
        assert_eq!(caps.get_int("width"), Some(10));

        let open = caps.with_field(
            "height",
            CapsValue::List(vec![CapsValue::Int(1), CapsValue::Int(2)]),
        );
        assert!(!open.is_fixed());
    }

    #[test]
    fn test_missing_or_negative_dimensions() {
        let mut caps = Caps::raw_video(FrameSize::new(64, 48), PixelFormat::BGRX);
        caps.remove_field("width");
        assert_eq!(caps.frame_size(), None);

        caps.set_field("width", CapsValue::Int(-1));
        assert_eq!(caps.frame_size(), None);
    }

    #[test]
    fn test_display() {
        let caps = Caps::new(RAW_RGB).with_field("width", CapsValue::Int(4));
        assert_eq!(caps.to_string(), "video/x-raw-rgb, width=(int)4");
    }
}
