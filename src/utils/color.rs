//! Color utilities
//!
//! Parsing of configured colors.

/// Parse hex color string to RGB tuple
///
/// Accepts formats: "#RRGGBB" or "RRGGBB"
pub fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');

    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some((r, g, b))
}
