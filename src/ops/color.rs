// ============================================================================
// COLOR MATCHING: hex parsing + Euclidean RGB distance
// ============================================================================

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Largest possible distance between two RGB colors: sqrt(3 * 255²).
pub const MAX_DISTANCE: f32 = 441.672_94;

/// An opaque 8-bit RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// RGB part of an RGBA pixel. Alpha is dropped.
    #[inline]
    pub fn from_pixel(p: &Rgba<u8>) -> Self {
        Self::new(p[0], p[1], p[2])
    }

    /// Fully opaque RGBA pixel of this color.
    #[inline]
    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, 255])
    }

    #[inline]
    pub fn distance(self, other: Rgb) -> f32 {
        color_distance(self.r, self.g, self.b, other.r, other.g, other.b)
    }

    /// True if `other` lies within `tolerance` of this color.
    #[inline]
    pub fn matches(self, other: Rgb, tolerance: f32) -> bool {
        self.distance(other) <= tolerance
    }

    /// Lowercase `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for Rgb {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s)
    }
}

/// Parse `#rrggbb` / `rrggbb` (case-insensitive). Returns `None` on anything else,
/// including the 3-digit shorthand.
pub fn hex_to_rgb(hex: &str) -> Option<Rgb> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
}

/// [`hex_to_rgb`] with the failure typed as [`EngineError::InvalidColor`].
pub fn parse_hex(hex: &str) -> EngineResult<Rgb> {
    hex_to_rgb(hex).ok_or_else(|| EngineError::InvalidColor(hex.to_string()))
}

/// Euclidean distance in RGB space, in `[0, MAX_DISTANCE]`.
#[inline]
pub fn color_distance(r1: u8, g1: u8, b1: u8, r2: u8, g2: u8, b2: u8) -> f32 {
    let dr = r1 as f32 - r2 as f32;
    let dg = g1 as f32 - g2 as f32;
    let db = b1 as f32 - b2 as f32;
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Whether a pixel takes part in color matching at all.
///
/// Fully transparent pixels carry no visible color and never match; any other
/// alpha is ignored and only RGB is compared.
#[inline]
pub fn pixel_matches(p: &Rgba<u8>, target: Rgb, tolerance: f32) -> bool {
    p[3] != 0 && Rgb::from_pixel(p).matches(target, tolerance)
}
