use image::{RgbaImage, imageops};

use crate::canvas::CanvasElement;
use crate::error::{EngineError, EngineResult};
use crate::ops::coords::natural_ratio;

/// A drag must exceed this on both sides (logical units) to become a crop.
pub const MIN_CROP_SIZE: f32 = 5.0;

/// Crop rectangle in element-local logical units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRect {
    /// Normalized rectangle spanned by two corners.
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        Self {
            x: a.0.min(b.0),
            y: a.1.min(b.1),
            width: (b.0 - a.0).abs(),
            height: (b.1 - a.1).abs(),
        }
    }

    /// Intersection with the element's own area `[0, width] x [0, height]`.
    pub fn clipped_to(&self, width: f32, height: f32) -> Option<CropRect> {
        let x0 = self.x.max(0.0);
        let y0 = self.y.max(0.0);
        let x1 = (self.x + self.width).min(width);
        let y1 = (self.y + self.height).min(height);
        (x1 > x0 && y1 > y0).then(|| CropRect { x: x0, y: y0, width: x1 - x0, height: y1 - y0 })
    }

    /// Source-pixel rectangle `(x, y, w, h)` for a bitmap of the given natural
    /// size, clipped to the bitmap.
    pub fn to_source(
        &self,
        element: &CanvasElement,
        natural_width: u32,
        natural_height: u32,
    ) -> EngineResult<(u32, u32, u32, u32)> {
        let (rx, ry) = natural_ratio(element, natural_width, natural_height)?;
        let x0 = (self.x * rx).round().clamp(0.0, natural_width as f32);
        let y0 = (self.y * ry).round().clamp(0.0, natural_height as f32);
        let x1 = ((self.x + self.width) * rx).round().clamp(0.0, natural_width as f32);
        let y1 = ((self.y + self.height) * ry).round().clamp(0.0, natural_height as f32);
        let (w, h) = ((x1 - x0) as u32, (y1 - y0) as u32);
        if w == 0 || h == 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "crop {:?} is empty at {}x{}",
                self, natural_width, natural_height
            )));
        }
        Ok((x0 as u32, y0 as u32, w, h))
    }
}

/// An in-progress crop drag over one element.
#[derive(Clone, Debug, PartialEq)]
pub struct CropSession {
    start: (f32, f32),
    current: (f32, f32),
    bounds: (f32, f32),
}

impl CropSession {
    /// Starts a drag at an element-local point. Returns `None` when the
    /// point lies outside the element.
    pub fn begin(local_x: f32, local_y: f32, element: &CanvasElement) -> Option<Self> {
        let inside = (0.0..=element.width).contains(&local_x) && (0.0..=element.height).contains(&local_y);
        inside.then(|| Self {
            start: (local_x, local_y),
            current: (local_x, local_y),
            bounds: (element.width, element.height),
        })
    }

    /// Moves the free corner, clamped to the element.
    pub fn update(&mut self, local_x: f32, local_y: f32) {
        self.current = (
            local_x.clamp(0.0, self.bounds.0),
            local_y.clamp(0.0, self.bounds.1),
        );
    }

    /// Rectangle currently spanned by the drag.
    pub fn rect(&self) -> CropRect {
        CropRect::from_corners(self.start, self.current)
    }

    /// Pointer-up: the rectangle, if it is large enough to keep.
    pub fn finish(self) -> Option<CropRect> {
        let rect = self.rect();
        (rect.width > MIN_CROP_SIZE && rect.height > MIN_CROP_SIZE).then_some(rect)
    }
}

/// Result of cropping one element.
#[derive(Clone, Debug)]
pub struct CropResult {
    pub image: RgbaImage,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Cut `rect` out of the element's bitmap. The rectangle is first clipped to
/// the element; the element then moves by the clipped origin and takes the
/// clipped logical size.
pub fn apply_crop(pixels: &RgbaImage, rect: &CropRect, element: &CanvasElement) -> EngineResult<CropResult> {
    let rect = rect.clipped_to(element.width, element.height).ok_or_else(|| {
        EngineError::InvalidGeometry(format!(
            "crop {:?} lies outside the {}x{} element",
            rect, element.width, element.height
        ))
    })?;
    let (sx, sy, sw, sh) = rect.to_source(element, pixels.width(), pixels.height())?;
    let image = imageops::crop_imm(pixels, sx, sy, sw, sh).to_image();
    Ok(CropResult {
        image,
        x: element.x + rect.x,
        y: element.y + rect.y,
        width: rect.width,
        height: rect.height,
    })
}
