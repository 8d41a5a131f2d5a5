// ============================================================================
// COORDINATE MAPPING: screen → logical canvas → source bitmap pixels
// ============================================================================

use crate::canvas::CanvasElement;
use crate::error::{EngineError, EngineResult};

pub const MIN_ZOOM: u32 = 50;
pub const MAX_ZOOM: u32 = 200;
pub const ZOOM_STEP: u32 = 25;

/// On-screen bounding rectangle of the (possibly zoomed) canvas surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    /// Rect of a logical box shown at `zoom` percent with its top-left at (left, top).
    pub fn zoomed(left: f32, top: f32, logical_width: f32, logical_height: f32, zoom: u32) -> Self {
        let s = zoom as f32 / 100.0;
        Self::new(left, top, logical_width * s, logical_height * s)
    }
}

/// Pointer client coordinates to logical canvas units.
pub fn to_logical(
    pointer_x: f32,
    pointer_y: f32,
    rect: &DisplayRect,
    logical_width: f32,
    logical_height: f32,
) -> EngineResult<(f32, f32)> {
    if !(rect.width > 0.0 && rect.height > 0.0) {
        return Err(EngineError::InvalidGeometry(format!(
            "display rect {}x{}",
            rect.width, rect.height
        )));
    }
    Ok((
        (pointer_x - rect.left) / rect.width * logical_width,
        (pointer_y - rect.top) / rect.height * logical_height,
    ))
}

/// Source-pixels-per-logical-unit of an element along each axis.
pub fn natural_ratio(element: &CanvasElement, natural_width: u32, natural_height: u32) -> EngineResult<(f32, f32)> {
    element.ensure_has_area()?;
    Ok((
        natural_width as f32 / element.width,
        natural_height as f32 / element.height,
    ))
}

/// Element-local logical point to the element's source bitmap resolution.
pub fn to_image_pixel(
    local_x: f32,
    local_y: f32,
    element: &CanvasElement,
    natural_width: u32,
    natural_height: u32,
) -> EngineResult<(f32, f32)> {
    let (rx, ry) = natural_ratio(element, natural_width, natural_height)?;
    Ok((local_x * rx, local_y * ry))
}

/// [`to_image_pixel`] floored to an addressable pixel; `InvalidGeometry` if it
/// falls outside the bitmap.
pub fn to_pixel_index(
    local_x: f32,
    local_y: f32,
    element: &CanvasElement,
    natural_width: u32,
    natural_height: u32,
) -> EngineResult<(u32, u32)> {
    if !(local_x.is_finite() && local_y.is_finite()) {
        return Err(EngineError::InvalidGeometry(format!("point ({}, {}) is not finite", local_x, local_y)));
    }
    let (px, py) = to_image_pixel(local_x, local_y, element, natural_width, natural_height)?;
    let (px, py) = (px.floor(), py.floor());
    if px < 0.0 || py < 0.0 || px >= natural_width as f32 || py >= natural_height as f32 {
        return Err(EngineError::InvalidGeometry(format!(
            "point ({}, {}) outside {}x{} bitmap",
            px, py, natural_width, natural_height
        )));
    }
    Ok((px as u32, py as u32))
}

pub fn clamp_zoom(zoom: i32) -> u32 {
    zoom.clamp(MIN_ZOOM as i32, MAX_ZOOM as i32) as u32
}

/// One wheel notch: positive `delta` zooms in.
pub fn step_zoom(zoom: u32, delta: i32) -> u32 {
    let step = ZOOM_STEP as i32 * delta.signum();
    clamp_zoom(zoom as i32 + step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ImageAsset;

    fn element(w: f32, h: f32) -> CanvasElement {
        CanvasElement::image_at(ImageAsset::Inline(Vec::new()), 20.0, 30.0, w, h)
    }

    #[test]
    fn pointer_maps_through_zoomed_rect() {
        // 400x400 canvas shown at 200% with its corner at (100, 50)
        let rect = DisplayRect::zoomed(100.0, 50.0, 400.0, 400.0, 200);
        assert_eq!(to_logical(100.0, 50.0, &rect, 400.0, 400.0).unwrap(), (0.0, 0.0));
        assert_eq!(to_logical(500.0, 850.0, &rect, 400.0, 400.0).unwrap(), (200.0, 400.0));

        let half = DisplayRect::zoomed(0.0, 0.0, 400.0, 500.0, 50);
        assert_eq!(to_logical(100.0, 125.0, &half, 400.0, 500.0).unwrap(), (200.0, 250.0));
    }

    #[test]
    fn zero_rect_is_invalid() {
        let rect = DisplayRect::new(0.0, 0.0, 0.0, 10.0);
        assert!(matches!(
            to_logical(1.0, 1.0, &rect, 400.0, 400.0),
            Err(EngineError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn image_pixels_follow_natural_ratio() {
        let el = element(100.0, 50.0);
        assert_eq!(to_image_pixel(10.0, 10.0, &el, 400, 100).unwrap(), (40.0, 20.0));
        assert_eq!(to_pixel_index(99.9, 49.9, &el, 400, 100).unwrap(), (399, 99));
        assert!(to_pixel_index(100.0, 0.0, &el, 400, 100).is_err());
        assert!(to_pixel_index(-0.1, 0.0, &el, 400, 100).is_err());
    }

    #[test]
    fn non_finite_points_are_invalid() {
        let el = element(100.0, 50.0);
        for (x, y) in [(f32::NAN, 1.0), (1.0, f32::NAN), (f32::INFINITY, 1.0), (1.0, f32::NEG_INFINITY)] {
            assert!(matches!(
                to_pixel_index(x, y, &el, 400, 100),
                Err(EngineError::InvalidGeometry(_))
            ));
        }
    }

    #[test]
    fn zero_size_element_is_invalid() {
        assert!(matches!(
            to_image_pixel(1.0, 1.0, &element(0.0, 10.0), 10, 10),
            Err(EngineError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn zoom_steps_are_clamped() {
        assert_eq!(step_zoom(100, 1), 125);
        assert_eq!(step_zoom(100, -3), 75);
        assert_eq!(step_zoom(200, 1), 200);
        assert_eq!(step_zoom(50, -1), 50);
        assert_eq!(clamp_zoom(10), 50);
    }
}
