use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::ops::color::Rgb;

/// Gestures smaller than this (logical units, both axes) are dropped.
pub const MIN_GESTURE: f32 = 3.0;
/// Extra margin (physical pixels) around a stroke so anti-aliasing is never clipped.
pub const STROKE_MARGIN: f32 = 5.0;

/// Available shape primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Line,
    Rectangle,
    Circle,
}

impl ShapeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::Line => "line",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Circle => "circle",
        }
    }

    pub fn all() -> &'static [ShapeKind] {
        &[ShapeKind::Line, ShapeKind::Rectangle, ShapeKind::Circle]
    }
}

impl std::str::FromStr for ShapeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShapeKind::all()
            .iter()
            .copied()
            .find(|k| k.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown shape '{}'", s))
    }
}

/// A shape being dragged out, in logical canvas coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeDescriptor {
    pub kind: ShapeKind,
    pub start: (f32, f32),
    pub end: (f32, f32),
    pub color: Rgb,
    /// Logical units.
    pub thickness: f32,
    pub fill: bool,
}

impl ShapeDescriptor {
    /// Pointer-down: start and end coincide.
    pub fn begin(kind: ShapeKind, x: f32, y: f32, color: Rgb, thickness: f32, fill: bool) -> Self {
        Self {
            kind,
            start: (x, y),
            end: (x, y),
            color,
            thickness,
            fill,
        }
    }

    /// Pointer-move.
    pub fn update(&mut self, x: f32, y: f32) {
        self.end = (x, y);
    }

    pub fn is_degenerate(&self) -> bool {
        (self.end.0 - self.start.0).abs() < MIN_GESTURE
            && (self.end.1 - self.start.1).abs() < MIN_GESTURE
    }
}

/// Vector record kept with a drawing element. Points and thickness are in
/// physical pixels; the bbox offset is the top-left of the bitmap it was first
/// rasterized into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrawingData {
    pub kind: ShapeKind,
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
    pub thickness: f32,
    pub color: Rgb,
    pub fill: bool,
    pub bbox_offset_x: f32,
    pub bbox_offset_y: f32,
}

/// Axis-aligned box in physical pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BoundingBox {
    fn around(x0: f32, y0: f32, x1: f32, y1: f32, pad: f32) -> Self {
        Self {
            min_x: x0.min(x1) - pad,
            min_y: y0.min(y1) - pad,
            max_x: x0.max(x1) + pad,
            max_y: y0.max(y1) + pad,
        }
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

/// Output of [`rasterize_shape`]: the tight bitmap, its vector record and
/// where the new element goes in logical space.
#[derive(Clone, Debug)]
pub struct RasterizedShape {
    pub image: RgbaImage,
    pub drawing: DrawingData,
    pub bbox: BoundingBox,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

// ============================================================================
// SDF functions: return signed distance (negative = inside)
// ============================================================================

/// SDF for a box centred at origin with half-extents (hx, hy).
#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

/// SDF for an ellipse (approximation, exact for circles).
#[inline]
fn sdf_ellipse(px: f32, py: f32, rx: f32, ry: f32) -> f32 {
    let rx = rx.max(1e-3);
    let ry = ry.max(1e-3);
    let nx = px / rx;
    let ny = py / ry;
    let len = (nx * nx + ny * ny).sqrt();
    if len < 1e-8 {
        return -rx.min(ry);
    }
    let scale = (rx * rx * ny * ny + ry * ry * nx * nx).sqrt() / (rx * ry * len);
    (len - 1.0) / scale
}

/// Unsigned distance to a line segment.
#[inline]
fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 1e-12 {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

/// Geometry in bitmap-local pixel coordinates.
#[derive(Clone, Copy, Debug)]
enum Outline {
    Segment { ax: f32, ay: f32, bx: f32, by: f32 },
    Box { cx: f32, cy: f32, hx: f32, hy: f32 },
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32 },
}

impl Outline {
    /// Corners `a` and `b` span a rectangle or a segment, depending on kind.
    /// Circles use the rectangle's center and half its diagonal.
    fn from_points(kind: ShapeKind, ax: f32, ay: f32, bx: f32, by: f32) -> Self {
        match kind {
            ShapeKind::Line => Outline::Segment { ax, ay, bx, by },
            ShapeKind::Rectangle => Outline::Box {
                cx: (ax + bx) * 0.5,
                cy: (ay + by) * 0.5,
                hx: (bx - ax).abs() * 0.5,
                hy: (by - ay).abs() * 0.5,
            },
            ShapeKind::Circle => {
                let r = circle_radius(ax, ay, bx, by);
                Outline::Ellipse {
                    cx: (ax + bx) * 0.5,
                    cy: (ay + by) * 0.5,
                    rx: r,
                    ry: r,
                }
            }
        }
    }

    #[inline]
    fn sdf(&self, px: f32, py: f32) -> f32 {
        match *self {
            Outline::Segment { ax, ay, bx, by } => sdf_line_segment(px, py, ax, ay, bx, by),
            Outline::Box { cx, cy, hx, hy } => sdf_box(px - cx, py - cy, hx, hy),
            Outline::Ellipse { cx, cy, rx, ry } => sdf_ellipse(px - cx, py - cy, rx, ry),
        }
    }

    fn is_closed(&self) -> bool {
        !matches!(self, Outline::Segment { .. })
    }
}

fn circle_radius(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let w = bx - ax;
    let h = by - ay;
    (w * w + h * h).sqrt() * 0.5
}

/// Stroke `outline` into a fresh transparent bitmap, or fill its interior
/// when `fill` is set on a closed outline. Lines get round caps from the
/// capsule distance.
fn paint(outline: Outline, w: u32, h: u32, thickness: f32, color: Rgb, fill: bool) -> RgbaImage {
    let mut img = RgbaImage::new(w, h);
    let row_bytes = w as usize * 4;
    let half = thickness * 0.5;
    let fill = fill && outline.is_closed();

    img.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(row, row_buf)| {
            let py = row as f32 + 0.5;
            for col in 0..w as usize {
                let px = col as f32 + 0.5;
                let d = outline.sdf(px, py);

                let coverage = if fill {
                    smoothstep(0.5, -0.5, d)
                } else if outline.is_closed() {
                    smoothstep(0.5, -0.5, d.abs() - half)
                } else {
                    smoothstep(0.5, -0.5, d - half)
                };

                if coverage > 0.001 {
                    let idx = col * 4;
                    row_buf[idx] = color.r;
                    row_buf[idx + 1] = color.g;
                    row_buf[idx + 2] = color.b;
                    row_buf[idx + 3] = (255.0 * coverage).round().min(255.0) as u8;
                }
            }
        });

    img
}

fn check_ratio(ratio: f32) -> EngineResult<()> {
    if ratio.is_finite() && ratio > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidGeometry(format!("scale ratio {}", ratio)))
    }
}

/// Rasterize a finished gesture at `ratio` physical pixels per logical unit.
///
/// The bitmap is exactly the stroke-padded bounding box, so the element it
/// becomes sits at `bbox.min / ratio`. Degenerate gestures return `Ok(None)`.
pub fn rasterize_shape(desc: &ShapeDescriptor, ratio: f32) -> EngineResult<Option<RasterizedShape>> {
    check_ratio(ratio)?;
    if desc.is_degenerate() {
        return Ok(None);
    }

    let (sx, sy) = (desc.start.0 * ratio, desc.start.1 * ratio);
    let (ex, ey) = (desc.end.0 * ratio, desc.end.1 * ratio);
    let thickness = desc.thickness * ratio;
    let pad = thickness + STROKE_MARGIN;

    let bbox = match desc.kind {
        ShapeKind::Line | ShapeKind::Rectangle => BoundingBox::around(sx, sy, ex, ey, pad),
        ShapeKind::Circle => {
            let r = circle_radius(sx, sy, ex, ey);
            let (cx, cy) = ((sx + ex) * 0.5, (sy + ey) * 0.5);
            BoundingBox::around(cx - r, cy - r, cx + r, cy + r, pad)
        }
    };

    let w = bbox.width().ceil().max(1.0) as u32;
    let h = bbox.height().ceil().max(1.0) as u32;
    let outline = Outline::from_points(
        desc.kind,
        sx - bbox.min_x,
        sy - bbox.min_y,
        ex - bbox.min_x,
        ey - bbox.min_y,
    );
    let image = paint(outline, w, h, thickness, desc.color, desc.fill);

    let drawing = DrawingData {
        kind: desc.kind,
        start_x: sx,
        start_y: sy,
        end_x: ex,
        end_y: ey,
        thickness,
        color: desc.color,
        fill: desc.fill,
        bbox_offset_x: bbox.min_x,
        bbox_offset_y: bbox.min_y,
    };

    Ok(Some(RasterizedShape {
        image,
        drawing,
        bbox,
        x: bbox.min_x / ratio,
        y: bbox.min_y / ratio,
        width: bbox.width() / ratio,
        height: bbox.height() / ratio,
    }))
}

/// Map one axis of the original shape onto a new bitmap extent, keeping
/// `pad` pixels free on both sides. A zero-span axis is centred.
fn remap_axis(a: f32, b: f32, extent: f32, pad: f32) -> (f32, f32) {
    let span = (b - a).abs();
    if span < 1e-6 {
        let mid = extent * 0.5;
        return (mid, mid);
    }
    let scale = ((extent - 2.0 * pad) / span).max(0.0);
    let min = a.min(b);
    ((a - min) * scale + pad, (b - min) * scale + pad)
}

/// Redraw a stored drawing for a new logical size.
///
/// The stored corners stretch independently along each axis to fill the new
/// bounds and the shape is drawn from them as on creation, so a circle keeps
/// half the remapped diagonal as its radius. The stroke keeps the stored
/// thickness. `drawing` is left untouched.
pub fn rerasterize(
    drawing: &DrawingData,
    new_width: f32,
    new_height: f32,
    ratio: f32,
) -> EngineResult<RgbaImage> {
    check_ratio(ratio)?;
    if !(new_width > 0.0 && new_height > 0.0) {
        return Err(EngineError::InvalidGeometry(format!(
            "drawing resized to {}x{}",
            new_width, new_height
        )));
    }

    let w = (new_width * ratio).round().max(1.0) as u32;
    let h = (new_height * ratio).round().max(1.0) as u32;
    let (wf, hf) = (w as f32, h as f32);
    let pad = drawing.thickness * 0.5 + STROKE_MARGIN;

    let ax = drawing.start_x - drawing.bbox_offset_x;
    let ay = drawing.start_y - drawing.bbox_offset_y;
    let bx = drawing.end_x - drawing.bbox_offset_x;
    let by = drawing.end_y - drawing.bbox_offset_y;
    let (nax, nbx) = remap_axis(ax, bx, wf, pad);
    let (nay, nby) = remap_axis(ay, by, hf, pad);
    let outline = Outline::from_points(drawing.kind, nax, nay, nbx, nby);

    Ok(paint(outline, w, h, drawing.thickness, drawing.color, drawing.fill))
}

/// Smoothstep between edge0 and edge1.
#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb::new(255, 0, 0);

    fn desc(kind: ShapeKind, start: (f32, f32), end: (f32, f32), thickness: f32) -> ShapeDescriptor {
        let mut d = ShapeDescriptor::begin(kind, start.0, start.1, RED, thickness, false);
        d.update(end.0, end.1);
        d
    }

    fn opaque(img: &RgbaImage, x: u32, y: u32) -> bool {
        img.get_pixel(x, y)[3] >= 128
    }

    #[test]
    fn line_bbox_is_tight_plus_padding() {
        let shape = rasterize_shape(&desc(ShapeKind::Line, (0.0, 0.0), (100.0, 50.0), 10.0), 1.0)
            .unwrap()
            .unwrap();
        assert_eq!(shape.image.dimensions(), (130, 80));
        assert_eq!((shape.x, shape.y), (-15.0, -15.0));
        assert_eq!((shape.width, shape.height), (130.0, 80.0));
        assert_eq!((shape.drawing.bbox_offset_x, shape.drawing.bbox_offset_y), (-15.0, -15.0));
        // the stroke passes through the middle of the line
        assert!(opaque(&shape.image, 65, 40));
        assert!(!opaque(&shape.image, 2, 77));
    }

    #[test]
    fn drawing_data_is_in_physical_pixels() {
        let shape = rasterize_shape(&desc(ShapeKind::Rectangle, (10.0, 20.0), (40.0, 60.0), 2.0), 2.7)
            .unwrap()
            .unwrap();
        let d = &shape.drawing;
        assert!((d.start_x - 27.0).abs() < 1e-4);
        assert!((d.end_y - 162.0).abs() < 1e-4);
        assert!((d.thickness - 5.4).abs() < 1e-4);
        // logical placement is the raster geometry divided back by the ratio
        assert!((shape.x - d.bbox_offset_x / 2.7).abs() < 1e-4);
        assert!((shape.width - shape.bbox.width() / 2.7).abs() < 1e-4);
    }

    #[test]
    fn circle_bbox_uses_half_diagonal() {
        let shape = rasterize_shape(&desc(ShapeKind::Circle, (0.0, 0.0), (60.0, 80.0), 4.0), 1.0)
            .unwrap()
            .unwrap();
        // radius 50 around (30, 40), padded by 4 + 5
        assert_eq!(shape.image.dimensions(), (118, 118));
        assert_eq!((shape.x, shape.y), (-29.0, -19.0));
    }

    #[test]
    fn small_gestures_are_dropped() {
        let tiny = desc(ShapeKind::Rectangle, (5.0, 5.0), (7.0, 6.5), 3.0);
        assert!(tiny.is_degenerate());
        assert!(rasterize_shape(&tiny, 2.7).unwrap().is_none());
        // one axis long enough is a valid (flat) shape
        let flat = desc(ShapeKind::Line, (0.0, 0.0), (3.0, 0.0), 3.0);
        assert!(rasterize_shape(&flat, 1.0).unwrap().is_some());
    }

    #[test]
    fn resize_keeps_stroke_thickness() {
        let shape = rasterize_shape(&desc(ShapeKind::Rectangle, (0.0, 0.0), (100.0, 100.0), 10.0), 1.0)
            .unwrap()
            .unwrap();
        let before = shape.drawing.clone();
        let img = rerasterize(&shape.drawing, 200.0, 50.0, 1.0).unwrap();
        assert_eq!(img.dimensions(), (200, 50));
        assert_eq!(shape.drawing, before);

        // left edge of the rectangle sits at x = 10 with a 10px stroke
        let left: Vec<u32> = (0..100).filter(|&x| opaque(&img, x, 25)).collect();
        assert_eq!(left, (5..15).collect::<Vec<_>>());
        // top edge is equally thick even though height shrank
        let top = (0..25).filter(|&y| opaque(&img, 100, y)).count();
        assert_eq!(top, 10);
        // interior stays empty when not filled
        assert_eq!(img.get_pixel(100, 25)[3], 0);
    }

    #[test]
    fn resized_circle_is_redrawn_from_remapped_corners() {
        let shape = rasterize_shape(&desc(ShapeKind::Circle, (0.0, 0.0), (40.0, 40.0), 4.0), 1.0)
            .unwrap()
            .unwrap();
        let img = rerasterize(&shape.drawing, 120.0, 60.0, 1.0).unwrap();
        // pad = 2 + 5: corners land on (7, 7) and (113, 53), so the circle is
        // centred at (60, 30) with radius sqrt(106² + 46²) / 2 ≈ 57.8
        assert!(opaque(&img, 117, 30));
        assert!(opaque(&img, 2, 30));
        assert!(!opaque(&img, 60, 7));
        assert!(!opaque(&img, 60, 30));
        assert!(!opaque(&img, 60, 59));
    }

    #[test]
    fn filled_rectangle_covers_interior_only() {
        let mut d = desc(ShapeKind::Rectangle, (0.0, 0.0), (20.0, 20.0), 2.0);
        d.fill = true;
        let shape = rasterize_shape(&d, 1.0).unwrap().unwrap();
        // pad = 2 + 5, so the rectangle spans x = 7..27
        let c = shape.image.dimensions().0 / 2;
        assert_eq!(shape.image.get_pixel(c, c).0, [255, 0, 0, 255]);
        assert_eq!(shape.image.get_pixel(7, c)[3], 255);
        assert_eq!(shape.image.get_pixel(6, c)[3], 0);
        assert_eq!(shape.image.get_pixel(27, c)[3], 0);
    }

    #[test]
    fn invalid_resize_is_rejected() {
        let shape = rasterize_shape(&desc(ShapeKind::Line, (0.0, 0.0), (10.0, 10.0), 1.0), 1.0)
            .unwrap()
            .unwrap();
        assert!(matches!(
            rerasterize(&shape.drawing, 0.0, 10.0, 1.0),
            Err(EngineError::InvalidGeometry(_))
        ));
        assert!(rasterize_shape(&desc(ShapeKind::Line, (0.0, 0.0), (10.0, 10.0), 1.0), 0.0).is_err());
    }
}
