// ============================================================================
// PAGE EXPORT: flatten a page's layers at physical resolution
// ============================================================================

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::{CanvasElement, CanvasSpec};
use crate::error::{EngineError, EngineResult};
use crate::io::{AssetResolver, ExportFormat, decode_asset, write_export};
use crate::ops::color::Rgb;
use crate::ops::filters::apply_filters;
use crate::project::Page;

/// Composite every bitmap-bearing element of a page, in list order, over a
/// solid background. Text is left to the text renderer. Elements whose
/// asset cannot be decoded are skipped with a warning.
pub fn flatten_page(
    elements: &[CanvasElement],
    canvas: &CanvasSpec,
    background: Rgb,
    resolver: &dyn AssetResolver,
) -> RgbaImage {
    let mut out = RgbaImage::from_pixel(
        canvas.physical_width,
        canvas.physical_height,
        background.to_rgba(),
    );
    let (sx, sy) = (canvas.ratio(), canvas.ratio_y());

    for el in elements {
        let Some(asset) = el.asset() else {
            continue;
        };
        if let Err(e) = el.ensure_has_area() {
            log_warn!("Export: skipping element {}: {}", el.id, e);
            continue;
        }
        let src = match decode_asset(asset, resolver) {
            Ok(img) => img,
            Err(e) => {
                log_warn!("Export: skipping element {}: {}", el.id, e);
                continue;
            }
        };
        let layer = prepare_layer(&src, el, sx, sy);
        let rotation = el.filters.map_or(0.0, |f| f.rotate);
        composite(&mut out, &layer, el.x * sx, el.y * sy, rotation);
    }
    out
}

/// A single element rendered on its own at physical resolution, with filters
/// and opacity but without rotation, on a transparent background.
pub fn render_layer(
    element: &CanvasElement,
    canvas: &CanvasSpec,
    resolver: &dyn AssetResolver,
) -> EngineResult<RgbaImage> {
    let asset = element
        .asset()
        .ok_or(EngineError::UnsupportedLayerType(element.kind()))?;
    element.ensure_has_area()?;
    let src = decode_asset(asset, resolver)?;
    Ok(prepare_layer(&src, element, canvas.ratio(), canvas.ratio_y()))
}

/// Resize to the element's physical footprint and bake its filters, flips
/// and opacity.
fn prepare_layer(src: &RgbaImage, el: &CanvasElement, sx: f32, sy: f32) -> RgbaImage {
    let tw = (el.width * sx).round().max(1.0) as u32;
    let th = (el.height * sy).round().max(1.0) as u32;
    let mut img = if src.dimensions() == (tw, th) {
        src.clone()
    } else {
        imageops::resize(src, tw, th, FilterType::Triangle)
    };

    if let Some(f) = &el.filters {
        img = apply_filters(&img, f, sx);
        if f.flip_h {
            imageops::flip_horizontal_in_place(&mut img);
        }
        if f.flip_v {
            imageops::flip_vertical_in_place(&mut img);
        }
        let opacity = (f.opacity / 100.0).clamp(0.0, 1.0);
        if opacity < 1.0 {
            for px in img.pixels_mut() {
                px[3] = (px[3] as f32 * opacity).round() as u8;
            }
        }
    }
    img
}

/// Premultiplied RGBA at a pixel, transparent outside the image.
#[inline]
fn fetch(img: &RgbaImage, x: i64, y: i64) -> [f32; 4] {
    if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
        return [0.0; 4];
    }
    let p = img.get_pixel(x as u32, y as u32);
    let a = p[3] as f32 / 255.0;
    [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, a]
}

/// Bilinear sample at continuous coordinates (pixel centres at i + 0.5).
/// Returns premultiplied RGB and alpha in [0, 1].
fn sample_bilinear(img: &RgbaImage, u: f32, v: f32) -> [f32; 4] {
    let fx = u - 0.5;
    let fy = v - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let p00 = fetch(img, x0, y0);
    let p10 = fetch(img, x0 + 1, y0);
    let p01 = fetch(img, x0, y0 + 1);
    let p11 = fetch(img, x0 + 1, y0 + 1);
    let mut out = [0.0f32; 4];
    for c in 0..4 {
        let top = p00[c] + (p10[c] - p00[c]) * tx;
        let bottom = p01[c] + (p11[c] - p01[c]) * tx;
        out[c] = top + (bottom - top) * ty;
    }
    out
}

/// Draw `layer` onto `dst` with its top-left at (`left`, `top`), rotated
/// clockwise by `degrees` about its own centre, using source-over.
fn composite(dst: &mut RgbaImage, layer: &RgbaImage, left: f32, top: f32, degrees: f32) {
    let (lw, lh) = (layer.width() as f32, layer.height() as f32);
    let (cx, cy) = (left + lw * 0.5, top + lh * 0.5);
    let (sin, cos) = degrees.to_radians().sin_cos();
    let ext_x = (cos.abs() * lw + sin.abs() * lh) * 0.5;
    let ext_y = (sin.abs() * lw + cos.abs() * lh) * 0.5;

    let dw = dst.width() as i64;
    let dh = dst.height() as i64;
    let x0 = ((cx - ext_x).floor() as i64).clamp(0, dw) as usize;
    let x1 = ((cx + ext_x).ceil() as i64).clamp(0, dw) as usize;
    let y0 = ((cy - ext_y).floor() as i64).clamp(0, dh);
    let y1 = ((cy + ext_y).ceil() as i64).clamp(0, dh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let stride = dw as usize * 4;
    dst.par_chunks_mut(stride)
        .enumerate()
        .filter(|(y, _)| (y0..y1).contains(&(*y as i64)))
        .for_each(|(y, row)| {
            let py = y as f32 + 0.5 - cy;
            for x in x0..x1 {
                let px = x as f32 + 0.5 - cx;
                // inverse rotation back into layer space
                let u = px * cos + py * sin + lw * 0.5;
                let v = -px * sin + py * cos + lh * 0.5;
                let s = sample_bilinear(layer, u, v);
                if s[3] <= 0.0 {
                    continue;
                }
                let idx = x * 4;
                let da = row[idx + 3] as f32 / 255.0;
                let out_a = s[3] + da * (1.0 - s[3]);
                for c in 0..3 {
                    let d = row[idx + c] as f32 * da;
                    let v = (s[c] + d * (1.0 - s[3])) / out_a;
                    row[idx + c] = v.round().clamp(0.0, 255.0) as u8;
                }
                row[idx + 3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        });
}

/// `page-N.<ext>`, numbered from 1.
pub fn page_file_name(index: usize, format: ExportFormat) -> String {
    format!("page-{}.{}", index + 1, format.extension())
}

/// Flatten and write every page into `dir`. Returns the written paths.
pub fn export_pages(
    pages: &[Page],
    canvas: &CanvasSpec,
    background: Rgb,
    dir: &Path,
    format: ExportFormat,
    quality: u8,
    resolver: &dyn AssetResolver,
) -> EngineResult<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(pages.len());
    for (i, page) in pages.iter().enumerate() {
        let image = flatten_page(&page.elements, canvas, background, resolver);
        let path = dir.join(page_file_name(i, format));
        write_export(&image, &path, format, quality)?;
        log_info!("Export: wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
