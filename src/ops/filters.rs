// ============================================================================
// RENDER FILTERS: CSS-style filter chain applied at export time
// ============================================================================
//
// Stored bitmaps are never filtered in place; the chain below runs on a copy
// when a page or layer is flattened. Order follows the CSS filter list used
// on the canvas: brightness, contrast, saturate, hue-rotate, blur, grayscale,
// sepia, invert. Each step clamps to [0, 255] before the next.

use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::ImageFilters;

type Matrix3 = [[f32; 3]; 3];

/// Color-only steps, one entry per active filter function.
#[derive(Clone, Copy, Debug)]
enum ColorStep {
    Brightness(f32),
    Contrast(f32),
    Matrix(Matrix3),
    Invert(f32),
}

impl ColorStep {
    #[inline]
    fn apply(&self, c: [f32; 3]) -> [f32; 3] {
        let out = match *self {
            ColorStep::Brightness(k) => [c[0] * k, c[1] * k, c[2] * k],
            ColorStep::Contrast(k) => c.map(|v| (v - 127.5) * k + 127.5),
            ColorStep::Matrix(m) => [
                m[0][0] * c[0] + m[0][1] * c[1] + m[0][2] * c[2],
                m[1][0] * c[0] + m[1][1] * c[1] + m[1][2] * c[2],
                m[2][0] * c[0] + m[2][1] * c[1] + m[2][2] * c[2],
            ],
            ColorStep::Invert(k) => c.map(|v| v * (1.0 - k) + (255.0 - v) * k),
        };
        out.map(|v| v.clamp(0.0, 255.0))
    }
}

fn saturate_matrix(s: f32) -> Matrix3 {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn hue_rotate_matrix(degrees: f32) -> Matrix3 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

fn grayscale_matrix(amount: f32) -> Matrix3 {
    let a = 1.0 - amount;
    [
        [0.2126 + 0.7874 * a, 0.7152 - 0.7152 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 + 0.2848 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 - 0.7152 * a, 0.0722 + 0.9278 * a],
    ]
}

fn sepia_matrix(amount: f32) -> Matrix3 {
    let a = 1.0 - amount;
    [
        [0.393 + 0.607 * a, 0.769 - 0.769 * a, 0.189 - 0.189 * a],
        [0.349 - 0.349 * a, 0.686 + 0.314 * a, 0.168 - 0.168 * a],
        [0.272 - 0.272 * a, 0.534 - 0.534 * a, 0.131 + 0.869 * a],
    ]
}

/// Percent to fraction, clamped to [0, 1] for the amount-style functions.
fn amount(percent: f32) -> f32 {
    (percent / 100.0).clamp(0.0, 1.0)
}

/// Steps before and after the blur, skipping neutral ones.
fn color_steps(f: &ImageFilters) -> (Vec<ColorStep>, Vec<ColorStep>) {
    let mut pre = Vec::new();
    if f.brightness != 100.0 {
        pre.push(ColorStep::Brightness(f.brightness.max(0.0) / 100.0));
    }
    if f.contrast != 100.0 {
        pre.push(ColorStep::Contrast(f.contrast.max(0.0) / 100.0));
    }
    if f.saturation != 100.0 {
        pre.push(ColorStep::Matrix(saturate_matrix(f.saturation.max(0.0) / 100.0)));
    }
    if f.hue % 360.0 != 0.0 {
        pre.push(ColorStep::Matrix(hue_rotate_matrix(f.hue)));
    }

    let mut post = Vec::new();
    if f.grayscale > 0.0 {
        post.push(ColorStep::Matrix(grayscale_matrix(amount(f.grayscale))));
    }
    if f.sepia > 0.0 {
        post.push(ColorStep::Matrix(sepia_matrix(amount(f.sepia))));
    }
    if f.invert > 0.0 {
        post.push(ColorStep::Invert(amount(f.invert)));
    }
    (pre, post)
}

/// Per-pixel transform over a copy of `src`. `transform` receives and returns
/// (r, g, b, a) as f32.
pub fn apply_pixel_transform<F>(src: &RgbaImage, transform: F) -> RgbaImage
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let mut out = src.clone();
    let stride = src.width() as usize * 4;
    if stride == 0 {
        return out;
    }
    out.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let (r, g, b, a) = transform(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32);
            px[0] = r.round().clamp(0.0, 255.0) as u8;
            px[1] = g.round().clamp(0.0, 255.0) as u8;
            px[2] = b.round().clamp(0.0, 255.0) as u8;
            px[3] = a.round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

fn run_steps(src: &RgbaImage, steps: &[ColorStep]) -> RgbaImage {
    apply_pixel_transform(src, |r, g, b, a| {
        let c = steps.iter().fold([r, g, b], |c, step| step.apply(c));
        (c[0], c[1], c[2], a)
    })
}

/// Apply an element's filter chain. `blur_scale` converts the stored blur
/// radius (logical pixels) to the output resolution.
pub fn apply_filters(src: &RgbaImage, filters: &ImageFilters, blur_scale: f32) -> RgbaImage {
    if filters.is_color_neutral() {
        return src.clone();
    }
    let (pre, post) = color_steps(filters);
    let mut img = if pre.is_empty() { src.clone() } else { run_steps(src, &pre) };
    let sigma = filters.blur.max(0.0) * blur_scale;
    if sigma > 0.0 {
        img = gaussian_blur(&img, sigma);
    }
    if !post.is_empty() {
        img = run_steps(&img, &post);
    }
    img
}

// ---------------------------------------------------------------------------
//  Parallel separable Gaussian blur (rayon)
// ---------------------------------------------------------------------------

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let inv = 1.0 / kernel.iter().sum::<f32>();
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// One separable pass. `along_x` picks the direction; edges are clamped.
fn blur_pass(src: &[f32], w: usize, h: usize, kernel: &[f32], along_x: bool) -> Vec<f32> {
    let radius = kernel.len() / 2;
    let mut out = vec![0.0f32; w * h * 4];
    out.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let off = ki as isize - radius as isize;
                let idx = if along_x {
                    let sx = (x as isize + off).clamp(0, w as isize - 1) as usize;
                    (y * w + sx) * 4
                } else {
                    let sy = (y as isize + off).clamp(0, h as isize - 1) as usize;
                    (sy * w + x) * 4
                };
                for c in 0..4 {
                    acc[c] += src[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });
    out
}

/// Separable Gaussian blur with standard deviation `sigma` pixels.
pub fn gaussian_blur(src: &RgbaImage, sigma: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 || sigma <= 0.0 {
        return src.clone();
    }
    let kernel = build_gaussian_kernel(sigma);
    let buf_in: Vec<f32> = src.as_raw().iter().map(|&b| b as f32).collect();
    let buf_h = blur_pass(&buf_in, w, h, &kernel, true);
    let buf_v = blur_pass(&buf_h, w, h, &kernel, false);

    let mut out = src.clone();
    for (dst, v) in out.iter_mut().zip(buf_v) {
        *dst = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(c: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(6, 6, Rgba(c))
    }

    #[test]
    fn neutral_filters_are_identity() {
        let img = RgbaImage::from_fn(5, 5, |x, y| Rgba([x as u8 * 40, y as u8 * 30, 7, 200]));
        assert_eq!(apply_filters(&img, &ImageFilters::default(), 2.7), img);
    }

    #[test]
    fn invert_and_brightness() {
        let img = solid([200, 100, 0, 255]);
        let inv = apply_filters(&img, &ImageFilters { invert: 100.0, ..Default::default() }, 1.0);
        assert_eq!(inv.get_pixel(0, 0).0, [55, 155, 255, 255]);
        let dim = apply_filters(&img, &ImageFilters { brightness: 50.0, ..Default::default() }, 1.0);
        assert_eq!(dim.get_pixel(0, 0).0, [100, 50, 0, 255]);
    }

    #[test]
    fn full_grayscale_equalizes_channels() {
        let img = solid([255, 0, 0, 128]);
        let gray = apply_filters(&img, &ImageFilters { grayscale: 100.0, ..Default::default() }, 1.0);
        let p = gray.get_pixel(3, 3).0;
        assert_eq!((p[0], p[1], p[2], p[3]), (54, 54, 54, 128));
    }

    #[test]
    fn zero_saturation_matches_luma_and_full_hue_turn_is_neutral() {
        let img = solid([30, 160, 90, 255]);
        let flat = apply_filters(&img, &ImageFilters { saturation: 0.0, ..Default::default() }, 1.0);
        let p = flat.get_pixel(0, 0).0;
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        let turned = apply_filters(&img, &ImageFilters { hue: 360.0, ..Default::default() }, 1.0);
        assert_eq!(turned, img);
    }

    #[test]
    fn blur_spreads_a_point_and_keeps_flat_areas() {
        let flat = solid([10, 20, 30, 255]);
        assert_eq!(gaussian_blur(&flat, 2.0), flat);

        let mut dot = solid([0, 0, 0, 255]);
        dot.put_pixel(3, 3, Rgba([255, 255, 255, 255]));
        let blurred = gaussian_blur(&dot, 1.0);
        assert!(blurred.get_pixel(3, 3)[0] < 255);
        assert!(blurred.get_pixel(4, 3)[0] > 0);
    }
}
