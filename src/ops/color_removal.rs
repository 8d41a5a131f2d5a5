use image::RgbaImage;
use rayon::prelude::*;

use crate::ops::color::{Rgb, color_distance};

/// Global color-to-transparent: every pixel within `tolerance` of `target`
/// gets alpha 0. RGB is left as-is so the operation stays reversible through
/// history snapshots.
///
/// Returns the number of pixels whose alpha actually changed. Pixels that are
/// already fully transparent never count, so running the same removal twice
/// yields 0 the second time.
pub fn remove_color(pixels: &mut RgbaImage, target: Rgb, tolerance: f32) -> usize {
    let row_bytes = pixels.width() as usize * 4;
    if row_bytes == 0 {
        return 0;
    }

    pixels
        .par_chunks_mut(row_bytes)
        .map(|row| {
            let mut changed = 0usize;
            for px in row.chunks_exact_mut(4) {
                if px[3] == 0 {
                    continue;
                }
                if color_distance(px[0], px[1], px[2], target.r, target.g, target.b) <= tolerance {
                    px[3] = 0;
                    changed += 1;
                }
            }
            changed
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn striped() -> RgbaImage {
        RgbaImage::from_fn(8, 4, |x, _| {
            if x % 2 == 0 {
                Rgba([250, 250, 250, 255])
            } else {
                Rgba([20, 40, 60, 200])
            }
        })
    }

    #[test]
    fn clears_alpha_and_keeps_rgb() {
        let mut img = striped();
        let n = remove_color(&mut img, Rgb::WHITE, 10.0);
        assert_eq!(n, 16);
        assert_eq!(img.get_pixel(0, 0).0, [250, 250, 250, 0]);
        assert_eq!(img.get_pixel(1, 0).0, [20, 40, 60, 200]);
    }

    #[test]
    fn second_pass_changes_nothing() {
        let mut img = striped();
        assert_eq!(remove_color(&mut img, Rgb::WHITE, 30.0), 16);
        let after_first = img.clone();
        assert_eq!(remove_color(&mut img, Rgb::WHITE, 30.0), 0);
        assert_eq!(img, after_first);
    }

    #[test]
    fn absent_color_is_a_no_op() {
        let mut img = striped();
        let before = img.clone();
        assert_eq!(remove_color(&mut img, Rgb::new(255, 0, 0), 50.0), 0);
        assert_eq!(img, before);
    }

    #[test]
    fn partially_transparent_pixels_match_by_rgb() {
        let mut img = striped();
        assert_eq!(remove_color(&mut img, Rgb::new(20, 40, 60), 0.0), 16);
        assert_eq!(img.get_pixel(3, 2)[3], 0);
    }
}
