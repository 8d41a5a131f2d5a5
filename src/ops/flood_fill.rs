use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::ops::color::{Rgb, pixel_matches};

/// Which pixels a fill reaches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillMode {
    /// 4-connected region grown from the seed pixel.
    #[default]
    Adjacent,
    /// Every pixel near the seed color, anywhere in the bitmap.
    All,
}

impl FillMode {
    pub fn label(&self) -> &'static str {
        match self {
            FillMode::Adjacent => "adjacent",
            FillMode::All => "all",
        }
    }
}

impl std::str::FromStr for FillMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "adjacent" | "contiguous" => Ok(FillMode::Adjacent),
            "all" | "global" => Ok(FillMode::All),
            other => Err(format!("unknown fill mode '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Left,
    Right,
    Up,
    Down,
}

const DEFAULT_ORDER: [Step; 4] = [Step::Left, Step::Right, Step::Up, Step::Down];

/// Recolor from `(seed_x, seed_y)` in source-pixel coordinates.
///
/// The seed's color is sampled once before anything is written; every
/// comparison is against that original color. Only RGB is written, each
/// pixel keeps its alpha. Returns how many pixels changed value.
pub fn flood_fill(
    pixels: &mut RgbaImage,
    seed_x: u32,
    seed_y: u32,
    fill: Rgb,
    tolerance: f32,
    mode: FillMode,
) -> EngineResult<usize> {
    let (w, h) = pixels.dimensions();
    if seed_x >= w || seed_y >= h {
        return Err(EngineError::InvalidGeometry(format!(
            "seed ({}, {}) outside {}x{} bitmap",
            seed_x, seed_y, w, h
        )));
    }
    let seed_px = *pixels.get_pixel(seed_x, seed_y);
    // Nothing to grow from on a fully transparent seed.
    if seed_px[3] == 0 {
        return Ok(0);
    }
    let seed = Rgb::from_pixel(&seed_px);

    let changed = match mode {
        FillMode::Adjacent => {
            let mask = adjacent_mask(pixels, seed_x, seed_y, seed, tolerance, &DEFAULT_ORDER);
            apply_mask(pixels, &mask, fill)
        }
        FillMode::All => fill_all(pixels, seed, fill, tolerance),
    };
    Ok(changed)
}

/// DFS over 4-neighbours. The mask doubles as the visited set; a pixel is
/// marked only when it matches, so boundary pixels stay unvisited.
fn adjacent_mask(
    pixels: &RgbaImage,
    seed_x: u32,
    seed_y: u32,
    seed: Rgb,
    tolerance: f32,
    order: &[Step; 4],
) -> Vec<bool> {
    let (w, h) = pixels.dimensions();
    let wu = w as usize;
    let flat = pixels.as_raw();
    let mut mask = vec![false; wu * h as usize];

    let matches = |idx: usize| {
        let o = idx * 4;
        pixel_matches(
            &image::Rgba([flat[o], flat[o + 1], flat[o + 2], flat[o + 3]]),
            seed,
            tolerance,
        )
    };

    let seed_idx = seed_y as usize * wu + seed_x as usize;
    if !matches(seed_idx) {
        return mask;
    }

    let mut stack: Vec<usize> = Vec::with_capacity(4096);
    mask[seed_idx] = true;
    stack.push(seed_idx);

    while let Some(idx) = stack.pop() {
        let x = (idx % wu) as u32;
        let y = (idx / wu) as u32;
        for step in order {
            let next = match step {
                Step::Left if x > 0 => idx - 1,
                Step::Right if x + 1 < w => idx + 1,
                Step::Up if y > 0 => idx - wu,
                Step::Down if y + 1 < h => idx + wu,
                _ => continue,
            };
            if !mask[next] && matches(next) {
                mask[next] = true;
                stack.push(next);
            }
        }
    }
    mask
}

#[inline]
fn recolor(px: &mut [u8], fill: Rgb) -> bool {
    let changed = px[0] != fill.r || px[1] != fill.g || px[2] != fill.b;
    px[0] = fill.r;
    px[1] = fill.g;
    px[2] = fill.b;
    changed
}

fn apply_mask(pixels: &mut RgbaImage, mask: &[bool], fill: Rgb) -> usize {
    let mut changed = 0;
    for (px, hit) in pixels.chunks_exact_mut(4).zip(mask) {
        if *hit && recolor(px, fill) {
            changed += 1;
        }
    }
    changed
}

fn fill_all(pixels: &mut RgbaImage, seed: Rgb, fill: Rgb, tolerance: f32) -> usize {
    let row_bytes = pixels.width() as usize * 4;
    pixels
        .par_chunks_mut(row_bytes)
        .map(|row| {
            let mut changed = 0usize;
            for px in row.chunks_exact_mut(4) {
                let matched = pixel_matches(&image::Rgba([px[0], px[1], px[2], px[3]]), seed, tolerance);
                if matched && recolor(px, fill) {
                    changed += 1;
                }
            }
            changed
        })
        .sum()
}
