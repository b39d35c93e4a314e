//! Binarized tile raster and the region-growing probes that run on it.

use crate::error::{RectifyError, RectifyResult};
use crate::frame::Frame;
use crate::geometry::{PixelPos, RowCol};
use crate::tiling::TileBounds;
use std::f64::consts::PI;

/// Shade of grid holes (inter-lens background) after thresholding.
pub const BACKGROUND: f32 = 0.0;
/// Shade of lens interiors after thresholding.
pub const FOREGROUND: f32 = 255.0;

const SHADES: usize = 256;
const MAX_PROBE: i64 = 100;
const MAX_CENTER_ITERATIONS: usize = 100;
const MAX_WALK_STEPS: usize = 10_000;

/// X-shaped probe directions in (row, col): up-left, up-right, down-right, down-left.
const X_SHAPE: [(f64, f64); 4] = [(-1.0, -1.0), (-1.0, 1.0), (1.0, 1.0), (1.0, -1.0)];

#[derive(Debug, Clone)]
pub struct TileImage {
    side: usize,
    pixels: Vec<f32>,
}

impl TileImage {
    /// Copies a tile out of the frame, rescaling brightness so the brightest
    /// pixel is 255.
    pub fn from_frame(frame: &Frame, bounds: &TileBounds) -> RectifyResult<Self> {
        let side = bounds.side;
        let mut pixels = Vec::with_capacity(side * side);
        for r in bounds.top..bounds.top + side {
            for c in bounds.left..bounds.left + side {
                pixels.push(frame.brightness(r, c) as f32);
            }
        }
        Self::from_pixels(side, pixels)
    }

    pub fn from_pixels(side: usize, mut pixels: Vec<f32>) -> RectifyResult<Self> {
        let max = pixels.iter().copied().fold(f32::MIN, f32::max);
        if !(max > 0.0) {
            return Err(RectifyError::DegenerateTile);
        }
        for p in pixels.iter_mut() {
            *p = *p * 255.0 / max;
        }
        Ok(Self { side, pixels })
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn pixel(&self, p: PixelPos) -> RectifyResult<f32> {
        let side = self.side as i64;
        if p.row < 0 || p.col < 0 || p.row >= side || p.col >= side {
            return Err(RectifyError::BoundaryExceeded {
                row: p.row,
                col: p.col,
            });
        }
        Ok(self.pixels[p.row as usize * self.side + p.col as usize])
    }

    /// Splits the tile into lens foreground (255) and background (0).
    pub fn threshold(&mut self, max_slope: f64) {
        let level = background_level(&self.pixels, max_slope);
        for p in self.pixels.iter_mut() {
            *p = if *p > level { FOREGROUND } else { BACKGROUND };
        }
    }

    /// Two passes of a 3x3 median filter to remove speckle.
    pub fn smooth(&mut self) {
        self.pixels = median3(&self.pixels, self.side);
        self.pixels = median3(&self.pixels, self.side);
    }

    /// Random walk from the tile center until a pixel of `color` is hit.
    pub fn find_any_region(&self, color: f32, rng: &mut fastrand::Rng) -> RectifyResult<PixelPos> {
        let half = (self.side / 2) as i64;
        let mut pos = PixelPos::new(half, half);
        for _ in 0..MAX_WALK_STEPS {
            if self.pixel(pos)? == color {
                return Ok(pos);
            }
            // Truncation toward zero gives steps in [-4, 4]
            pos.row += (rng.f64() * 10.0 - 5.0) as i64;
            pos.col += (rng.f64() * 10.0 - 5.0) as i64;
        }
        Err(RectifyError::DegenerateTile)
    }

    /// Steps along each X-shape diagonal until the color changes. A diagonal
    /// with no change within the probe limit reports 0.
    pub fn xdist(&self, pos: RowCol, color: f32) -> RectifyResult<[i64; 4]> {
        let mut dist = [0i64; 4];
        for (d, &(dr, dc)) in X_SHAPE.iter().enumerate() {
            for i in 0..MAX_PROBE {
                let step = i as f64;
                let probe = PixelPos::containing(RowCol::new(pos.row + dr * step, pos.col + dc * step));
                if self.pixel(probe)? != color {
                    dist[d] = i;
                    break;
                }
            }
        }
        Ok(dist)
    }

    /// Walks toward the point where all four diagonal distances to the
    /// region edge agree within one pixel.
    pub fn find_region_center(&self, color: f32, start: RowCol) -> RectifyResult<PixelPos> {
        let mut pos = start;
        let mut xdist = self.xdist(pos, color)?;

        let mut i = 0;
        while spread(&xdist) > 1 && i < MAX_CENTER_ITERATIONS {
            let step = spread(&xdist) as f64 / (1.5 + (i as f64).sqrt());
            let avg = xdist.iter().sum::<i64>() as f64 / 4.0;

            let mut dir = 0;
            let mut max_dev = f64::MIN;
            for (d, &v) in xdist.iter().enumerate() {
                let dev = (v as f64 - avg).abs();
                if dev > max_dev {
                    max_dev = dev;
                    dir = d;
                }
            }

            let (dr, dc) = X_SHAPE[dir];
            let sign = if (xdist[dir] as f64) < avg { -1.0 } else { 1.0 };
            pos = pos + RowCol::new(dr, dc) * (step * sign);

            xdist = self.xdist(pos, color)?;
            i += 1;
        }
        Ok(PixelPos::containing(pos))
    }

    /// Finds the center of the neighboring region in direction `dir`
    /// (components in {-1, 0, 1}).
    pub fn find_next_region_center(
        &self,
        color: f32,
        center: PixelPos,
        dir: PixelPos,
    ) -> RectifyResult<PixelPos> {
        if dir == PixelPos::default() {
            return Ok(center);
        }
        let xdist = self.xdist(center.to_row_col(), color)?;
        let avg = xdist.iter().sum::<i64>() as f64 / 4.0;
        let step = dir.to_row_col();

        let mut next = center.to_row_col() + step * (avg * 4.0);
        let mut steps = 0;
        while self.pixel(PixelPos::containing(next))? != color {
            if steps >= self.side * 2 {
                return Err(RectifyError::DegenerateTile);
            }
            next = next + step;
            steps += 1;
        }
        self.find_region_center(color, next)
    }

    /// Lens center from the four holes surrounding it.
    pub fn find_lens_from_holes(&self, holes: [PixelPos; 4]) -> RectifyResult<PixelPos> {
        let sum = holes.iter().fold(PixelPos::default(), |acc, &h| acc + h);
        let mean = RowCol::new((sum.row / 4) as f64, (sum.col / 4) as f64);
        self.find_region_center(FOREGROUND, mean)
    }
}

fn spread(xdist: &[i64; 4]) -> i64 {
    let max = xdist.iter().copied().max().unwrap_or(0);
    let min = xdist.iter().copied().min().unwrap_or(0);
    max - min
}

/// Shade separating background from lenses.
///
/// Each lens covers a disk of radius `max_slope * pitch` inside its square
/// cell, so roughly `(1 - 2 * max_slope) + (1 - pi / 4)` of the tile is
/// background. The level is the histogram bin boundary where the cumulative
/// mass crosses that fraction.
pub fn background_level(pixels: &[f32], max_slope: f64) -> f32 {
    let target = (1.0 - 2.0 * max_slope) + (1.0 - PI / 4.0);
    let max = pixels.iter().copied().fold(0.0f32, f32::max) as f64;
    if pixels.is_empty() || max <= 0.0 {
        return 0.5;
    }

    let width = max / SHADES as f64;
    let mut counts = [0usize; SHADES];
    for &p in pixels {
        let p = p as f64;
        if !(0.0..=max).contains(&p) {
            continue;
        }
        let bin = ((p / width) as usize).min(SHADES - 1);
        counts[bin] += 1;
    }
    let bound = |i: usize| (i as f64 * width) as f32;

    let total = pixels.len() as f64;
    let mut sum = 0.0;
    for (i, &count) in counts.iter().enumerate() {
        let next = sum + count as f64 / total;
        if next > target {
            if i > 0 && target - sum < next - target {
                return (bound(i - 1) + bound(i)) / 2.0;
            } else if i < SHADES - 1 {
                return (bound(i + 1) + bound(i)) / 2.0;
            } else {
                return bound(i - 1);
            }
        }
        sum = next;
    }
    0.5
}

/// 3x3 median filter; out-of-tile neighbors replicate the nearest edge pixel.
fn median3(pixels: &[f32], side: usize) -> Vec<f32> {
    let mut out = vec![0.0; pixels.len()];
    let last = side as i64 - 1;
    let mut window = [0.0f32; 9];
    for r in 0..side as i64 {
        for c in 0..side as i64 {
            let mut k = 0;
            for dr in -1..=1 {
                for dc in -1..=1 {
                    let rr = (r + dr).clamp(0, last) as usize;
                    let cc = (c + dc).clamp(0, last) as usize;
                    window[k] = pixels[rr * side + cc];
                    k += 1;
                }
            }
            window.sort_by(|a, b| a.total_cmp(b));
            out[r as usize * side + c as usize] = window[4];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_removes_isolated_pixel() {
        let side = 5;
        let mut pixels = vec![0.0; side * side];
        pixels[2 * side + 2] = 255.0;
        let out = median3(&pixels, side);
        assert!(out.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_median_keeps_thick_block() {
        let side = 6;
        let mut pixels = vec![0.0; side * side];
        for r in 0..3 {
            for c in 0..3 {
                pixels[r * side + c] = 255.0;
            }
        }
        let out = median3(&pixels, side);
        // Corner pixel sees replicated border values
        assert_eq!(out[0], 255.0);
        assert_eq!(out[side + 1], 255.0);
        assert_eq!(out[5 * side + 5], 0.0);
    }

    #[test]
    fn test_background_level_splits_two_shades() {
        // 30% dark, 70% bright; target fraction for slope 0.47 is ~0.275
        let mut pixels = vec![20.0f32; 30];
        pixels.extend(std::iter::repeat(255.0).take(70));
        let level = background_level(&pixels, 0.47);
        assert!(level > 20.0 && level < 255.0, "level {}", level);
    }

    #[test]
    fn test_background_level_empty_tile() {
        assert_eq!(background_level(&[], 0.47), 0.5);
        assert_eq!(background_level(&[0.0, 0.0], 0.47), 0.5);
    }

    #[test]
    fn test_degenerate_tile_rejected() {
        let err = TileImage::from_pixels(2, vec![0.0; 4]).unwrap_err();
        assert!(matches!(err, RectifyError::DegenerateTile));
    }
}
