//! Pixel-domain score of a lens grid hypothesis.
//!
//! Around a lens center, the cell of one grid step is split into the ellipse
//! a lens of the given optics would light and the rest. A good hypothesis puts
//! bright pixels inside and dark ones outside, so the score is the ratio of
//! the two brightness sums.

use crate::frame::Frame;
use crate::geometry::{PixelPos, Xy};
use crate::grid::GridParams;
use crate::tiling::Tiling;
use nalgebra::Rotation2;

const EPS: f64 = f64::EPSILON;

/// Scores a single lens centered at `lens`. Cell pixels outside the frame
/// are ignored.
pub fn measure_one(frame: &Frame, max_slope: f64, params: &GridParams, lens: Xy) -> f64 {
    let size = params.size();
    let lens_size = size * max_slope;
    let rotation = Rotation2::new(params.tau());

    let x_range = (-size.x / 2.0).round() as i64..(size.x / 2.0).round() as i64;
    let y_range = (-size.y / 2.0).round() as i64..(size.y / 2.0).round() as i64;

    let mut inside = 0.0;
    let mut outside = 0.0;
    for x in x_range {
        for y in y_range.clone() {
            let in_lens = Xy::new(x as f64, y as f64);
            let Some(b) = frame.brightness_at(PixelPos::nearest(lens + rotation * in_lens)) else {
                continue;
            };
            let u = in_lens.x / lens_size.x;
            let v = in_lens.y / lens_size.y;
            if u * u + v * v <= 1.0 {
                inside += b;
            } else {
                outside += b;
            }
        }
    }
    (inside + EPS) / (outside + EPS)
}

/// Number of lenses scored by [`measure_aggregate`] for a grid.
pub fn aggregate_sample_count(params: &GridParams) -> usize {
    let (cols, rows) = params.grid_size();
    10 + ((cols * rows) as f64 / 400.0).round() as usize
}

/// Mean single-lens score over lenses picked through the tile sampler.
pub fn measure_aggregate(
    tiling: &Tiling<'_>,
    max_slope: f64,
    params: &GridParams,
    rng: &mut fastrand::Rng,
) -> f64 {
    let n = aggregate_sample_count(params);
    let frame = tiling.frame();
    let total: f64 = (0..n)
        .map(|_| {
            let tile = tiling.sample_tile(rng);
            let gc = tiling.tile_center_to_grid(tile, params);
            measure_one(frame, max_slope, params, params.lens_xy(gc))
        })
        .sum();
    total / n as f64
}
