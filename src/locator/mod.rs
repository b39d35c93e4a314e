//! Per-tile lens grid detection.
//!
//! A tile is binarized into lens interiors and the dark holes between them.
//! One hole is found by a random walk, its eight neighbors by stepping along
//! the hole spacing, and the four lenses enclosed by the 3x3 hole matrix give
//! one estimate of the reference lens and both grid vectors.

pub mod tile_image;

use crate::error::{RectifyError, RectifyResult};
use crate::frame::Frame;
use crate::geometry::{PixelPos, RowCol, Xy};
use crate::grid::{GridParams, GridSteps, SizeBounds};
use crate::tiling::{TileBounds, Tiling};
use tile_image::{TileImage, BACKGROUND};
use tracing::debug;

pub use tile_image::background_level;

/// One independent grid estimate and the tile it came from.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub bounds: TileBounds,
    pub params: GridParams,
}

/// Runs the hole/lens detection on one tile window.
pub fn locate_candidate(
    frame: &Frame,
    bounds: &TileBounds,
    max_slope: f64,
    size_bounds: SizeBounds,
    rng: &mut fastrand::Rng,
) -> RectifyResult<GridParams> {
    let mut tile = TileImage::from_frame(frame, bounds)?;
    tile.threshold(max_slope);
    tile.smooth();

    let seed = tile.find_any_region(BACKGROUND, rng)?;
    let hole = tile.find_region_center(BACKGROUND, seed.to_row_col())?;

    let mut holes = [[PixelPos::default(); 3]; 3];
    for (y, row) in holes.iter_mut().enumerate() {
        for (x, cell) in row.iter_mut().enumerate() {
            let dir = PixelPos::new(y as i64 - 1, x as i64 - 1);
            *cell = tile.find_next_region_center(BACKGROUND, hole, dir)?;
        }
    }

    let mut lenses = [[PixelPos::default(); 2]; 2];
    for (y, row) in lenses.iter_mut().enumerate() {
        for (x, cell) in row.iter_mut().enumerate() {
            *cell = tile.find_lens_from_holes([
                holes[y][x],
                holes[y][x + 1],
                holes[y + 1][x],
                holes[y + 1][x + 1],
            ])?;
        }
    }

    let diff = |a: PixelPos, b: PixelPos| (a - b).to_row_col();
    let horizontal = (diff(lenses[0][1], lenses[0][0]) + diff(lenses[1][1], lenses[1][0])) * 0.5;
    let vertical = (diff(lenses[1][0], lenses[0][0]) + diff(lenses[1][1], lenses[0][1])) * 0.5;
    let steps = GridSteps {
        reference_point: (lenses[0][0] + bounds.origin()).to_xy(),
        horizontal: horizontal.to_xy(),
        vertical: vertical.to_xy(),
    };
    debug!(
        "Tile at ({}, {}): lens0 {:?} h {:?} v {:?}",
        bounds.top,
        bounds.left,
        RowCol::from_xy(steps.reference_point),
        steps.horizontal,
        steps.vertical
    );

    let frame_size = Xy::new(frame.width() as f64, frame.height() as f64);
    Ok(GridParams::from_steps(frame_size, &steps, size_bounds, rng))
}

/// Draws tiles until one yields a candidate. Tiles that run the probes off
/// their edge (or carry no signal) are skipped.
pub fn sample_candidate(
    tiling: &Tiling<'_>,
    max_slope: f64,
    size_bounds: SizeBounds,
    max_attempts: usize,
    rng: &mut fastrand::Rng,
) -> RectifyResult<Candidate> {
    for attempt in 1..=max_attempts {
        let tile = tiling.sample_tile(rng);
        let jitter = tiling.random_jitter(rng);
        let bounds = tiling.tile_bounds(tile, jitter);

        match locate_candidate(tiling.frame(), &bounds, max_slope, size_bounds, rng) {
            Ok(params) => return Ok(Candidate { bounds, params }),
            Err(e) if e.is_retryable() => {
                debug!("Bad region on attempt {} ({}), retrying", attempt, e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(RectifyError::DetectionFailed {
        attempts: max_attempts,
        reason: "no sampled tile yielded a lens grid".to_string(),
    })
}
