//! Local refinement: hill-climbing single lens positions, and re-estimating
//! the grid vectors from lenses progressively farther from the reference.

use crate::error::{RectifyError, RectifyResult};
use crate::fitness::measure_one;
use crate::frame::Frame;
use crate::geometry::{GridIndex, PixelPos, RowCol, Xy};
use crate::grid::{GridParams, GridSteps};
use itertools::iproduct;
use rayon::prelude::*;
use strum_macros::{Display, EnumIter};
use tracing::debug;

const HALF_WINDOW: i64 = 2;
const WINDOW: usize = (2 * HALF_WINDOW + 1) as usize;

/// Moves a lens position one pixel step at a time toward the best local
/// score, using a 5x5 window of candidate shifts around the current position.
///
/// Scores of the previous window that overlap the shifted one are reused.
/// Fails with `BoundaryExceeded` once the position leaves the frame.
pub fn finetune_lens_position(
    frame: &Frame,
    max_slope: f64,
    params: &GridParams,
    start: Xy,
) -> RectifyResult<Xy> {
    let mut pos = start;
    let mut window = [[0.0f64; WINDOW]; WINDOW];
    let mut gradient: Option<PixelPos> = None;

    loop {
        let pixel = PixelPos::containing(RowCol::from_xy(pos));
        if !frame.contains(pixel) {
            return Err(RectifyError::BoundaryExceeded {
                row: pixel.row,
                col: pixel.col,
            });
        }

        let mut next = [[0.0f64; WINDOW]; WINDOW];
        for r in 0..WINDOW {
            for c in 0..WINDOW {
                let reused = gradient.and_then(|g| {
                    let pr = r as i64 + g.row;
                    let pc = c as i64 + g.col;
                    let in_window = (0..WINDOW as i64).contains(&pr) && (0..WINDOW as i64).contains(&pc);
                    in_window.then(|| window[pr as usize][pc as usize])
                });
                next[r][c] = reused.unwrap_or_else(|| {
                    let shift = Xy::new(c as f64, r as f64) - Xy::new(HALF_WINDOW as f64, HALF_WINDOW as f64);
                    measure_one(frame, max_slope, params, pos + shift)
                });
            }
        }
        window = next;

        // First maximum in row-major order wins ties
        let (best_r, best_c) = iproduct!(0..WINDOW, 0..WINDOW).fold((0, 0), |best, (r, c)| {
            if window[r][c] > window[best.0][best.1] {
                (r, c)
            } else {
                best
            }
        });
        let step = PixelPos::new(best_r as i64 - HALF_WINDOW, best_c as i64 - HALF_WINDOW);
        let center = HALF_WINDOW as usize;
        if step == PixelPos::default() || window[best_r][best_c] <= window[center][center] {
            break;
        }
        pos += step.to_xy();
        gradient = Some(step);
    }
    Ok(pos)
}

/// Probe direction on the lens lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Right,
    Left,
    Down,
    Up,
}

impl Direction {
    /// Lattice offset of the lens `delta` steps away in this direction.
    pub fn offset(self, delta: i64) -> GridIndex {
        match self {
            Direction::Right => GridIndex::new(0, delta),
            Direction::Left => GridIndex::new(0, -delta),
            Direction::Down => GridIndex::new(delta, 0),
            Direction::Up => GridIndex::new(-delta, 0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub params: GridParams,
    /// Directions whose probe ran off the frame.
    pub failed: Vec<Direction>,
}

/// Re-estimates the grid vectors (and the reference lens) from lenses
/// `delta` steps away along each active direction.
///
/// Each probe starts where the current grid predicts the lens and is
/// hill-climbed onto the real one. Opposite probes on an axis give a central
/// difference; a lone probe is compared against the reference lens. The new
/// steps are blended into the old ones with weight
/// `min(1, update_weight * sqrt(2 / delta))`, so far probes, which carry more
/// leverage but more risk, move the grid less per step.
pub fn refine_grid_by_directional_probe(
    frame: &Frame,
    max_slope: f64,
    params: &GridParams,
    delta: i64,
    directions: &[Direction],
    update_weight: f64,
    rng: &mut fastrand::Rng,
) -> RectifyResult<ProbeOutcome> {
    let probes: Vec<(Direction, RectifyResult<Xy>)> = directions
        .par_iter()
        .map(|&dir| {
            let before = params.lens_xy(dir.offset(delta));
            (dir, finetune_lens_position(frame, max_slope, params, before))
        })
        .collect();

    let mut failed = Vec::new();
    let mut found = [None; 4];
    for (dir, result) in probes {
        match result {
            Ok(after) => found[dir as usize] = Some(after),
            Err(e) if e.is_retryable() => {
                debug!("Probe {} at delta {} failed: {}", dir, delta, e);
                failed.push(dir);
            }
            Err(e) => return Err(e),
        }
    }

    let prior = params.to_steps();
    let d = delta as f64;
    let mut reference_estimates = Vec::new();

    let mut axis = |plus: Option<Xy>, minus: Option<Xy>, old: Xy| match (plus, minus) {
        (Some(p), Some(m)) => {
            let step = (p - m) / (2.0 * d);
            reference_estimates.push(m + step * d);
            step
        }
        (Some(p), None) => (p - prior.reference_point) / d,
        (None, Some(m)) => (prior.reference_point - m) / d,
        (None, None) => old,
    };
    let horizontal = axis(
        found[Direction::Right as usize],
        found[Direction::Left as usize],
        prior.horizontal,
    );
    let vertical = axis(
        found[Direction::Down as usize],
        found[Direction::Up as usize],
        prior.vertical,
    );

    let reference_point = if reference_estimates.is_empty() {
        prior.reference_point
    } else {
        reference_estimates.iter().sum::<Xy>() / reference_estimates.len() as f64
    };

    let proposed = GridSteps {
        reference_point,
        horizontal,
        vertical,
    };
    let weight = (update_weight * (2.0 / d).sqrt()).min(1.0);
    let blended = proposed.blend(&prior, weight);

    Ok(ProbeOutcome {
        params: GridParams::from_steps(params.frame_size(), &blended, params.bounds(), rng),
        failed,
    })
}
