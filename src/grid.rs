//! Lens grid parameters and their interchangeable representations.
//!
//! A grid is stored as lens pitch along each grid axis (`size`), the shift of
//! the reference lens from the frame center (`offset`) and the grid rotation
//! (`tau`). The same grid can be written as a steps triple (reference point
//! plus the two basis vectors) or as a flat 5-vector for the optimizer.

use crate::config::SearchParams;
use crate::geometry::{rotate, GridIndex, Xy};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

const TAU_PERIOD: f64 = PI / 8.0;
const TAU_HALF_PERIOD: f64 = PI / 16.0;
const PERTURB_SIZE: f64 = 0.1;
const PERTURB_TAU: f64 = PI / 32.0;

/// Accepted range of lens pitch, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for SizeBounds {
    fn default() -> Self {
        Self {
            min: 12.0,
            max: 30.0,
        }
    }
}

impl From<&SearchParams> for SizeBounds {
    fn from(params: &SearchParams) -> Self {
        Self {
            min: params.min_lens_size,
            max: params.max_lens_size,
        }
    }
}

impl SizeBounds {
    fn draw(&self, rng: &mut fastrand::Rng) -> f64 {
        self.min + rng.f64() * (self.max - self.min)
    }
}

/// Reference lens position and the two grid basis vectors, all in image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSteps {
    pub reference_point: Xy,
    pub horizontal: Xy,
    pub vertical: Xy,
}

/// Final detection output.
pub type GridResult = GridSteps;

impl GridSteps {
    /// Image position of the lens at the given lattice index.
    pub fn lens_at(&self, gc: GridIndex) -> Xy {
        self.reference_point + self.horizontal * gc.col as f64 + self.vertical * gc.row as f64
    }

    /// Component-wise `self * weight + prior * (1 - weight)`.
    pub fn blend(&self, prior: &GridSteps, weight: f64) -> GridSteps {
        let mix = |new: Xy, old: Xy| new * weight + old * (1.0 - weight);
        GridSteps {
            reference_point: mix(self.reference_point, prior.reference_point),
            horizontal: mix(self.horizontal, prior.horizontal),
            vertical: mix(self.vertical, prior.vertical),
        }
    }

    pub fn to_record(&self) -> RectificationRecord {
        RectificationRecord {
            x_offset: self.reference_point.x,
            y_offset: self.reference_point.y,
            right_dx: self.horizontal.x,
            right_dy: self.horizontal.y,
            down_dx: self.vertical.x,
            down_dy: self.vertical.y,
        }
    }
}

/// Persisted six-number form of a detected grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectificationRecord {
    pub x_offset: f64,
    pub y_offset: f64,
    pub right_dx: f64,
    pub right_dy: f64,
    pub down_dx: f64,
    pub down_dy: f64,
}

impl RectificationRecord {
    fn to_array(self) -> [f64; 6] {
        [
            self.x_offset,
            self.y_offset,
            self.right_dx,
            self.right_dy,
            self.down_dx,
            self.down_dy,
        ]
    }

    /// Element-wise mean of several records, `None` for an empty slice.
    pub fn mean(records: &[RectificationRecord]) -> Option<RectificationRecord> {
        if records.is_empty() {
            return None;
        }
        let mut sum = [0.0; 6];
        for r in records {
            for (acc, v) in sum.iter_mut().zip(r.to_array()) {
                *acc += v;
            }
        }
        let n = records.len() as f64;
        let [x_offset, y_offset, right_dx, right_dy, down_dx, down_dy] = sum.map(|v| v / n);
        Some(RectificationRecord {
            x_offset,
            y_offset,
            right_dx,
            right_dy,
            down_dx,
            down_dy,
        })
    }
}

impl From<RectificationRecord> for GridSteps {
    fn from(r: RectificationRecord) -> Self {
        GridSteps {
            reference_point: Xy::new(r.x_offset, r.y_offset),
            horizontal: Xy::new(r.right_dx, r.right_dy),
            vertical: Xy::new(r.down_dx, r.down_dy),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    frame_size: Xy,
    size: Xy,
    offset: Xy,
    tau: f64,
    bounds: SizeBounds,
}

impl GridParams {
    /// Builds normalized parameters. Values already in range are kept as given.
    pub fn new(
        frame_size: Xy,
        size: Xy,
        offset: Xy,
        tau: f64,
        bounds: SizeBounds,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let mut params = Self {
            frame_size,
            size,
            offset,
            tau,
            bounds,
        };
        params.normalize(rng);
        params
    }

    pub fn randomize(frame_size: Xy, bounds: SizeBounds, rng: &mut fastrand::Rng) -> Self {
        let s0 = bounds.draw(rng);
        let s1 = s0 * (0.8 + rng.f64() * 0.4);
        let size = Xy::new(s0, s1);
        let offset = Xy::new(rng.f64() * s0 - s0 / 2.0, rng.f64() * s1 - s1 / 2.0);
        let tau = rng.f64() * TAU_PERIOD;
        Self::new(frame_size, size, offset, tau, bounds, rng)
    }

    /// Random neighbor: pitch within 10%, reference lens within half a pitch,
    /// rotation within pi/32.
    pub fn perturbed(&self, rng: &mut fastrand::Rng) -> Self {
        let mut spread = || 2.0 * rng.f64() - 1.0;
        let size = Xy::new(
            self.size.x * (1.0 + PERTURB_SIZE * spread()),
            self.size.y * (1.0 + PERTURB_SIZE * spread()),
        );
        let offset = self.offset + Xy::new(self.size.x * spread(), self.size.y * spread()) / 2.0;
        let tau = self.tau + PERTURB_TAU * spread();
        Self::new(self.frame_size, size, offset, tau, self.bounds, rng)
    }

    pub fn frame_size(&self) -> Xy {
        self.frame_size
    }

    pub fn size(&self) -> Xy {
        self.size
    }

    pub fn offset(&self) -> Xy {
        self.offset
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn bounds(&self) -> SizeBounds {
        self.bounds
    }

    fn center(&self) -> Xy {
        self.frame_size / 2.0
    }

    /// Brings size, rotation and offset back into their canonical ranges.
    ///
    /// A size above the maximum is redrawn at random instead of clamped, so
    /// that an optimizer population does not pile up at the upper bound.
    pub fn normalize(&mut self, rng: &mut fastrand::Rng) {
        self.size = self.size.abs();

        if self.size.x > self.bounds.max {
            self.size.x = self.bounds.draw(rng);
        } else if self.size.x < self.bounds.min {
            self.size.x = self.bounds.min;
        }
        if self.size.y > self.bounds.max {
            let redrawn = self.size.x * (0.8 + rng.f64() * 0.4);
            self.size.y = redrawn.clamp(self.bounds.min, self.bounds.max);
        } else if self.size.y < self.bounds.min {
            self.size.y = self.bounds.min;
        }

        if !(-TAU_HALF_PERIOD..TAU_HALF_PERIOD).contains(&self.tau) {
            self.tau = (self.tau + TAU_HALF_PERIOD).rem_euclid(TAU_PERIOD) - TAU_HALF_PERIOD;
        }

        self.normalize_offset();
    }

    /// Moves the reference lens to the lattice cell around the frame center.
    /// The grid itself is unchanged: the offset moves by whole grid steps.
    fn normalize_offset(&mut self) {
        let straight = rotate(self.offset, -self.tau);
        let kx = ((straight.x + self.size.x / 2.0) / self.size.x).floor();
        let ky = ((straight.y + self.size.y / 2.0) / self.size.y).floor();
        if kx != 0.0 || ky != 0.0 {
            let wrapped = Xy::new(straight.x - kx * self.size.x, straight.y - ky * self.size.y);
            self.offset = rotate(wrapped, self.tau);
        }
    }

    pub fn to_steps(&self) -> GridSteps {
        GridSteps {
            reference_point: self.center() + self.offset,
            horizontal: rotate(Xy::new(self.size.x, 0.0), self.tau),
            vertical: rotate(Xy::new(0.0, self.size.y), self.tau),
        }
    }

    pub fn from_steps(
        frame_size: Xy,
        steps: &GridSteps,
        bounds: SizeBounds,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let h = steps.horizontal;
        let v = steps.vertical;
        let tau_h = h.y.atan2(h.x);
        let tau_v = (-v.x).atan2(v.y);
        let size = Xy::new(h.x / tau_h.cos(), v.y / tau_v.cos());
        Self::new(
            frame_size,
            size,
            steps.reference_point - frame_size / 2.0,
            (tau_h + tau_v) / 2.0,
            bounds,
            rng,
        )
    }

    /// Flat optimizer vector `[size_x, aspect, offset_x, offset_y, tau]`.
    pub fn to_array(&self) -> [f64; 5] {
        [
            self.size.x,
            self.size.y / self.size.x,
            self.offset.x,
            self.offset.y,
            self.tau,
        ]
    }

    /// Copy of `self` carrying the values of a flat optimizer vector, normalized.
    pub fn from_array(&self, a: &[f64; 5], rng: &mut fastrand::Rng) -> Self {
        Self::new(
            self.frame_size,
            Xy::new(a[0], a[1] * a[0]),
            Xy::new(a[2], a[3]),
            a[4],
            self.bounds,
            rng,
        )
    }

    /// Image position of the lens at a lattice index.
    pub fn lens_xy(&self, gc: GridIndex) -> Xy {
        let straight = Xy::new(self.size.x * gc.col as f64, self.size.y * gc.row as f64);
        self.center() + self.offset + rotate(straight, self.tau)
    }

    /// Lattice index of the lens nearest to an image position.
    pub fn xy_to_grid(&self, xy: Xy) -> GridIndex {
        let straight = rotate(xy - self.center() - self.offset, -self.tau);
        GridIndex::new(
            (straight.y / self.size.y).round() as i64,
            (straight.x / self.size.x).round() as i64,
        )
    }

    /// Position of the reference lens.
    pub fn lens0(&self) -> Xy {
        self.center() + self.offset
    }

    /// Re-anchors the grid so the reference lens sits at `pos`.
    pub fn set_lens0(&mut self, pos: Xy) {
        self.offset = pos - self.center();
        self.normalize_offset();
    }

    /// Approximate lens count along each axis, rotation ignored.
    pub fn grid_size(&self) -> (usize, usize) {
        let cols = (self.frame_size.x / self.size.x).round().max(0.0) as usize;
        let rows = (self.frame_size.y / self.size.y).round().max(0.0) as usize;
        (cols, rows)
    }

    /// Combines independent detections: upper median of each size component
    /// and of the rotation, plus the offset closest to the frame center.
    pub fn median(candidates: &[GridParams]) -> Option<GridParams> {
        let first = candidates.first()?;
        let upper_median = |mut values: Vec<f64>| {
            values.sort_by(|a, b| a.total_cmp(b));
            values[values.len() / 2]
        };

        let size_x = upper_median(candidates.iter().map(|c| c.size.x).collect());
        let size_y = upper_median(candidates.iter().map(|c| c.size.y).collect());
        let tau = upper_median(candidates.iter().map(|c| c.tau).collect());
        let offset = candidates
            .iter()
            .map(|c| c.offset)
            .min_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))?;

        let mut median = GridParams {
            frame_size: first.frame_size,
            size: Xy::new(size_x, size_y),
            offset,
            tau,
            bounds: first.bounds,
        };
        median.normalize_offset();
        Some(median)
    }
}

impl fmt::Display for GridParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[size ({:.3}, {:.3}) offset ({:.3}, {:.3}) tau {:.3}deg]",
            self.size.x,
            self.size.y,
            self.offset.x,
            self.offset.y,
            self.tau.to_degrees()
        )
    }
}
