//! Square tiling of a frame and the brightness-weighted tile sampler.

use crate::error::{RectifyError, RectifyResult};
use crate::frame::Frame;
use crate::geometry::{GridIndex, PixelPos, RowCol};
use crate::grid::GridParams;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIndex {
    pub row: usize,
    pub col: usize,
}

impl TileIndex {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Square pixel window `[top, top + side) x [left, left + side)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub top: usize,
    pub left: usize,
    pub side: usize,
}

impl TileBounds {
    pub fn origin(&self) -> PixelPos {
        PixelPos::new(self.top as i64, self.left as i64)
    }
}

pub struct Tiling<'a> {
    frame: &'a Frame,
    tile_step: usize,
    rows: usize,
    cols: usize,
    means: Vec<f64>,
    stds: Vec<f64>,
    weights: Vec<f64>,
    total_weight: f64,
}

impl<'a> Tiling<'a> {
    /// Crops the frame to whole tiles, gathers per-tile brightness statistics
    /// and builds the sampling distribution.
    pub fn build(frame: &'a Frame, tile_step: usize) -> RectifyResult<Self> {
        if tile_step == 0 {
            return Err(RectifyError::InvalidFrame("tile step must be positive".to_string()));
        }
        let rows = frame.height() / tile_step;
        let cols = frame.width() / tile_step;
        if rows == 0 || cols == 0 {
            return Err(RectifyError::InvalidFrame(format!(
                "{}x{} frame is smaller than one {}px tile",
                frame.width(),
                frame.height(),
                tile_step
            )));
        }

        let n = (tile_step * tile_step) as f64;
        let mut means = Vec::with_capacity(rows * cols);
        let mut stds = Vec::with_capacity(rows * cols);
        for tr in 0..rows {
            for tc in 0..cols {
                let mut sum = 0.0;
                let mut sum_sq = 0.0;
                for r in tr * tile_step..(tr + 1) * tile_step {
                    for c in tc * tile_step..(tc + 1) * tile_step {
                        let b = frame.brightness(r, c);
                        sum += b;
                        sum_sq += b * b;
                    }
                }
                let mean = sum / n;
                let var = (sum_sq / n - mean * mean).max(0.0);
                means.push(mean);
                stds.push(var.sqrt());
            }
        }

        let mut tiling = Self {
            frame,
            tile_step,
            rows,
            cols,
            means,
            stds,
            weights: Vec::new(),
            total_weight: 0.0,
        };
        tiling.scan_brightness();
        Ok(tiling)
    }

    /// Recomputes sampling weights: high-contrast tiles near the frame center
    /// are preferred, since lens shapes degrade toward the borders.
    pub fn scan_brightness(&mut self) {
        let center = RowCol::new(
            (self.rows * self.tile_step) as f64 / 2.0,
            (self.cols * self.tile_step) as f64 / 2.0,
        );
        let mut weights = Vec::with_capacity(self.rows * self.cols);
        for tr in 0..self.rows {
            for tc in 0..self.cols {
                let dist = (self.tile_center(TileIndex::new(tr, tc)) - center).norm().max(1.0);
                weights.push(self.stds[tr * self.cols + tc].powi(3) / dist.sqrt());
            }
        }
        self.total_weight = weights.iter().sum();
        self.weights = weights;
        debug!(
            "Scanned {}x{} tiles, total weight {:.3e}",
            self.rows, self.cols, self.total_weight
        );
    }

    pub fn frame(&self) -> &'a Frame {
        self.frame
    }

    pub fn tile_step(&self) -> usize {
        self.tile_step
    }

    /// Tile grid dimensions as `(rows, cols)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn mean(&self, tile: TileIndex) -> f64 {
        self.means[tile.row * self.cols + tile.col]
    }

    pub fn std(&self, tile: TileIndex) -> f64 {
        self.stds[tile.row * self.cols + tile.col]
    }

    pub fn weight(&self, tile: TileIndex) -> f64 {
        self.weights[tile.row * self.cols + tile.col]
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn sample_tile(&self, rng: &mut fastrand::Rng) -> TileIndex {
        let count = self.rows * self.cols;
        if self.total_weight <= 0.0 || !self.total_weight.is_finite() {
            return self.index_of(rng.usize(0..count));
        }

        let target = rng.f64() * self.total_weight;
        let mut current = 0.0;
        for (i, &w) in self.weights.iter().enumerate() {
            current += w;
            if current > target {
                return self.index_of(i);
            }
        }
        // Fallback for float rounding errors
        self.index_of(rng.usize(0..count))
    }

    /// Per-axis origin perturbation in `[-step/4, step/4)`.
    pub fn random_jitter(&self, rng: &mut fastrand::Rng) -> PixelPos {
        let quarter = (self.tile_step / 4) as i64;
        if quarter == 0 {
            return PixelPos::default();
        }
        PixelPos::new(rng.i64(-quarter..quarter), rng.i64(-quarter..quarter))
    }

    /// Pixel window of a tile moved by `jitter`, kept inside the cropped frame.
    pub fn tile_bounds(&self, tile: TileIndex, jitter: PixelPos) -> TileBounds {
        let max_top = ((self.rows - 1) * self.tile_step) as i64;
        let max_left = ((self.cols - 1) * self.tile_step) as i64;
        let top = (tile.row * self.tile_step) as i64 + jitter.row;
        let left = (tile.col * self.tile_step) as i64 + jitter.col;
        TileBounds {
            top: top.clamp(0, max_top) as usize,
            left: left.clamp(0, max_left) as usize,
            side: self.tile_step,
        }
    }

    /// Lattice index of the lens nearest to the tile's center.
    pub fn tile_center_to_grid(&self, tile: TileIndex, params: &GridParams) -> GridIndex {
        params.xy_to_grid(self.tile_center(tile).to_xy())
    }

    fn tile_center(&self, tile: TileIndex) -> RowCol {
        let half = self.tile_step as f64 / 2.0;
        RowCol::new(
            (tile.row * self.tile_step) as f64 + half,
            (tile.col * self.tile_step) as f64 + half,
        )
    }

    fn index_of(&self, flat: usize) -> TileIndex {
        TileIndex::new(flat / self.cols, flat % self.cols)
    }
}
