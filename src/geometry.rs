//! Coordinate types.
//!
//! Two conventions meet in this crate: pixel storage is row-major, while grid
//! math is done in image space (x = column, y = row). `RowCol` and `PixelPos`
//! carry storage order, `Xy` carries image space, and the conversions below
//! are the only places where one becomes the other.

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Image-space vector: `x` is the column axis, `y` the row axis.
pub type Xy = Vector2<f64>;

/// Rotates an image-space vector counterclockwise by `tau` radians.
#[inline]
pub fn rotate(v: Xy, tau: f64) -> Xy {
    Rotation2::new(tau) * v
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RowCol {
    pub row: f64,
    pub col: f64,
}

impl RowCol {
    pub fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }

    #[inline]
    pub fn to_xy(self) -> Xy {
        Xy::new(self.col, self.row)
    }

    #[inline]
    pub fn from_xy(xy: Xy) -> Self {
        Self {
            row: xy.y,
            col: xy.x,
        }
    }

    pub fn norm(self) -> f64 {
        self.row.hypot(self.col)
    }
}

impl Add for RowCol {
    type Output = RowCol;
    fn add(self, rhs: RowCol) -> RowCol {
        RowCol::new(self.row + rhs.row, self.col + rhs.col)
    }
}

impl Sub for RowCol {
    type Output = RowCol;
    fn sub(self, rhs: RowCol) -> RowCol {
        RowCol::new(self.row - rhs.row, self.col - rhs.col)
    }
}

impl Mul<f64> for RowCol {
    type Output = RowCol;
    fn mul(self, rhs: f64) -> RowCol {
        RowCol::new(self.row * rhs, self.col * rhs)
    }
}

/// Integer pixel address in storage order. May point outside a frame; callers
/// check with `Frame::contains` before reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelPos {
    pub row: i64,
    pub col: i64,
}

impl PixelPos {
    pub const fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }

    /// The pixel whose area contains the point.
    #[inline]
    pub fn containing(p: RowCol) -> Self {
        Self::new(p.row.floor() as i64, p.col.floor() as i64)
    }

    /// The pixel whose center is nearest to the image-space point.
    #[inline]
    pub fn nearest(xy: Xy) -> Self {
        Self::new(xy.y.round() as i64, xy.x.round() as i64)
    }

    #[inline]
    pub fn to_row_col(self) -> RowCol {
        RowCol::new(self.row as f64, self.col as f64)
    }

    #[inline]
    pub fn to_xy(self) -> Xy {
        self.to_row_col().to_xy()
    }
}

impl Add for PixelPos {
    type Output = PixelPos;
    fn add(self, rhs: PixelPos) -> PixelPos {
        PixelPos::new(self.row + rhs.row, self.col + rhs.col)
    }
}

impl Sub for PixelPos {
    type Output = PixelPos;
    fn sub(self, rhs: PixelPos) -> PixelPos {
        PixelPos::new(self.row - rhs.row, self.col - rhs.col)
    }
}

/// Lattice address of a lens: `col` counts horizontal grid steps from the
/// reference lens, `row` counts vertical ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridIndex {
    pub row: i64,
    pub col: i64,
}

impl GridIndex {
    pub const fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }
}
