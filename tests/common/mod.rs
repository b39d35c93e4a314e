#![allow(dead_code)]

use lensgrid::geometry::Xy;
use lensgrid::Frame;
use nalgebra::Matrix2;

/// Builder for synthetic lens array frames: bright disks on a dark
/// background, one disk per lattice point `reference + i * horizontal + j * vertical`.
pub struct LensGridBuilder {
    width: usize,
    height: usize,
    reference: Xy,
    horizontal: Xy,
    vertical: Xy,
    radius: f64,
    bright: f32,
    dark: f32,
    channels: usize,
}

impl Default for LensGridBuilder {
    fn default() -> Self {
        Self {
            width: 600,
            height: 600,
            reference: Xy::new(100.0, 100.0),
            horizontal: Xy::new(20.0, 0.0),
            vertical: Xy::new(0.0, 20.0),
            radius: 9.4,
            bright: 255.0,
            dark: 20.0,
            channels: 1,
        }
    }
}

impl LensGridBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn reference(mut self, x: f64, y: f64) -> Self {
        self.reference = Xy::new(x, y);
        self
    }

    pub fn steps(mut self, horizontal: Xy, vertical: Xy) -> Self {
        self.horizontal = horizontal;
        self.vertical = vertical;
        self
    }

    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn shades(mut self, bright: f32, dark: f32) -> Self {
        self.bright = bright;
        self.dark = dark;
        self
    }

    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn pixels(&self) -> Vec<f32> {
        let basis = Matrix2::from_columns(&[self.horizontal, self.vertical]);
        let inverse = basis.try_inverse().expect("grid vectors must be independent");

        let mut data = Vec::with_capacity(self.width * self.height * self.channels);
        for row in 0..self.height {
            for col in 0..self.width {
                let p = Xy::new(col as f64, row as f64);
                let g = inverse * (p - self.reference);
                let (gi, gj) = (g.x.round(), g.y.round());

                let mut lit = false;
                for di in -1..=1 {
                    for dj in -1..=1 {
                        let lens = self.reference
                            + self.horizontal * (gi + di as f64)
                            + self.vertical * (gj + dj as f64);
                        if (p - lens).norm() <= self.radius {
                            lit = true;
                        }
                    }
                }
                let value = if lit { self.bright } else { self.dark };
                for _ in 0..self.channels {
                    data.push(value / self.channels as f32);
                }
            }
        }
        data
    }

    pub fn build(&self) -> Frame {
        Frame::new(self.width, self.height, self.channels, self.pixels())
            .expect("synthetic frame dimensions are consistent")
    }
}

/// Uniform frame of the given brightness.
pub fn uniform_frame(width: usize, height: usize, value: f32) -> Frame {
    Frame::from_gray(width, height, vec![value; width * height]).expect("valid frame")
}

/// Single bright ellipse (semi-axes `rx`, `ry`, centered on `center`) on black.
pub fn ellipse_frame(width: usize, height: usize, center: Xy, rx: f64, ry: f64) -> Frame {
    let mut data = vec![0.0f32; width * height];
    for row in 0..height {
        for col in 0..width {
            let u = (col as f64 - center.x) / rx;
            let v = (row as f64 - center.y) / ry;
            if u * u + v * v <= 1.0 {
                data[row * width + col] = 255.0;
            }
        }
    }
    Frame::from_gray(width, height, data).expect("valid frame")
}

/// Square tile raster with a bright disk on black, for region probes.
pub fn disk_tile(side: usize, center: Xy, radius: f64) -> Vec<f32> {
    let mut data = vec![0.0f32; side * side];
    for row in 0..side {
        for col in 0..side {
            let d = (Xy::new(col as f64, row as f64) - center).norm();
            if d <= radius {
                data[row * side + col] = 255.0;
            }
        }
    }
    data
}

/// Distance from `p` to the nearest lattice point of the grid.
pub fn lattice_distance(p: Xy, reference: Xy, horizontal: Xy, vertical: Xy) -> f64 {
    let basis = Matrix2::from_columns(&[horizontal, vertical]);
    let inverse = basis.try_inverse().expect("grid vectors must be independent");
    let g = inverse * (p - reference);
    let nearest = reference + horizontal * g.x.round() + vertical * g.y.round();
    (p - nearest).norm()
}
