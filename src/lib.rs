pub mod config;
pub mod detector;
pub mod error;
pub mod evolution;
pub mod fitness;
pub mod frame;
pub mod geometry;
pub mod grid;
pub mod locator;
pub mod optics;
pub mod refine;
pub mod tiling;
// cmd and reports are binary modules (see main.rs).

pub use detector::{detect_grid, DetectionOptions, DetectionReport, GridDetector, Strategy};
pub use error::{RectifyError, RectifyResult};
pub use frame::Frame;
pub use grid::{GridParams, GridResult, GridSteps, RectificationRecord};
