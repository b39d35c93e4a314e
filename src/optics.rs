//! Microscope optics and the lenslet slope constant derived from them.
//!
//! The detector only needs one number from the optical setup: the maximum
//! normalized slope of rays leaving a lenslet, which bounds how much of each
//! lens cell is lit. It is derived from the objective's numerical aperture,
//! its magnification, and the lenslet pitch and focal length.

use crate::error::{RectifyError, RectifyResult};
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Slope used when the recipe is inconsistent or nothing is known about the
/// optics (40x / 0.95 objective on a 125 um pitch, 2500 um focal length array).
pub const DEFAULT_MAX_NORMALIZED_SLOPE: f64 = 0.4667937556007068;

#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticsRecipe {
    /// Lenslet pitch in micrometers
    #[arg(long, default_value_t = 125.0)]
    pub pitch: f64,
    /// Lenslet focal length in micrometers
    #[arg(long, default_value_t = 2500.0)]
    pub flen: f64,
    /// Objective magnification
    #[arg(long, default_value_t = 40.0)]
    pub mag: f64,
    /// Objective numerical aperture
    #[arg(long, default_value_t = 0.95)]
    pub na: f64,
    /// Refractive index of the immersion medium
    #[arg(long, default_value_t = 1.0)]
    pub medium: f64,
    /// Objective obeys the Abbe sine condition
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub abbe: bool,
}

impl Default for OpticsRecipe {
    fn default() -> Self {
        Self {
            pitch: 125.0,
            flen: 2500.0,
            mag: 40.0,
            na: 0.95,
            medium: 1.0,
            abbe: true,
        }
    }
}

impl OpticsRecipe {
    /// Numerical aperture on the image side of the objective.
    pub fn image_na(&self) -> f64 {
        self.na / self.mag
    }

    /// Slope of the steepest ray leaving a lenslet, in units of the lenslet
    /// pitch over its focal length. Fails unless the image-side NA lies in
    /// (0, 1) and both lenslet dimensions are positive.
    pub fn max_normalized_slope(&self) -> RectifyResult<f64> {
        let image_na = self.image_na();
        if !(image_na > 0.0 && image_na < 1.0) {
            return Err(RectifyError::InconsistentOptics {
                reason: format!("image-side NA {} is not in (0, 1)", image_na),
            });
        }
        if !(self.pitch > 0.0 && self.flen > 0.0) {
            return Err(RectifyError::InconsistentOptics {
                reason: format!(
                    "lenslet pitch {} and focal length {} must be positive",
                    self.pitch, self.flen
                ),
            });
        }
        let ray_slope = image_na / (1.0 - image_na * image_na).sqrt();
        check_slope(ray_slope / (self.pitch / self.flen))
    }
}

/// Accepts only finite, positive slopes.
pub fn check_slope(slope: f64) -> RectifyResult<f64> {
    if slope.is_finite() && slope > 0.0 {
        Ok(slope)
    } else {
        Err(RectifyError::InconsistentOptics {
            reason: format!("slope {} is not a positive number", slope),
        })
    }
}

/// Picks the slope for a detection run: an explicit value wins but must be
/// positive, otherwise the recipe is evaluated and an inconsistent recipe
/// falls back to [`DEFAULT_MAX_NORMALIZED_SLOPE`].
pub fn resolve_slope(explicit: Option<f64>, recipe: &OpticsRecipe) -> RectifyResult<f64> {
    if let Some(slope) = explicit {
        return check_slope(slope);
    }
    match recipe.max_normalized_slope() {
        Ok(slope) => Ok(slope),
        Err(e) => {
            warn!(
                "{}. Falling back to default slope {}",
                e, DEFAULT_MAX_NORMALIZED_SLOPE
            );
            Ok(DEFAULT_MAX_NORMALIZED_SLOPE)
        }
    }
}
