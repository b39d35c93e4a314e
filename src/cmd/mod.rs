pub mod detect;
pub mod optics;
