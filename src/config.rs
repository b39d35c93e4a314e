use crate::error::{RectifyError, RectifyResult};
use clap::{parser::ValueSource, ArgMatches, Args};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Args, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[command(flatten)]
    pub search: SearchParams,
    #[command(flatten)]
    pub evolution: EvolutionParams,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    // === SAMPLING ===
    #[arg(long, default_value_t = 16)]
    pub n_samples: usize,
    #[arg(long, default_value_t = 500)]
    pub max_tile_attempts: usize,
    #[arg(long, default_value_t = 8)]
    pub max_restarts: usize,

    // === LENS SIZE (pixels) ===
    #[arg(long, default_value_t = 12.0)]
    pub min_lens_size: f64,
    #[arg(long, default_value_t = 30.0)]
    pub max_lens_size: f64,
    // Tiles span this many of the largest lenses
    #[arg(long, default_value_t = 5)]
    pub tile_factor: usize,

    // === REFINEMENT ===
    #[arg(long, default_value_t = 2)]
    pub initial_probe_delta: i64,
    #[arg(long, default_value_t = 0.8)]
    pub update_weight: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            n_samples: 16,
            max_tile_attempts: 500,
            max_restarts: 8,
            min_lens_size: 12.0,
            max_lens_size: 30.0,
            tile_factor: 5,
            initial_probe_delta: 2,
            update_weight: 0.8,
        }
    }
}

impl SearchParams {
    /// Side of the square sampling tile in pixels.
    pub fn tile_step(&self) -> usize {
        (self.max_lens_size.round() as usize) * self.tile_factor
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionParams {
    #[arg(long, default_value_t = 20)]
    pub de_population: usize,
    #[arg(long, default_value_t = 50)]
    pub de_generations: usize,
    #[arg(long, default_value_t = 0.1)]
    pub de_crossover: f64,
    // Differential weight is drawn from [f_min, 2 * f_min)
    #[arg(long, default_value_t = 0.5)]
    pub de_f_min: f64,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        Self {
            de_population: 20,
            de_generations: 50,
            de_crossover: 0.1,
            de_f_min: 0.5,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> RectifyResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RectifyResult<()> {
        let s = &self.search;
        if !(s.min_lens_size > 0.0 && s.min_lens_size <= s.max_lens_size) {
            return Err(RectifyError::Config(format!(
                "lens size bounds [{}, {}] are not a valid range",
                s.min_lens_size, s.max_lens_size
            )));
        }
        if s.n_samples == 0 || s.tile_factor == 0 {
            return Err(RectifyError::Config(
                "n_samples and tile_factor must be positive".to_string(),
            ));
        }
        if s.initial_probe_delta < 1 {
            return Err(RectifyError::Config(
                "initial_probe_delta must be at least 1".to_string(),
            ));
        }
        // Mutation draws three partners distinct from the parent
        if self.evolution.de_population < 4 {
            return Err(RectifyError::Config(format!(
                "de_population must be at least 4 (got {})",
                self.evolution.de_population
            )));
        }
        Ok(())
    }

    /// Overwrites fields with values the user typed on the command line,
    /// leaving file-provided values in place for everything else.
    pub fn merge_from_cli(&mut self, cli: &Config, matches: &ArgMatches) {
        macro_rules! update_if_present {
            ($group:ident, $field:ident) => {
                if matches.value_source(stringify!($field)) == Some(ValueSource::CommandLine) {
                    self.$group.$field = cli.$group.$field.clone();
                }
            };
        }

        update_if_present!(search, n_samples);
        update_if_present!(search, max_tile_attempts);
        update_if_present!(search, max_restarts);
        update_if_present!(search, min_lens_size);
        update_if_present!(search, max_lens_size);
        update_if_present!(search, tile_factor);
        update_if_present!(search, initial_probe_delta);
        update_if_present!(search, update_weight);

        update_if_present!(evolution, de_population);
        update_if_present!(evolution, de_generations);
        update_if_present!(evolution, de_crossover);
        update_if_present!(evolution, de_f_min);
    }
}
