//! Detection pipeline: independent per-tile candidates are combined by their
//! median, then refined either locally (hill-climbing lenses in widening
//! rings) or globally (differential evolution).

use crate::config::Config;
use crate::error::{RectifyError, RectifyResult};
use crate::evolution::{DifferentialEvolution, EvolutionOptions, NoProgress, ProgressCallback};
use crate::fitness::measure_aggregate;
use crate::frame::Frame;
use crate::grid::{GridParams, GridResult, GridSteps, SizeBounds};
use crate::locator::{sample_candidate, Candidate};
use crate::optics::check_slope;
use crate::refine::{finetune_lens_position, refine_grid_by_directional_probe, Direction};
use crate::tiling::Tiling;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{debug, info, warn};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Median candidate refined by directional lens probes.
    #[default]
    Local,
    /// Median candidate used to seed differential evolution.
    GlobalDe,
}

#[derive(Debug, Clone)]
pub struct DetectionOptions {
    pub n_samples: usize,
    pub max_tile_attempts: usize,
    pub max_restarts: usize,
    pub tile_step: usize,
    pub size_bounds: SizeBounds,
    pub initial_probe_delta: i64,
    pub update_weight: f64,
    pub evolution: EvolutionOptions,
}

impl From<&Config> for DetectionOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            n_samples: cfg.search.n_samples,
            max_tile_attempts: cfg.search.max_tile_attempts,
            max_restarts: cfg.search.max_restarts,
            tile_step: cfg.search.tile_step(),
            size_bounds: SizeBounds::from(&cfg.search),
            initial_probe_delta: cfg.search.initial_probe_delta,
            update_weight: cfg.search.update_weight,
            evolution: EvolutionOptions::from(cfg),
        }
    }
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub steps: GridSteps,
    pub params: GridParams,
    pub strategy: Strategy,
    /// Full restarts caused by a failed center finetune.
    pub restarts: usize,
    pub candidates: usize,
    /// Aggregate fitness of the final grid.
    pub fitness: f64,
}

enum Stage {
    Sample,
    Median(Vec<Candidate>),
    FinetuneCenter(GridParams),
    RefineDirections {
        params: GridParams,
        delta: i64,
        active: Vec<Direction>,
    },
    Evolve(GridParams),
    Done(GridParams),
}

pub struct GridDetector {
    options: DetectionOptions,
}

impl GridDetector {
    pub fn new(options: DetectionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DetectionOptions {
        &self.options
    }

    pub fn detect(
        &self,
        frame: &Frame,
        max_slope: f64,
        strategy: Strategy,
        seed: Option<u64>,
    ) -> RectifyResult<DetectionReport> {
        self.detect_with_callback(frame, max_slope, strategy, seed, NoProgress)
    }

    /// Runs the full pipeline. `callback` receives per-generation updates of
    /// the global strategy and is not called by the local one.
    pub fn detect_with_callback<CB: ProgressCallback>(
        &self,
        frame: &Frame,
        max_slope: f64,
        strategy: Strategy,
        seed: Option<u64>,
        callback: CB,
    ) -> RectifyResult<DetectionReport> {
        let opts = &self.options;
        let max_slope = check_slope(max_slope)?;
        let mut rng = match seed {
            Some(s) => fastrand::Rng::with_seed(s),
            None => fastrand::Rng::new(),
        };
        let tiling = Tiling::build(frame, opts.tile_step)?;
        let frame_extent = frame.width().max(frame.height()) as f64;

        info!(
            "Detecting lens grid on {}x{} frame ({} strategy, slope {:.4})",
            frame.width(),
            frame.height(),
            strategy,
            max_slope
        );

        let mut callback = Some(callback);
        let mut restarts = 0;
        let mut candidates = 0;
        let mut stage = Stage::Sample;

        let params = loop {
            stage = match stage {
                Stage::Sample => {
                    let sampled = self.sample_candidates(&tiling, max_slope, &mut rng)?;
                    candidates = sampled.len();
                    Stage::Median(sampled)
                }
                Stage::Median(sampled) => {
                    let params: Vec<GridParams> = sampled.into_iter().map(|c| c.params).collect();
                    let median = GridParams::median(&params).ok_or_else(|| RectifyError::DetectionFailed {
                        attempts: 0,
                        reason: "no candidates to combine".to_string(),
                    })?;
                    info!("Median candidate: {}", median);
                    match strategy {
                        Strategy::Local => Stage::FinetuneCenter(median),
                        Strategy::GlobalDe => Stage::Evolve(median),
                    }
                }
                Stage::FinetuneCenter(mut params) => {
                    match finetune_lens_position(frame, max_slope, &params, params.lens0()) {
                        Ok(pos) => {
                            params.set_lens0(pos);
                            Stage::RefineDirections {
                                params,
                                delta: opts.initial_probe_delta,
                                active: Direction::iter().collect(),
                            }
                        }
                        Err(e) if e.is_retryable() => {
                            restarts += 1;
                            if restarts > opts.max_restarts {
                                return Err(RectifyError::DetectionFailed {
                                    attempts: restarts,
                                    reason: format!("reference lens finetune kept failing: {}", e),
                                });
                            }
                            warn!("Reference lens finetune failed ({}), restarting detection", e);
                            Stage::Sample
                        }
                        Err(e) => return Err(e),
                    }
                }
                Stage::RefineDirections {
                    params,
                    delta,
                    mut active,
                } => {
                    if active.is_empty() || delta as f64 * params.size().min() > frame_extent {
                        Stage::Done(params)
                    } else {
                        debug!("Refining at delta {} along {:?}: {}", delta, active, params);
                        let outcome = refine_grid_by_directional_probe(
                            frame,
                            max_slope,
                            &params,
                            delta,
                            &active,
                            opts.update_weight,
                            &mut rng,
                        )?;
                        active.retain(|d| !outcome.failed.contains(d));
                        Stage::RefineDirections {
                            params: outcome.params,
                            delta: delta * 2,
                            active,
                        }
                    }
                }
                Stage::Evolve(median) => {
                    let de = DifferentialEvolution::new(&tiling, max_slope, opts.evolution.clone());
                    let result = match callback.take() {
                        Some(cb) => de.run(Some(&median), &mut rng, cb),
                        None => de.run(Some(&median), &mut rng, NoProgress),
                    };
                    Stage::Done(result.params)
                }
                Stage::Done(params) => break params,
            };
        };

        let fitness = measure_aggregate(&tiling, max_slope, &params, &mut rng);
        let steps = params.to_steps();
        info!(
            "Final grid {} (fitness {:.4}, {} restarts)",
            params, fitness, restarts
        );

        Ok(DetectionReport {
            steps,
            params,
            strategy,
            restarts,
            candidates,
            fitness,
        })
    }

    /// Draws `n_samples` candidates in parallel. Every candidate gets its own
    /// generator seeded from `rng`, so results do not depend on scheduling.
    fn sample_candidates(
        &self,
        tiling: &Tiling<'_>,
        max_slope: f64,
        rng: &mut fastrand::Rng,
    ) -> RectifyResult<Vec<Candidate>> {
        let opts = &self.options;
        let seeds: Vec<u64> = (0..opts.n_samples).map(|_| rng.u64(..)).collect();
        seeds
            .par_iter()
            .map(|&s| {
                let mut local = fastrand::Rng::with_seed(s);
                sample_candidate(
                    tiling,
                    max_slope,
                    opts.size_bounds,
                    opts.max_tile_attempts,
                    &mut local,
                )
            })
            .collect()
    }
}

/// Detects the grid with default options.
pub fn detect_grid(
    frame: &Frame,
    max_slope: f64,
    strategy: Strategy,
    seed: Option<u64>,
) -> RectifyResult<GridResult> {
    GridDetector::new(DetectionOptions::default())
        .detect(frame, max_slope, strategy, seed)
        .map(|report| report.steps)
}
