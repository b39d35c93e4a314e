use crate::reports;
use clap::Args;
use lensgrid::config::Config;
use lensgrid::error::{RectifyError, RectifyResult};
use lensgrid::evolution::ProgressCallback;
use lensgrid::optics::{resolve_slope, OpticsRecipe};
use lensgrid::{DetectionOptions, Frame, GridDetector, GridParams, RectificationRecord, Strategy};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
    /// Raster images of the lens array (PNG, JPEG or TIFF). Several frames
    /// of the same array are detected one by one and their records averaged.
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Detect only a random share of the inputs, in percent
    #[arg(short = 'p', long)]
    pub percent: Option<f64>,

    #[arg(short = 's', long, default_value = "local")]
    pub strategy: Strategy,

    #[arg(short = 'S', long)]
    pub seed: Option<u64>,

    /// Write the detected grid as a JSON record
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Use this slope instead of deriving it from the optics flags
    #[arg(long)]
    pub max_slope: Option<f64>,

    #[command(flatten)]
    pub optics: OpticsRecipe,

    #[command(flatten)]
    pub config: Config,
}

struct LogProgress;

impl ProgressCallback for LogProgress {
    fn on_progress(&self, generation: usize, best_fitness: f64, best: &GridParams) -> bool {
        if generation % 10 == 0 {
            info!("   gen {:>3}: best {:.4} {}", generation, best_fitness, best);
        }
        true
    }
}

/// Picks `ceil(percent/100 * n)` inputs at random, at least one. Without a
/// percentage every input is kept in its given order.
fn select_inputs(
    mut inputs: Vec<PathBuf>,
    percent: Option<f64>,
    rng: &mut fastrand::Rng,
) -> RectifyResult<Vec<PathBuf>> {
    let Some(percent) = percent else {
        return Ok(inputs);
    };
    if !(percent > 0.0 && percent <= 100.0) {
        return Err(RectifyError::Config(format!(
            "percent must be in (0, 100], got {}",
            percent
        )));
    }
    let n = inputs.len();
    let keep = ((percent / 100.0 * n as f64).ceil() as usize).clamp(1, n.max(1));
    rng.shuffle(&mut inputs);
    inputs.truncate(keep);
    Ok(inputs)
}

pub fn run(args: DetectArgs, config: Config) -> RectifyResult<()> {
    if let Some(path) = &args.output {
        if path.exists() {
            return Err(RectifyError::Config(format!(
                "output file {} already exists",
                path.display()
            )));
        }
    }

    let slope = resolve_slope(args.max_slope, &args.optics)?;
    let mut rng = match args.seed {
        Some(s) => fastrand::Rng::with_seed(s),
        None => fastrand::Rng::new(),
    };
    let total = args.inputs.len();
    let inputs = select_inputs(args.inputs, args.percent, &mut rng)?;
    if inputs.len() < total {
        info!("🎲 Selected {} of {} frames", inputs.len(), total);
    }

    let detector = GridDetector::new(DetectionOptions::from(&config));
    let start = Instant::now();
    let mut records = Vec::with_capacity(inputs.len());
    for input in &inputs {
        info!("📂 Loading frame: {}", input.display());
        let frame = Frame::load(input)?;
        let report =
            detector.detect_with_callback(&frame, slope, args.strategy, args.seed, LogProgress)?;

        reports::print_detection(&report);
        let record = report.steps.to_record();
        reports::print_record_line(&record);
        records.push(record);
    }
    info!("🏁 Detection finished in {:.2}s", start.elapsed().as_secs_f64());

    let record = RectificationRecord::mean(&records)
        .ok_or_else(|| RectifyError::Config("no input frames".to_string()))?;
    if records.len() > 1 {
        reports::print_mean(records.len(), &record);
    }

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(path, json)?;
        info!("💾 Wrote {}", path.display());
    }
    Ok(())
}
