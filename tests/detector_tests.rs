mod common;

use common::{lattice_distance, uniform_frame, LensGridBuilder};
use lensgrid::evolution::{DifferentialEvolution, EvolutionOptions, NoProgress, ProgressCallback};
use lensgrid::geometry::Xy;
use lensgrid::grid::{GridParams, GridSteps, SizeBounds};
use lensgrid::tiling::Tiling;
use lensgrid::{detect_grid, DetectionOptions, GridDetector, RectifyError, Strategy};
use rstest::rstest;
use std::str::FromStr;
use std::sync::Mutex;

const SLOPE: f64 = 0.47;

fn assert_matches_lattice(steps: &GridSteps, reference: Xy, h: Xy, v: Xy, tol_vec: f64, tol_ref: f64) {
    assert!(
        (steps.horizontal - h).norm() < tol_vec,
        "horizontal {:?} vs {:?}",
        steps.horizontal,
        h
    );
    assert!(
        (steps.vertical - v).norm() < tol_vec,
        "vertical {:?} vs {:?}",
        steps.vertical,
        v
    );
    let d = lattice_distance(steps.reference_point, reference, h, v);
    assert!(d < tol_ref, "reference {:?} is {} px off the lattice", steps.reference_point, d);
}

// --- LOCAL STRATEGY ---

#[rstest]
#[case(1)]
#[case(42)]
#[case(2024)]
fn test_local_recovers_square_grid(#[case] seed: u64) {
    let frame = LensGridBuilder::new().build();
    let steps = detect_grid(&frame, SLOPE, Strategy::Local, Some(seed)).unwrap();
    assert_matches_lattice(
        &steps,
        Xy::new(100.0, 100.0),
        Xy::new(20.0, 0.0),
        Xy::new(0.0, 20.0),
        1.0,
        2.0,
    );
}

#[test]
fn test_local_recovers_rotated_grid() {
    let tau: f64 = 0.05;
    let h = Xy::new(22.0 * tau.cos(), 22.0 * tau.sin());
    let v = Xy::new(-22.0 * tau.sin(), 22.0 * tau.cos());
    let frame = LensGridBuilder::new()
        .size(700, 600)
        .reference(351.0, 297.0)
        .steps(h, v)
        .radius(22.0 * SLOPE)
        .build();

    let report = GridDetector::new(DetectionOptions::default())
        .detect(&frame, SLOPE, Strategy::Local, Some(8))
        .unwrap();
    assert_matches_lattice(&report.steps, Xy::new(351.0, 297.0), h, v, 1.0, 2.0);
    assert_eq!(report.candidates, 16);
    assert_eq!(report.strategy, Strategy::Local);
    assert!(report.fitness > 1.0);
}

#[test]
fn test_color_frame_matches_gray() {
    let frame = LensGridBuilder::new().channels(3).build();
    assert_eq!(frame.channels(), 3);
    let steps = detect_grid(&frame, SLOPE, Strategy::Local, Some(5)).unwrap();
    assert_matches_lattice(
        &steps,
        Xy::new(100.0, 100.0),
        Xy::new(20.0, 0.0),
        Xy::new(0.0, 20.0),
        1.0,
        2.0,
    );
}

#[test]
fn test_same_seed_same_result() {
    let frame = LensGridBuilder::new().build();
    let a = detect_grid(&frame, SLOPE, Strategy::Local, Some(99)).unwrap();
    let b = detect_grid(&frame, SLOPE, Strategy::Local, Some(99)).unwrap();
    assert_eq!(a, b);
}

// --- GLOBAL STRATEGY ---

#[rstest]
#[case(17)]
#[case(4)]
fn test_global_de_stays_near_truth(#[case] seed: u64) {
    let frame = LensGridBuilder::new().build();
    let steps = detect_grid(&frame, SLOPE, Strategy::GlobalDe, Some(seed)).unwrap();
    assert_matches_lattice(
        &steps,
        Xy::new(100.0, 100.0),
        Xy::new(20.0, 0.0),
        Xy::new(0.0, 20.0),
        1.0,
        2.0,
    );
}

#[test]
fn test_evolution_keeps_true_seed() {
    let frame = LensGridBuilder::new().build();
    let tiling = Tiling::build(&frame, 150).unwrap();
    let mut rng = fastrand::Rng::with_seed(12);
    // Lens centers sit on multiples of 20, the frame center included
    let truth = GridParams::new(
        Xy::new(600.0, 600.0),
        Xy::new(20.0, 20.0),
        Xy::zeros(),
        0.0,
        SizeBounds::default(),
        &mut rng,
    );
    let options = EvolutionOptions {
        generations: 10,
        ..EvolutionOptions::default()
    };
    let result = DifferentialEvolution::new(&tiling, SLOPE, options).run(Some(&truth), &mut rng, NoProgress);
    assert_matches_lattice(
        &result.params.to_steps(),
        Xy::new(100.0, 100.0),
        Xy::new(20.0, 0.0),
        Xy::new(0.0, 20.0),
        0.5,
        1.0,
    );
}

#[test]
fn test_zero_generations_return_seed() {
    let frame = LensGridBuilder::new().build();
    let tiling = Tiling::build(&frame, 150).unwrap();
    let mut rng = fastrand::Rng::with_seed(13);
    let seed = GridParams::new(
        Xy::new(600.0, 600.0),
        Xy::new(19.5, 20.0),
        Xy::new(1.0, -1.0),
        0.01,
        SizeBounds::default(),
        &mut rng,
    );
    // No generations: the result is the seed itself
    let options = EvolutionOptions {
        generations: 0,
        ..EvolutionOptions::default()
    };
    let result = DifferentialEvolution::new(&tiling, SLOPE, options).run(Some(&seed), &mut rng, NoProgress);
    assert_eq!(result.params, seed);
    assert_eq!(result.generations_run, 0);
}

struct StopAfterFirst;

impl ProgressCallback for StopAfterFirst {
    fn on_progress(&self, _generation: usize, _best_fitness: f64, _best: &GridParams) -> bool {
        false
    }
}

struct Recorder(Mutex<Vec<f64>>);

impl ProgressCallback for Recorder {
    fn on_progress(&self, _generation: usize, best_fitness: f64, _best: &GridParams) -> bool {
        self.0.lock().unwrap().push(best_fitness);
        true
    }
}

fn small_evolution() -> EvolutionOptions {
    EvolutionOptions {
        population: 6,
        generations: 4,
        ..EvolutionOptions::default()
    }
}

#[test]
fn test_callback_can_stop_evolution() {
    let frame = LensGridBuilder::new().build();
    let tiling = Tiling::build(&frame, 150).unwrap();
    let de = DifferentialEvolution::new(&tiling, SLOPE, small_evolution());
    let mut rng = fastrand::Rng::with_seed(1);
    let result = de.run(None, &mut rng, StopAfterFirst);
    assert_eq!(result.generations_run, 1);
}

#[test]
fn test_progress_reported_every_generation() {
    let frame = LensGridBuilder::new().build();
    let tiling = Tiling::build(&frame, 150).unwrap();
    let de = DifferentialEvolution::new(&tiling, SLOPE, small_evolution());
    let mut rng = fastrand::Rng::with_seed(2);
    let recorder = Recorder(Mutex::new(Vec::new()));
    let result = de.run(None, &mut rng, &recorder);

    let history = recorder.0.lock().unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(result.generations_run, 4);
    assert_eq!(*history.last().unwrap(), result.fitness);
}

// --- FAILURES ---

#[test]
fn test_dark_frame_fails_detection() {
    let frame = uniform_frame(400, 400, 0.0);
    let mut options = DetectionOptions::default();
    options.max_tile_attempts = 3;
    options.n_samples = 4;
    let err = GridDetector::new(options)
        .detect(&frame, SLOPE, Strategy::Local, Some(1))
        .unwrap_err();
    assert!(matches!(err, RectifyError::DetectionFailed { attempts: 3, .. }));
}

#[test]
fn test_frame_smaller_than_tile() {
    let frame = uniform_frame(120, 600, 10.0);
    let err = detect_grid(&frame, SLOPE, Strategy::Local, Some(1)).unwrap_err();
    assert!(matches!(err, RectifyError::InvalidFrame(_)));
}

#[rstest]
#[case(-0.47)]
#[case(f64::NAN)]
fn test_bad_slope_rejected(#[case] slope: f64) {
    let frame = LensGridBuilder::new().build();
    let err = detect_grid(&frame, slope, Strategy::Local, Some(1)).unwrap_err();
    assert!(matches!(err, RectifyError::InconsistentOptics { .. }));
}

#[rstest]
#[case("local", Strategy::Local)]
#[case("global_de", Strategy::GlobalDe)]
fn test_strategy_names(#[case] name: &str, #[case] expected: Strategy) {
    assert_eq!(Strategy::from_str(name).unwrap(), expected);
    assert_eq!(expected.to_string(), name);
}
