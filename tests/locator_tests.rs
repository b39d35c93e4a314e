mod common;

use common::{disk_tile, uniform_frame, LensGridBuilder};
use lensgrid::geometry::{PixelPos, RowCol, Xy};
use lensgrid::grid::SizeBounds;
use lensgrid::locator::tile_image::{TileImage, BACKGROUND, FOREGROUND};
use lensgrid::locator::{locate_candidate, sample_candidate};
use lensgrid::tiling::{TileBounds, Tiling};
use lensgrid::RectifyError;
use rstest::rstest;

fn lens_tile() -> TileImage {
    let frame = LensGridBuilder::new().build();
    let bounds = TileBounds {
        top: 0,
        left: 0,
        side: 150,
    };
    let mut tile = TileImage::from_frame(&frame, &bounds).unwrap();
    tile.threshold(0.47);
    tile.smooth();
    tile
}

fn near(p: PixelPos, row: i64, col: i64, tol: i64) -> bool {
    (p.row - row).abs() <= tol && (p.col - col).abs() <= tol
}

// --- REGION PROBES ---

#[test]
fn test_xdist_symmetric_on_disk() {
    let tile = TileImage::from_pixels(100, disk_tile(100, Xy::new(40.0, 37.0), 12.0)).unwrap();
    let d = tile.xdist(RowCol::new(37.0, 40.0), FOREGROUND).unwrap();
    assert_eq!(d, [9, 9, 9, 9]);
}

#[rstest]
#[case(RowCol::new(37.0, 40.0))]
#[case(RowCol::new(30.0, 45.0))]
#[case(RowCol::new(44.0, 33.0))]
#[case(RowCol::new(40.5, 47.5))]
fn test_region_center_converges_on_blob(#[case] start: RowCol) {
    let tile = TileImage::from_pixels(100, disk_tile(100, Xy::new(40.0, 37.0), 12.0)).unwrap();
    let c = tile.find_region_center(FOREGROUND, start).unwrap();
    assert!(near(c, 37, 40, 1), "start {:?} -> {:?}", start, c);
}

#[test]
fn test_probe_off_tile_is_boundary_error() {
    // Disk touching the tile edge: probes walk off before the color changes
    let tile = TileImage::from_pixels(40, disk_tile(40, Xy::new(2.0, 2.0), 30.0)).unwrap();
    let err = tile.xdist(RowCol::new(2.0, 2.0), FOREGROUND).unwrap_err();
    assert!(matches!(err, RectifyError::BoundaryExceeded { .. }));
    assert!(err.is_retryable());
}

#[test]
fn test_find_any_region_lands_on_color() {
    let tile = lens_tile();
    let mut rng = fastrand::Rng::with_seed(5);
    let p = tile.find_any_region(BACKGROUND, &mut rng).unwrap();
    assert_eq!(tile.pixel(p).unwrap(), BACKGROUND);
}

#[test]
fn test_hole_centers_on_lens_tile() {
    let tile = lens_tile();
    // Holes sit between four lenses, e.g. at (110, 110)
    let hole = tile
        .find_region_center(BACKGROUND, RowCol::new(110.0, 110.0))
        .unwrap();
    assert!(near(hole, 110, 110, 1), "hole {:?}", hole);

    let right = tile
        .find_next_region_center(BACKGROUND, hole, PixelPos::new(0, 1))
        .unwrap();
    assert!(near(right, 110, 130, 2), "right neighbor {:?}", right);

    let same = tile
        .find_next_region_center(BACKGROUND, hole, PixelPos::new(0, 0))
        .unwrap();
    assert_eq!(same, hole);
}

#[test]
fn test_lens_from_holes() {
    let tile = lens_tile();
    let holes = [
        PixelPos::new(50, 50),
        PixelPos::new(50, 70),
        PixelPos::new(70, 50),
        PixelPos::new(70, 70),
    ];
    let lens = tile.find_lens_from_holes(holes).unwrap();
    assert!(near(lens, 60, 60, 1), "lens {:?}", lens);
}

// --- CANDIDATES ---

#[rstest]
#[case(0, 0)]
#[case(150, 150)]
#[case(217, 95)]
fn test_locate_candidate_recovers_vectors(#[case] top: usize, #[case] left: usize) {
    let frame = LensGridBuilder::new().build();
    let bounds = TileBounds {
        top,
        left,
        side: 150,
    };
    let mut rng = fastrand::Rng::with_seed(21);
    let params = locate_candidate(&frame, &bounds, 0.47, SizeBounds::default(), &mut rng).unwrap();
    let steps = params.to_steps();
    assert!(
        (steps.horizontal - Xy::new(20.0, 0.0)).norm() < 2.0,
        "h {:?}",
        steps.horizontal
    );
    assert!(
        (steps.vertical - Xy::new(0.0, 20.0)).norm() < 2.0,
        "v {:?}",
        steps.vertical
    );
}

#[test]
fn test_dark_frame_exhausts_attempts() {
    let frame = uniform_frame(300, 300, 0.0);
    let tiling = Tiling::build(&frame, 150).unwrap();
    let mut rng = fastrand::Rng::with_seed(1);
    let err = sample_candidate(&tiling, 0.47, SizeBounds::default(), 5, &mut rng).unwrap_err();
    match err {
        RectifyError::DetectionFailed { attempts, .. } => assert_eq!(attempts, 5),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_sample_candidate_on_lens_grid() {
    let frame = LensGridBuilder::new().build();
    let tiling = Tiling::build(&frame, 150).unwrap();
    let mut rng = fastrand::Rng::with_seed(77);
    let cand = sample_candidate(&tiling, 0.47, SizeBounds::default(), 50, &mut rng).unwrap();
    assert_eq!(cand.bounds.side, 150);
    assert!((cand.params.size().x - 20.0).abs() < 2.0);
}
