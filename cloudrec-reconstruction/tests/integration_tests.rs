//! Integration tests for cloudrec-reconstruction
//!
//! These tests run the full train-then-fill pipeline on synthetic planes
//! with holes punched into them.

use approx::assert_relative_eq;
use cloudrec_algorithms::CoverTree;
use cloudrec_core::{
    BoundingBox, ConfigError, Error, Point3f, PointStore, ReconstructConfig, SparseApprox, DEFAULT_NORMAL,
};
use cloudrec_reconstruction::*;

const HOLE_RADIUS: f32 = 0.3;

/// A 41 × 41 grid over `[-1, 1]²` at `z = 0`, minus a disc around the origin
fn plane_with_hole() -> PointStore {
    let mut store = PointStore::new();
    for i in 0..41 {
        for j in 0..41 {
            let (x, y) = (-1.0 + i as f32 * 0.05, -1.0 + j as f32 * 0.05);
            if x.hypot(y) > HOLE_RADIUS {
                store.push(Point3f::new(x, y, 0.0), DEFAULT_NORMAL);
            }
        }
    }
    store
}

fn plane_box() -> BoundingBox {
    BoundingBox::new(Point3f::new(-1.0, -1.0, -0.1), Point3f::new(1.0, 1.0, 0.1))
}

fn small_config() -> ReconstructConfig {
    ReconstructConfig::default()
        .with_ksvd_iters(3)
        .with_knn(50)
        .with_nfreq(2)
        .with_atoms(6, 2)
        .with_bounding_box(plane_box())
}

fn indexed(store: &PointStore) -> CoverTree {
    CoverTree::from_points(store.points()).unwrap()
}

#[test]
fn test_hole_is_filled_inside_the_box() {
    let mut store = plane_with_hole();
    let mut index = indexed(&store);
    let before = store.len();
    let config = small_config();

    let report = reconstruct(&mut store, &mut index, &config, None, 5).unwrap();

    assert!(report.training_patches > 0);
    assert!(report.points_added > 0);
    assert!(report.filled_patches > 0);
    assert!(report.passes >= 1 && report.passes <= MAX_PASSES);
    assert!(report.max_code_support <= config.latm);
    assert_eq!(report.segments.len(), report.points_added);
    assert_eq!(store.len(), before + report.points_added);
    assert_eq!(store.points().len(), store.normals().len());

    let bb = plane_box();
    let added = &store.points()[before..];
    for p in added {
        assert!(bb.contains(p));
        assert!(p.z.abs() < 0.02, "new point off the plane: {:?}", p);
    }
    for n in &store.normals()[before..] {
        assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-4);
        assert!(n.z.abs() > 0.99);
    }
    assert!(added.iter().any(|p| p.coords.xy().norm() < HOLE_RADIUS - 0.05));
}

#[test]
fn test_index_stays_in_step_with_the_store() {
    let mut store = plane_with_hole();
    let mut index = indexed(&store);
    let before = store.len();

    reconstruct(&mut store, &mut index, &small_config(), None, 5).unwrap();

    assert_eq!(index.len(), store.len());
    index.check_invariants().unwrap();
    for (i, p) in store.points().iter().enumerate().skip(before) {
        let nearest = index.nearest(p).unwrap().unwrap();
        assert_eq!(nearest.index(), i);
        assert_eq!(nearest.distance, 0.0);
    }
}

#[test]
fn test_budget_is_respected() {
    for budget in [0, 1, 7] {
        let mut store = plane_with_hole();
        let mut index = indexed(&store);
        let before = store.len();
        let config = small_config().with_max_new_points(budget);

        let report = reconstruct(&mut store, &mut index, &config, None, 5).unwrap();
        assert!(report.points_added <= budget);
        assert_eq!(store.len(), before + report.points_added);
    }
}

#[test]
fn test_sparsity_above_dictionary_size_is_rejected_untouched() {
    let mut store = plane_with_hole();
    let mut index = indexed(&store);
    let points = store.points().to_vec();
    let normals = store.normals().to_vec();
    let config = small_config().with_atoms(3, 4);

    let err = reconstruct(&mut store, &mut index, &config, None, 5).unwrap_err();
    match err {
        Error::Config(e) => {
            assert_eq!(e, ConfigError::Sparsity { latm: 4, natm: 3 });
            assert_eq!(e.code(), -5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.points(), points.as_slice());
    assert_eq!(store.normals(), normals.as_slice());
    assert_eq!(index.len(), points.len());
}

#[test]
fn test_invalid_fields_report_their_code() {
    let mut store = plane_with_hole();
    let mut index = indexed(&store);
    let cases = [
        (small_config().with_ksvd_iters(0), -1),
        (small_config().with_knn(0), -2),
        (small_config().with_nfreq(0), -3),
        (small_config().with_atoms(0, 0), -4),
        (
            small_config().with_bounding_box(BoundingBox::new(Point3f::new(1.0, 0.0, 0.0), Point3f::origin())),
            -7,
        ),
    ];
    for (config, code) in cases {
        match reconstruct(&mut store, &mut index, &config, None, 5) {
            Err(Error::Config(e)) => assert_eq!(e.code(), code),
            other => panic!("expected config error {code}, got {other:?}"),
        }
    }
}

#[test]
fn test_stale_index_is_refused() {
    let mut store = plane_with_hole();
    let mut index = CoverTree::new();
    let before = store.len();

    let err = reconstruct(&mut store, &mut index, &small_config(), None, 5).unwrap_err();
    assert!(matches!(err, Error::IndexNotBuilt));
    assert_eq!(store.len(), before);

    let mut partial = CoverTree::from_points(&store.points()[..10]).unwrap();
    let err = reconstruct(&mut store, &mut partial, &small_config(), None, 5).unwrap_err();
    assert!(matches!(err, Error::IndexNotBuilt));
}

#[test]
fn test_matching_pursuit_fills_too() {
    let mut store = plane_with_hole();
    let mut index = indexed(&store);
    let config = small_config().with_method(SparseApprox::MatchingPursuit);

    let report = reconstruct(&mut store, &mut index, &config, None, 5).unwrap();
    assert!(report.points_added > 0);
    assert!(report.max_code_support <= config.latm);
}

#[test]
fn test_reconstruction_is_deterministic() {
    let run = || {
        let mut store = plane_with_hole();
        let mut index = indexed(&store);
        let report = reconstruct(&mut store, &mut index, &small_config(), None, 5).unwrap();
        (report, store.points().to_vec())
    };
    let (a, pa) = run();
    let (b, pb) = run();
    assert_eq!(a, b);
    assert_eq!(pa, pb);
}
