//! End-to-end tests for the locked cloud

use approx::assert_relative_eq;
use cloudrec::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread;

fn random_xyz(n: usize, seed: u64) -> Vec<[f32; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| [rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0)])
        .collect()
}

#[test]
fn test_import_keeps_leading_subset_recentered() {
    let coords = random_xyz(100, 1);
    let cloud = Cloud::new();
    let mut guard = cloud.lock();

    let centroid = guard.import_xyz(&coords).unwrap();
    let exported = guard.to_xyz();

    assert_eq!(exported.len(), 100 / IMPORT_DIVISOR);
    for (out, original) in exported.iter().zip(&coords) {
        for axis in 0..3 {
            assert_relative_eq!(out[axis] + centroid[axis], original[axis], epsilon = 1e-5);
        }
    }
    let mean: f32 = exported.iter().map(|p| p[0]).sum::<f32>() / exported.len() as f32;
    assert_relative_eq!(mean, 0.0, epsilon = 1e-5);
    assert!(guard.normals().iter().all(|n| *n == DEFAULT_NORMAL));
}

#[test]
fn test_small_import_is_empty() {
    let cloud = Cloud::new();
    let mut guard = cloud.lock();
    let centroid = guard.import_xyz(&random_xyz(24, 2)).unwrap();
    assert!(guard.is_empty());
    assert_eq!(centroid, Point3f::origin());
}

#[test]
fn test_query_before_build_fails_loudly() {
    let cloud = Cloud::new();
    let mut guard = cloud.lock();
    assert!(matches!(guard.point_knn(&Point3f::origin(), 1), Err(Error::IndexNotBuilt)));

    guard.import_xyz(&random_xyz(500, 3)).unwrap();
    assert!(matches!(guard.point_knn(&Point3f::origin(), 1), Err(Error::IndexNotBuilt)));
    guard.build_spatial_index().unwrap();
    assert_eq!(guard.point_knn(&Point3f::origin(), 3).unwrap().len(), 3);

    guard.import_xyz(&random_xyz(500, 4)).unwrap();
    assert!(matches!(guard.point_knn(&Point3f::origin(), 1), Err(Error::IndexNotBuilt)));
}

#[test]
fn test_import_of_widely_spread_coordinates_indexes() {
    let mut coords = vec![[0.0, 0.0, 0.0], [1e20, 0.0, 0.0], [2e20, 0.0, 0.0]];
    coords.resize(3 * IMPORT_DIVISOR, [0.0, 0.0, 0.0]);
    let cloud = Cloud::new();
    let mut guard = cloud.lock();
    guard.import_xyz(&coords).unwrap();
    assert_eq!(guard.len(), 3);

    guard.build_spatial_index().unwrap();
    let nearest = guard.point_knn(&Point3f::new(9e19, 0.0, 0.0), 3).unwrap();
    let order: Vec<usize> = nearest.iter().map(|n| n.index()).collect();
    assert_eq!(order, vec![2, 1, 0]);
}

#[test]
fn test_points_and_normals_stay_parallel() {
    let cloud = Cloud::new();
    let mut guard = cloud.lock();
    let mut rng = StdRng::seed_from_u64(9);
    let check = |g: &CloudGuard<'_>| {
        assert_eq!(g.points().len(), g.normals().len());
        assert_eq!(g.vertex_buffer().len(), g.len());
        assert_eq!(g.normal_line_buffer(0.1).len(), g.len());
    };

    guard.fill_random_plane(Vector3f::new(0.0, 1.0, 1.0), 800, None, &mut rng).unwrap();
    check(&guard);
    guard.build_spatial_index().unwrap();
    guard.add_point(Point3f::new(0.1, 0.2, 0.3), DEFAULT_NORMAL).unwrap();
    check(&guard);
    guard.approx_cloud_norms(&NormalConfig::default()).unwrap();
    check(&guard);
    guard.decimate_with_rng(&DecimateConfig { n_holes: 3, knn: 30 }, &mut rng).unwrap();
    check(&guard);
    guard.replace_point(0, Point3f::origin(), DEFAULT_NORMAL).unwrap();
    check(&guard);
    guard.clear();
    check(&guard);
}

#[test]
fn test_estimated_normals_match_the_plane() {
    let normal = Vector3f::new(1.0, 1.0, 0.0).normalize();
    let cloud = Cloud::new();
    let mut guard = cloud.lock();
    let mut rng = StdRng::seed_from_u64(21);
    guard.fill_random_plane(normal, 1000, None, &mut rng).unwrap();
    for i in 0..guard.len() {
        let p = guard.point(i).unwrap();
        guard.replace_point(i, p, DEFAULT_NORMAL).unwrap();
    }
    guard.build_spatial_index().unwrap();

    let degenerate = guard.approx_cloud_norms(&NormalConfig::default()).unwrap();
    assert_eq!(degenerate, 0);
    for n in guard.normals() {
        assert!(n.dot(&normal).abs() > 0.999);
    }
    let single = guard.approx_norm(&Point3f::origin(), 10, 25).unwrap();
    assert!(single.dot(&normal).abs() > 0.999);
}

#[test]
fn test_vertex_buffers_cast_to_floats() {
    let cloud = Cloud::new();
    let mut guard = cloud.lock();
    guard.add_point(Point3f::new(1.0, 2.0, 3.0), Vector3f::new(0.0, 1.0, 0.0)).unwrap();

    let vertices = guard.vertex_buffer();
    let floats: &[f32] = bytemuck::cast_slice(&vertices);
    assert_eq!(floats, &[1.0, 2.0, 3.0, 0.0, 1.0, 0.0]);

    let lines = guard.normal_line_buffer(2.0);
    let floats: &[f32] = bytemuck::cast_slice(&lines);
    assert_eq!(floats.len(), 12);
    assert_eq!(&floats[6..9], &[1.0, 4.0, 3.0]);
}

#[test]
fn test_cloud_is_shared_between_threads() {
    let cloud = Arc::new(Cloud::new());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cloud = Arc::clone(&cloud);
            thread::spawn(move || {
                for i in 0..50 {
                    let mut guard = cloud.lock();
                    guard.add_point(Point3f::new(t as f32, i as f32, 0.0), DEFAULT_NORMAL).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut guard = cloud.lock();
    assert_eq!(guard.len(), 200);
    guard.build_spatial_index().unwrap();
    let nearest = guard.point_knn(&Point3f::new(2.0, 7.0, 0.0), 1).unwrap();
    assert_eq!(nearest[0].distance, 0.0);
}

const HOLE_RADIUS: f32 = 0.2;

/// 10,000 uniform samples of `[-1, 1]²` avoiding a disc around the origin
fn holed_plane(cloud: &Cloud) {
    let mut guard = cloud.lock();
    let mut rng = StdRng::seed_from_u64(2024);
    while guard.len() < 10_000 {
        let p = Point3f::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 0.0);
        if p.coords.xy().norm() > HOLE_RADIUS {
            guard.add_point(p, DEFAULT_NORMAL).unwrap();
        }
    }
}

#[test]
fn test_circular_hole_is_filled() {
    let cloud = Cloud::new();
    holed_plane(&cloud);
    let mut guard = cloud.lock();
    guard.build_spatial_index().unwrap();
    guard.approx_cloud_norms(&NormalConfig::default()).unwrap();

    let bounds = BoundingBox::new(Point3f::new(-1.0, -1.0, -0.05), Point3f::new(1.0, 1.0, 0.05));
    let config = ReconstructConfig::default().with_bounding_box(bounds);
    let before = guard.len();

    let report = guard.reconstruct(&config).unwrap();

    let added = guard.len() - before;
    assert_eq!(added, report.points_added);
    assert!(added > 0 && added <= config.max_new_points);
    assert!(report.max_code_support <= config.latm);
    assert_eq!(guard.debug_segments().len(), added);
    assert!(guard.points()[before..].iter().all(|p| bounds.contains(p)));

    // Spacing of the original sampling is about 0.02.
    let steps = 12;
    for i in 0..=steps {
        for j in 0..=steps {
            let x = -HOLE_RADIUS + 2.0 * HOLE_RADIUS * i as f32 / steps as f32;
            let y = -HOLE_RADIUS + 2.0 * HOLE_RADIUS * j as f32 / steps as f32;
            let probe = Point3f::new(x, y, 0.0);
            if probe.coords.xy().norm() >= HOLE_RADIUS {
                continue;
            }
            let nearest = guard.point_knn(&probe, 1).unwrap();
            assert!(
                nearest[0].distance < 0.06,
                "empty region around {:?}: nearest point {}",
                probe,
                nearest[0].distance
            );
        }
    }
}
