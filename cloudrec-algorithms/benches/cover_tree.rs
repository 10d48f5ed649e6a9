use cloudrec_algorithms::CoverTree;
use cloudrec_core::Point3f;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CLOUD_SIZES: [usize; 3] = [1_000, 10_000, 50_000];

fn random_cloud(n: usize) -> Vec<Point3f> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| Point3f::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-0.05..0.05)))
        .collect()
}

fn build(c: &mut Criterion) {
    let mut g = c.benchmark_group("cover tree build");
    g.sample_size(10);

    for n in CLOUD_SIZES {
        let cloud = random_cloud(n);
        g.bench_with_input(BenchmarkId::from_parameter(n), &cloud, |b, cloud| {
            b.iter(|| CoverTree::from_points(std::hint::black_box(cloud)).unwrap());
        });
    }

    g.finish();
}

fn knn(c: &mut Criterion) {
    let mut g = c.benchmark_group("cover tree knn");

    for n in CLOUD_SIZES {
        let cloud = random_cloud(n);
        let tree = CoverTree::from_points(&cloud).unwrap();
        g.bench_with_input(BenchmarkId::from_parameter(n), &(&tree, &cloud), |b, &(tree, cloud)| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 97) % cloud.len();
                tree.k_nearest_neighbors(std::hint::black_box(&cloud[i]), 50).unwrap()
            });
        });
    }

    g.finish();
}

criterion_group!(benches, build, knn);
criterion_main!(benches);
