use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rigreg_3d::{pointcloud::PointCloud, transforms::RigidTransform};
use rigreg_icp::{fit_transformation, icp_vanilla, IcpConvergenceCriteria};

fn random_cloud(num_points: usize) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(7);
    let points = (0..num_points)
        .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
        .collect();
    PointCloud::new(points, None, None)
}

fn bench_fit_transformation(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit_transformation");

    let transform = RigidTransform::from_axis_angle(&[0.0, 1.0, 0.0], 0.3, [0.1, 0.2, 0.0]).unwrap();

    for num_points in [4, 100, 10000].iter() {
        let source = random_cloud(*num_points);
        let target = source.transformed(&transform);

        group.bench_with_input(
            BenchmarkId::new("fit_transformation", num_points),
            &(source.points(), target.points()),
            |b, i| {
                b.iter(|| {
                    black_box(fit_transformation(i.0, i.1).unwrap());
                })
            },
        );
    }
}

fn bench_icp_vanilla(c: &mut Criterion) {
    let mut group = c.benchmark_group("icp_vanilla");
    group.sample_size(10);

    let transform = RigidTransform::from_axis_angle(&[0.0, 0.0, 1.0], 0.01, [0.005, 0.0, 0.0]).unwrap();
    let criteria = IcpConvergenceCriteria::default();

    for num_points in [1000, 10000, 50000].iter() {
        group.throughput(criterion::Throughput::Elements(*num_points as u64));
        let target = random_cloud(*num_points);
        let source = target.transformed(&transform);

        group.bench_with_input(
            BenchmarkId::new("icp_vanilla", num_points),
            &(&source, &target),
            |b, i| {
                b.iter(|| {
                    black_box(
                        icp_vanilla(i.0, i.1, &RigidTransform::identity(), &criteria).unwrap(),
                    );
                })
            },
        );
    }
}

criterion_group!(benches, bench_fit_transformation, bench_icp_vanilla);
criterion_main!(benches);
