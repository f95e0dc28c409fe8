use criterion::{criterion_group, criterion_main, Criterion};
use glisten::accel::KdTree;
use glisten::geometry::Ray;
use glisten::photon::{Photon, PhotonMap};
use glisten::primitive::sphere::Sphere;
use glisten::primitive::Primitive;
use glisten::{Point3f, Vec3f};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::sync::Arc;
use std::time::Duration;

fn sphere_field(n: usize) -> Vec<Arc<dyn Primitive>> {
    let mut rng = Xoshiro256Plus::seed_from_u64(9);
    (0..n)
        .map(|_| {
            Arc::new(Sphere::new(
                Point3f::new(
                    rng.gen_range(-20.0, 20.0),
                    rng.gen_range(-20.0, 20.0),
                    rng.gen_range(-20.0, 20.0),
                ),
                rng.gen_range(0.2, 1.0),
                0,
            )) as Arc<dyn Primitive>
        })
        .collect()
}

fn bench(c: &mut Criterion) {
    c.bench_function("kdtree_build_5k", |b| {
        let prims = sphere_field(5000);
        b.iter(|| KdTree::build(prims.clone()))
    });

    c.bench_function("kdtree_intersect", |b| {
        let tree = KdTree::build(sphere_field(5000));
        let mut rng = Xoshiro256Plus::seed_from_u64(4);
        b.iter(|| {
            let ray = Ray::new(
                Point3f::new(
                    rng.gen_range(-25.0, 25.0),
                    rng.gen_range(-25.0, 25.0),
                    -30.0,
                ),
                Vec3f::new(0.0, 0.0, 1.0),
            );
            tree.intersect(&ray)
        })
    });

    c.bench_function("photon_gather_k50", |b| {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let mut map = PhotonMap::new();
        for _ in 0..100_000 {
            map.push(Photon {
                pos: Point3f::new(
                    rng.gen_range(-10.0, 10.0),
                    rng.gen_range(-10.0, 10.0),
                    rng.gen_range(-10.0, 10.0),
                ),
                dir: Vec3f::new(0.0, -1.0, 0.0),
                power: glisten::Rgb::uniform(1.0),
                normal: Vec3f::new(0.0, 1.0, 0.0),
            });
        }
        map.build();
        b.iter(|| {
            let q = Point3f::new(
                rng.gen_range(-10.0, 10.0f32),
                rng.gen_range(-10.0, 10.0),
                rng.gen_range(-10.0, 10.0),
            );
            map.gather(q, 50, 4.0)
        })
    });

}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = bench
}
criterion_main!(benches);
