use ambs_surrogate::{Surrogate, SurrogateKind, SurrogateParams};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn bench_train_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("surrogate_train_predict");
    group.sample_size(10);

    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let xt = Array2::random_using((50, 5), Uniform::new(0., 1.), &mut rng);
    let yt = xt.map_axis(ndarray::Axis(1), |r| r.mapv(|v| (v - 0.5) * (v - 0.5)).sum());
    let xp = Array2::random_using((10000, 5), Uniform::new(0., 1.), &mut rng);

    for kind in [SurrogateKind::RF, SurrogateKind::ET, SurrogateKind::GBRT, SurrogateKind::GP] {
        group.bench_function(BenchmarkId::from_parameter(kind), |b| {
            b.iter(|| {
                let model = SurrogateParams::new(kind)
                    .n_jobs(-1)
                    .train(&xt.view(), &yt.view())
                    .expect("training");
                model.predict_valstd(&xp.view()).expect("prediction")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_train_predict);
criterion_main!(benches);
