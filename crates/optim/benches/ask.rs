use ambs_optim::{MultiPointStrategy, Optimizer, OptimizerConfig, Outcome};
use ambs_space::{Dimension, Scale, Space};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn space() -> Space {
    Space::new(vec![
        Dimension::continuous("x1", -5., 10., Scale::Linear).expect("dimension"),
        Dimension::continuous("x2", 0., 15., Scale::Linear).expect("dimension"),
        Dimension::integer("n", 1, 50).expect("dimension"),
        Dimension::categorical("c", &["a", "b", "c"]).expect("dimension"),
    ])
    .expect("space")
}

fn warm_optimizer() -> Optimizer {
    let config = OptimizerConfig::default()
        .n_initial_points(20)
        .n_points(2000)
        .seed(42);
    let mut optimizer = Optimizer::new(space(), config).expect("optimizer");
    let xs = optimizer.ask(20, MultiPointStrategy::ClMax).expect("ask");
    let ys: Vec<Outcome> = xs
        .iter()
        .map(|x| {
            let x1 = x[0].as_f64().unwrap_or_default();
            let x2 = x[1].as_f64().unwrap_or_default();
            Outcome::Success((x2 - 0.13 * x1 * x1 + 1.6 * x1 - 6.).powi(2))
        })
        .collect();
    optimizer.tell(&xs, &ys).expect("tell");
    optimizer
}

fn bench_ask(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimizer_ask");
    group.sample_size(10);

    for strategy in [
        MultiPointStrategy::ClMax,
        MultiPointStrategy::TopK,
        MultiPointStrategy::Boltzmann,
    ] {
        let mut optimizer = warm_optimizer();
        group.bench_function(BenchmarkId::from_parameter(strategy), |b| {
            b.iter(|| optimizer.ask(4, strategy).expect("ask"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ask);
criterion_main!(benches);
