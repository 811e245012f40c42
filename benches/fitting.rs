use autoforecast::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn seasonal_values(n: usize, period: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            100.0
                + 0.5 * i as f64
                + 10.0 * (2.0 * std::f64::consts::PI * (i % period) as f64 / period as f64).sin()
        })
        .collect()
}

fn bench_ets_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("ets_fit");
    for &n in &[100usize, 500] {
        let ts = TimeSeries::from_values(seasonal_values(n, 12)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &ts, |b, ts| {
            b.iter(|| {
                let mut model = ETS::new(ETSSpec::aaa(), 12);
                model.fit(black_box(ts)).unwrap();
                black_box(model.predict(12).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_auto_ets(c: &mut Criterion) {
    let ts = TimeSeries::from_values(seasonal_values(120, 12)).unwrap();
    c.bench_function("auto_ets_search_120", |b| {
        b.iter(|| {
            let mut model = AutoETS::with_period(12);
            model.fit(black_box(&ts)).unwrap();
            black_box(model.predict(12).unwrap())
        })
    });
}

fn bench_mfles_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("mfles_fit");
    for &n in &[100usize, 500] {
        let ts = TimeSeries::from_values(seasonal_values(n, 12)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &ts, |b, ts| {
            b.iter(|| {
                let mut model = MFLES::new();
                model.fit(black_box(ts)).unwrap();
                black_box(model.predict(12).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_auto_mfles(c: &mut Criterion) {
    let ts = TimeSeries::from_values(seasonal_values(120, 12)).unwrap();
    c.bench_function("auto_mfles_search_120", |b| {
        b.iter(|| {
            let mut model = AutoMFLES::new();
            model.fit(black_box(&ts)).unwrap();
            black_box(model.predict(12).unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_ets_fit,
    bench_auto_ets,
    bench_mfles_fit,
    bench_auto_mfles
);
criterion_main!(benches);
