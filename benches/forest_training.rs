//! Random forest fitting and prediction benchmark
//!
//! Measures the cost that dominates a grid search: fitting one forest on a
//! fold-sized table, for a few tree counts and both split criteria.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench forest_training
//! ```

use asistencia::features::NUM_FEATURES;
use asistencia::forest::{Criterion as SplitCriterion, ForestParams, RandomForest};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Synthetic attendance-like table: weekday, lateness and noise columns
fn bench_table(n: usize) -> (Vec<Vec<f64>>, Vec<usize>, Vec<f64>) {
    let mut rows = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let weekday = (i % 5) as f64;
        let label = match i % 5 {
            0 => 1,
            4 => 2,
            _ => 0,
        };
        let lateness = if label == 2 { 20.0 + (i % 13) as f64 } else { (i % 7) as f64 - 3.0 };
        let mut row = vec![0.0; NUM_FEATURES];
        row[0] = weekday;
        row[4] = (i % 12 + 1) as f64;
        row[6] = (i % 28 + 1) as f64;
        row[8] = lateness;
        rows.push(row);
        labels.push(label);
    }
    let weights = vec![1.0; n];
    (rows, labels, weights)
}

fn bench_fit(c: &mut Criterion) {
    let (rows, labels, weights) = bench_table(1000);
    let mut group = c.benchmark_group("forest_fit");

    for n_estimators in [10, 50, 100] {
        for criterion in [SplitCriterion::Gini, SplitCriterion::Entropy] {
            let params = ForestParams {
                n_estimators,
                criterion,
                ..ForestParams::default()
            };
            group.bench_with_input(
                BenchmarkId::new(criterion.to_string(), n_estimators),
                &params,
                |b, params| {
                    b.iter(|| {
                        let mut forest = RandomForest::new(params.clone(), 42);
                        forest
                            .fit(black_box(&rows), black_box(&labels), black_box(&weights))
                            .unwrap();
                        forest
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let (rows, labels, weights) = bench_table(1000);
    let mut forest = RandomForest::new(ForestParams::default(), 42);
    forest.fit(&rows, &labels, &weights).unwrap();

    c.bench_function("forest_predict_proba_1000_rows", |b| {
        b.iter(|| {
            rows.iter()
                .map(|row| forest.predict_proba(black_box(row)))
                .count()
        });
    });
}

criterion_group!(benches, bench_fit, bench_predict);
criterion_main!(benches);
