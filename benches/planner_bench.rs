//! Benchmarks for chunk planning

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dimsplit_core::query::{ChunkPlanner, PlannerSettings, Query};

fn query(items: usize, units: usize, periods: usize) -> Query {
    Query::builder()
        .items((0..items).map(|i| format!("dx{:03}", i)))
        .units((0..units).map(|u| format!("ou{:06}", u)))
        .periods((0..periods).map(|p| format!("pe{:04}", p)))
        .build()
}

fn bench_plan_units(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_units");
    let planner = ChunkPlanner::with_limit(10_000);

    for units in [2_000, 20_000, 200_000].iter() {
        let query = query(5, *units, 12);
        group.bench_with_input(BenchmarkId::from_parameter(units), &query, |b, query| {
            b.iter(|| planner.plan(black_box(query)).unwrap());
        });
    }
    group.finish();
}

fn bench_plan_all_dimensions(c: &mut Criterion) {
    // every dimension alone exceeds the limit, so splits cascade
    let query = query(100, 100, 100);
    let planner = ChunkPlanner::with_limit(1_000);
    c.bench_function("plan_cascading_100_cubed", |b| {
        b.iter(|| planner.plan(black_box(&query)).unwrap());
    });
}

fn bench_plan_url_budget(c: &mut Criterion) {
    let mut settings = PlannerSettings::with_limit(10_000);
    settings.url_budget = Some(1_900);
    let planner = ChunkPlanner::new(settings);
    let query = query(5, 2_000, 12);
    c.bench_function("plan_with_url_budget", |b| {
        b.iter(|| planner.plan(black_box(&query)).unwrap());
    });
}

criterion_group!(benches, bench_plan_units, bench_plan_all_dimensions, bench_plan_url_budget);
criterion_main!(benches);
