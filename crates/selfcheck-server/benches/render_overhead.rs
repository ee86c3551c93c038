// Cost of turning a run report into a response, and of recording it

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use selfcheck::{Outcome, Reason, RunReport};
use selfcheck_server::metrics::MetricsRegistry;
use selfcheck_server::render::{HtmlPresenter, JsonPresenter, Presenter};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

fn report(checks: usize) -> RunReport {
    let outcomes = (0..checks)
        .map(|i| {
            let url = format!("/service/{i}");
            match i % 4 {
                0 => Outcome::timeout(url, Duration::from_secs(3)),
                1 => Outcome::response(url, Duration::from_millis(8), Reason::Body, 200, "x".repeat(2048)),
                _ => Outcome::response(url, Duration::from_millis(4), Reason::Pass, 200, "x".repeat(2048)),
            }
        })
        .collect();
    RunReport::from_outcomes(outcomes)
}

fn bench_presenters(c: &mut Criterion) {
    let mut group = c.benchmark_group("presenters");

    for checks in [1usize, 10, 100] {
        let report = report(checks);

        group.bench_with_input(BenchmarkId::new("html", checks), &report, |b, r| {
            let presenter = HtmlPresenter::default();
            b.iter(|| black_box(presenter.render(r)));
        });

        group.bench_with_input(BenchmarkId::new("json", checks), &report, |b, r| {
            b.iter(|| black_box(JsonPresenter.render(r)));
        });
    }

    group.finish();
}

fn bench_metrics_recording(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics_recording");
    let report = report(10);

    // Benchmark with metrics disabled (None)
    group.bench_function("disabled", |b| {
        let metrics: Option<Arc<MetricsRegistry>> = None;
        b.iter(|| {
            if let Some(ref m) = metrics {
                m.record_run(black_box(&report), black_box(Duration::from_millis(10)));
            }
        });
    });

    // Benchmark with metrics enabled
    group.bench_function("enabled", |b| {
        let metrics = Some(Arc::new(MetricsRegistry::new()));
        b.iter(|| {
            if let Some(ref m) = metrics {
                m.record_run(black_box(&report), black_box(Duration::from_millis(10)));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_presenters, bench_metrics_recording);
criterion_main!(benches);
