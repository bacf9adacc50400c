//! Selection benchmarks for conduit-transport.

use conduit_transport::{TransportKind, TransportSelector};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_select_preferred(c: &mut Criterion) {
    let selector =
        TransportSelector::new(TransportKind::ALL, Some(reqwest::Client::new()), None).unwrap();

    c.bench_function("select_all_available", |b| {
        b.iter(|| selector.select(black_box(TransportKind::ALL)))
    });
}

fn bench_select_fallback(c: &mut Criterion) {
    let selector =
        TransportSelector::new(TransportKind::ALL, Some(reqwest::Client::new()), None).unwrap();

    let mut group = c.benchmark_group("select_fallback");
    group.bench_function("long_polling_only", |b| {
        b.iter(|| selector.select(black_box(TransportKind::LONG_POLLING)))
    });
    group.bench_function("no_overlap", |b| {
        b.iter(|| selector.select(black_box(TransportKind::NONE)))
    });
    group.finish();
}

criterion_group!(benches, bench_select_preferred, bench_select_fallback);
criterion_main!(benches);
