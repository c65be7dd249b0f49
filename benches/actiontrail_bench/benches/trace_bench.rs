//! Hot-path benchmarks
//!
//! Route gating, body redaction and queue hand-off run on every request.

use actiontrail::{Redactor, RouteFilter, TraceQueue, TraceRecord};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Map, Value};

fn body_with_fields(n: usize) -> Map<String, Value> {
    let mut body = Map::new();
    for i in 0..n {
        body.insert(format!("field_{i}"), json!(i));
    }
    body.insert("apiKey".to_string(), json!("secret"));
    body.insert("password".to_string(), json!("hunter2"));
    body
}

/// Benchmark the route gate against exact, pattern and unmatched routes
fn bench_should_trace(c: &mut Criterion) {
    let filter = RouteFilter::builtin();
    let mut group = c.benchmark_group("should_trace");

    let cases = [
        ("exact_hit", "GET", "/{projectId}/sessions/search2"),
        ("pattern_hit", "GET", "/integrations/github"),
        ("miss", "PUT", "/projects/{id}/settings"),
    ];
    for (name, method, path) in cases {
        group.bench_function(name, |b| {
            b.iter(|| filter.should_trace(black_box(method), black_box(path)))
        });
    }

    group.finish();
}

/// Benchmark redaction as bodies grow
fn bench_redact(c: &mut Criterion) {
    let redactor = Redactor::new();
    let mut group = c.benchmark_group("redact");

    for size in [2, 16, 128].iter() {
        let body = body_with_fields(*size);
        group.throughput(Throughput::Elements(body.len() as u64));
        group.bench_with_input(BenchmarkId::new("fields", size), &body, |b, body| {
            b.iter(|| redactor.redact(black_box(body.clone())))
        });
    }

    group.finish();
}

/// Benchmark enqueue followed by a full drain
fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");

    for batch in [1, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::new("enqueue_drain", batch), batch, |b, &n| {
            let queue = TraceQueue::new();
            b.iter(|| {
                for i in 0..n {
                    queue.enqueue(TraceRecord::new(
                        i as i64,
                        "update_settings",
                        "PUT",
                        "/projects/{id}/settings",
                        "/projects/1/settings",
                    ));
                }
                black_box(queue.drain_all())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_should_trace, bench_redact, bench_queue);
criterion_main!(benches);
