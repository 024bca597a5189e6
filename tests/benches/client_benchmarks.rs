//! # Ledger-Link Client Benchmarks
//!
//! Hot paths of the inbound side: envelope parsing and routing one frame to
//! its pending call or subscription.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use node_client::adapters::{MessageRouter, PendingCallStore, SubscriptionRegistry};
use node_client::domain::envelope::Inbound;
use node_client::{CorrelationId, InboundSink};
use serde_json::json;
use std::sync::Arc;

fn bench_envelope_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope-parse");

    let response = json!({"id": CorrelationId::new().to_string(), "result": {"ip": "10.0.0.1"}})
        .to_string()
        .into_bytes();
    let notification = json!({
        "method": "Atoms.subscribeUpdate",
        "params": {
            "subscriberId": CorrelationId::new().to_string(),
            "atoms": (0..20).map(|i| json!({"hid": format!("atom-{}", i)})).collect::<Vec<_>>()
        }
    })
    .to_string()
    .into_bytes();

    group.bench_function("response", |b| {
        b.iter(|| black_box(Inbound::parse(black_box(&response)).is_ok()))
    });
    group.bench_function("notification_20_atoms", |b| {
        b.iter(|| black_box(Inbound::parse(black_box(&notification)).is_ok()))
    });
    group.finish();
}

fn bench_route_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("route-response");

    for in_flight in [1usize, 100, 10_000] {
        let pending = Arc::new(PendingCallStore::new());
        let router = MessageRouter::new(Arc::clone(&pending), Arc::new(SubscriptionRegistry::new()));
        let _others: Vec<_> = (0..in_flight).map(|_| pending.register("Other.call")).collect();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("in_flight", in_flight), &in_flight, |b, _| {
            b.iter(|| {
                let (id, rx) = pending.register("Bench.call");
                let frame = json!({"id": id.to_string(), "result": 1}).to_string();
                router.on_message(frame.as_bytes());
                black_box(rx)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_envelope_parse, bench_route_response);
criterion_main!(benches);
