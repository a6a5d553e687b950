//! Micro benchmarks for docstore-wire
//!
//! Covers the pure resolvers and the frame codec; no node is needed.
//!
//! Run with: cargo bench --bench micro_benchmarks

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docstore_wire::client::{
    compatible, feature_available, features, resolve_read_preference, resolve_transport,
    resolve_write_concern, Acknowledgement, ClientConfig, RawTlsOptions, WireVersionRange,
    WriteConcern, WriteConcernOptions, CLIENT_WIRE_VERSIONS,
};
use docstore_wire::connection::{discovery_command, NodeDescriptor};
use docstore_wire::protocol::{decode_message, encode_message, Message};
use serde_json::json;
use std::time::Duration;

fn resolver_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolvers");

    group.bench_function("resolve_transport_tcp", |b| {
        let raw = RawTlsOptions::default();
        b.iter(|| resolve_transport(black_box("db.example.com"), black_box(&raw)))
    });

    group.bench_function("resolve_transport_tls", |b| {
        let raw = RawTlsOptions {
            ssl: Some(true),
            ssl_ca_cert: Some("/etc/ssl/ca.pem".into()),
            ssl_cert: Some("/etc/ssl/client.pem".into()),
            ..Default::default()
        };
        b.iter(|| resolve_transport(black_box("db.example.com"), black_box(&raw)))
    });

    group.bench_function("resolve_read_preference", |b| {
        b.iter(|| {
            resolve_read_preference(
                black_box(None),
                black_box(None),
                black_box(Some(20)),
                black_box(true),
            )
        })
    });

    group.bench_function("resolve_write_concern", |b| {
        let defaults = WriteConcern::default();
        let options = WriteConcernOptions {
            w: Some(Acknowledgement::Majority),
            j: Some(true),
            wtimeout: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        b.iter(|| resolve_write_concern(black_box(&options), black_box(&defaults)))
    });

    group.bench_function("wire_version_gating", |b| {
        let server = WireVersionRange::new(0, 5);
        b.iter(|| {
            compatible(black_box(CLIENT_WIRE_VERSIONS), black_box(server))
                && feature_available(
                    CLIENT_WIRE_VERSIONS,
                    server,
                    black_box(features::WRITE_COMMANDS),
                )
        })
    });

    group.bench_function("config_from_options", |b| {
        let options = [
            ("pool_size", "10"),
            ("pool_timeout", "2.5"),
            ("read", "secondary_preferred"),
            ("tag_sets", "dc:ny,rack:1;dc:sf"),
            ("w", "majority"),
            ("unknown", "ignored"),
        ];
        b.iter(|| ClientConfig::from_options("db.example.com", 27017, black_box(options)))
    });

    group.finish();
}

fn codec_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let discovery = Message::command(1, discovery_command(Some("bench")));
    group.bench_function("encode_discovery", |b| {
        b.iter(|| encode_message(black_box(&discovery)))
    });

    for batch in [1usize, 100, 1000] {
        let docs: Vec<_> = (0..batch)
            .map(|i| json!({"_id": i, "name": format!("doc-{}", i), "tags": ["a", "b"]}))
            .collect();
        let reply = Message::reply(2, 1, json!({"ok": 1, "docs": docs}));
        let frame = encode_message(&reply).expect("encode");

        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("decode_reply", batch), &frame, |b, frame| {
            b.iter(|| {
                let mut buf = BytesMut::from(&frame[..]);
                decode_message(black_box(&mut buf))
            })
        });
    }

    let reply = json!({
        "ismaster": true,
        "maxBsonObjectSize": 16777216,
        "maxMessageSizeBytes": 48000000,
        "maxWriteBatchSize": 1000,
        "minWireVersion": 0,
        "maxWireVersion": 3,
        "ok": 1
    });
    group.bench_function("parse_node_descriptor", |b| {
        b.iter(|| NodeDescriptor::from_reply(black_box(&reply)))
    });

    group.finish();
}

criterion_group!(benches, resolver_benchmarks, codec_benchmarks);
criterion_main!(benches);
