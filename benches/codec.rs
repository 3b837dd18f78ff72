//! Codec benchmarks - envelope encoding per content type.
//!
//! Every default content type encodes the same envelope so the framing and
//! envelope formats can be compared directly.

use std::collections::HashMap;
use std::hint::black_box;
use std::sync::Arc;

use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tether_codec::{default_codecs, resolve, Codec};
use tether_core::Envelope;

const CONTENT_TYPES: [&str; 4] = [
    "application/grpc",
    "application/protobuf",
    "application/json",
    "application/octet-stream",
];

fn request(payload_size: usize) -> Envelope {
    let mut headers = HashMap::new();
    headers.insert("x-trace-id".to_string(), "4bf92f3577b34da6".to_string());
    headers.insert("tether-timeout-ms".to_string(), "5000".to_string());
    Envelope::request(
        42,
        "BenchService",
        "Echo",
        headers,
        vec![0xABu8; payload_size],
    )
}

fn codec(content_type: &str) -> Arc<dyn Codec> {
    resolve(&default_codecs(), content_type).unwrap()
}

/// Benchmark envelope encoding for each content type.
fn bench_envelope_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_encode");

    for size in [64, 1024, 102_400] {
        let envelope = request(size);
        group.throughput(Throughput::Bytes(size as u64));

        for content_type in CONTENT_TYPES {
            let codec = codec(content_type);
            group.bench_with_input(
                BenchmarkId::new(content_type, size),
                &envelope,
                |b, envelope| {
                    let mut buf = BytesMut::with_capacity(size + 256);
                    b.iter(|| {
                        buf.clear();
                        codec.encode(black_box(envelope), &mut buf).unwrap();
                        black_box(&buf);
                    });
                },
            );
        }
    }

    group.finish();
}

/// Benchmark envelope decoding for each content type.
fn bench_envelope_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_decode");

    for size in [64, 1024, 102_400] {
        group.throughput(Throughput::Bytes(size as u64));

        for content_type in CONTENT_TYPES {
            let codec = codec(content_type);
            let mut encoded = BytesMut::new();
            codec.encode(&request(size), &mut encoded).unwrap();

            group.bench_with_input(
                BenchmarkId::new(content_type, size),
                &encoded,
                |b, encoded| {
                    b.iter(|| {
                        let mut buf = encoded.clone();
                        let envelope = codec.decode(black_box(&mut buf)).unwrap().unwrap();
                        black_box(envelope);
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_envelope_encode, bench_envelope_decode);

criterion_main!(benches);
