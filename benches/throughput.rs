//! End-to-end throughput benchmarks.
//!
//! These benchmarks measure the full call path over the memory transport:
//! rkyv bodies, envelope codec, framing, multiplexing and server dispatch.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use tether::{Client, Context};
use tether_benches::EchoHarness;
use tokio::runtime::Runtime;

/// Benchmark unary echo calls at various payload sizes.
fn bench_unary_echo(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let harness = rt.block_on(EchoHarness::start()).unwrap();
    let mut group = c.benchmark_group("unary_echo");

    for size in [64, 1024, 10_240, 102_400] {
        let body = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.to_async(&rt).iter(|| async {
                let reply: Vec<u8> = harness
                    .client
                    .call(Context::new(), "Echo.Echo", black_box(body))
                    .await
                    .unwrap();
                black_box(reply);
            });
        });
    }

    group.finish();
    rt.block_on(harness.stop());
}

/// Benchmark concurrent unary calls sharing one connection.
fn bench_concurrent_calls(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let harness = rt.block_on(EchoHarness::start()).unwrap();
    let mut group = c.benchmark_group("concurrent_calls");

    for concurrency in [1, 8, 64] {
        let body = vec![0xABu8; 256];
        group.throughput(Throughput::Elements(concurrency as u64));

        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &body,
            |b, body| {
                b.to_async(&rt).iter(|| async {
                    let calls = (0..concurrency).map(|_| {
                        harness
                            .client
                            .call::<_, Vec<u8>>(Context::new(), "Echo.Echo", body)
                    });
                    for reply in join_all(calls).await {
                        black_box(reply.unwrap());
                    }
                });
            },
        );
    }

    group.finish();
    rt.block_on(harness.stop());
}

/// Benchmark client streams of fixed-size chunks.
fn bench_client_stream(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let harness = rt.block_on(EchoHarness::start()).unwrap();
    let mut group = c.benchmark_group("client_stream");

    for chunks in [4, 32, 128] {
        let chunk = vec![0xABu8; 1024];
        group.throughput(Throughput::Bytes((chunks * chunk.len()) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(chunks), &chunk, |b, chunk| {
            b.to_async(&rt).iter(|| async {
                let mut stream = harness
                    .client
                    .stream_in(Context::new(), "Echo.Sink")
                    .await
                    .unwrap();
                for _ in 0..chunks {
                    stream.send_item(chunk).await.unwrap();
                }
                let total: u64 = Client::finish(stream).await.unwrap();
                assert_eq!(total, (chunks * chunk.len()) as u64);
            });
        });
    }

    group.finish();
    rt.block_on(harness.stop());
}

criterion_group!(
    benches,
    bench_unary_echo,
    bench_concurrent_calls,
    bench_client_stream,
);

criterion_main!(benches);
