//! Benchmark: decompression and JSON tokenizing through [`streamdec::Pump`]
//! with varying buffer sizes.
#![allow(missing_docs)]

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use streamdec::{
    ByteBuffer, Decoder, FnSink, Pump, SliceSource,
    compress::ZlibDecoder,
    json::{JsonDecoder, MIN_SRC_CAPACITY, Token, TokenBuffer},
};

/// A deterministic array of small objects, at least `target_len` bytes long.
fn make_json_payload(target_len: usize) -> String {
    let mut s = String::from("[");
    let mut i = 0u64;
    while s.len() < target_len {
        if i > 0 {
            s.push(',');
        }
        s.push_str(&format!(r#"{{"id":{i},"name":"item {i}","ok":true,"score":{}.5}}"#, i % 97));
        i += 1;
    }
    s.push(']');
    s
}

fn inflate(zlib: &[u8], src_len: usize, dst_len: usize) -> usize {
    let mut decoder = ZlibDecoder::default();
    let mut workbuf = vec![0; decoder.workbuf_len().max];
    let mut produced = 0usize;
    let mut sink = FnSink(|out: &[u8], _: &[u8]| {
        produced += out.len();
        Ok::<_, streamdec::BoxError>(())
    });
    Pump::default()
        .run(
            &mut decoder,
            &mut SliceSource::new(zlib),
            &mut sink,
            &mut ByteBuffer::with_capacity(src_len),
            &mut ByteBuffer::with_capacity(dst_len),
            &mut workbuf,
        )
        .unwrap();
    produced
}

fn tokenize(json: &[u8], dst_len: usize) -> usize {
    let mut count = 0usize;
    let mut sink = FnSink(|tokens: &[Token], _: &[u8]| {
        count += tokens.len();
        Ok::<_, streamdec::BoxError>(())
    });
    Pump::default()
        .run(
            &mut JsonDecoder::default(),
            &mut SliceSource::new(json),
            &mut sink,
            &mut ByteBuffer::with_capacity(MIN_SRC_CAPACITY.max(4096)),
            &mut TokenBuffer::with_capacity(dst_len),
            &mut [],
        )
        .unwrap();
    count
}

fn bench_decode(c: &mut Criterion) {
    let payload = make_json_payload(1 << 20);
    let zlib = miniz_oxide::deflate::compress_to_vec_zlib(payload.as_bytes(), 6);

    let mut group = c.benchmark_group("zlib");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    for &(src_len, dst_len) in &[(64usize, 64usize), (4096, 4096), (65_536, 65_536)] {
        group.bench_with_input(
            BenchmarkId::new("inflate", format!("{src_len}x{dst_len}")),
            &(src_len, dst_len),
            |b, &(s, d)| b.iter(|| black_box(inflate(black_box(&zlib), s, d))),
        );
    }
    group.finish();

    let mut group = c.benchmark_group("json");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    for &dst_len in &[16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("tokens", dst_len), &dst_len, |b, &d| {
            b.iter(|| black_box(tokenize(black_box(payload.as_bytes()), d)));
        });
    }
    group.finish();
}

fn criterion() -> Criterion {
    let mut c = Criterion::default();
    if cfg!(feature = "bench-fast") {
        c = c
            .warm_up_time(Duration::from_millis(10))
            .measurement_time(Duration::from_millis(100))
            .sample_size(10);
    } else {
        c = c
            .warm_up_time(Duration::from_secs(3))
            .measurement_time(Duration::from_secs(10));
    }
    c
}

criterion_group! { name = benches; config = criterion(); targets = bench_decode }
criterion_main!(benches);
