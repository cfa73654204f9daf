//! Benchmarks for the stream hot path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sigflow_rs::analysis::{SpectrumAnalyzer, WindowFunction};
use sigflow_rs::pipeline::{FrameSpec, TimeBuffer, WindowResolver};
use sigflow_rs::{SampleType, Stream, StreamDescriptor};
use std::sync::Arc;
use std::time::Duration;

fn bench_buffer_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_write");

    for block in [16usize, 256, 4096].iter() {
        let descriptor = Arc::new(StreamDescriptor::new(1000.0, 3, SampleType::Float));
        let buffer = TimeBuffer::new(descriptor.clone(), 16_384);
        buffer.register_reader("idle");
        let stream = Stream::new(descriptor, *block);

        group.throughput(Throughput::Elements(*block as u64));
        group.bench_with_input(BenchmarkId::new("overwrite", block), block, |b, _| {
            b.iter(|| black_box(buffer.write(&stream).ok()));
        });
    }

    group.finish();
}

fn bench_buffer_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_read");
    let descriptor = Arc::new(StreamDescriptor::new(1000.0, 3, SampleType::Float));
    let buffer = TimeBuffer::new(descriptor.clone(), 16_384);
    let reader = buffer.register_reader("bench");

    for frame in [64usize, 1024].iter() {
        let source = Stream::new(descriptor.clone(), *frame);
        let mut window = Stream::new(descriptor.clone(), 0);

        group.throughput(Throughput::Elements(*frame as u64));
        group.bench_with_input(BenchmarkId::new("write_read_advance", frame), frame, |b, &n| {
            b.iter(|| {
                let _ = buffer.write(&source);
                let _ = buffer.read_next_into(reader, n, Duration::ZERO, &mut window);
                let _ = buffer.advance(reader, n);
                black_box(window.num())
            });
        });
    }

    group.finish();
}

fn bench_window_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_resolution");

    group.bench_function("fractional_frame_44100hz", |b| {
        let mut resolver = WindowResolver::new(&FrameSpec::new(0.1), 44_100.0).unwrap();
        b.iter(|| black_box(resolver.next_window()));
    });

    group.bench_function("overlapping_step", |b| {
        let mut resolver = WindowResolver::new(&FrameSpec::with_step(0.15, 0.05), 30.0).unwrap();
        b.iter(|| black_box(resolver.next_window()));
    });

    group.finish();
}

fn bench_spectrum(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectrum");

    for len in [64usize, 1000].iter() {
        let mut analyzer = SpectrumAnalyzer::new(*len, WindowFunction::Hann, true);
        let frame: Vec<f64> = (0..*len).map(|i| (i as f64 * 0.1).sin()).collect();
        let mut out = vec![0.0; analyzer.bins()];

        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::new("magnitudes", len), len, |b, _| {
            b.iter(|| analyzer.magnitudes_into(black_box(&frame), &mut out));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_buffer_write,
    bench_buffer_read,
    bench_window_resolution,
    bench_spectrum
);
criterion_main!(benches);
