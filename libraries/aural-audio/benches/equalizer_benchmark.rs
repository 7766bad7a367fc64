//! Equalizer per-block cost
//!
//! Run with: cargo bench -p aural-audio --bench equalizer_benchmark

use aural_audio::{GraphicEq, SpectrumAnalyzer, SpectrumConfig};
use aural_core::{AudioBlock, EqualizerPreset};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn sine_block(frames: usize, sample_rate: u32) -> AudioBlock {
    let samples = (0..frames)
        .flat_map(|i| {
            let t = i as f32 / sample_rate as f32;
            let s = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            [s, s]
        })
        .collect();
    AudioBlock::new(samples, sample_rate, 2, 0)
}

fn bench_equalizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("graphic_eq");

    for &frames in &[256usize, 1024, 4096] {
        let block = sine_block(frames, 44_100);
        group.throughput(Throughput::Elements(frames as u64));

        group.bench_with_input(BenchmarkId::new("flat", frames), &block, |b, block| {
            let mut eq = GraphicEq::new(44_100, 2);
            b.iter(|| black_box(eq.apply(block.clone())));
        });

        group.bench_with_input(BenchmarkId::new("v_shape", frames), &block, |b, block| {
            let mut eq = GraphicEq::new(44_100, 2);
            if let Some(preset) = EqualizerPreset::builtin("V-Shape") {
                eq.load_preset(&preset);
            }
            b.iter(|| black_box(eq.apply(block.clone())));
        });
    }

    group.finish();
}

fn bench_analyzer(c: &mut Criterion) {
    let block = sine_block(1024, 44_100);
    c.bench_function("spectrum_feed_1024", |b| {
        let mut analyzer = SpectrumAnalyzer::new(SpectrumConfig::default());
        let mut offset = 0u64;
        b.iter(|| {
            let mut block = block.clone();
            block.frame_offset = Some(offset);
            offset += 1024;
            black_box(analyzer.feed(&block))
        });
    });
}

criterion_group!(benches, bench_equalizer, bench_analyzer);
criterion_main!(benches);
