//! Output-stage benchmarks
//!
//! Run with: cargo bench --bench kernels

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qgemm_output::*;

// Block shapes a GEMM driver typically hands to the output pipeline
const BLOCKS: [(usize, usize); 5] = [(1, 512), (4, 256), (12, 64), (64, 64), (120, 17)];

fn accumulators(len: usize) -> Vec<i32> {
    (0..len).map(|i| ((i * 7919) % 60_001) as i32 - 30_000).collect()
}

fn requantize_with<I: InstructionSet>(
    stage: &ReQuantizeOutput<'_, DoNothing<u8>>,
    out: &mut [u8],
    acc: &mut [i32],
    block: &BlockType,
) {
    let _ = stage.apply::<I>(out, Source::buffer(acc, block.col_size), block, block.col_size);
}

// ============================================================================
// Requantization Benchmarks
// ============================================================================

fn bench_requantize(c: &mut Criterion) {
    let mut group = c.benchmark_group("requantize_u8");

    for &(m, n) in &BLOCKS {
        let zps: Vec<i32> = (0..n).map(|j| (j % 3) as i32).collect();
        let mults: Vec<f32> = (0..n).map(|j| 0.002 + j as f32 * 1e-5).collect();
        let rows: Vec<i32> = (0..m).map(|i| 1000 + i as i32).collect();
        let cols: Vec<i32> = (0..n).map(|j| j as i32 - 40).collect();
        let bias: Vec<i32> = (0..n).map(|j| j as i32 * 3).collect();
        let params = RequantizationParams::new(3, &zps, &mults, 128, n)
            .with_row_offsets(&rows)
            .with_col_offsets(&cols)
            .with_bias(&bias);
        let done = DoNothing::<u8>::new();
        let Ok(stage) = ReQuantizeOutput::new(&done, params, Granularity::OutChannel, true) else {
            continue;
        };
        let block = BlockType::new(0, m, 0, n);
        let mut acc = accumulators(m * n);
        let mut out = vec![0u8; m * n];

        group.throughput(Throughput::Elements((m * n) as u64));
        group.bench_with_input(BenchmarkId::new("scalar", format!("{}x{}", m, n)), &(m, n), |bencher, _| {
            bencher.iter(|| requantize_with::<AnyArch>(&stage, &mut out, black_box(&mut acc), &block));
        });
        if IsaKind::Avx2.is_supported() {
            group.bench_with_input(BenchmarkId::new("avx2", format!("{}x{}", m, n)), &(m, n), |bencher, _| {
                bencher.iter(|| requantize_with::<Avx2>(&stage, &mut out, black_box(&mut acc), &block));
            });
        }
        if IsaKind::Neon.is_supported() {
            group.bench_with_input(BenchmarkId::new("neon", format!("{}x{}", m, n)), &(m, n), |bencher, _| {
                bencher.iter(|| requantize_with::<Neon>(&stage, &mut out, black_box(&mut acc), &block));
            });
        }
    }

    group.finish();
}

// ============================================================================
// Float Output Benchmarks
// ============================================================================

fn bench_dequantize(c: &mut Criterion) {
    let mut group = c.benchmark_group("dequantize_f32");

    for &(m, n) in &BLOCKS {
        let zps = [2];
        let scales = [0.01f32];
        let rows: Vec<i32> = (0..m).map(|i| 1000 + i as i32).collect();
        let cols: Vec<i32> = (0..n).map(|j| j as i32 - 40).collect();
        let bias: Vec<f32> = (0..n).map(|j| j as f32 * 0.1).collect();
        let params = DequantizationParams::new(3, 0.05, &zps, &scales, &rows, n)
            .with_col_offsets(&cols)
            .with_bias(&bias);
        let done = DoNothing::<f32>::new();
        let Ok(stage) = ReQuantizeForFloat::new(&done, params, Granularity::Tensor, false) else {
            continue;
        };
        let block = BlockType::new(0, m, 0, n);
        let mut acc = accumulators(m * n);
        let mut out = vec![0.0f32; m * n];

        group.throughput(Throughput::Elements((m * n) as u64));
        group.bench_with_input(BenchmarkId::new("scalar", format!("{}x{}", m, n)), &(m, n), |bencher, _| {
            bencher.iter(|| {
                let _ = stage.apply::<AnyArch>(&mut out, Source::buffer(black_box(&mut acc), n), &block, n);
            });
        });
    }

    group.finish();
}

// ============================================================================
// Sparse Fusion Benchmarks
// ============================================================================

fn bench_spmdm(c: &mut Criterion) {
    let mut group = c.benchmark_group("spmdm_requantize");

    for &density in &[0.05f64, 0.2] {
        let (m, k, n) = (64, 256, 64);
        let step = (1.0 / density) as usize;
        let dense: Vec<i8> = (0..k * n).map(|i| if i % step == 0 { (i % 13) as i8 - 6 } else { 0 }).collect();
        let csc = CompressedSparseColumn::from_dense(k, n, &dense);
        let a: Vec<u8> = (0..m * k).map(|i| (i % 251) as u8).collect();

        let zps = [0];
        let mults = [0.001f32];
        let params = RequantizationParams::new(0, &zps, &mults, 128, n);
        let done = DoNothing::<u8>::new();
        let Ok(requant) = ReQuantizeOutput::new(&done, params, Granularity::Tensor, false) else {
            continue;
        };
        let Ok(stage) = DoSpmdmOnInpBuffer::new(&requant, &a, k, &csc, 1) else {
            continue;
        };
        let block = BlockType::new(0, m, 0, n);
        let mut acc = vec![0i32; m * n];
        let mut out = vec![0u8; m * n];

        group.throughput(Throughput::Elements((m * n) as u64));
        group.bench_with_input(BenchmarkId::new("scalar", format!("density_{}", density)), &density, |bencher, _| {
            bencher.iter(|| {
                acc.fill(0);
                let _ = stage.apply::<AnyArch>(&mut out, Source::buffer(black_box(&mut acc), n), &block, n);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_requantize, bench_dequantize, bench_spmdm);
criterion_main!(benches);
