//! Benchmarks for height field synthesis and chunk meshing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use islet_world::{ChunkMeshBuilder, ColorLut, HeightField, MeshingConfig, TerrainParams};

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("heightfield");

    for side in [128usize, 256, 512] {
        group.bench_with_input(BenchmarkId::new("generate", side), &side, |b, &side| {
            let mut field = HeightField::with_side(side);
            let params = TerrainParams::default();
            b.iter(|| field.generate(black_box(&params)));
        });
    }

    group.finish();
}

fn bench_meshing(c: &mut Criterion) {
    let mut group = c.benchmark_group("meshing");

    let mut field = HeightField::with_side(256);
    field.generate(&TerrainParams::default());
    let lut = ColorLut::default();

    for chunk_size in [32usize, 64, 128] {
        let builder = ChunkMeshBuilder::new(
            &field,
            &lut,
            MeshingConfig::default().with_chunk_size(chunk_size),
        );
        group.bench_function(BenchmarkId::new("sequential", chunk_size), |b| {
            b.iter(|| black_box(builder.build()));
        });
        group.bench_function(BenchmarkId::new("parallel", chunk_size), |b| {
            b.iter(|| black_box(builder.build_parallel()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_generate, bench_meshing);
criterion_main!(benches);
