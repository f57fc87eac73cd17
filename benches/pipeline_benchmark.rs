use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgb, RgbImage};
use platenorm::{BBox, CandidateBuilder, RecognizedLine, Region, VariantGenerator, VariantMethod};

/// Light plate on a dark background, `scale` times the 200x80 base size.
fn synthetic_plate(scale: u32) -> Region {
    let (w, h) = (200 * scale, 80 * scale);
    let img = RgbImage::from_fn(w, h, |x, y| {
        let inside = x >= 20 * scale && x < 180 * scale && y >= 15 * scale && y < 65 * scale;
        if inside { Rgb([235, 235, 235]) } else { Rgb([40, 40, 40]) }
    });
    Region::new(img, BBox::new(0, 0, w - 1, h - 1))
}

fn benchmark_variant_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("variant_generation");
    group.sample_size(20);

    let generator = VariantGenerator::default();
    for scale in [1u32, 2] {
        let region = synthetic_plate(scale);
        group.bench_with_input(BenchmarkId::new("rectified", scale), &region, |b, region| {
            b.iter(|| generator.generate(black_box(region), true))
        });
        group.bench_with_input(BenchmarkId::new("unrectified", scale), &region, |b, region| {
            b.iter(|| generator.generate(black_box(region), false))
        });
    }

    group.finish();
}

fn benchmark_candidate_build(c: &mut Criterion) {
    let builder = CandidateBuilder::default();
    let single = [RecognizedLine::new("3OA-I23.4S", 0.8)];
    let double = [RecognizedLine::new("29AA", 0.8), RecognizedLine::new("I2345", 0.7)];

    c.bench_function("build_single_line", |b| {
        b.iter(|| builder.build(black_box(&single), VariantMethod::Gray, 0))
    });
    c.bench_function("build_two_lines", |b| {
        b.iter(|| builder.build(black_box(&double), VariantMethod::Binary, 0))
    });
}

criterion_group!(benches, benchmark_variant_generation, benchmark_candidate_build);
criterion_main!(benches);
