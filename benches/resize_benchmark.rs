use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use batchscale::{BatchResizer, CancellationSignal, ConcurrencyMode};
use image::{ImageBuffer, Rgb};
use std::path::Path;
use tempfile::TempDir;

const FILES: usize = 16;

fn source_tree(dir: &Path, width: u32, height: u32) {
    for i in 0..FILES {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x + i as u32) as u8, y as u8, (x ^ y) as u8])
        });
        img.save_with_format(dir.join(format!("bench{:02}.png", i)), image::ImageFormat::Png)
            .expect("failed to write benchmark image");
    }
}

fn benchmark_modes(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let mut group = c.benchmark_group("batch");
    group.sample_size(10);

    for &(width, height) in &[(256u32, 256u32), (1024, 768)] {
        let src = TempDir::new().expect("tempdir");
        source_tree(src.path(), width, height);
        let label = format!("{}x{}", width, height);

        for mode in [ConcurrencyMode::Sequential, ConcurrencyMode::Concurrent] {
            let resizer = BatchResizer::new(mode);
            group.bench_with_input(BenchmarkId::new(mode.as_str(), &label), &src, |b, src| {
                b.iter(|| {
                    let dest = TempDir::new().expect("tempdir");
                    runtime
                        .block_on(resizer.resize_images(
                            src.path(),
                            dest.path(),
                            0.5,
                            &CancellationSignal::new(),
                        ))
                        .expect("batch failed")
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, benchmark_modes);
criterion_main!(benches);
