//! Performance benchmarks for DataFlow analysis
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dataflow::analysis::{CompatibilityAnalyzer, FileSetAnalyzer};
use dataflow::core::build_batches;
use dataflow::model::{Endpoint, EndpointKind, Manifest, ManifestEntry};
use std::fs::File;
use std::io::Write;
use tempfile::TempDir;

const EXTENSIONS: &[&str] = &["txt", "jpg", "csv", "mp4", "log", "zip", "json", "bin"];

/// Manifest of `count` files with mixed types and sizes
fn synthetic_manifest(count: usize) -> Manifest {
    (0..count)
        .map(|i| {
            let ext = EXTENSIONS[i % EXTENSIONS.len()];
            let size = ((i as u64 * 7919) % (64 * 1024 * 1024)) + 1;
            ManifestEntry::new(format!("dir_{}/file_{}.{}", i % 50, i, ext), size)
        })
        .collect()
}

fn bench_fileset_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("fileset_analysis");
    let analyzer = FileSetAnalyzer::new();

    for count in [1_000usize, 10_000, 100_000].iter() {
        let manifest = synthetic_manifest(*count);
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("analyze", count), &manifest, |b, manifest| {
            b.iter(|| black_box(analyzer.analyze(manifest)));
        });
    }

    group.finish();
}

fn bench_build_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_batches");
    let manifest = synthetic_manifest(100_000);

    for batch_size in [100 * 1024 * 1024u64, 1024 * 1024 * 1024].iter() {
        group.bench_with_input(
            BenchmarkId::new(
                "greedy",
                humansize::format_size(*batch_size, humansize::BINARY),
            ),
            batch_size,
            |b, &batch_size| {
                b.iter(|| black_box(build_batches(&manifest, batch_size)));
            },
        );
    }

    group.finish();
}

fn bench_compatibility(c: &mut Criterion) {
    let analyzer = CompatibilityAnalyzer::new();
    let source = Endpoint::database("PostgreSQL", "db1:5432").with_os("linux");
    let destination = Endpoint::new(EndpointKind::NetworkShare, "//nas/share")
        .with_protocol("smb")
        .with_os("windows");

    c.bench_function("compatibility_db_to_share", |b| {
        b.iter(|| black_box(analyzer.analyze(&source, &destination)));
    });
}

fn bench_manifest_scan(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();

    for i in 0..10 {
        let subdir = dir.path().join(format!("subdir_{}", i));
        std::fs::create_dir_all(&subdir).unwrap();

        for j in 0..100 {
            let mut file = File::create(subdir.join(format!("file_{}.txt", j))).unwrap();
            file.write_all(&[b'x'; 1024]).unwrap();
        }
    }

    c.bench_function("manifest_from_1000_files", |b| {
        b.iter(|| black_box(Manifest::from_dir(dir.path()).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_fileset_analysis,
    bench_build_batches,
    bench_compatibility,
    bench_manifest_scan
);
criterion_main!(benches);
