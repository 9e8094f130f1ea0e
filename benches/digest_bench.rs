use criterion::{criterion_group, criterion_main, Criterion};
use packsmith::digest::DigestBuilder;
use packsmith::hasher::{self, ExcludeRules};
use packsmith::workload::Dependency;
use std::fs;
use tempfile::tempdir;

fn bench_digest(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path();

    // Mock project with VCS metadata the walk skips
    for i in 0..100 {
        fs::write(path.join(format!("file_{}.js", i)), format!("content {}", i)).unwrap();
    }
    fs::create_dir_all(path.join(".git/objects/ab")).unwrap();
    fs::write(path.join(".git/objects/ab/cdef"), "ignored").unwrap();

    let exclude = ExcludeRules::defaults();
    c.bench_function("directory checksum", |b| {
        b.iter(|| hasher::directory_checksum(path, &exclude).unwrap())
    });

    let fingerprints = hasher::collect_fingerprints(path, &exclude).unwrap();
    let dependencies: Vec<Dependency> = (0..50)
        .map(|i| Dependency::new(format!("dep-{}", i), "1.0.0"))
        .collect();
    c.bench_function("digest merge", |b| {
        b.iter(|| {
            DigestBuilder::new()
                .sources(&fingerprints)
                .dependencies(&dependencies)
                .config("build_args", &["PORT=3000"])
                .unwrap()
                .additional(Some("STAGE=prod"))
                .finish()
        })
    });
}

criterion_group!(benches, bench_digest);
criterion_main!(benches);
