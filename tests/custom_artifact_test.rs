mod common;

use common::{entries, packager, test_config, write, RecordingRunner};
use packsmith::archive::{self, read_archive, ArchiveFormat, ArchiveOptions};
use packsmith::workload::CustomArtifact;
use packsmith::{Artifact, Outcome, Packager, PackagingError, Packaging, Workload};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn artifact_workload(name: &str, path: &Path) -> Workload {
    Workload::new(
        name,
        Packaging::CustomArtifact(CustomArtifact {
            package_path: path.to_path_buf(),
            handler: Some("index.handler".to_string()),
        }),
    )
}

#[tokio::test]
async fn test_directory_is_zipped_then_skipped() {
    let root = tempdir().unwrap();
    let src = root.path().join("fn");
    write(&src, "index.js", "exports.handler = async () => 'ok'");
    write(&src, "lib/util.js", "module.exports = 1");
    write(&src, ".git/HEAD", "ref: refs/heads/main");

    let packager = packager(root.path(), Arc::new(RecordingRunner::new()));
    let mut workload = artifact_workload("fn", &src);

    let first = packager.package(&workload).await.unwrap().into_results();
    assert_eq!(first.len(), 1);
    let result = &first[0];
    assert_eq!(result.outcome, Outcome::Bundled);
    let Some(Artifact::Archive { path, files, handler }) = &result.artifact else {
        panic!("expected an archive artifact");
    };
    assert_eq!(files, &vec!["index.js".to_string(), "lib/util.js".to_string()]);
    assert_eq!(handler.as_deref(), Some("index.handler"));
    assert_eq!(result.size, Some(fs::metadata(path).unwrap().len()));
    assert_eq!(path, &root.path().join("out").join("fn").join("fn.zip"));

    // Same inputs with the digest already deployed: no new artifact.
    fs::remove_dir_all(root.path().join("out")).unwrap();
    workload.existing_digests.insert(result.digest.clone());
    let second = packager.package(&workload).await.unwrap().into_results();
    assert_eq!(second[0].outcome, Outcome::Skipped);
    assert_eq!(second[0].size, None);
    assert_eq!(second[0].digest, result.digest);
    assert!(!root.path().join("out").join("fn").join("fn.zip").exists());
}

#[tokio::test]
async fn test_digest_ignores_vcs_metadata_and_tracks_content() {
    let root = tempdir().unwrap();
    let src = root.path().join("fn");
    write(&src, "index.js", "v1");
    let packager = packager(root.path(), Arc::new(RecordingRunner::new()));
    let workload = artifact_workload("fn", &src);

    let first = packager.package(&workload).await.unwrap().into_results();
    write(&src, ".git/ORIG_HEAD", "ignored");
    let unchanged = packager.package(&workload).await.unwrap().into_results();
    assert_eq!(first[0].digest, unchanged[0].digest);

    write(&src, "index.js", "v2");
    let changed = packager.package(&workload).await.unwrap().into_results();
    assert_ne!(first[0].digest, changed[0].digest);
}

#[tokio::test]
async fn test_prebuilt_directory_keeps_build_output_names() {
    let root = tempdir().unwrap();
    let src = root.path().join("layer");
    write(&src, "handler.py", "def handler(e, c): pass");
    write(&src, "coverage/__init__.py", "# vendored package");
    write(&src, ".next/BUILD_ID", "build-1");
    write(&src, "pkg/__pycache__/mod.cpython-312.pyc", "bytecode");
    write(&src, ".git/HEAD", "ref: refs/heads/main");

    let packager = packager(root.path(), Arc::new(RecordingRunner::new()));
    let results = packager
        .package(&artifact_workload("layer", &src))
        .await
        .unwrap()
        .into_results();

    let Some(Artifact::Archive { path, .. }) = &results[0].artifact else {
        panic!("expected an archive artifact");
    };
    let names: Vec<String> = read_archive(path)
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .collect();
    assert_eq!(
        names,
        vec![
            ".next/BUILD_ID",
            "coverage/__init__.py",
            "handler.py",
            "pkg/__pycache__/mod.cpython-312.pyc",
        ]
    );
}

#[tokio::test]
async fn test_additional_digest_input_changes_digest() {
    let root = tempdir().unwrap();
    let src = root.path().join("fn");
    write(&src, "index.js", "same");
    let packager = packager(root.path(), Arc::new(RecordingRunner::new()));

    let mut prod = artifact_workload("fn", &src);
    prod.additional_digest_input = Some("STAGE=prod".to_string());
    let mut dev = artifact_workload("fn", &src);
    dev.additional_digest_input = Some("STAGE=dev".to_string());

    let a = packager.package(&prod).await.unwrap().into_results();
    let b = packager.package(&dev).await.unwrap().into_results();
    assert_ne!(a[0].digest, b[0].digest);
}

#[tokio::test]
async fn test_size_limit_produces_no_archive() {
    let root = tempdir().unwrap();
    let src = root.path().join("big");
    write(&src, "blob.bin", &"x".repeat(4096));

    let mut config = test_config(root.path());
    config.max_artifact_bytes = 1024;
    let packager = Packager::new(config).with_runner(Arc::new(RecordingRunner::new()));

    let err = packager
        .package(&artifact_workload("big", &src))
        .await
        .unwrap_err();
    match &err {
        PackagingError::SizeLimitExceeded {
            actual_bytes,
            limit_bytes,
            ..
        } => {
            assert_eq!(*actual_bytes, 4096);
            assert_eq!(*limit_bytes, 1024);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("exceeds the maximum allowed size"));
    assert!(entries(&root.path().join("out").join("big")).is_empty());
}

#[tokio::test]
async fn test_prebuilt_zip_is_copied_not_rearchived() {
    let root = tempdir().unwrap();
    let src = root.path().join("build");
    write(&src, "bootstrap", "#!/bin/sh");
    write(&src, "handler.py", "def handler(e, c): pass");
    let prebuilt = archive::archive(
        &src,
        &root.path().join("dist"),
        ArchiveFormat::Zip,
        &ArchiveOptions {
            executable_patterns: vec!["bootstrap".to_string()],
            ..Default::default()
        },
    )
    .unwrap();

    let packager = packager(root.path(), Arc::new(RecordingRunner::new()));
    let results = packager
        .package(&artifact_workload("prebuilt", &prebuilt.path))
        .await
        .unwrap()
        .into_results();

    let Some(Artifact::Archive { path, files, .. }) = &results[0].artifact else {
        panic!("expected an archive artifact");
    };
    assert_eq!(files, &vec!["bootstrap".to_string(), "handler.py".to_string()]);
    assert_eq!(fs::read(path).unwrap(), fs::read(&prebuilt.path).unwrap());
    let copied = read_archive(path).unwrap();
    assert!(copied[0].executable);
}

#[tokio::test]
async fn test_missing_path_is_input_error() {
    let root = tempdir().unwrap();
    let packager = packager(root.path(), Arc::new(RecordingRunner::new()));
    let err = packager
        .package(&artifact_workload("ghost", &root.path().join("nope")))
        .await
        .unwrap_err();
    assert!(matches!(err, PackagingError::SourceNotFound { .. }));
    assert_eq!(err.kind(), packsmith::ErrorKind::Input);
}
