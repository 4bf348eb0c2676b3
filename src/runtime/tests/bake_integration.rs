//! Integration test: bake build plans end to end.
//!
//! Each test writes variant metadata, layer files and a build plan into a
//! temporary directory, bakes it, and inspects the output tree.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p ocibake-runtime --test bake_integration
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use oci_spec::image::{ImageConfiguration, ImageIndex, ImageManifest};
use ocibake_core::{BakeConfig, BakeError, CancelToken, Digest, DigestAlgorithm, OutputKind};
use ocibake_runtime::Baker;
use serde_json::json;
use tempfile::TempDir;

/// Write one variant (metadata document plus a single layer) and return its
/// plan entry.
fn variant(dir: &Path, name: &str, platforms: Option<&[&str]>, user: &str) -> serde_json::Value {
    let layer = format!("{}.tar.gz", name);
    let content = format!("{} layer content", name);
    std::fs::write(dir.join(&layer), &content).unwrap();
    let digest = Digest::of_bytes(DigestAlgorithm::Sha256, content.as_bytes());

    let metadata = json!({
        "imageReference": format!("example/{}:1.0", name),
        "creationTime": "2024-01-01T00:00:00Z",
        "user": user,
        "environment": { "PATH": "/usr/bin" },
        "ports": ["8080/tcp"],
        "entryPoint": ["/bin/sh"],
        "layers": [
            {
                "descriptor": {
                    "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                    "digest": digest.to_string(),
                    "size": content.len(),
                    "diffId": digest.to_string(),
                },
                "createdBy": format!("ADD {}", layer),
            },
            { "createdBy": "ENV PATH=/usr/bin" },
        ],
    });
    let metadata_file = format!("{}.json", name);
    std::fs::write(dir.join(&metadata_file), metadata.to_string()).unwrap();

    let mut entry = json!({
        "component": format!("org:{}", name),
        "metadata": metadata_file,
        "layers": [layer],
    });
    if let Some(platforms) = platforms {
        entry["platforms"] = json!(platforms);
    }
    entry
}

fn depends_on(mut entry: serde_json::Value, component: &str) -> serde_json::Value {
    entry["dependencies"] = json!([{ "component": component }]);
    entry
}

/// Base for two platforms, an app on top of it, published with two tags.
fn write_plan(dir: &Path, app_user: &str) -> PathBuf {
    let plan = json!({
        "variants": [
            variant(dir, "base", Some(&["linux,amd64", "linux,arm64,v8"]), "root"),
            depends_on(variant(dir, "app", None, app_user), "org:base"),
        ],
        "images": [
            { "roots": [{ "component": "org:app", "name": "example/app", "tags": ["1.0.0", "latest"] }] },
            { "roots": [{ "component": "org:base", "name": "example/base" }] },
        ],
    });
    let path = dir.join("plan.json");
    std::fs::write(&path, plan.to_string()).unwrap();
    path
}

fn bake(plan: &Path, out: &Path, output: OutputKind) -> ocibake_core::Result<Vec<ocibake_runtime::BakeResult>> {
    let config = BakeConfig {
        output,
        docker_manifest: true,
        ..Default::default()
    };
    Baker::from_file(plan, config, CancelToken::new())?.bake(out, None)
}

/// Every file under `root`, keyed by relative path.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, files: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, files);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                files.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }
    let mut files = BTreeMap::new();
    walk(root, root, &mut files);
    files
}

fn blob(out: &Path, digest: &str) -> Vec<u8> {
    let (algorithm, hex) = digest.split_once(':').unwrap();
    std::fs::read(out.join("blobs").join(algorithm).join(hex)).unwrap()
}

#[test]
fn test_bake_is_reproducible() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let out_a = TempDir::new().unwrap();
    let out_b = TempDir::new().unwrap();

    let a = bake(&write_plan(first.path(), "app"), out_a.path(), OutputKind::Layout).unwrap();
    let b = bake(&write_plan(second.path(), "app"), out_b.path(), OutputKind::Layout).unwrap();

    assert_eq!(a, b);
    assert_eq!(snapshot(out_a.path()), snapshot(out_b.path()));
}

#[test]
fn test_rebake_into_same_output() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let plan = write_plan(dir.path(), "app");

    let first = bake(&plan, out.path(), OutputKind::Layout).unwrap();
    let before = snapshot(out.path());
    let second = bake(&plan, out.path(), OutputKind::Layout).unwrap();

    assert_eq!(first, second);
    assert_eq!(before, snapshot(out.path()));
}

#[test]
fn test_tags_share_index() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let results = bake(&write_plan(dir.path(), "app"), out.path(), OutputKind::Layout).unwrap();

    let references: Vec<String> = results.iter().map(|r| r.reference.to_string()).collect();
    assert_eq!(
        references,
        vec!["example/app:1.0.0", "example/app:latest", "example/base:1.0"]
    );
    assert_eq!(results[0].digest, results[1].digest);
    assert_ne!(results[0].digest, results[2].digest);

    let index: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.path().join("index.json")).unwrap()).unwrap();
    assert_eq!(index["manifests"].as_array().unwrap().len(), 3);
}

#[test]
fn test_documents_parse_as_oci() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let results = bake(&write_plan(dir.path(), "app"), out.path(), OutputKind::Layout).unwrap();
    let app = &results[0];

    let index: ImageIndex = serde_json::from_slice(&blob(out.path(), &app.digest.to_string())).unwrap();
    assert_eq!(index.manifests().len(), 2);

    let mut architectures = Vec::new();
    for descriptor in index.manifests() {
        let platform = descriptor.platform().as_ref().unwrap();
        architectures.push(platform.architecture().to_string());

        let manifest: ImageManifest =
            serde_json::from_slice(&blob(out.path(), &descriptor.digest().to_string())).unwrap();
        // base and app each contribute one layer
        assert_eq!(manifest.layers().len(), 2);

        let config: ImageConfiguration =
            serde_json::from_slice(&blob(out.path(), &manifest.config().digest().to_string())).unwrap();
        assert_eq!(config.os().to_string(), "linux");
        assert_eq!(config.rootfs().diff_ids().len(), 2);
        // every declared layer has a history entry, metadata-only ones included
        assert_eq!(config.history().len(), 4);

        let container = config.config().as_ref().unwrap();
        assert_eq!(container.user().as_deref(), Some("app"));
        assert_eq!(
            container.entrypoint().as_ref().unwrap(),
            &vec!["/bin/sh".to_string()]
        );
    }
    assert_eq!(architectures, vec!["amd64", "arm64"]);
}

#[test]
fn test_shared_layers_stored_once() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    bake(&write_plan(dir.path(), "app"), out.path(), OutputKind::Layout).unwrap();

    let content = "base layer content";
    let digest = Digest::of_bytes(DigestAlgorithm::Sha256, content.as_bytes());
    assert_eq!(blob(out.path(), &digest.to_string()), content.as_bytes());

    let docker: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.path().join("manifest.json")).unwrap()).unwrap();
    // two platforms for the app, two for the base
    assert_eq!(docker.as_array().unwrap().len(), 4);
}

#[test]
fn test_hash_collision() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(dir.path(), "app");

    let scratch = TempDir::new().unwrap();
    let results = bake(&plan, scratch.path(), OutputKind::Layout).unwrap();
    let digest = &results[0].digest;

    let out = TempDir::new().unwrap();
    let path = out.path().join("blobs/sha256").join(digest.encoded());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"not the index").unwrap();

    let err = bake(&plan, out.path(), OutputKind::Layout).unwrap_err();
    assert!(matches!(err, BakeError::HashCollision { .. }), "{}", err);
}

#[test]
fn test_registry_tag_conflict() {
    let out = TempDir::new().unwrap();

    let first = TempDir::new().unwrap();
    bake(&write_plan(first.path(), "app"), out.path(), OutputKind::Registry).unwrap();

    let second = TempDir::new().unwrap();
    let err = bake(&write_plan(second.path(), "nobody"), out.path(), OutputKind::Registry).unwrap_err();
    match err {
        BakeError::TagConflict { repository, tag, .. } => {
            assert_eq!(repository, "example/app");
            assert_eq!(tag, "1.0.0");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_sha512_output() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let config = BakeConfig {
        digest_algorithm: DigestAlgorithm::Sha512,
        ..Default::default()
    };
    let results = Baker::from_file(&write_plan(dir.path(), "app"), config, CancelToken::new())
        .unwrap()
        .bake(out.path(), None)
        .unwrap();
    assert_eq!(results[0].digest.algorithm(), DigestAlgorithm::Sha512);
    assert!(out
        .path()
        .join("blobs/sha512")
        .join(results[0].digest.encoded())
        .exists());
}
