//! Integration test: drive the `ocibake` binary end to end.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p ocibake-cli --test cli_integration
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Run an ocibake command and return (stdout, stderr, success).
fn run_cmd(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_ocibake"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run `ocibake {}`: {}", args.join(" "), e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run an ocibake command, assert success, return stdout.
fn run_ok(args: &[&str]) -> String {
    let (stdout, stderr, success) = run_cmd(args);
    assert!(
        success,
        "Command `ocibake {}` failed.\nstdout: {}\nstderr: {}",
        args.join(" "),
        stdout,
        stderr,
    );
    stdout
}

/// A universal app variant with no layers on top of nothing, published as
/// example/app:1.0.0.
fn write_plan(dir: &Path) -> PathBuf {
    std::fs::write(
        dir.join("app.json"),
        r#"{"imageReference":"example/app:1.0","user":"app","layers":[{"createdBy":"config only"}]}"#,
    )
    .unwrap();
    let plan = r#"{
        "variants": [
            { "component": "org:app", "metadata": "app.json" }
        ],
        "images": [
            { "roots": [ { "component": "org:app", "tags": ["1.0.0"] } ],
              "platforms": "linux,amd64 | linux,arm64" }
        ]
    }"#;
    let path = dir.join("plan.json");
    std::fs::write(&path, plan).unwrap();
    path
}

#[test]
fn test_bake_layout() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(dir.path());
    let out = dir.path().join("out");

    let stdout = run_ok(&["bake", plan.to_str().unwrap(), "-o", out.to_str().unwrap()]);
    let line = stdout.lines().next().unwrap();
    let (reference, digest) = line.split_once(' ').unwrap();
    assert_eq!(reference, "example/app:1.0.0");
    assert!(digest.starts_with("sha256:"));

    let index: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join("index.json")).unwrap()).unwrap();
    assert_eq!(index["manifests"][0]["digest"], digest);
}

#[test]
fn test_bake_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(dir.path());
    let out = dir.path().join("out");
    let args = ["bake", plan.to_str().unwrap(), "-o", out.to_str().unwrap(), "--quiet"];

    let first = run_ok(&args);
    let second = run_ok(&args);
    assert_eq!(first, second);
}

#[test]
fn test_bake_registry_with_platform_override() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(dir.path());
    let out = dir.path().join("registry");

    run_ok(&[
        "bake",
        plan.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "--format",
        "registry",
        "--platform",
        "linux,arm64",
    ]);
    assert!(out
        .join("repositories/example/app/_manifests/tags/1.0.0/current/link")
        .exists());
}

#[test]
fn test_bake_without_selector_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("app.json"), r#"{"imageReference":"example/app"}"#).unwrap();
    std::fs::write(
        dir.path().join("plan.json"),
        r#"{"variants":[{"component":"app","metadata":"app.json"}],"images":[{"roots":[{"component":"app"}]}]}"#,
    )
    .unwrap();
    let plan = dir.path().join("plan.json");
    let out = dir.path().join("out");

    let (_, stderr, success) = run_cmd(&["bake", plan.to_str().unwrap(), "-o", out.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Error: Platform selection failed"), "{}", stderr);
    assert!(stderr.contains("a platform selector is required"), "{}", stderr);
}

#[test]
fn test_platforms() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(dir.path());
    let stdout = run_ok(&["platforms", plan.to_str().unwrap()]);
    assert!(stdout.contains("org:app"));
    assert!(stdout.contains("<all platforms>"));
}

#[test]
fn test_filter() {
    let stdout = run_ok(&["filter", "@linux,amd64", "@linux,arm64", "--matches", "linux,arm64"]);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["@linux,amd64+arm64", "linux,arm64: matches"]);
}

#[test]
fn test_invalid_filter_exits_nonzero() {
    let (_, stderr, success) = run_cmd(&["filter", "linux"]);
    assert!(!success);
    assert!(stderr.contains("Invalid platform filter"), "{}", stderr);
}
