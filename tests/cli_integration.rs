//! CLI Integration Tests
//!
//! These tests verify that the CLI commands work correctly end-to-end.
//! They test the actual binary behavior, not just the library.
//!
//! Run with:
//! ```bash
//! cargo test --test cli_integration
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::tempdir;

/// Get the path to the built binary
fn state_tree_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_state-tree"))
}

/// Run state-tree and return (stdout, stderr, success)
fn run_state_tree(args: &[&str], config: &Path) -> (String, String, bool) {
    let output = Command::new(state_tree_binary())
        .args(["-c", config.to_str().unwrap(), "-f", "json"])
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute state-tree");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

/// Write an empty config plus the given JSON documents into `dir`
fn setup(dir: &Path, docs: &[(&str, &str)]) -> PathBuf {
    let config = dir.join("config.json");
    std::fs::write(&config, "{}").unwrap();
    for (name, content) in docs {
        std::fs::write(dir.join(name), content).unwrap();
    }
    config
}

fn parse(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout.trim()).expect("stdout should be JSON")
}

// ============================================================================
// Reconcile
// ============================================================================

#[test]
fn test_cli_reconcile_equal_documents_reuses_root() {
    let dir = tempdir().unwrap();
    let doc = r#"{"title": "a", "fields": [{"name": "x"}]}"#;
    let config = setup(dir.path(), &[("prev.json", doc), ("next.json", doc)]);

    let (stdout, _stderr, success) = run_state_tree(
        &[
            "reconcile",
            dir.path().join("prev.json").to_str().unwrap(),
            dir.path().join("next.json").to_str().unwrap(),
        ],
        &config,
    );

    assert!(success, "reconcile should succeed");
    let report = parse(&stdout);
    assert_eq!(report["reused_root"], true);
    assert_eq!(report["stats"]["rebuilt"], 0);
    assert_eq!(report["previous_hash"], report["result_hash"]);
    assert_eq!(report["value"]["fields"][0]["name"], "x");
}

#[test]
fn test_cli_reconcile_change_rebuilds_path() {
    let dir = tempdir().unwrap();
    let config = setup(
        dir.path(),
        &[
            ("prev.json", r#"{"a": {"x": 1}, "b": [1, 2]}"#),
            ("next.json", r#"{"a": {"x": 2}, "b": [1, 2]}"#),
        ],
    );

    let (stdout, _stderr, success) = run_state_tree(
        &[
            "reconcile",
            dir.path().join("prev.json").to_str().unwrap(),
            dir.path().join("next.json").to_str().unwrap(),
        ],
        &config,
    );

    assert!(success);
    let report = parse(&stdout);
    assert_eq!(report["reused_root"], false);
    assert_eq!(report["stats"]["rebuilt"], 2, "root and \"a\" are rebuilt");
    assert_eq!(report["next_hash"], report["result_hash"]);
    assert_eq!(report["value"]["a"]["x"], 2);
}

#[test]
fn test_cli_reconcile_stats_only() {
    let dir = tempdir().unwrap();
    let config = setup(dir.path(), &[("prev.json", "[1, 2, 3]"), ("next.json", "[1, 2]")]);

    let (stdout, _stderr, success) = run_state_tree(
        &[
            "reconcile",
            "--stats-only",
            dir.path().join("prev.json").to_str().unwrap(),
            dir.path().join("next.json").to_str().unwrap(),
        ],
        &config,
    );

    assert!(success);
    let report = parse(&stdout);
    assert!(report.get("value").is_none());
    assert_eq!(report["reused_root"], false);
    assert_eq!(report["stats"]["reused"], 2);
}

#[test]
fn test_cli_reconcile_reads_stdin() {
    let dir = tempdir().unwrap();
    let config = setup(dir.path(), &[("prev.json", r#"{"k": true}"#)]);

    let mut child = Command::new(state_tree_binary())
        .args(["-c", config.to_str().unwrap()])
        .args(["reconcile", dir.path().join("prev.json").to_str().unwrap(), "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to execute state-tree");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"{"k": true}"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let report = parse(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(report["reused_root"], true);
}

#[test]
fn test_cli_reconcile_depth_limit_flag() {
    let dir = tempdir().unwrap();
    let doc = r#"{"a": {"b": {"c": 1}}}"#;
    let config = setup(dir.path(), &[("prev.json", doc), ("next.json", doc)]);

    let (stdout, _stderr, success) = run_state_tree(
        &[
            "--max-depth",
            "1",
            "reconcile",
            "--stats-only",
            dir.path().join("prev.json").to_str().unwrap(),
            dir.path().join("next.json").to_str().unwrap(),
        ],
        &config,
    );

    assert!(success);
    let report = parse(&stdout);
    assert_eq!(report["stats"]["depth_limited"], 1);
    assert_eq!(report["reused_root"], false);
}

// ============================================================================
// Diff
// ============================================================================

#[test]
fn test_cli_diff_reports_paths() {
    let dir = tempdir().unwrap();
    let config = setup(
        dir.path(),
        &[
            ("old.json", r#"{"title": "a", "tags": ["x"], "gone": 1}"#),
            ("new.json", r#"{"title": "b", "tags": ["x", "y"]}"#),
        ],
    );

    let (stdout, _stderr, success) = run_state_tree(
        &[
            "diff",
            dir.path().join("old.json").to_str().unwrap(),
            dir.path().join("new.json").to_str().unwrap(),
        ],
        &config,
    );

    assert!(success);
    let report = parse(&stdout);
    assert_eq!(report["added"], 1);
    assert_eq!(report["removed"], 1);
    assert_eq!(report["modified"], 1);
    let paths: Vec<&str> = report["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["$.title", "$.tags[1]", "$.gone"]);
}

#[test]
fn test_cli_diff_identical_is_empty() {
    let dir = tempdir().unwrap();
    let config = setup(
        dir.path(),
        &[("a.json", r#"{"x": [1, {"y": null}]}"#), ("b.json", r#"{"x": [1, {"y": null}]}"#)],
    );

    let (stdout, _stderr, success) = run_state_tree(
        &[
            "diff",
            dir.path().join("a.json").to_str().unwrap(),
            dir.path().join("b.json").to_str().unwrap(),
        ],
        &config,
    );

    assert!(success);
    let report = parse(&stdout);
    assert_eq!(report["entries"].as_array().unwrap().len(), 0);
    assert_eq!(report["from"], report["to"]);
}

// ============================================================================
// Fingerprint
// ============================================================================

#[test]
fn test_cli_fingerprint_ignores_key_order() {
    let dir = tempdir().unwrap();
    let config = setup(
        dir.path(),
        &[("a.json", r#"{"a": 1, "b": 2}"#), ("b.json", r#"{"b": 2, "a": 1}"#)],
    );

    let (a_out, _, a_ok) = run_state_tree(
        &["fingerprint", dir.path().join("a.json").to_str().unwrap()],
        &config,
    );
    let (b_out, _, b_ok) = run_state_tree(
        &["fingerprint", dir.path().join("b.json").to_str().unwrap()],
        &config,
    );

    assert!(a_ok && b_ok);
    let (a, b) = (parse(&a_out), parse(&b_out));
    assert_eq!(a["hash"], b["hash"]);
    assert_eq!(a["kind"], "mapping");
    assert_eq!(a["short"].as_str().unwrap().len(), 7);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_cli_missing_file_fails() {
    let dir = tempdir().unwrap();
    let config = setup(dir.path(), &[]);

    let (_stdout, stderr, success) = run_state_tree(
        &["fingerprint", dir.path().join("nope.json").to_str().unwrap()],
        &config,
    );

    assert!(!success, "missing file should fail");
    assert!(stderr.contains("Failed to read"), "got: {}", stderr);
}

#[test]
fn test_cli_invalid_json_fails() {
    let dir = tempdir().unwrap();
    let config = setup(dir.path(), &[("bad.json", "{not json")]);

    let (_stdout, stderr, success) = run_state_tree(
        &["fingerprint", dir.path().join("bad.json").to_str().unwrap()],
        &config,
    );

    assert!(!success);
    assert!(stderr.contains("Invalid JSON"), "got: {}", stderr);
}

#[test]
fn test_cli_invalid_config_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{"pretty": "yes"}"#).unwrap();
    std::fs::write(dir.path().join("a.json"), "1").unwrap();

    let (_stdout, stderr, success) = run_state_tree(
        &["fingerprint", dir.path().join("a.json").to_str().unwrap()],
        &config,
    );

    assert!(!success);
    assert!(stderr.contains("Config error"), "got: {}", stderr);
}
