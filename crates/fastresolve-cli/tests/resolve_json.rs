//! Integration tests for `fastresolve resolve --json` output.

use serial_test::serial;
use std::path::Path;
use std::process::{Command, Output};

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "fastresolve-cli", "--bin", "fastresolve", "--"]);
    cmd
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "src/a.js", "");
    write(root, "src/b.ts", "");
    write(
        root,
        "node_modules/pkg/package.json",
        r#"{
            "name": "pkg",
            "exports": {
                ".": { "import": "./esm.mjs", "default": "./cjs.js" }
            }
        }"#,
    );
    write(root, "node_modules/pkg/esm.mjs", "");
    write(root, "node_modules/pkg/cjs.js", "");
    dir
}

fn run_resolve(dir: &Path, args: &[&str]) -> (Output, serde_json::Value) {
    let output = cargo_bin()
        .args(["--json", "resolve"])
        .args(args)
        .arg("--cwd")
        .arg(dir)
        .output()
        .expect("Failed to run resolve command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout should be valid JSON ({e}): {stdout}"));
    (output, json)
}

#[test]
#[serial]
fn test_resolve_relative_json() {
    let dir = project();
    let (output, json) = run_resolve(dir.path(), &["./a", "--context", "src"]);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(json["schema_version"].as_u64(), Some(1));
    assert_eq!(json["ok"], true);
    assert_eq!(json["ignored"], false);
    assert_eq!(json["request"], "./a");
    let resolved = json["resolved"].as_str().unwrap();
    assert!(resolved.ends_with("a.js"), "resolved: {resolved}");
    assert!(json["file_dependencies"].is_array());
    assert!(json.get("error").is_none());
}

#[test]
#[serial]
fn test_resolve_not_found_exits_1() {
    let dir = project();
    let (output, json) = run_resolve(dir.path(), &["./missing", "--context", "src"]);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(json["ok"], false);
    assert!(json.get("resolved").is_none());
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    let message = json["error"]["message"].as_str().unwrap();
    assert!(message.starts_with("Can't resolve './missing'"), "{message}");
    assert!(!json["error"]["details"].as_array().unwrap().is_empty());
    assert!(!json["missing_dependencies"].as_array().unwrap().is_empty());
}

#[test]
#[serial]
fn test_resolve_relative_hint() {
    let dir = project();
    let (output, json) = run_resolve(dir.path(), &["a", "--context", "src"]);

    assert_eq!(output.status.code(), Some(1));
    let hints = json["error"]["hints"].as_array().unwrap();
    assert!(
        hints
            .iter()
            .any(|h| h.as_str().unwrap().starts_with("Did you mean './a'?")),
        "hints: {hints:?}"
    );
}

#[test]
#[serial]
fn test_resolve_condition_flag() {
    let dir = project();

    let (_, json) = run_resolve(dir.path(), &["pkg"]);
    assert!(json["resolved"].as_str().unwrap().ends_with("cjs.js"));

    let (_, json) = run_resolve(dir.path(), &["pkg", "--condition", "import"]);
    assert!(json["resolved"].as_str().unwrap().ends_with("esm.mjs"));
}

#[test]
#[serial]
fn test_resolve_alias_false_is_ignored() {
    let dir = project();
    let (output, json) = run_resolve(dir.path(), &["fs", "--alias", "fs=false"]);

    assert!(output.status.success());
    assert_eq!(json["ok"], true);
    assert_eq!(json["ignored"], true);
    assert!(json.get("resolved").is_none());
}

#[test]
#[serial]
fn test_resolve_uses_config_file() {
    let dir = project();

    let (output, _) = run_resolve(dir.path(), &["./b", "--context", "src"]);
    assert_eq!(output.status.code(), Some(1));

    write(dir.path(), "fastresolve.json", r#"{ "extensions": [".ts"] }"#);
    let (output, json) = run_resolve(dir.path(), &["./b", "--context", "src"]);
    assert!(output.status.success());
    assert!(json["resolved"].as_str().unwrap().ends_with("b.ts"));
}

#[test]
#[serial]
fn test_resolve_trace_lines() {
    let dir = project();
    let (_, json) = run_resolve(dir.path(), &["./a", "--context", "src", "--trace"]);

    let trace = json["trace"].as_array().unwrap();
    assert!(!trace.is_empty());
    assert!(trace[0].as_str().unwrap().starts_with("resolve './a' in"));
}

#[test]
#[serial]
fn test_version_json() {
    let output = cargo_bin()
        .args(["--json", "version"])
        .output()
        .expect("Failed to run version command");

    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON");
    assert_eq!(json["schema_version"].as_u64(), Some(1));
    assert_eq!(json["name"], "fastresolve");
    assert!(json["version"].as_str().is_some());
}
