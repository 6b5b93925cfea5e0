#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn wtf_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_wtf"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/wtf.sqlite"

[retrieval]
similarity_threshold = 0.8
max_similar_cases = 3

[context]
lines = 2
"#,
        root.display()
    );

    let config_path = config_dir.join("wtf.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_wtf_in(dir: &Path, config_path: &Path, args: &[&str]) -> Output {
    let binary = wtf_binary();
    Command::new(&binary)
        .current_dir(dir)
        .env_remove("OPENAI_API_KEY")
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run wtf binary at {:?}: {}", binary, e))
}

fn run_wtf(config_path: &Path, args: &[&str]) -> (String, String, Option<i32>) {
    let dir = config_path.parent().unwrap();
    let output = run_wtf_in(dir, config_path, args);
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code(),
    )
}

/// Pull `<id>` out of the `Case id: <id>  (wtf show <id>)` line.
fn case_id(output: &str) -> String {
    output
        .lines()
        .find_map(|l| l.strip_prefix("Case id: "))
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_else(|| panic!("no case id in output: {}", output))
        .to_string()
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, code) = run_wtf(&config_path, &["init"]);
    assert_eq!(code, Some(0), "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, code) = run_wtf(&config_path, &["init"]);
    assert_eq!(code, Some(0), "second init failed (not idempotent)");
}

#[test]
fn test_missing_config_uses_minimal_defaults() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("config").join("nope.toml");

    let output = run_wtf_in(tmp.path(), &missing, &["init"]);
    assert!(output.status.success());
    assert!(tmp.path().join("data").join("wtf.sqlite").exists());
}

#[test]
fn test_invalid_config_is_an_error() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(
        &config_path,
        "[db]\npath = \"x\"\n[retrieval]\nsimilarity_threshold = 3.0\n",
    )
    .unwrap();

    let (_, stderr, code) = run_wtf(&config_path, &["list"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("similarity_threshold"), "stderr: {}", stderr);
}

#[test]
fn test_run_with_invalid_config_still_runs_command() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(
        &config_path,
        "[db]\npath = \"x\"\n[retrieval]\nsimilarity_threshold = 3.0\n",
    )
    .unwrap();

    let (stdout, _, code) = run_wtf(&config_path, &["run", "--", "echo ran; exit 7"]);
    assert_eq!(code, Some(7));
    assert_eq!(stdout, "ran\n");

    let (stdout, stderr, code) =
        run_wtf(&config_path, &["run", "--", "echo ran; echo boom >&2; exit 5"]);
    assert_eq!(code, Some(5));
    assert_eq!(stdout, "ran\n");
    assert!(stderr.contains("boom"));
    assert!(stderr.contains("similarity_threshold"), "stderr: {}", stderr);
    assert!(!stderr.contains("Case id"));
}

#[test]
fn test_run_success_passes_through() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, code) = run_wtf(&config_path, &["run", "--", "echo", "hello", "world"]);
    assert_eq!(code, Some(0));
    assert_eq!(stdout, "hello world\n");

    let (stdout, _, _) = run_wtf(&config_path, &["list"]);
    assert!(stdout.contains("No cases found"));
}

#[test]
fn test_run_failure_without_stderr_is_not_analyzed() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, code) = run_wtf(&config_path, &["run", "--", "echo out; exit 4"]);
    assert_eq!(code, Some(4));
    assert_eq!(stdout, "out\n");
    assert!(!stderr.contains("Case id"));

    let (stdout, _, _) = run_wtf(&config_path, &["list"]);
    assert!(stdout.contains("No cases found"));
}

#[test]
fn test_run_failure_records_fallback_case() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, code) =
        run_wtf(&config_path, &["run", "--", "echo boom >&2; exit 3"]);
    assert_eq!(code, Some(3), "stdout={}, stderr={}", stdout, stderr);
    assert!(stderr.contains("boom"));
    assert!(stderr.contains("=== Error Analysis Failed ==="), "stderr: {}", stderr);
    assert!(stderr.contains("Tags: error, ai-failed"));
    // The wrapped command wrote nothing to stdout, so neither does wtf.
    assert_eq!(stdout, "");

    let id = case_id(&stderr);

    let (stdout, _, code) = run_wtf(&config_path, &["list"]);
    assert_eq!(code, Some(0));
    assert!(stdout.contains(&id));
    assert!(stdout.contains("Error Analysis Failed"));
    assert!(stdout.contains("$ echo boom >&2; exit 3"));

    let (stdout, _, code) = run_wtf(&config_path, &["list", "--tag", "ai-failed"]);
    assert_eq!(code, Some(0));
    assert!(stdout.contains(&id));

    let (stdout, _, _) = run_wtf(&config_path, &["list", "--tag", "python"]);
    assert!(stdout.contains("No cases found"));

    let (stdout, _, code) = run_wtf(&config_path, &["show", &id]);
    assert_eq!(code, Some(0));
    assert!(stdout.contains(&format!("id:         {}", id)));
    assert!(stdout.contains("--- Error log ---\nboom"));
}

#[test]
fn test_run_python_failure_attaches_code_context() {
    let (tmp, config_path) = setup_test_env();
    let script = tmp.path().join("config").join("app.py");
    fs::write(&script, "a = 1\nb = 2\nprint(x)\nc = 3\n").unwrap();

    let trace = "Traceback (most recent call last):\n  File \\\"app.py\\\", line 3, in <module>\nNameError: name 'x' is not defined";
    let cmd = format!("printf \"{}\\n\" >&2; exit 1", trace);
    let (stdout, stderr, code) = run_wtf(&config_path, &["run", "--", &cmd]);
    assert_eq!(code, Some(1), "stdout={}, stderr={}", stdout, stderr);

    let id = case_id(&stderr);
    let (stdout, _, _) = run_wtf(&config_path, &["show", &id]);
    assert!(stdout.contains("--- Code (app.py:3) ---"), "stdout: {}", stdout);
    assert!(stdout.contains(">>>    3 | print(x)"));
}

#[test]
fn test_show_missing_case_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_wtf(&config_path, &["init"]);

    let (_, stderr, code) = run_wtf(&config_path, &["show", "no-such-id"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("case not found"), "stderr: {}", stderr);
}

#[test]
fn test_similar_requires_embeddings() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, code) = run_wtf(&config_path, &["similar", "NameError"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);
}
