use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn factgap_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("factgap");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // A small checkout
    let repo = root.join("repo");
    fs::create_dir_all(repo.join("src")).unwrap();
    fs::create_dir_all(repo.join("docs")).unwrap();
    fs::create_dir_all(repo.join("src/node_modules/left-pad")).unwrap();
    fs::write(
        repo.join("src/billing.py"),
        "def charge(amount):\n    return amount * 100\n",
    )
    .unwrap();
    fs::write(
        repo.join("docs/naming.md"),
        "# Naming\n\nUse snake_case for Python modules.\n",
    )
    .unwrap();
    fs::write(
        repo.join("src/node_modules/left-pad/index.js"),
        "module.exports = 1;\n",
    )
    .unwrap();
    fs::write(repo.join("README.md"), "# Demo\n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/factgap.sqlite"

[scope]
user_id = "tester"
repo = "acme/demo"

[discovery]
include_roots = ["src/", "docs/", "README.md"]
"#,
        root.display()
    );

    let config_path = config_dir.join("factgap.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_factgap(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = factgap_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("FACTGAP_IGNORE_GLOBS")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run factgap binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_factgap(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/factgap.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_factgap(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_factgap(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_classify_without_config() {
    let missing = Path::new("/nonexistent/factgap.toml");
    let (stdout, stderr, success) =
        run_factgap(missing, &["classify", "What is the deploy runbook?"]);
    assert!(success, "classify failed: {}", stderr);
    assert!(stdout.contains("intent: process"));
    assert!(stdout.contains("deploy"));
}

#[test]
fn test_classify_json() {
    let missing = Path::new("/nonexistent/factgap.toml");
    let (stdout, _, success) = run_factgap(missing, &["classify", "hello there", "--json"]);
    assert!(success);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["intent"], "general");
    assert_eq!(value["confidence"], 0.0);
}

#[test]
fn test_discover_counts() {
    let (tmp, config_path) = setup_test_env();
    let repo = tmp.path().join("repo");

    let (stdout, stderr, success) = run_factgap(
        &config_path,
        &["discover", "--root", repo.to_str().unwrap(), "--list"],
    );
    assert!(success, "discover failed: {}", stderr);
    assert!(stdout.contains("README.md"));
    assert!(stdout.contains("src/billing.py"));
    assert!(stdout.contains("docs/naming.md"));
    assert!(!stdout.contains("left-pad"));
    assert!(stdout.contains("files included: 3"));
    assert!(stdout.contains("ignored dirs pruned: 1"));
}

#[test]
fn test_index_requires_embedding_provider() {
    let (tmp, config_path) = setup_test_env();
    let repo = tmp.path().join("repo");

    let (_, stderr, success) = run_factgap(
        &config_path,
        &["index", "repo", "--root", repo.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("Embedding provider is disabled"));
}

#[test]
fn test_purge_empty_database() {
    let (_tmp, config_path) = setup_test_env();

    run_factgap(&config_path, &["init"]);
    let (stdout, stderr, success) = run_factgap(&config_path, &["purge", "--repo", "acme/demo"]);
    assert!(success, "purge failed: {}", stderr);
    assert!(stdout.contains("chunks deleted: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_purge_rejects_unknown_source_type() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_factgap(&config_path, &["purge", "--source-type", "wiki"]);
    assert!(!success);
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/x.sqlite\"\n\n[chunking]\ncode_chunk_size = 100\ncode_overlap = 100\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_factgap(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("code_overlap"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_factgap(Path::new("/nonexistent/factgap.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
