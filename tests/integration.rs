use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ncm_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ncm"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("ncm.json"),
        r#"[
  {"code": "8471.30.12", "description": "Computadores portáteis de peso inferior a 3,5 kg", "chapter": "84"},
  {"code": "8471.30.19", "description": "Outras máquinas automáticas para processamento de dados, portáteis"},
  {"code": "8471.41.00", "description": "Outras máquinas automáticas para processamento de dados"},
  {"code": "09012100", "description": "Café torrado, não descafeinado", "notes": "Ex 01"},
  {"code": "8471.30.12", "description": "Duplicate line"},
  {"code": "XX.YY", "description": "Broken code"}
]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/ncm.sqlite"

[search]
default_limit = 10

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("ncm.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ncm(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ncm_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ncm binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn seeded_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, ok) = run_ncm(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let seed_file = tmp.path().join("ncm.json");
    let (_, stderr, ok) = run_ncm(&config_path, &["seed", seed_file.to_str().unwrap()]);
    assert!(ok, "seed failed: {}", stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ncm(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/ncm.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ncm(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ncm(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_seed_counts_and_skips_duplicates() {
    let (tmp, config_path) = setup_test_env();
    run_ncm(&config_path, &["init"]);
    let seed_file = tmp.path().join("ncm.json");

    let (stdout, stderr, success) = run_ncm(&config_path, &["seed", seed_file.to_str().unwrap()]);
    assert!(success, "seed failed: {}", stderr);
    assert!(stdout.contains("records read: 6"), "{}", stdout);
    assert!(stdout.contains("inserted: 4"), "{}", stdout);
    assert!(stdout.contains("duplicates skipped: 1"), "{}", stdout);
    assert!(stdout.contains("invalid skipped: 1"), "{}", stdout);

    let (stdout, _, success) = run_ncm(&config_path, &["seed", seed_file.to_str().unwrap()]);
    assert!(success, "re-seeding should be a no-op");
    assert!(stdout.contains("inserted: 0"), "{}", stdout);
}

#[test]
fn test_search_code_prefix() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, stderr, success) = run_ncm(&config_path, &["search", "8471.30", "--json"]);
    assert!(success, "search failed: {}", stderr);

    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let codes: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["entry"]["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["8471.30.12", "8471.30.19"]);
    assert!(results
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["matchType"] == "lexical"));
}

#[test]
fn test_search_description_is_accent_insensitive() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, stderr, success) = run_ncm(&config_path, &["search", "cafe torrado"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("0901.21.00"), "got: {}", stdout);
    assert!(stdout.contains("lexical"));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = seeded_env();

    let (stdout1, _, _) = run_ncm(&config_path, &["search", "maquinas automaticas"]);
    let (stdout2, _, _) = run_ncm(&config_path, &["search", "maquinas automaticas"]);
    assert_eq!(
        stdout1, stdout2,
        "Search results should be deterministic across runs"
    );
}

#[test]
fn test_search_empty_query_fails() {
    let (_tmp, config_path) = seeded_env();

    let (_, stderr, success) = run_ncm(&config_path, &["search", "   "]);
    assert!(!success, "blank query should be rejected");
    assert!(stderr.contains("invalid query"), "got: {}", stderr);
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, _, success) = run_ncm(&config_path, &["search", "xyznonexistent"]);
    assert!(success);
    assert!(stdout.contains("No results"));
}

#[test]
fn test_get_entry() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, stderr, success) = run_ncm(&config_path, &["get", "09012100"]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("0901.21.00"));
    assert!(stdout.contains("Café torrado"));
    assert!(stdout.contains("Ex 01"));
}

#[test]
fn test_get_missing_entry() {
    let (_tmp, config_path) = seeded_env();

    let (_, stderr, success) = run_ncm(&config_path, &["get", "9999.99.99"]);
    assert!(!success, "get with missing code should fail");
    assert!(
        stderr.contains("not found"),
        "Should report not found, got: {}",
        stderr
    );
}

#[test]
fn test_correct_updates_description() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, stderr, success) = run_ncm(
        &config_path,
        &["correct", "8471.41.00", "--description", "Outras unidades de processamento"],
    );
    assert!(success, "correct failed: {}", stderr);
    assert!(stdout.contains("corrected 8471.41.00"));

    let (stdout, _, _) = run_ncm(&config_path, &["get", "8471.41.00", "--json"]);
    let entry: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(entry["description"], "Outras unidades de processamento");

    let (_, _, success) = run_ncm(
        &config_path,
        &["correct", "1234.56.78", "--description", "nothing here"],
    );
    assert!(!success, "correcting an unknown code should fail");
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, stderr, success) = run_ncm(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Entries:     4"), "{}", stdout);
    assert!(stdout.contains("Chapters:    2"), "{}", stdout);
    assert!(stdout.contains("Embedded:    0 / 4"), "{}", stdout);
}

#[test]
fn test_embed_requires_provider() {
    let (_tmp, config_path) = seeded_env();

    let (_, stderr, success) = run_ncm(&config_path, &["embed", "pending"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "got: {}", stderr);
}

#[test]
fn test_embed_pending_dry_run_counts_without_calling_provider() {
    let (tmp, _) = seeded_env();
    let config_path = tmp.path().join("config/openai.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{}/data/ncm.sqlite"

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 8
base_url = "http://127.0.0.1:9"
"#,
            tmp.path().display()
        ),
    )
    .unwrap();

    let output = Command::new(ncm_binary())
        .arg("--config")
        .arg(&config_path)
        .args(["embed", "pending", "--dry-run"])
        .env("OPENAI_API_KEY", "sk-test")
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "dry run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("entries needing embeddings: 4"), "{}", stdout);

    let (stdout, _, _) = run_ncm(&config_path, &["stats"]);
    assert!(stdout.contains("Embedded:    0 / 4"), "{}", stdout);
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(
        &bad,
        format!(
            "[db]\npath = \"{}/data/ncm.sqlite\"\n\n[search]\ndefault_threshold = 1.5\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_ncm(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("default_threshold"), "got: {}", stderr);
}
