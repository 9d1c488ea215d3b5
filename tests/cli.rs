use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn civic_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("civic");
    path
}

fn write_config(root: &Path, dims: usize) -> PathBuf {
    let config_content = format!(
        r#"[db]
path = "{root}/data/index.sqlite"

[corpus]
root = "{root}/corpus"

[collection]
name = "public_services_kb"

[chunking]
chunk_size = 400
overlap = 80

[embedding]
provider = "hashing"
dims = {dims}

[generation]
provider = "disabled"

[retrieval]
top_k = 3
"#,
        root = root.display(),
        dims = dims
    );

    let config_path = root.join("config").join("civic.toml");
    fs::create_dir_all(config_path.parent().unwrap()).unwrap();
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let corpus = root.join("corpus");
    fs::create_dir_all(corpus.join("housing")).unwrap();
    fs::write(
        corpus.join("housing/residency.md"),
        "# Residency certificate\n\nTo obtain a residency certificate as a tenant, submit a lease contract and a utility bill.\n",
    )
    .unwrap();
    fs::write(
        corpus.join("passport.json"),
        r#"{"service": "passport renewal", "documents": ["old passport", "two photos"]}"#,
    )
    .unwrap();
    fs::write(corpus.join("notes.txt"), "not indexed").unwrap();

    let config_path = write_config(&root, 256);
    (tmp, config_path)
}

fn run_civic(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = civic_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run civic binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_civic(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/index.sqlite").exists());

    let (_, stderr, success) = run_civic(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_build_reports_counts() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_civic(&config_path, &["build"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stdout.contains("build public_services_kb"));
    assert!(stdout.contains("documents loaded: 2"));
    assert!(stdout.contains("chunks indexed: 2"));
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_search_ranks_matching_document_first() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_civic(&config_path, &["build"]);
    assert!(success, "build failed: {}", stderr);

    let (stdout, stderr, success) = run_civic(
        &config_path,
        &[
            "search",
            "what documents are needed for a residency certificate as a tenant?",
            "--k",
            "2",
        ],
    );
    assert!(success, "search failed: {}", stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. "), "unexpected output: {}", stdout);
    assert!(first.contains("housing/residency.md"), "unexpected output: {}", stdout);
    assert!(stdout.contains("lease contract"));
}

#[test]
fn test_search_before_build_is_not_ready() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_civic(&config_path, &["search", "anything"]);
    assert!(!success);
    assert!(stderr.contains("collection not found"), "stderr: {}", stderr);
}

#[test]
fn test_rebuild_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    run_civic(&config_path, &["build"]);
    let (stdout, stderr, success) = run_civic(&config_path, &["build"]);
    assert!(success, "rebuild failed: {}", stderr);
    assert!(stdout.contains("chunks indexed: 2"));

    let (stdout, _, success) = run_civic(&config_path, &["collections"]);
    assert!(success);
    let line = stdout
        .lines()
        .find(|l| l.contains("public_services_kb") && l.contains("hashing"))
        .unwrap_or_else(|| panic!("collection missing from: {}", stdout));
    assert!(line.starts_with('*'));
    let fields: Vec<&str> = line.split_whitespace().collect();
    assert_eq!(fields[1], "public_services_kb");
    assert_eq!(fields[2], "2");
}

#[test]
fn test_changed_embedding_requires_reset() {
    let (tmp, config_path) = setup_test_env();
    run_civic(&config_path, &["build"]);

    let config_path = write_config(tmp.path(), 128);
    let (_, stderr, success) = run_civic(&config_path, &["build"]);
    assert!(!success);
    assert!(stderr.contains("embedding space mismatch"), "stderr: {}", stderr);

    let (stdout, stderr, success) = run_civic(&config_path, &["build", "--reset"]);
    assert!(success, "reset build failed: {}", stderr);
    assert!(stdout.contains("chunks indexed: 2"));
}

#[test]
fn test_build_into_named_collection() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_civic(&config_path, &["build", "--collection", "public_admin_kb"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stdout.contains("build public_admin_kb"));

    // The configured collection is still unbuilt
    let (_, stderr, success) = run_civic(&config_path, &["search", "residency"]);
    assert!(!success);
    assert!(stderr.contains("public_services_kb"));
}

#[test]
fn test_missing_corpus_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nowhere");

    let (_, stderr, success) = run_civic(
        &config_path,
        &["build", "--corpus", missing.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("corpus directory not found"), "stderr: {}", stderr);
}

#[test]
fn test_ask_with_generation_disabled_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_civic(&config_path, &["build"]);

    let (_, stderr, success) = run_civic(&config_path, &["ask", "residency certificate?"]);
    assert!(!success);
    assert!(stderr.contains("generation is disabled"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_civic(&tmp.path().join("absent.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
