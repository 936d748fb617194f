use mockito::Matcher;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::from(Command::new(env!("CARGO_BIN_EXE_promptfill")));
    cmd.env_remove("PROMPTFILL_API_KEY").env_remove("RUST_LOG");
    cmd
}

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Copy fixtures into a fresh directory so tests can rewrite them.
fn workspace(names: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in names {
        let target = dir.path().join(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::copy(fixture_path(name), target).unwrap();
    }
    dir
}

fn parity(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("Parity.java")).unwrap()
}

// -- process --

#[test]
fn process_folder_with_chat_backend() {
    let dir = workspace(&["Parity.java"]);
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/chat")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "model": "codellama",
            "stream": false,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "model": "codellama",
                "message": {"role": "assistant", "content": "```java\nreturn n % 2 == 0;\n```"},
                "done": true,
            })
            .to_string(),
        )
        .create();

    cmd()
        .args(["process", dir.path().to_str().unwrap()])
        .args(["--endpoint", &server.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "processed 1 file(s): 1 completed, 0 failed, 1 skipped",
        ));

    mock.assert();
    let text = parity(&dir);
    assert!(
        text.contains("        // generated start\n        return n % 2 == 0;\n        // generated end"),
        "Got:\n{text}"
    );
    assert!(text.contains("        return !isEven(n);\n"));
}

#[test]
fn process_single_file_with_generate_mode() {
    let dir = workspace(&["Parity.java"]);
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({"model": "starcoder", "stream": false})))
        .with_status(200)
        .with_body(r#"{"model":"starcoder","response":"return (n & 1) == 0;","done":true}"#)
        .create();

    cmd()
        .arg("process")
        .arg(dir.path().join("Parity.java"))
        .args(["--endpoint", &server.url(), "--mode", "completion", "--model", "starcoder"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 completed"));

    mock.assert();
    assert!(parity(&dir).contains("        return (n & 1) == 0;\n"));
}

#[test]
fn process_with_primary_backend() {
    let dir = workspace(&["Parity.java"]);
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/generate")
        .match_body(Matcher::PartialJson(json!({"max_tokens": 512})))
        .with_status(200)
        .with_body(r#"{"text":"return n % 2 == 0;"}"#)
        .create();

    cmd()
        .args(["process", dir.path().to_str().unwrap(), "--backend", "primary"])
        .args(["--endpoint", &format!("{}/generate", server.url())])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 completed, 0 failed"));

    mock.assert();
    assert!(parity(&dir).contains("return n % 2 == 0;"));
}

#[test]
fn config_file_in_folder_selects_backend() {
    let dir = workspace(&["Parity.java"]);
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/complete")
        .match_body(Matcher::PartialJson(json!({"max_tokens": 64})))
        .with_status(200)
        .with_body(r#"{"content":"return true;"}"#)
        .create();
    fs::write(
        dir.path().join("promptfill.toml"),
        format!(
            "[backend]\nkind = \"primary\"\n\n[backend.primary]\nendpoint = \"{}/complete\"\nmax_tokens = 64\n",
            server.url()
        ),
    )
    .unwrap();

    cmd()
        .args(["process", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 completed"));

    mock.assert();
    assert!(parity(&dir).contains("        return true;\n"));
}

#[test]
fn api_key_is_sent_as_bearer() {
    let dir = workspace(&["Parity.java"]);
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/chat")
        .match_header("authorization", "Bearer s3cret")
        .with_status(200)
        .with_body(r#"{"message":{"role":"assistant","content":"return false;"}}"#)
        .create();

    cmd()
        .env("PROMPTFILL_API_KEY", "s3cret")
        .args(["process", dir.path().to_str().unwrap(), "--endpoint", &server.url()])
        .assert()
        .success();

    mock.assert();
}

#[test]
fn backend_error_fails_task_not_batch() {
    let dir = workspace(&["Parity.java"]);
    let original = parity(&dir);
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/chat")
        .with_status(500)
        .with_body(r#"{"error":"model 'codellama' not found"}"#)
        .create();

    cmd()
        .args(["process", dir.path().to_str().unwrap(), "--endpoint", &server.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 completed, 1 failed, 1 skipped"))
        .stderr(predicate::str::contains("model 'codellama' not found"));

    mock.assert();
    assert_eq!(parity(&dir), original);
}

#[test]
fn unreachable_backend_fails_task() {
    let dir = workspace(&["Parity.java"]);
    let original = parity(&dir);

    cmd()
        .args(["process", dir.path().to_str().unwrap()])
        .args(["--endpoint", "http://127.0.0.1:9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 failed"))
        .stderr(predicate::str::contains("unreachable"));

    assert_eq!(parity(&dir), original);
}

#[test]
fn missing_path_fails() {
    let dir = TempDir::new().unwrap();
    cmd()
        .arg("process")
        .arg(dir.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn folder_without_sources_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("README.md"), "# nothing").unwrap();
    cmd()
        .args(["process", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no .java files found"));
}

#[test]
fn invalid_config_fails() {
    let dir = workspace(&["Parity.java"]);
    fs::write(dir.path().join("promptfill.toml"), "[backend]\nknd = \"primary\"\n").unwrap();
    cmd()
        .args(["process", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

// -- scan --

#[test]
fn scan_lists_directives() {
    cmd()
        .arg("scan")
        .arg(fixture_path("Parity.java"))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "#0 isEven [region] return true if n is even",
        ))
        .stdout(predicate::str::contains(
            "#1 isOdd [no region] return true if n is odd",
        ))
        .stdout(predicate::str::contains("methods with generated regions: isEven"));
}

#[test]
fn scan_json() {
    let assert = cmd()
        .args(["scan", "--json"])
        .arg(fixture_path("Parity.java"))
        .assert()
        .success();
    let out: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let items = out.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["method_name"], "isEven");
    assert_eq!(items[0]["directive"]["payload"], "return true if n is even");
    assert!(items[0]["region"]["start"].is_u64());
    assert!(items[1]["region"].is_null());
}

// -- export --

#[test]
fn export_inserts_into_discovered_model() {
    let dir = workspace(&["Filled.java", "model/calc.cdiag"]);

    cmd()
        .arg("export")
        .arg(dir.path().join("Filled.java"))
        .args(["--root", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("inserted compute into"));

    let model = fs::read_to_string(dir.path().join("model/calc.cdiag")).unwrap();
    assert!(
        model.contains("compute(x: int): int { spec \"doubles x\"\n     impl java << return x * 2; >> }"),
        "Got:\n{model}"
    );
    assert!(model.contains("    reset() { spec \"clears state\" }\n"));
}

#[test]
fn export_unknown_method_keeps_model() {
    let dir = workspace(&["Parity.java", "model/calc.cdiag"]);
    let model_path = dir.path().join("model/calc.cdiag");
    let original = fs::read_to_string(&model_path).unwrap();

    cmd()
        .arg("export")
        .arg(dir.path().join("Parity.java"))
        .args(["--method", "isEven", "--model"])
        .arg(&model_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found in the model file"));

    assert_eq!(fs::read_to_string(&model_path).unwrap(), original);
}

#[test]
fn export_without_model_file_fails() {
    let dir = workspace(&["Filled.java"]);
    cmd()
        .arg("export")
        .arg(dir.path().join("Filled.java"))
        .args(["--root", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no .cdiag file found"));
}
