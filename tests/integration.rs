use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn crew_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("crew");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();
    fs::create_dir_all(root.join("kb")).unwrap();

    let config_content = format!(
        r#"[knowledge_base]
root = "{root}/kb"

[index]
path = "{root}/data/index.sqlite"

[conversations]
root = "{root}/data/conversations"

[chunking]
chunk_size = 800
overlap = 80

[server]
bind = "127.0.0.1:7410"
"#,
        root = root.display()
    );

    let config_path = root.join("config").join("crew.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_crew(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = crew_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("GEMINI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run crew binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Minimal well-formed PDF with a single text object. Offsets and stream
/// length are computed, not hard-coded, so parsers accept the file.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET\n", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
          /Resources << /Font << /F1 5 0 R >> >> >> endobj\n",
    );
    offsets.push(out.len());
    out.extend_from_slice(
        format!("4 0 obj << /Length {} >> stream\n{}endstream endobj\n", stream.len(), stream)
            .as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(b"0000000000 65535 f \n");
    for off in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

// ============ CLI: process ============

#[test]
fn process_empty_knowledge_base_warns_and_writes_no_index() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_crew(&config_path, &["--api-key", "test-key", "process"]);
    assert!(success, "process failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("No PDF files found"),
        "Expected empty-kb warning, got: {}",
        stdout
    );
    assert!(
        !tmp.path().join("data").join("index.sqlite").exists(),
        "No index must be written for an empty knowledge base"
    );
}

#[test]
fn process_requires_api_key() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_crew(&config_path, &["process"]);
    assert!(!success, "process without key should fail");
    assert!(
        stderr.contains("API key"),
        "Should mention the missing key, got: {}",
        stderr
    );
}

#[test]
fn process_dry_run_needs_no_api_key() {
    let (tmp, config_path) = setup_test_env();
    fs::write(
        tmp.path().join("kb").join("manual.pdf"),
        minimal_pdf_with_phrase("The engine produces 9000 lbf of thrust."),
    )
    .unwrap();

    let (stdout, stderr, success) = run_crew(&config_path, &["process", "--dry-run"]);
    assert!(success, "dry-run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("process (dry-run)"));
    assert!(
        stdout.contains("documents readable: 1"),
        "Expected the fixture PDF to parse, got: {}",
        stdout
    );
    assert!(
        !tmp.path().join("data").join("index.sqlite").exists(),
        "Dry run must not write an index"
    );
}

#[test]
fn process_dry_run_counts_corrupt_pdfs_as_skipped() {
    let (tmp, config_path) = setup_test_env();
    fs::write(tmp.path().join("kb").join("bad.pdf"), b"not a valid pdf").unwrap();

    let (stdout, stderr, success) = run_crew(&config_path, &["process", "--dry-run"]);
    assert!(success, "dry-run must survive a corrupt PDF: {}", stderr);
    assert!(
        stdout.contains("documents skipped: 1"),
        "Corrupt PDF should be counted as skipped, got: {}",
        stdout
    );
    assert!(
        stderr.contains("Warning"),
        "Corrupt PDF should be warned about on stderr, got: {}",
        stderr
    );
}

// ============ CLI: ask ============

#[test]
fn ask_before_processing_yields_gate_message() {
    let (_tmp, config_path) = setup_test_env();

    // The dummy key proves the gate fires before any external call: a real
    // call with this key could only fail, yet the command succeeds.
    let (stdout, _, success) = run_crew(
        &config_path,
        &["--api-key", "dummy", "ask", "How much thrust?"],
    );
    assert!(success, "ask before processing must not fail the session");
    assert!(
        stdout.contains("process the knowledge base first"),
        "Expected the gate message, got: {}",
        stdout
    );
}

#[test]
fn ask_requires_api_key() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_crew(&config_path, &["ask", "anything"]);
    assert!(!success);
    assert!(stderr.contains("API key"));
}

// ============ CLI: chat ============

#[test]
fn chat_list_empty() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_crew(&config_path, &["chat", "list"]);
    assert!(success);
    assert!(stdout.contains("No saved conversations"));
}

#[test]
fn chat_delete_missing_reports_not_found() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_crew(&config_path, &["chat", "delete", "ghost"]);
    assert!(!success, "deleting a missing conversation should fail");
    assert!(
        stderr.contains("no conversation named 'ghost'"),
        "Should report not found, got: {}",
        stderr
    );
}

#[test]
fn chat_show_missing_reports_not_found() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_crew(&config_path, &["chat", "show", "ghost"]);
    assert!(!success);
    assert!(stderr.contains("no conversation named 'ghost'"));
}

// ============ CLI: status ============

#[test]
fn status_reports_unbuilt_index() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_crew(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("index: not built"));
    assert!(stdout.contains("knowledge base:"));
}

#[test]
fn bad_config_path_fails_with_context() {
    let (_, stderr, success) = run_crew(Path::new("/nonexistent/crew.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("config"), "got: {}", stderr);
}

// ============ HTTP server ============

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn setup_server_env(port: u16) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();
    fs::create_dir_all(root.join("kb")).unwrap();

    let config_content = format!(
        r#"[knowledge_base]
root = "{root}/kb"

[index]
path = "{root}/data/index.sqlite"

[conversations]
root = "{root}/data/conversations"

[server]
bind = "127.0.0.1:{port}"
"#,
        root = root.display(),
        port = port
    );

    let config_path = root.join("config").join("crew.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn start_server(config_path: &Path) -> std::process::Child {
    let binary = crew_binary();
    Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("serve")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("Failed to start server: {}", e))
}

fn wait_for_server(port: u16) {
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        std::thread::sleep(std::time::Duration::from_millis(100));
        if let Ok(resp) = reqwest::blocking::get(&url) {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

#[test]
fn server_health() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    let mut server = start_server(&config_path);
    wait_for_server(port);

    let resp = reqwest::blocking::get(format!("http://127.0.0.1:{}/health", port)).unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn server_conversation_roundtrip() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    let mut server = start_server(&config_path);
    wait_for_server(port);

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::blocking::Client::new();

    let session = serde_json::json!({
        "messages": [
            { "role": "user", "content": "How much thrust does the engine produce?" },
            { "role": "assistant", "content": "The engine produces 9000 lbf of thrust." },
        ],
        "current_chat_name": null,
    });

    // Save
    let resp = client
        .post(format!("{}/chats/sortie", base))
        .json(&serde_json::json!({ "session": session }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["session"]["current_chat_name"], "sortie");

    // List
    let resp = client.get(format!("{}/chats", base)).send().unwrap();
    let body: serde_json::Value = resp.json().unwrap();
    let names = body["conversations"].as_array().unwrap();
    assert!(names.iter().any(|n| n == "sortie"));

    // Load — exact roundtrip of roles, content, order
    let resp = client.get(format!("{}/chats/sortie", base)).send().unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["session"]["messages"], session["messages"]);

    // Delete, then the name is gone
    let resp = client
        .delete(format!("{}/chats/sortie", base))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(format!("{}/chats/sortie", base)).send().unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = client
        .delete(format!("{}/chats/sortie", base))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 404, "double delete reports not found");

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn server_owner_namespaces_are_isolated() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    let mut server = start_server(&config_path);
    wait_for_server(port);

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::blocking::Client::new();

    let session = serde_json::json!({
        "messages": [{ "role": "user", "content": "secret" }],
    });

    let resp = client
        .post(format!("{}/chats/private", base))
        .header("x-owner", "alice")
        .json(&serde_json::json!({ "session": session }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/chats", base))
        .header("x-owner", "bob")
        .send()
        .unwrap();
    let body: serde_json::Value = resp.json().unwrap();
    assert!(body["conversations"].as_array().unwrap().is_empty());

    let resp = client
        .get(format!("{}/chats/private", base))
        .header("x-owner", "bob")
        .send()
        .unwrap();
    assert_eq!(resp.status(), 404);

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn server_ask_without_api_key_is_rejected() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    let mut server = start_server(&config_path);
    wait_for_server(port);

    let client = reqwest::blocking::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{}/ask", port))
        .json(&serde_json::json!({ "question": "anything" }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "missing_api_key");

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn server_ask_before_processing_returns_gate_reply() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    let mut server = start_server(&config_path);
    wait_for_server(port);

    let client = reqwest::blocking::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{}/ask", port))
        .header("x-api-key", "dummy")
        .json(&serde_json::json!({ "question": "How much thrust?" }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(
        body["reply"],
        "Please process the knowledge base first."
    );
    // The session comes back untouched: the question was not attempted.
    assert!(body["session"]["messages"].as_array().unwrap().is_empty());

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn server_ask_rejects_empty_question() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    let mut server = start_server(&config_path);
    wait_for_server(port);

    let client = reqwest::blocking::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{}/ask", port))
        .header("x-api-key", "dummy")
        .json(&serde_json::json!({ "question": "   " }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn server_process_without_api_key_is_rejected() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    let mut server = start_server(&config_path);
    wait_for_server(port);

    let client = reqwest::blocking::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{}/process", port))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "missing_api_key");

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn server_process_empty_kb_reports_warning_state() {
    let port = find_free_port();
    let (tmp, config_path) = setup_server_env(port);

    let mut server = start_server(&config_path);
    wait_for_server(port);

    let client = reqwest::blocking::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{}/process", port))
        .header("x-api-key", "dummy")
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["status"], "no_documents");
    assert!(!tmp.path().join("data").join("index.sqlite").exists());

    server.kill().ok();
    server.wait().ok();
}

#[test]
fn server_rejects_traversal_conversation_names() {
    let port = find_free_port();
    let (_tmp, config_path) = setup_server_env(port);

    let mut server = start_server(&config_path);
    wait_for_server(port);

    let client = reqwest::blocking::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{}/chats/..%2Fescape", port))
        .json(&serde_json::json!({ "session": { "messages": [] } }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    server.kill().ok();
    server.wait().ok();
}
