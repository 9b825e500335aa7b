//! Smoke test for the stdio transport: one request per line in, one
//! response per line out, parse errors answered with -32700.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn stdio_loop_answers_requests_line_by_line() {
    let dir = TempDir::new().unwrap();
    let rules_dir = dir.path().join("rules");
    std::fs::create_dir_all(&rules_dir).unwrap();

    let input = "\
not json at all
{\"jsonrpc\":\"2.0\",\"method\":\"get_cache_stats\",\"params\":{},\"id\":1}
{\"jsonrpc\":\"2.0\",\"method\":\"nope\",\"params\":{},\"id\":2}
";

    let assert = Command::cargo_bin("mdcheckd")
        .unwrap()
        .arg("--rules-dir")
        .arg(&rules_dir)
        .arg("--prompts-dir")
        .arg(dir.path().join("prompts"))
        .env("MDCHECK_LLM_ENABLED", "false")
        .env_remove("MDCHECK_DB")
        .write_stdin(input)
        .assert()
        .success();

    let output = assert.get_output();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "one response per request line: {stdout}");

    let parse_error: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(parse_error["error"]["code"], -32700);
    assert_eq!(parse_error["id"], serde_json::Value::Null);

    let ok: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(ok["id"], 1);
    assert!(ok["result"]["total_items"].is_number());

    let not_found: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
    assert_eq!(not_found["error"]["code"], -32601);
    assert_eq!(not_found["error"]["message"], "Method not found: nope");
}

#[test]
fn binary_reports_version() {
    Command::cargo_bin("mdcheckd")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mdcheckd"));
}
