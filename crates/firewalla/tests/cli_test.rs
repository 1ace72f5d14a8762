//! Integration tests for the `firewalla` CLI binary.
//!
//! Argument parsing, config handling and error exits run without a
//! network; the status/pause tests talk to a wiremock MSP.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `firewalla` binary with env isolation.
///
/// Clears all `FIREWALLA_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn firewalla_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("firewalla");
    cmd.env("HOME", "/tmp/firewalla-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/firewalla-cli-test-nonexistent")
        .env_remove("FIREWALLA_PROFILE")
        .env_remove("FIREWALLA_CONFIG")
        .env_remove("FIREWALLA_HOST")
        .env_remove("FIREWALLA_BOX")
        .env_remove("FIREWALLA_API_KEY")
        .env_remove("FIREWALLA_OUTPUT")
        .env_remove("FIREWALLA_INSECURE")
        .env_remove("FIREWALLA_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

async fn mount_box(server: &MockServer, rule_status: &str) {
    Mock::given(method("GET"))
        .and(path("/v2/boxes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "gid": "g-1",
            "name": "Home",
            "model": "gold",
            "online": true
        }])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "AA:BB:CC:DD:EE:FF",
            "name": "laptop",
            "online": true
        }])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/rules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "r1",
            "type": "internet",
            "target": { "type": "domain", "value": "example.com" },
            "action": "block",
            "status": rule_status
        }])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/alarms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(server)
        .await;
}

/// Run the binary off the async runtime so wiremock keeps serving.
async fn run_blocking(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = firewalla_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(
        text.contains("Usage"),
        "Expected 'Usage' in output:\n{text}"
    );
}

#[test]
fn test_help_flag() {
    firewalla_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Firewalla")
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("pause"))
            .and(predicate::str::contains("resume")),
    );
}

#[test]
fn test_version_flag() {
    firewalla_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("firewalla"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    firewalla_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("firewalla"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    firewalla_cmd()
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_redacts_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
default_profile = "home"

[profiles.home]
host = "acme.firewalla.net"
api_key = "super-secret-token"
"#,
    );

    let output = firewalla_cmd()
        .args(["config", "show", "--config"])
        .arg(&path)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("acme.firewalla.net"), "{stdout}");
    assert!(!stdout.contains("super-secret-token"), "{stdout}");
    assert!(stdout.contains("****"), "{stdout}");
}

#[test]
fn test_config_set_then_use_profile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    firewalla_cmd()
        .args(["config", "set", "host", "acme.firewalla.net", "-p", "office", "--config"])
        .arg(&path)
        .assert()
        .success();
    firewalla_cmd()
        .args(["config", "use", "office", "--config"])
        .arg(&path)
        .assert()
        .success();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("acme.firewalla.net"), "{written}");
    assert!(written.contains(r#"default_profile = "office""#), "{written}");

    firewalla_cmd()
        .args(["config", "profiles", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("office *"));
}

#[test]
fn test_config_set_rejects_bad_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let output = firewalla_cmd()
        .args(["config", "set", "poll_interval", "often", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("poll_interval"));
    assert!(!path.exists());
}

#[test]
fn test_use_unknown_profile_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let output = firewalla_cmd()
        .args(["config", "use", "nowhere", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("nowhere"));
}

// ── Errors ──────────────────────────────────────────────────────────

#[test]
fn test_status_without_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = firewalla_cmd()
        .args(["status", "--config"])
        .arg(dir.path().join("missing.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("--host"));
}

#[test]
fn test_host_without_key_needs_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let output = firewalla_cmd()
        .args(["status", "--host", "acme.firewalla.net", "--config"])
        .arg(dir.path().join("missing.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_pause_rejects_malformed_id_before_connecting() {
    let output = firewalla_cmd().args(["pause", "a/b"]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("a/b"));
}

#[test]
fn test_unknown_profile_flag_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = firewalla_cmd()
        .args(["status", "-p", "ghost", "--config"])
        .arg(dir.path().join("missing.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("ghost"));
}

// ── Against a mock MSP ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_status_json_reports_box() {
    let server = MockServer::start().await;
    mount_box(&server, "active").await;
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = firewalla_cmd();
    cmd.args(["status", "-o", "json", "--api-key", "token", "--host"])
        .arg(server.uri())
        .arg("--config")
        .arg(dir.path().join("missing.toml"));
    let output = run_blocking(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["gid"], "g-1");
    assert_eq!(value["name"], "Home");
    assert_eq!(value["devices"], 1);
    assert_eq!(value["rules"], 1);
    assert_eq!(value["health"]["health"], "available");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_rules_plain_lists_ids() {
    let server = MockServer::start().await;
    mount_box(&server, "active").await;
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = firewalla_cmd();
    cmd.args(["status", "rules", "-o", "plain", "--api-key", "token", "--host"])
        .arg(server.uri())
        .arg("--config")
        .arg(dir.path().join("missing.toml"));
    let output = run_blocking(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "r1");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pause_posts_to_msp() {
    let server = MockServer::start().await;
    mount_box(&server, "active").await;
    Mock::given(method("POST"))
        .and(path("/v2/rules/r1/pause"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = firewalla_cmd();
    cmd.args(["pause", "r1", "-o", "json", "--api-key", "token", "--host"])
        .arg(server.uri())
        .arg("--config")
        .arg(dir.path().join("missing.toml"));
    let output = run_blocking(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["rule_id"], "r1");
    assert_eq!(value["action"], "pause");
    assert_eq!(value["outcome"], "applied");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_token_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "bad token" })))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = firewalla_cmd();
    cmd.args(["status", "--api-key", "wrong", "--host"])
        .arg(server.uri())
        .arg("--config")
        .arg(dir.path().join("missing.toml"));
    let output = run_blocking(cmd).await;

    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}
