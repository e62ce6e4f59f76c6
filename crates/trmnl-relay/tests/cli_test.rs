//! Integration tests for the `trmnl-relay` binary.
//!
//! Argument parsing, completions and error paths run without any backend;
//! the send tests point a throwaway config file at a wiremock server.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEVICE: &str = "AA:BB:CC:DD:EE:FF";

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the binary with env isolation.
///
/// Clears `TRMNL_*` variables and points the home and config dirs at a
/// nonexistent path so tests never touch the user's configuration.
fn relay_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("trmnl-relay");
    cmd.env("HOME", "/tmp/trmnl-relay-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/trmnl-relay-test-nonexistent")
        .env_remove("TRMNL_RELAY_DEVICE")
        .env_remove("TRMNL_RELAY_CONFIG")
        .env_remove("TRMNL_RELAY_API_KEY")
        .env_remove("TRMNL_RELAY_OUTPUT")
        .env_remove("TRMNL_RELAY_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Command bound to a config file.
fn relay_with(config: &Path) -> assert_cmd::Command {
    let mut cmd = relay_cmd();
    cmd.arg("--config").arg(config);
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn terminus_config(dir: &Path, endpoint: &str, quota: i64) -> PathBuf {
    write_config(
        dir,
        &format!(
            r#"
default_device = "office"

[devices.office]
device_id = "aa-bb-cc-dd-ee-ff"
backend = "terminus"
api_endpoint = "{endpoint}"
api_key = "byos-token"
quota = {quota}
"#
        ),
    )
}

fn standard_config(dir: &Path, endpoint: &str) -> PathBuf {
    write_config(
        dir,
        &format!(
            r#"
[devices.cloud]
device_id = "{DEVICE}"
backend = "standard"
api_endpoint = "{endpoint}"
api_key = "acct"
"#
        ),
    )
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = relay_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    relay_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("send-image")
            .and(predicate::str::contains("send-variables"))
            .and(predicate::str::contains("batch"))
            .and(predicate::str::contains("register")),
    );
}

#[test]
fn test_version_flag() {
    relay_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("trmnl-relay"));
}

#[test]
fn test_completions_bash() {
    relay_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    relay_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_invalid_output_format() {
    let output = relay_cmd()
        .args(["--output", "invalid", "devices"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about valid output formats:\n{text}"
    );
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    relay_with(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_redacts_key() {
    let dir = tempfile::tempdir().unwrap();
    let config = terminus_config(dir.path(), "http://127.0.0.1:9", 12);
    relay_with(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[devices.office]")
                .and(predicate::str::contains("****"))
                .and(predicate::str::contains("byos-token").not()),
        );
}

#[test]
fn test_devices_without_config() {
    let dir = tempfile::tempdir().unwrap();
    relay_with(&dir.path().join("missing.toml"))
        .arg("devices")
        .assert()
        .success()
        .stderr(predicate::str::contains("No devices configured"));
}

#[test]
fn test_devices_lists_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let config = terminus_config(dir.path(), "http://127.0.0.1:9", 12);
    relay_with(&config)
        .args(["--output", "plain", "devices"])
        .assert()
        .success()
        .stdout("office\n");
}

#[test]
fn test_devices_table_marks_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = terminus_config(dir.path(), "http://127.0.0.1:9", 12);
    relay_with(&config)
        .arg("devices")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("office *")
                .and(predicate::str::contains("aa-bb-cc-dd-ee-ff"))
                .and(predicate::str::contains("terminus")),
        );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_devices_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(header("Access-Token", "acct"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 7, "name": "Kitchen", "friendly_id": "K1TCH3", "battery_voltage": 3.91}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = standard_config(dir.path(), &server.uri());
    relay_with(&config)
        .args(["devices", "--remote"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Kitchen")
                .and(predicate::str::contains("K1TCH3"))
                .and(predicate::str::contains("3.91V")),
        );
}

#[test]
fn test_send_without_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    relay_with(&dir.path().join("missing.toml"))
        .args(["send-image", "https://ha.local/a.png"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config init"));
}

#[test]
fn test_unknown_profile_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = terminus_config(dir.path(), "http://127.0.0.1:9", 12);
    relay_with(&config)
        .args(["--device", "lobby", "send-image", "https://ha.local/a.png"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("lobby"));
}

// ── Sending ─────────────────────────────────────────────────────────

#[test]
fn test_relative_url_is_usage_error() {
    // The endpoint is unroutable: validation must stop the request first.
    let dir = tempfile::tempdir().unwrap();
    let config = terminus_config(dir.path(), "http://127.0.0.1:9", 12);
    relay_with(&config)
        .args(["send-image", "images/a.png"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("image_url"));
}

#[test]
fn test_invalid_variables_json_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = terminus_config(dir.path(), "http://127.0.0.1:9", 12);
    relay_with(&config)
        .args(["send-variables", "{not json"])
        .assert()
        .code(2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_image_to_terminus() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/display"))
        .and(header("ID", DEVICE))
        .and(header("Authorization", "Bearer byos-token"))
        .and(body_json(json!({
            "image_url": "https://ha.local/a.png",
            "refresh_rate": 900
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"refresh_rate": 900, "message": "ok"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = terminus_config(dir.path(), &server.uri(), 12);
    let output = relay_with(&config)
        .args([
            "--output",
            "json",
            "send-image",
            "https://ha.local/a.png",
            "--refresh-rate",
            "900",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["state"], "success");
    assert_eq!(result["device_id"], DEVICE);
    assert_eq!(result["metadata"]["refresh_rate"], 900);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quota_persists_between_runs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/display"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = terminus_config(dir.path(), &server.uri(), 1);

    relay_with(&config)
        .args(["send-image", "https://ha.local/a.png"])
        .assert()
        .success();

    // Second process: the window saved by the first one is still full.
    let output = relay_with(&config)
        .args(["send-image", "https://ha.local/b.png"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(9), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("Rate limit reached"));
    assert!(dir.path().join("limiter-state.json").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backend_rejection_maps_exit_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/display"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "bad token"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = terminus_config(dir.path(), &server.uri(), 12);
    relay_with(&config)
        .args(["send-image", "https://ha.local/a.png"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Authentication failed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_register_saves_plugin_uuid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/custom_plugins"))
        .and(header("Access-Token", "acct"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"uuid": "plug-9"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/custom_plugins/plug-9"))
        .and(body_json(json!({
            "merge_variables": {"temp": 21},
            "merge_strategy": "stream"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = standard_config(dir.path(), &server.uri());

    // Unregistered standard devices cannot send yet.
    relay_with(&config)
        .args(["send-variables", r#"{"temp": 21}"#])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("register"));

    relay_with(&config)
        .args(["--output", "plain", "register"])
        .assert()
        .success()
        .stdout("plug-9\n");
    let saved = std::fs::read_to_string(&config).unwrap();
    assert!(saved.contains("plugin_uuid = \"plug-9\""), "{saved}");

    // The saved uuid is used directly; no second registration call.
    let vars = dir.path().join("vars.json");
    std::fs::write(&vars, r#"{"temp": 21}"#).unwrap();
    relay_with(&config)
        .args([
            "send-variables",
            &format!("@{}", vars.display()),
            "--merge-strategy",
            "stream",
        ])
        .assert()
        .success();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_isolates_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/display"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"refresh_rate": 60})))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = terminus_config(dir.path(), &server.uri(), 12);
    let batch = dir.path().join("batch.yaml");
    std::fs::write(
        &batch,
        "\
- device: office
  type: image
  image_url: https://ha.local/a.png
- device: lobby
  type: image
  image_url: https://ha.local/b.png
- type: image
  image_url: https://ha.local/c.png
- device: office
  type: variables
  variables: [1, 2]
",
    )
    .unwrap();

    let output = relay_with(&config)
        .args(["--output", "json", "batch"])
        .arg(&batch)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("2 of 4 requests failed"));

    let results: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let states: Vec<&str> = results.iter().map(|r| r["state"].as_str().unwrap()).collect();
    assert_eq!(states, ["success", "failed", "success", "failed"]);
    assert_eq!(results[1]["error_kind"], "device_not_found");
    assert_eq!(results[3]["error_kind"], "invalid_argument");
}
