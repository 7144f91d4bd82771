//! Integration tests for the `testhost-session` command line.

use std::process::Command;

const CLI: &str = env!("CARGO_BIN_EXE_testhost-session");

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("testhost.toml");
    let toml = format!(
        "peer_executable = \"dotnet\"\nworking_directory = '{}'\n",
        dir.display()
    );
    std::fs::write(&path, toml).expect("write config");
    path
}

#[test]
fn missing_config_file_fails() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = Command::new(CLI)
        .arg("--config")
        .arg(temp.path().join("absent.toml"))
        .arg("connect")
        .output()
        .expect("run cli");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read config"), "stderr: {stderr}");
}

#[test]
fn invalid_payload_is_rejected_before_launch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_config(temp.path());

    let output = Command::new(CLI)
        .arg("--config")
        .arg(&config)
        .args(["send", "TestDiscovery.Start", "--payload", "{not json"])
        .output()
        .expect("run cli");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--payload is not valid JSON"), "stderr: {stderr}");
}

#[test]
fn missing_workspace_override_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_config(temp.path());

    let output = Command::new(CLI)
        .arg("--config")
        .arg(&config)
        .arg("--workspace")
        .arg(temp.path().join("missing"))
        .arg("connect")
        .output()
        .expect("run cli");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("working_directory"), "stderr: {stderr}");
}

#[test]
fn json_log_format_is_accepted() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = Command::new(CLI)
        .arg("--config")
        .arg(temp.path().join("absent.toml"))
        .args(["--log-format", "json", "connect"])
        .env_remove("RUST_LOG")
        .output()
        .expect("run cli");

    let stderr = String::from_utf8_lossy(&output.stderr);
    let first = stderr.lines().next().expect("a log line");
    let line: serde_json::Value = serde_json::from_str(first).expect("json log line");
    assert_eq!(line["fields"]["message"], "testhost-session bootstrap");
}
