//! Integration tests for hostmap CLI functionality

#![allow(clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const V4_TABLE: &str = "\
1.0.0.0\t1.0.0.255\t13335\tUS\tCLOUDFLARENET
5.9.0.0\t5.9.255.255\t24940\tDE\tHETZNER-AS
";

fn write_inputs(dir: &Path) {
    fs::write(dir.join("ip2asn-v4.tsv"), V4_TABLE).unwrap();
    fs::write(
        dir.join("hosts.json"),
        r#"{
            "cf.example": ["1.0.0.10"],
            "hz.example": ["5.9.1.1", "5.9.1.2"],
            "dark.example": ["198.51.100.7"]
        }"#,
    )
    .unwrap();
    fs::write(
        dir.join("instances.json"),
        r#"{"instances": [
            {"name": "cf.example", "users": "1500", "active_users": 300},
            {"name": "hz.example", "users": 900, "active_users": null},
            {"name": "dark.example", "users": 40},
            {"name": "gone.example", "users": 20},
            {"name": "you-think-your-fake-numbers-are-funny.example", "users": 9999999}
        ]}"#,
    )
    .unwrap();
}

fn hostmap(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hostmap").expect("Failed to find hostmap binary");
    cmd.current_dir(dir).args([
        "--asn-ipv4",
        "ip2asn-v4.tsv",
        "--hosts",
        "hosts.json",
        "--instances-list",
        "instances.json",
    ]);
    cmd
}

#[test]
fn test_help_output() {
    let mut cmd = Command::cargo_bin("hostmap").expect("Failed to find hostmap binary");
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("hosting providers"))
        .stdout(predicate::str::contains("--asn-ipv4"))
        .stdout(predicate::str::contains("--instances-list"))
        .stdout(predicate::str::contains("--json"));
}

#[test]
fn test_missing_instance_list_argument() {
    let mut cmd = Command::cargo_bin("hostmap").expect("Failed to find hostmap binary");
    cmd.args(["--asn-ipv4", "v4.tsv"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--instances-list"));
}

#[test]
fn test_missing_range_file_fails() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());
    fs::remove_file(dir.path().join("ip2asn-v4.tsv")).unwrap();

    hostmap(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("ip2asn-v4.tsv"));
}

#[test]
fn test_no_range_file_fails() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());

    let mut cmd = Command::cargo_bin("hostmap").expect("Failed to find hostmap binary");
    cmd.current_dir(dir.path())
        .args(["--hosts", "hosts.json", "--instances-list", "instances.json"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("range files is required"));
}

#[test]
fn test_offline_text_output() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());

    hostmap(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("cloudflare"))
        .stdout(predicate::str::contains("hetzner"))
        .stdout(predicate::str::contains("Ignored 1 fake instances"));

    assert!(dir.path().join(".cache_ip").exists());
    assert!(dir.path().join(".cache_no_ip").exists());
    assert!(dir.path().join(".cache_asn").exists());
}

#[test]
fn test_offline_json_output() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());

    let output = hostmap(dir.path()).arg("--json").output().unwrap();
    assert!(output.status.success());

    let json: Value = serde_json::from_slice(&output.stdout).expect("Output should be valid JSON");
    let outcome = &json["outcome"];
    assert_eq!(outcome["hosters"]["cloudflare"][0], "cf.example");
    assert_eq!(outcome["hosters"]["hetzner"][0], "hz.example");
    assert_eq!(outcome["skipped"]["no_asn"][0]["name"], "dark.example");
    assert_eq!(outcome["skipped"]["no_ip"][0]["name"], "gone.example");
    assert_eq!(outcome["fixtures_ignored"], 1);
    assert_eq!(json["summary"][0]["hoster"], "cloudflare");
    assert!(json["version"].is_string());
}

#[test]
fn test_second_run_uses_failed_cache() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());

    hostmap(dir.path()).assert().success();
    let cached = fs::read_to_string(dir.path().join(".cache_no_ip")).unwrap();
    assert!(cached.contains("gone.example"));

    // The hosts table now knows the name, but the failed cache wins
    fs::write(
        dir.path().join("hosts.json"),
        r#"{"cf.example": ["1.0.0.10"], "gone.example": ["1.0.0.20"]}"#,
    )
    .unwrap();
    let output = hostmap(dir.path()).arg("--json").output().unwrap();
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["outcome"]["skipped"]["no_ip"][0]["name"], "gone.example");
    assert!(json["outcome"]["accepted"]["gone.example"].is_null());
}

fn write_two_hour_old_resolved_entry(dir: &Path) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64();
    fs::write(
        dir.join(".cache_ip"),
        format!(
            r#"{{"old.example":{{"v4":["1.0.0.99"],"v6":[],"timestamp":{}}}}}"#,
            now - 2.0 * 3600.0
        ),
    )
    .unwrap();
}

#[test]
fn test_default_ttl_evicts_old_entries() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());
    write_two_hour_old_resolved_entry(dir.path());

    let output = hostmap(dir.path()).arg("--json").output().unwrap();
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["evicted"]["resolved"], 1);

    let cached = fs::read_to_string(dir.path().join(".cache_ip")).unwrap();
    assert!(!cached.contains("old.example"));
}

#[test]
fn test_ttl_override_changes_eviction() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());
    write_two_hour_old_resolved_entry(dir.path());

    let output = hostmap(dir.path())
        .args(["--json", "--ttl-ip", "10800"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["evicted"]["resolved"], 0);

    let cached = fs::read_to_string(dir.path().join(".cache_ip")).unwrap();
    assert!(cached.contains("old.example"));
}
