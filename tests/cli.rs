//! Binary-level CLI tests.

#![allow(clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;

const PROVIDER_VARS: [&str; 6] = [
    "DASHSCOPE_API_KEY",
    "OPENAI_API_KEY",
    "GOOGLE_API_KEY",
    "BAICHUAN_API_KEY",
    "OLLAMA_BASE_URL",
    "LLM_PROVIDER",
];

fn mdt() -> Command {
    let mut cmd = Command::cargo_bin("mdt-rs").unwrap();
    cmd.env_remove("MDT_ROSTER_DIR").env_remove("MDT_CACHE_PATH");
    for var in PROVIDER_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_roles_lists_default_roster() {
    mdt()
        .arg("roles")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("13 specialist role(s)"))
        .stdout(predicate::str::contains("心脏科医生"));
}

#[test]
fn test_roles_json() {
    let output = mdt().args(["--format", "json", "roles"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value.as_array().map(Vec::len), Some(13));
    assert_eq!(value[0]["name"], "心脏科医生");
}

#[test]
fn test_init_roster_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let roster = dir.path().join("roster");

    mdt()
        .arg("init-roster")
        .arg(&roster)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 14 role template(s)"));
    assert!(roster.join("multidisciplinary_team.md").is_file());

    std::fs::write(roster.join("全科医生.md"), "请以全科医生身份分析：{medical_report}").unwrap();
    mdt()
        .arg("roles")
        .arg("--roster-dir")
        .arg(&roster)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("14 specialist role(s)"))
        .stdout(predicate::str::contains("全科医生"));
}

#[test]
fn test_cache_stats_on_fresh_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/cache.db");

    mdt()
        .arg("--cache-path")
        .arg(&path)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cached diagnoses: 0"));
    assert!(path.is_file());

    mdt()
        .arg("--cache-path")
        .arg(&path)
        .args(["cache", "prune", "--ttl", "60"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pruned 0"));
}

#[test]
fn test_diagnose_without_providers_fails() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.txt");
    std::fs::write(&report, "胸痛两天").unwrap();

    mdt()
        .arg("--cache-path")
        .arg(dir.path().join("cache.db"))
        .arg("diagnose")
        .arg(&report)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no model provider is configured"));
}

#[test]
fn test_unknown_provider_override_fails() {
    mdt()
        .args(["triage", "--provider", "acme"])
        .write_stdin("headache")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported provider: acme"));
}

#[test]
fn test_empty_report_rejected() {
    mdt()
        .arg("diagnose")
        .write_stdin("   \n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("report is empty"));
}
