use std::process::Command;

use eyre::Context as _;

#[test]
fn doctor_json_runs_and_returns_valid_json() -> eyre::Result<()> {
    let exe = assert_cmd::cargo::cargo_bin!("keelvault");

    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;

    let out = Command::new(exe)
        .env("KEELVAULT_CONFIG_DIR", cfg_dir.path())
        .env("KEELVAULT_DATA_DIR", data_dir.path())
        .args(["doctor", "--json"])
        .output()
        .context("run keelvault doctor --json")?;

    assert!(
        out.status.success(),
        "doctor exited non-zero: status={:?}, stderr={}",
        out.status.code(),
        String::from_utf8_lossy(&out.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).context("parse doctor json")?;
    assert_eq!(v.get("ok").and_then(serde_json::Value::as_bool), Some(true));
    assert!(v.get("version").and_then(|x| x.as_str()).is_some());
    assert!(v.get("paths").and_then(|x| x.as_object()).is_some());
    assert_eq!(
        v.pointer("/vault/has_wallet").and_then(serde_json::Value::as_bool),
        Some(false)
    );
    Ok(())
}

#[test]
fn status_reports_no_wallet_on_fresh_dirs() -> eyre::Result<()> {
    use predicates::prelude::*;

    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;

    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("keelvault"))
        .env("KEELVAULT_CONFIG_DIR", cfg_dir.path())
        .env("KEELVAULT_DATA_DIR", data_dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"has_wallet\":false"));
    Ok(())
}

#[test]
fn paths_respects_env_overrides() -> eyre::Result<()> {
    let exe = assert_cmd::cargo::cargo_bin!("keelvault");

    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;

    let out = Command::new(exe)
        .env("KEELVAULT_CONFIG_DIR", cfg_dir.path())
        .env("KEELVAULT_DATA_DIR", data_dir.path())
        .arg("paths")
        .output()
        .context("run keelvault paths")?;

    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).context("parse paths json")?;
    assert_eq!(
        v.get("config_dir").and_then(|x| x.as_str()),
        cfg_dir.path().to_str()
    );
    assert_eq!(
        v.get("data_dir").and_then(|x| x.as_str()),
        data_dir.path().to_str()
    );
    Ok(())
}
