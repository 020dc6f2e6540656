#![allow(missing_docs)]

use std::process::Stdio;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

mod common;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn tswindow() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tswindow"));
    cmd.env_remove("TSWINDOW_BASE").env("RUST_LOG", "off");
    cmd
}

/// Two days of November 2025 for `s1`, two hours per row group.
fn shards() -> TestResult<TempDir> {
    let tmp = TempDir::new()?;
    common::write_shard(tmp.path(), "s1", (2025, 11), 2880, 120)?;
    Ok(tmp)
}

#[test]
fn inspect_prints_footer_summary() -> TestResult {
    let tmp = shards()?;
    tswindow()
        .arg("--base")
        .arg(tmp.path())
        .args(["inspect", "--entity", "s1", "--month", "2025-11"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shard: s1@2025-11"))
        .stdout(predicate::str::contains("rows: 2880"))
        .stdout(predicate::str::contains("row groups: 24"))
        .stdout(predicate::str::contains("2025-11-01T00:00:00Z .. 2025-11-02T23:59:00Z"));
    Ok(())
}

#[test]
fn inspect_json_lists_row_groups() -> TestResult {
    let tmp = shards()?;
    let output = tswindow()
        .env("TSWINDOW_BASE", tmp.path())
        .args(["inspect", "--entity", "s1", "--month", "2025-11", "--json"])
        .output()?;
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["rows"], 2880);
    let groups = value["row_groups"].as_array().ok_or("row_groups not an array")?;
    assert_eq!(groups.len(), 24);
    assert_eq!(groups[1]["time_min"], "2025-11-01T02:00:00Z");
    Ok(())
}

#[test]
fn inspect_absent_month_fails() -> TestResult {
    let tmp = shards()?;
    tswindow()
        .arg("--base")
        .arg(tmp.path())
        .args(["inspect", "--entity", "s1", "--month", "2025-10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
    Ok(())
}

#[test]
fn window_reports_row_groups_and_absent_months() -> TestResult {
    let tmp = shards()?;
    tswindow()
        .arg("--base")
        .arg(tmp.path())
        .args(["window", "--entity", "s1", "--window", "251102T06-6h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s1: 3 row groups"))
        .stdout(predicate::str::contains("360 rows"));

    tswindow()
        .arg("--base")
        .arg(tmp.path())
        .args(["window", "--entity", "s1", "--end", "20251101T06", "--duration", "12h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2025-10: no data"))
        .stdout(predicate::str::contains("2025-11: 3 row groups"));
    Ok(())
}

#[test]
fn window_json_is_parseable() -> TestResult {
    let tmp = shards()?;
    let output = tswindow()
        .arg("--base")
        .arg(tmp.path())
        .args(["window", "--entity", "s1", "--window", "251102-1h", "--json"])
        .output()?;
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["start"], "2025-11-01T23:00:00Z");
    assert_eq!(value["entities"][0]["shards"][0]["month"], "2025-11");
    Ok(())
}

#[test]
fn usage_errors() -> TestResult {
    tswindow()
        .args(["window", "--entity", "s1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No shard base"));

    let tmp = shards()?;
    tswindow()
        .arg("--base")
        .arg(tmp.path())
        .args(["window", "--entity", "s1", "--window", "2511-3w"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid window"));

    tswindow()
        .arg("--base")
        .arg(tmp.path())
        .args(["window", "--entity", "s1", "--window=-99999999d"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds"));

    tswindow()
        .args(["--base", "/definitely/not/here", "inspect", "--entity", "s1", "--month", "2025-11"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    tswindow()
        .arg("--base")
        .arg(tmp.path())
        .args(["inspect", "--entity", "s1", "--month", "2025-13"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid entity or month"));
    Ok(())
}

#[test]
fn watch_reports_one_round() -> TestResult {
    let tmp = shards()?;
    tswindow()
        .arg("--base")
        .arg(tmp.path())
        .args(["watch", "--entity", "s1", "--interval-secs", "1", "--ticks", "1"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("resolved"));
    Ok(())
}

#[tokio::test]
async fn shell_navigates_from_a_fixed_window() -> TestResult {
    let tmp = shards()?;
    let bin = assert_cmd::cargo::cargo_bin!("tswindow");
    let mut child = tokio::process::Command::new(bin)
        .env_remove("TSWINDOW_BASE")
        .env("RUST_LOG", "off")
        .arg("--base")
        .arg(tmp.path())
        .args(["shell", "--entity", "s1", "--window", "251102T06-6h"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(b"page-back\nwindow\nearliest\nback\nstats\nbogus\nexit\n")
            .await?;
    }
    let output = tokio::time::timeout(Duration::from_secs(30), child.wait_with_output())
        .await
        .map_err(|_| "shell timed out")??;

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout:\n{stdout}");
    assert!(stdout.contains("'251102-6h'"), "stdout:\n{stdout}");
    assert!(stdout.contains("[at earliest]"), "stdout:\n{stdout}");
    assert!(stdout.contains("not available here"), "stdout:\n{stdout}");
    assert!(stdout.contains("unknown command: bogus"), "stdout:\n{stdout}");
    assert!(stdout.contains("total:"), "stdout:\n{stdout}");
    Ok(())
}
