//! Integration tests for the stride binary.
//!
//! These tests verify end-to-end behavior including:
//! - Level output
//! - Day loading from placeholder counts and record files
//! - Pull-to-refresh notices and dev inflation
//! - Animation frames and the flash edge
//! - Leaderboard standings

use assert_cmd::Command;
use chrono::{Local, NaiveDate, TimeZone};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a test directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary
fn cli() -> Command {
    Command::cargo_bin("stride").expect("Failed to find stride binary")
}

/// Config forcing the placeholder backend so runs never depend on the host
fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(
        &path,
        format!("[provider]\nkind = \"placeholder\"\n{}", extra),
    )
    .expect("Failed to write config");
    path
}

/// Record at local noon on `date`
fn noon_row(date: NaiveDate, count: u64, origin: &str) -> String {
    let start = Local
        .from_local_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
        .earliest()
        .unwrap();
    let end = start + chrono::Duration::minutes(30);
    format!(
        "{},{},{},{}\n",
        start.to_rfc3339(),
        end.to_rfc3339(),
        count,
        origin
    )
}

fn write_records(dir: &Path, rows: &[String]) -> PathBuf {
    let path = dir.join("records.csv");
    let mut contents = String::from("start_time,end_time,count,data_origin\n");
    for row in rows {
        contents.push_str(row);
    }
    fs::write(&path, contents).expect("Failed to write records");
    path
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Daily step tracker with levels"));
}

#[test]
fn test_level_text() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli()
        .arg("--config")
        .arg(&config)
        .args(["level", "8754"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Level:     8"))
        .stdout(predicate::str::contains("754/1000 (75.4%)"))
        .stdout(predicate::str::contains("To next:   246"));
}

#[test]
fn test_level_boundary_json() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    let output = cli()
        .arg("--config")
        .arg(&config)
        .args(["--json", "level", "1000"])
        .output()
        .expect("Failed to run stride");
    assert!(output.status.success());

    let info: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output is not JSON");
    assert_eq!(info["current_level"], 1);
    assert_eq!(info["progress_in_current_level"], 0);
    assert_eq!(info["steps_to_next_level"], 1000);
}

#[test]
fn test_today_placeholder() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli()
        .arg("--config")
        .arg(&config)
        .arg("today")
        .assert()
        .success()
        .stdout(predicate::str::contains("8754 steps"))
        .stdout(predicate::str::contains("Level 8"))
        .stdout(predicate::str::contains("Previous day: 7432 steps (↑18%)"));
}

#[test]
fn test_default_command_is_today() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli()
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Today"))
        .stdout(predicate::str::contains("8754 steps"));
}

#[test]
fn test_today_sums_sources_from_records() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");
    let day = NaiveDate::from_ymd_opt(2024, 5, 8).unwrap();
    let records = write_records(
        temp_dir.path(),
        &[
            noon_row(day, 5000, "com.example.watch"),
            noon_row(day, 3754, "com.example.phone"),
            noon_row(day.pred_opt().unwrap(), 7432, "com.example.phone"),
        ],
    );

    let output = cli()
        .arg("--config")
        .arg(&config)
        .args(["--json", "today", "--date", "2024-05-08", "--records"])
        .arg(&records)
        .output()
        .expect("Failed to run stride");
    assert!(output.status.success());

    let day: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output is not JSON");
    assert_eq!(day["date"], "2024-05-08");
    assert_eq!(day["steps"], 8754);
    assert_eq!(day["previous_day_steps"], 7432);
    assert_eq!(day["change_vs_previous_day"]["percent"], 18);
    assert_eq!(day["change_vs_previous_day"]["is_increase"], true);
    assert_eq!(day["level"]["current_level"], 8);
    assert_eq!(day["source"], "com.example.watch");
}

#[test]
fn test_today_missing_records_shows_zero() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");
    let missing = temp_dir.path().join("missing.csv");

    cli()
        .arg("--config")
        .arg(&config)
        .args(["today", "--records"])
        .arg(&missing)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 steps"))
        .stdout(predicate::str::contains("Previous day: 0 steps (↑0%)"))
        .stdout(predicate::str::contains("Never updated"));
}

#[test]
fn test_today_rejects_future_day() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");
    let tomorrow = Local::now().date_naive().succ_opt().unwrap();

    cli()
        .arg("--config")
        .arg(&config)
        .args(["today", "--date", &tomorrow.to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is after today"));
}

#[test]
fn test_refresh_up_to_date() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli()
        .arg("--config")
        .arg(&config)
        .arg("refresh")
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 8754 steps"))
        .stdout(predicate::str::contains("Steps are up to date"));
}

#[test]
fn test_refresh_with_inflation() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "[dev]\ninflate_steps = 500\n");
    let today = Local::now().date_naive();
    let records = write_records(temp_dir.path(), &[noon_row(today, 8754, "com.example.phone")]);

    let output = cli()
        .arg("--config")
        .arg(&config)
        .args(["--json", "refresh", "--inflate", "--times", "3", "--records"])
        .arg(&records)
        .output()
        .expect("Failed to run stride");
    assert!(output.status.success());

    let reports: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output is not JSON");
    let reports = reports.as_array().expect("Expected a list of reports");
    assert_eq!(reports.len(), 3);

    assert_eq!(reports[0]["previous"], 8754);
    assert_eq!(reports[0]["current"], 9254);
    assert_eq!(reports[0]["notice"]["kind"], "synced");
    assert_eq!(reports[0]["notice"]["added"], 500);
    assert_eq!(reports[0]["transition"]["has_leveled_up"], true);
    assert_eq!(reports[2]["current"], 10254);
}

#[test]
fn test_refresh_inflation_needs_records() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli()
        .arg("--config")
        .arg(&config)
        .args(["refresh", "--inflate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--inflate needs a record file"));
}

#[test]
fn test_refresh_failure_is_reported() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");
    let missing = temp_dir.path().join("missing.csv");

    // The initial load stays silent, the pull-to-refresh reports the failure
    cli()
        .arg("--config")
        .arg(&config)
        .args(["refresh", "--records"])
        .arg(&missing)
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 0 steps"))
        .stdout(predicate::str::contains("[Error] Could not sync steps"));
}

#[test]
fn test_animate_level_up_flashes_once() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    let output = cli()
        .arg("--config")
        .arg(&config)
        .args(["--json", "animate", "--from", "950", "--to", "1020"])
        .output()
        .expect("Failed to run stride");
    assert!(output.status.success());

    let frames: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output is not JSON");
    let frames = frames.as_array().expect("Expected a list of frames");

    let edges = frames
        .iter()
        .filter(|f| f["flash_edge"] == serde_json::Value::Bool(true))
        .count();
    assert_eq!(edges, 1);

    assert!(frames
        .iter()
        .any(|f| f["progress"].as_f64().unwrap() > 0.999 && f["level"] == 0));

    // The overlay pulses right after the edge and has faded by the end
    assert!(frames.iter().any(|f| f["overlay"].as_f64().unwrap() > 0.0));

    let last = frames.last().unwrap();
    assert_eq!(last["overlay"].as_f64().unwrap(), 0.0);
    assert_eq!(last["steps"], 1020);
    assert_eq!(last["level"], 1);
    assert!((last["progress"].as_f64().unwrap() - 0.02).abs() < 1e-9);
}

#[test]
fn test_animate_text_marks_flash() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli()
        .arg("--config")
        .arg(&config)
        .args(["animate", "--from", "0", "--to", "8754", "--fps", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("level up (+8 levels)"))
        .stdout(predicate::str::contains("FLASH"));
}

#[test]
fn test_animate_counting_has_no_flash() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli()
        .arg("--config")
        .arg(&config)
        .args(["animate", "--from", "500", "--to", "999"])
        .assert()
        .success()
        .stdout(predicate::str::contains("FLASH").not());
}

#[test]
fn test_leaderboard_marks_current_user() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli()
        .arg("--config")
        .arg(&config)
        .arg("leaderboard")
        .assert()
        .success()
        .stdout(predicate::str::contains(" 1. Sophie"))
        .stdout(predicate::str::contains("→  4. You"));
}

#[test]
fn test_leaderboard_with_own_steps() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    let output = cli()
        .arg("--config")
        .arg(&config)
        .args(["--json", "leaderboard", "--steps", "13000"])
        .output()
        .expect("Failed to run stride");
    assert!(output.status.success());

    let standings: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output is not JSON");
    assert_eq!(standings[0]["name"], "You");
    assert_eq!(standings[0]["rank"], 1);
    assert_eq!(standings[0]["is_current_user"], true);
    assert_eq!(standings[0]["level"], 13);
}

#[test]
fn test_invalid_config_rejected() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "fetch_timeout_ms = 0\n");

    cli()
        .arg("--config")
        .arg(&config)
        .args(["level", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fetch_timeout_ms"));
}
