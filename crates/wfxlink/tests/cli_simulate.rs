#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

fn wfxlink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wfxlink"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("wfxlink should run")
}

fn json_stdout(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be one JSON document")
}

#[test]
fn simulate_confirms_every_request() {
    let output = wfxlink(&["--format", "json", "simulate", "--count", "40", "--capacity", "4"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report = json_stdout(&output);
    assert_eq!(report["requests_queued"], 40);
    assert_eq!(report["frames_written"], 40);
    assert_eq!(report["stats"]["requests"], 40);
    assert_eq!(report["stats"]["confirmations"], 40);
    assert_eq!(report["received"]["confirmations"], 40);
    assert_eq!(report["stats"]["seq_mismatches"], 0);
}

#[test]
fn simulate_with_multi_confirmations_and_indications() {
    let output = wfxlink(&[
        "--format",
        "json",
        "simulate",
        "--count",
        "30",
        "--capacity",
        "8",
        "--multi",
        "4",
        "--unsolicited",
        "5",
    ]);
    assert!(output.status.success());

    let report = json_stdout(&output);
    assert_eq!(report["stats"]["requests"], 30);
    assert_eq!(report["received"]["multi_confirmations"], 8);
    assert_eq!(report["received"]["indications"], 6);
    assert_eq!(report["stats"]["credit_underflows"], 0);
}

#[test]
fn simulate_with_wake_pin_leaves_chip_asleep() {
    let output = wfxlink(&["--format", "json", "simulate", "--count", "16", "--wake-pin"]);
    assert!(output.status.success());

    let report = json_stdout(&output);
    assert_eq!(report["wake_line"], false);
    assert_eq!(report["stats"]["requests"], 16);
}

#[test]
fn simulate_rejects_multi_above_capacity() {
    let output = wfxlink(&["simulate", "--capacity", "2", "--multi", "4"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("exceeds --capacity"));
}

#[test]
fn version_prints_package_version() {
    let output = wfxlink(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("wfxlink {}", env!("CARGO_PKG_VERSION")));
}
