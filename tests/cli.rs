//! End-to-end runs of the `decoplan` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("decoplan"))
}

fn demo(name: &str) -> String {
    format!("{}/demos/{name}", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run a dive script"));
}

#[test]
fn test_runs_demo_script() {
    let output = cli()
        .arg(demo("canonical.dive"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();
    let reports: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0]["depth_m"], 20.0);
    assert_eq!(reports[1]["deco"]["success"], true);
    assert!(reports[1]["ceiling_m"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_reads_stdin() {
    cli()
        .arg("--pretty")
        .write_stdin("gas air oc 21 0\ntravel 18 rate 18 on air\nreport\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"depth_m\": 18.0"));
}

#[test]
fn test_missing_script_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.dive");
    cli()
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"))
        .stderr(predicate::str::contains("absent.dive"));
}

#[test]
fn test_script_errors_carry_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.dive");
    fs::write(&path, "gas air oc 21 0\nhold 10 for 5 on nitrox\n").unwrap();
    cli()
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("line 2: unknown gas 'nitrox'"));
}

#[test]
fn test_invalid_gradient_factor_fails() {
    cli()
        .write_stdin("set gf 0 70\ngas air oc 21 0\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("gf_low must be within 1-100"));
}
