use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

mod common;

#[test]
fn test_malformed_rows_are_skipped() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "out_trade_no,trade_no,trade_status").unwrap();
    writeln!(csv, "P1002_0,T-1,TRADE_SUCCESS").unwrap();
    // Missing columns
    writeln!(csv, "P1002_1").unwrap();
    writeln!(csv, "P1002_1,T-2,TRADE_SUCCESS").unwrap();
    csv.flush().unwrap();

    let mut cmd = Command::new(cargo_bin!("installments"));
    cmd.env_remove("RUST_LOG")
        .arg("replay")
        .arg(csv.path())
        .arg("--seed")
        .arg(common::SEED);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("unreadable notification row"))
        .stdout(predicate::str::contains("P1002,O-1002,finished,2,2"));
}

#[test]
fn test_malformed_keys_never_mutate() {
    let csv = common::notifications_file(&[
        ("P1001", "T-1", "TRADE_SUCCESS"),
        ("P1001_x", "T-2", "TRADE_SUCCESS"),
        ("P1001_0_1", "T-3", "TRADE_SUCCESS"),
        ("_0", "T-4", "TRADE_SUCCESS"),
        ("P1001_7", "T-5", "TRADE_SUCCESS"),
    ])
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("installments"));
    cmd.arg("replay")
        .arg(csv.path())
        .arg("--seed")
        .arg(common::SEED);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("P1001,O-1001,pending,0,3"));
}

#[test]
fn test_wrong_secret_rejects_signed_rows() {
    // Rows signed by a different secret must not settle anything.
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "out_trade_no,trade_no,trade_status,sign").unwrap();
    writeln!(csv, "P1002_0,T-1,TRADE_SUCCESS,00ff").unwrap();
    csv.flush().unwrap();

    let mut cmd = Command::new(cargo_bin!("installments"));
    cmd.env("INSTALLMENTS_GATEWAY_SECRET", "other-secret")
        .arg("replay")
        .arg(csv.path())
        .arg("--seed")
        .arg(common::SEED);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("P1002,O-1002,pending,0,2"));
}

#[test]
fn test_missing_input_file_fails() {
    let mut cmd = Command::new(cargo_bin!("installments"));
    cmd.args(["replay", "does/not/exist.csv"]);

    cmd.assert().failure();
}
