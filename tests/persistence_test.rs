#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::process::Command;
use tempfile::tempdir;

mod common;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: seed and settle the first step
    let csv1 = common::notifications_file(&[("P1001_0", "T-1", "TRADE_SUCCESS")]).unwrap();
    let output1 = Command::new(cargo_bin!("installments"))
        .arg("replay")
        .arg(csv1.path())
        .arg("--seed")
        .arg(common::SEED)
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("P1001,O-1001,repaying,1,3"));

    // 2. Second run: re-seeding keeps the stored progress
    let csv2 = common::notifications_file(&[
        ("P1001_0", "T-1", "TRADE_SUCCESS"),
        ("P1001_1", "T-2", "TRADE_SUCCESS"),
        ("P1001_2", "T-3", "TRADE_SUCCESS"),
    ])
    .unwrap();
    let output2 = Command::new(cargo_bin!("installments"))
        .arg("replay")
        .arg(csv2.path())
        .arg("--seed")
        .arg(common::SEED)
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    assert!(stdout2.contains("P1001,O-1001,finished,3,3"));
}
