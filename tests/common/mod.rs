#![allow(dead_code)]

use std::io::{Error, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

pub const SEED: &str = "tests/fixtures/seed.json";
pub const NOTIFICATIONS: &str = "tests/fixtures/notifications.csv";

/// Writes unsigned notification rows to a temporary CSV file.
pub fn notifications_file(rows: &[(&str, &str, &str)]) -> Result<NamedTempFile, Error> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "out_trade_no,trade_no,trade_status")?;
    for (out_trade_no, trade_no, trade_status) in rows {
        writeln!(file, "{out_trade_no},{trade_no},{trade_status}")?;
    }
    file.flush()?;
    Ok(file)
}

pub fn seed_path() -> PathBuf {
    PathBuf::from(SEED)
}
