use crate::domain::gateway::RawCallback;
use crate::error::{InstallmentError, Result};
use serde::Deserialize;
use std::io::Read;

/// One gateway notification as captured in a replay file.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct NotificationRecord {
    pub out_trade_no: String,
    pub trade_no: String,
    pub trade_status: String,
    #[serde(default)]
    pub sign: Option<String>,
}

impl NotificationRecord {
    pub fn is_signed(&self) -> bool {
        self.sign.as_deref().is_some_and(|sign| !sign.is_empty())
    }

    pub fn into_callback(self) -> RawCallback {
        let mut pairs = vec![
            ("out_trade_no", self.out_trade_no),
            ("trade_no", self.trade_no),
            ("trade_status", self.trade_status),
        ];
        if let Some(sign) = self.sign.filter(|sign| !sign.is_empty()) {
            pairs.push(("sign", sign));
        }
        RawCallback::from_pairs(pairs)
    }
}

/// Reads gateway notifications from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<NotificationRecord>`.
/// It handles whitespace trimming and a missing trailing `sign` column.
pub struct NotificationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> NotificationReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes notifications, one per row.
    pub fn notifications(self) -> impl Iterator<Item = Result<NotificationRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(InstallmentError::from))
    }
}
