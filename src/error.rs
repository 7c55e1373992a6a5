use thiserror::Error;

/// Reasons a gateway notification could not be resolved to a single (plan, step) pair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchingFailure {
    #[error("malformed correlation key {key:?}: {reason}")]
    MalformedKey { key: String, reason: &'static str },
    #[error("unknown installment plan {0}")]
    UnknownPlan(String),
    #[error("installment plan {plan} has no step {sequence}")]
    UnknownStep { plan: String, sequence: u32 },
}

#[derive(Error, Debug)]
pub enum InstallmentError {
    #[error("principal {principal} does not own installment plan {plan}")]
    Authorization { principal: u64, plan: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Gateway verification failed: {0}")]
    Verification(String),
    #[error("Matching failure: {0}")]
    Matching(#[from] MatchingFailure),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDB(#[from] rocksdb::Error),
}

impl InstallmentError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// True for failures that must never be acknowledged to the gateway as handled.
    pub fn is_retryable_by_gateway(&self) -> bool {
        matches!(
            self,
            Self::Verification(_)
                | Self::StorageError(_)
                | Self::IoError(_)
                | Self::SerdeError(_)
                | Self::InternalError(_)
        ) || self.is_backend_failure()
    }

    #[cfg(feature = "storage-rocksdb")]
    fn is_backend_failure(&self) -> bool {
        matches!(self, Self::RocksDB(_))
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    fn is_backend_failure(&self) -> bool {
        false
    }
}

pub type Result<T> = std::result::Result<T, InstallmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_failure_converts() {
        let err: InstallmentError = MatchingFailure::UnknownPlan("P1".to_string()).into();
        assert!(matches!(
            err,
            InstallmentError::Matching(MatchingFailure::UnknownPlan(_))
        ));
        assert!(!err.is_retryable_by_gateway());
    }

    #[test]
    fn test_storage_errors_are_retryable() {
        assert!(InstallmentError::StorageError("disk".to_string()).is_retryable_by_gateway());
        assert!(InstallmentError::Verification("sign".to_string()).is_retryable_by_gateway());
        assert!(!InstallmentError::invalid_request("closed").is_retryable_by_gateway());
    }
}
