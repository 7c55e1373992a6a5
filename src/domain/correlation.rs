//! The correlation key echoed back by the payment gateway.
//!
//! A step is presented to the gateway as `<plan_reference>_<sequence>`, which
//! lets a notification be resolved to its (plan, step) pair without any
//! server-side session state. The separator is reserved and can never appear
//! inside a [`PlanReference`].

use crate::error::{InstallmentError, MatchingFailure};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SEPARATOR: char = '_';

/// Globally unique reference of an installment plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlanReference(String);

impl PlanReference {
    pub fn new(value: impl Into<String>) -> Result<Self, InstallmentError> {
        let value = value.into();
        if value.is_empty() {
            return Err(InstallmentError::ValidationError(
                "Plan reference must not be empty".to_string(),
            ));
        }
        if value.contains(SEPARATOR) {
            return Err(InstallmentError::ValidationError(format!(
                "Plan reference {value:?} contains the reserved separator '{SEPARATOR}'"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PlanReference {
    type Error = InstallmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlanReference> for String {
    fn from(reference: PlanReference) -> Self {
        reference.0
    }
}

impl fmt::Display for PlanReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub plan_reference: PlanReference,
    pub sequence: u32,
}

impl CorrelationKey {
    pub fn new(plan_reference: PlanReference, sequence: u32) -> Self {
        Self {
            plan_reference,
            sequence,
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.plan_reference, SEPARATOR, self.sequence)
    }
}

impl FromStr for CorrelationKey {
    type Err = MatchingFailure;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let malformed = |reason| MatchingFailure::MalformedKey {
            key: key.to_string(),
            reason,
        };

        let mut parts = key.split(SEPARATOR);
        let (Some(plan), Some(sequence), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed("expected exactly one separator"));
        };

        if plan.is_empty() {
            return Err(malformed("empty plan reference"));
        }
        // u32::from_str would also accept a leading '+'
        if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("sequence is not a decimal number"));
        }
        let sequence = sequence
            .parse::<u32>()
            .map_err(|_| malformed("sequence out of range"))?;
        let plan_reference =
            PlanReference::new(plan).map_err(|_| malformed("invalid plan reference"))?;

        Ok(Self::new(plan_reference, sequence))
    }
}
