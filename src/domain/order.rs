use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment method recorded on an order paid through an installment plan.
pub const INSTALLMENT_PAYMENT_METHOD: &str = "installment";

/// The order an installment plan pays for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub reference: String,
    pub owner_id: u64,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_no: Option<String>,
}

impl Order {
    pub fn new(reference: impl Into<String>, owner_id: u64) -> Self {
        Self {
            reference: reference.into(),
            owner_id,
            closed: false,
            paid_at: None,
            payment_method: None,
            payment_no: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.paid_at.is_some()
    }

    /// Marks the order paid by the plan `plan_reference`.
    ///
    /// Closed or already paid orders are left untouched and `false` is returned.
    pub fn mark_paid_by_installment(
        &mut self,
        paid_at: DateTime<Utc>,
        plan_reference: &str,
    ) -> bool {
        if self.closed || self.is_paid() {
            return false;
        }
        self.paid_at = Some(paid_at);
        self.payment_method = Some(INSTALLMENT_PAYMENT_METHOD.to_string());
        self.payment_no = Some(plan_reference.to_string());
        true
    }
}
