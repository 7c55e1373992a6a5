use super::correlation::{CorrelationKey, PlanReference};
use super::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scheduled repayment of an installment plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentItem {
    pub plan_reference: PlanReference,
    /// Zero-based position in the plan's schedule.
    pub sequence: u32,
    /// Amount due for this step.
    pub total: Amount,
    /// Set once, when the gateway confirms payment.
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// The gateway's transaction id.
    #[serde(default)]
    pub payment_no: Option<String>,
}

impl RepaymentItem {
    pub fn new(plan_reference: PlanReference, sequence: u32, total: Amount) -> Self {
        Self {
            plan_reference,
            sequence,
            total,
            paid_at: None,
            payment_method: None,
            payment_no: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.paid_at.is_some()
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.plan_reference.clone(), self.sequence)
    }

    /// Records the settlement facts. Returns `false`, leaving the item
    /// untouched, if it was already settled.
    pub fn settle(
        &mut self,
        paid_at: DateTime<Utc>,
        payment_method: &str,
        payment_no: &str,
    ) -> bool {
        if self.is_settled() {
            return false;
        }
        self.paid_at = Some(paid_at);
        self.payment_method = Some(payment_method.to_string());
        self.payment_no = Some(payment_no.to_string());
        true
    }
}

/// First unsettled step in sequence order.
pub fn next_unpaid(items: &[RepaymentItem]) -> Option<&RepaymentItem> {
    items
        .iter()
        .filter(|item| !item.is_settled())
        .min_by_key(|item| item.sequence)
}
