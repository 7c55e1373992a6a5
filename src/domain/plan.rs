use super::correlation::PlanReference;
use super::item::RepaymentItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an installment plan.
///
/// Variants are declared in transition order so that `Ord` can be used to
/// keep status writes monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    /// The plan exists but its first step is unpaid.
    #[default]
    Pending,
    Repaying,
    Finished,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Repaying => "repaying",
            Self::Finished => "finished",
        }
    }
}

/// A state change fired by settling one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTransition {
    /// Step 0 was settled: the plan starts repaying and the order counts as paid.
    FirstPayment,
    /// No unsettled step is left.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub reference: PlanReference,
    /// The principal who owns the plan.
    pub owner_id: u64,
    pub order_reference: String,
    /// Number of repayment steps.
    pub count: u32,
    #[serde(default)]
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

impl InstallmentPlan {
    pub fn new(
        reference: PlanReference,
        owner_id: u64,
        order_reference: impl Into<String>,
        count: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reference,
            owner_id,
            order_reference: order_reference.into(),
            count,
            status: PlanStatus::Pending,
            created_at,
        }
    }

    pub fn is_owned_by(&self, principal_id: u64) -> bool {
        self.owner_id == principal_id
    }

    pub fn is_finished(&self) -> bool {
        self.status == PlanStatus::Finished
    }

    /// Moves the plan forward to `status`; a lower status never overwrites a higher one.
    pub fn advance_to(&mut self, status: PlanStatus) {
        self.status = self.status.max(status);
    }

    /// Works out which transitions settling `sequence` fires, given the plan's
    /// items *after* that step has been settled.
    ///
    /// Finishing is decided on the whole schedule rather than on the sequence
    /// number alone, so a last step that arrives before an interior one does
    /// not finish the plan early; the interior step finishes it instead.
    pub fn transitions_for(&self, sequence: u32, items: &[RepaymentItem]) -> Vec<PlanTransition> {
        let mut transitions = Vec::with_capacity(2);
        if sequence == 0 {
            transitions.push(PlanTransition::FirstPayment);
        }
        let settled = items.iter().filter(|item| item.is_settled()).count();
        if self.status != PlanStatus::Finished && settled as u64 == u64::from(self.count) {
            transitions.push(PlanTransition::Finished);
        }
        transitions
    }

    /// Checks that `items` form the contiguous schedule `0..count` of this plan.
    pub fn validate_items(&self, items: &[RepaymentItem]) -> Result<(), String> {
        if self.count == 0 {
            return Err(format!("plan {} has no steps", self.reference));
        }
        if items.len() as u64 != u64::from(self.count) {
            return Err(format!(
                "plan {} declares {} steps but has {}",
                self.reference,
                self.count,
                items.len()
            ));
        }
        for (expected, item) in (0u32..).zip(items) {
            if item.plan_reference != self.reference {
                return Err(format!(
                    "step {} belongs to plan {}, not {}",
                    item.sequence, item.plan_reference, self.reference
                ));
            }
            if item.sequence != expected {
                return Err(format!(
                    "plan {} steps are not contiguous: expected {}, found {}",
                    self.reference, expected, item.sequence
                ));
            }
        }
        Ok(())
    }
}
