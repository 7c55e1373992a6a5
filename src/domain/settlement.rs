//! Settlement of a single repayment step.
//!
//! [`apply`] is the read-modify-write at the heart of reconciliation. Stores
//! call it on rows they have loaded *inside* their atomic unit (a write guard
//! or a database transaction) and persist the result only when it reports
//! [`SettlementOutcome::Applied`]. Because the step's `paid_at` is re-checked
//! there, two deliveries racing past the engine's fast-path check can never
//! both apply.

use super::correlation::{CorrelationKey, PlanReference};
use super::item::RepaymentItem;
use super::order::Order;
use super::plan::{InstallmentPlan, PlanStatus, PlanTransition};
use crate::error::{InstallmentError, MatchingFailure, Result};
use chrono::{DateTime, Utc};

/// Settlement facts reported by the gateway for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub key: CorrelationKey,
    pub settled_at: DateTime<Utc>,
    /// Gateway tag, e.g. `alipay`.
    pub payment_method: String,
    /// The gateway's transaction id.
    pub payment_no: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEffects {
    pub plan_reference: PlanReference,
    pub order_reference: String,
    pub sequence: u32,
    pub transitions: Vec<PlanTransition>,
    pub order_marked_paid: bool,
    pub status: PlanStatus,
}

impl SettlementEffects {
    pub fn first_payment(&self) -> bool {
        self.transitions.contains(&PlanTransition::FirstPayment)
    }

    pub fn finished(&self) -> bool {
        self.transitions.contains(&PlanTransition::Finished)
    }

    /// The order-paid event follows the first-payment transition, whether or
    /// not the order row itself could be written.
    pub fn publishes_order_paid(&self) -> bool {
        self.first_payment()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Applied(SettlementEffects),
    /// Another delivery settled the step first; nothing was written.
    AlreadySettled,
}

pub fn apply(
    settlement: &Settlement,
    plan: &mut InstallmentPlan,
    items: &mut [RepaymentItem],
    mut order: Option<&mut Order>,
) -> Result<SettlementOutcome> {
    let sequence = settlement.key.sequence;
    let item = items
        .iter_mut()
        .find(|item| item.sequence == sequence)
        .ok_or_else(|| MatchingFailure::UnknownStep {
            plan: plan.reference.to_string(),
            sequence,
        })?;

    if !item.settle(
        settlement.settled_at,
        &settlement.payment_method,
        &settlement.payment_no,
    ) {
        return Ok(SettlementOutcome::AlreadySettled);
    }

    let transitions = plan.transitions_for(sequence, items);
    let mut order_marked_paid = false;

    for transition in &transitions {
        match transition {
            PlanTransition::FirstPayment => {
                plan.advance_to(PlanStatus::Repaying);
                let order = order.as_deref_mut().ok_or_else(|| {
                    InstallmentError::StorageError(format!(
                        "order {} of plan {} is missing",
                        plan.order_reference, plan.reference
                    ))
                })?;
                order_marked_paid =
                    order.mark_paid_by_installment(settlement.settled_at, plan.reference.as_str());
            }
            PlanTransition::Finished => plan.advance_to(PlanStatus::Finished),
        }
    }

    Ok(SettlementOutcome::Applied(SettlementEffects {
        plan_reference: plan.reference.clone(),
        order_reference: plan.order_reference.clone(),
        sequence,
        transitions,
        order_marked_paid,
        status: plan.status,
    }))
}
