use crate::domain::correlation::PlanReference;
use crate::domain::item::RepaymentItem;
use crate::domain::order::Order;
use crate::domain::plan::InstallmentPlan;
use crate::domain::ports::PlanStore;
use crate::domain::settlement::{self, Settlement, SettlementOutcome};
use crate::error::{InstallmentError, MatchingFailure, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    plans: HashMap<PlanReference, InstallmentPlan>,
    /// Kept sorted by sequence.
    items: HashMap<PlanReference, Vec<RepaymentItem>>,
    orders: HashMap<String, Order>,
}

/// A thread-safe in-memory store for plans, items and orders.
///
/// All three tables live behind one `Arc<RwLock<..>>`, so a settlement
/// performed under the write guard is atomic with respect to every other
/// reader and writer. Ideal for testing or single-process deployments where
/// persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryPlanStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryPlanStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn insert_plan(
        &self,
        plan: InstallmentPlan,
        mut items: Vec<RepaymentItem>,
    ) -> Result<()> {
        items.sort_by_key(|item| item.sequence);
        plan.validate_items(&items).map_err(InstallmentError::ValidationError)?;

        let mut state = self.state.write().await;
        state.items.insert(plan.reference.clone(), items);
        state.plans.insert(plan.reference.clone(), plan);
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.insert(order.reference.clone(), order);
        Ok(())
    }

    async fn get_plan(&self, reference: &PlanReference) -> Result<Option<InstallmentPlan>> {
        let state = self.state.read().await;
        Ok(state.plans.get(reference).cloned())
    }

    async fn get_items(&self, reference: &PlanReference) -> Result<Vec<RepaymentItem>> {
        let state = self.state.read().await;
        Ok(state.items.get(reference).cloned().unwrap_or_default())
    }

    async fn get_item(
        &self,
        reference: &PlanReference,
        sequence: u32,
    ) -> Result<Option<RepaymentItem>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .get(reference)
            .and_then(|items| items.iter().find(|item| item.sequence == sequence))
            .cloned())
    }

    async fn get_order(&self, reference: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(reference).cloned())
    }

    async fn list_by_owner(
        &self,
        owner_id: u64,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<InstallmentPlan>, usize)> {
        let state = self.state.read().await;
        let mut owned: Vec<&InstallmentPlan> = state
            .plans
            .values()
            .filter(|plan| plan.is_owned_by(owner_id))
            .collect();
        owned.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        let total = owned.len();
        let page = owned.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((page, total))
    }

    async fn get_all(&self) -> Result<Vec<InstallmentPlan>> {
        let state = self.state.read().await;
        let mut plans: Vec<InstallmentPlan> = state.plans.values().cloned().collect();
        plans.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(plans)
    }

    async fn settle(&self, settlement: &Settlement) -> Result<SettlementOutcome> {
        let reference = &settlement.key.plan_reference;
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        // Work on copies so a failure part-way leaves every table untouched.
        let mut plan = state
            .plans
            .get(reference)
            .cloned()
            .ok_or_else(|| MatchingFailure::UnknownPlan(reference.to_string()))?;
        let mut items = state.items.get(reference).cloned().unwrap_or_default();
        let mut order = state.orders.get(&plan.order_reference).cloned();

        let outcome = settlement::apply(settlement, &mut plan, &mut items, order.as_mut())?;

        if let SettlementOutcome::Applied(_) = &outcome {
            if let Some(order) = order {
                state.orders.insert(order.reference.clone(), order);
            }
            state.items.insert(reference.clone(), items);
            state.plans.insert(reference.clone(), plan);
        }
        Ok(outcome)
    }
}
