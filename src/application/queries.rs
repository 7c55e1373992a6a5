use crate::config::DEFAULT_PAGE_SIZE;
use crate::domain::correlation::PlanReference;
use crate::domain::item::{RepaymentItem, next_unpaid};
use crate::domain::plan::InstallmentPlan;
use crate::domain::ports::{PlanStore, PlanStoreRef};
use crate::domain::principal::Principal;
use crate::error::{InstallmentError, Result};
use serde::Serialize;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
}

impl PageRequest {
    /// Out-of-range values are clamped to the first page and a page size of one.
    pub fn new(page: usize, per_page: usize) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn last_page(&self) -> usize {
        self.total.div_ceil(self.per_page).max(1)
    }
}

/// A plan, its full schedule and the step to pay next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanDetail {
    pub plan: InstallmentPlan,
    pub items: Vec<RepaymentItem>,
    pub next_item: Option<RepaymentItem>,
}

/// Loads a plan and checks that `principal` owns it.
pub(crate) async fn owned_plan(
    store: &dyn PlanStore,
    principal: &Principal,
    reference: &PlanReference,
) -> Result<InstallmentPlan> {
    let plan = store
        .get_plan(reference)
        .await?
        .ok_or_else(|| InstallmentError::NotFound(format!("installment plan {reference}")))?;
    if !plan.is_owned_by(principal.user_id) {
        return Err(InstallmentError::Authorization {
            principal: principal.user_id,
            plan: reference.to_string(),
        });
    }
    Ok(plan)
}

/// Read side of installment plans, always scoped to an explicit principal.
pub struct PlanQueries {
    store: PlanStoreRef,
}

impl PlanQueries {
    pub fn new(store: PlanStoreRef) -> Self {
        Self { store }
    }

    pub async fn list_plans(
        &self,
        principal: &Principal,
        request: PageRequest,
    ) -> Result<Page<InstallmentPlan>> {
        let (items, total) = self
            .store
            .list_by_owner(principal.user_id, request.offset(), request.per_page)
            .await?;
        Ok(Page {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
        })
    }

    pub async fn show_plan(
        &self,
        principal: &Principal,
        reference: &PlanReference,
    ) -> Result<PlanDetail> {
        let plan = owned_plan(self.store.as_ref(), principal, reference).await?;
        let items = self.store.get_items(reference).await?;
        let next_item = next_unpaid(&items).cloned();
        Ok(PlanDetail {
            plan,
            items,
            next_item,
        })
    }
}
