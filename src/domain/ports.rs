use super::correlation::PlanReference;
use super::event::DomainEvent;
use super::gateway::{AckToken, GatewayPayload, PaymentRequest, RawCallback, RedirectDirective};
use super::item::RepaymentItem;
use super::order::Order;
use super::plan::InstallmentPlan;
use super::settlement::{Settlement, SettlementOutcome};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence for installment plans, their repayment items and the orders they pay for.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Stores a plan together with its full schedule.
    async fn insert_plan(&self, plan: InstallmentPlan, items: Vec<RepaymentItem>) -> Result<()>;
    async fn insert_order(&self, order: Order) -> Result<()>;

    async fn get_plan(&self, reference: &PlanReference) -> Result<Option<InstallmentPlan>>;
    /// Items of a plan ordered by sequence ascending.
    async fn get_items(&self, reference: &PlanReference) -> Result<Vec<RepaymentItem>>;
    async fn get_item(&self, reference: &PlanReference, sequence: u32)
    -> Result<Option<RepaymentItem>>;
    async fn get_order(&self, reference: &str) -> Result<Option<Order>>;

    /// One page of an owner's plans plus the owner's total plan count.
    async fn list_by_owner(
        &self,
        owner_id: u64,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<InstallmentPlan>, usize)>;
    async fn get_all(&self) -> Result<Vec<InstallmentPlan>>;

    /// Settles one step and cascades plan and order changes as a single atomic unit.
    ///
    /// Implementations must re-check the step's settlement inside the unit and
    /// write nothing when it is already settled; on error nothing is written.
    async fn settle(&self, settlement: &Settlement) -> Result<SettlementOutcome>;
}

/// Capability interface to the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Tag recorded as the payment method of settled items.
    fn method_tag(&self) -> &str;
    async fn initiate_payment(&self, request: PaymentRequest) -> Result<RedirectDirective>;
    fn verify_return(&self, raw: &RawCallback) -> Result<GatewayPayload>;
    fn verify_notification(&self, raw: &RawCallback) -> Result<GatewayPayload>;
    fn ack_success(&self) -> AckToken;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> Result<()>;
}

pub type PlanStoreRef = Arc<dyn PlanStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type EventPublisherRef = Arc<dyn EventPublisher>;
