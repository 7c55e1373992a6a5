use super::queries::owned_plan;
use crate::config::GatewaySettings;
use crate::domain::correlation::{CorrelationKey, PlanReference};
use crate::domain::event::DomainEvent;
use crate::domain::gateway::{
    GatewayPayload, NotificationAck, PaymentRequest, RawCallback, RedirectDirective,
    ReturnOutcome,
};
use crate::domain::item::next_unpaid;
use crate::domain::ports::{EventPublisherRef, PaymentGatewayRef, PlanStoreRef};
use crate::domain::principal::Principal;
use crate::domain::settlement::{Settlement, SettlementEffects, SettlementOutcome};
use crate::error::{InstallmentError, MatchingFailure, Result};
use chrono::Utc;
use tracing::{debug, error, info, warn};

const ORDER_CLOSED: &str = "the linked order has been closed";
const PLAN_SETTLED: &str = "the installment plan is already settled";

/// Reconciles gateway callbacks against installment plans.
///
/// The engine holds no state of its own between calls: every notification is
/// an independent unit of work and correctness under duplicate or concurrent
/// delivery rests on [`PlanStore::settle`](crate::domain::ports::PlanStore::settle)
/// being conditional and atomic.
pub struct ReconciliationEngine {
    store: PlanStoreRef,
    gateway: PaymentGatewayRef,
    publisher: EventPublisherRef,
    settings: GatewaySettings,
}

impl ReconciliationEngine {
    pub fn new(
        store: PlanStoreRef,
        gateway: PaymentGatewayRef,
        publisher: EventPublisherRef,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            store,
            gateway,
            publisher,
            settings,
        }
    }

    /// Starts a gateway payment for the plan's next unpaid step.
    pub async fn initiate(
        &self,
        principal: &Principal,
        reference: &PlanReference,
    ) -> Result<RedirectDirective> {
        let plan = owned_plan(self.store.as_ref(), principal, reference).await?;

        let order = self
            .store
            .get_order(&plan.order_reference)
            .await?
            .ok_or_else(|| {
                InstallmentError::StorageError(format!(
                    "order {} of plan {} is missing",
                    plan.order_reference, plan.reference
                ))
            })?;
        if order.closed {
            return Err(InstallmentError::invalid_request(ORDER_CLOSED));
        }
        if plan.is_finished() {
            return Err(InstallmentError::invalid_request(PLAN_SETTLED));
        }

        let items = self.store.get_items(&plan.reference).await?;
        // Unreachable while the plan invariant holds, but a finished schedule
        // under a non-finished plan must still be refused.
        let Some(next) = next_unpaid(&items) else {
            warn!(plan = %plan.reference, status = plan.status.as_str(), "plan has no unpaid step");
            return Err(InstallmentError::invalid_request(PLAN_SETTLED));
        };

        let request = PaymentRequest {
            correlation_key: next.correlation_key(),
            amount: next.total,
            subject: format!("Installment plan {}", plan.reference),
            return_url: self.settings.return_url.clone(),
            notify_url: self.settings.notify_url.clone(),
        };
        info!(
            plan = %plan.reference,
            sequence = next.sequence,
            amount = %next.total,
            "initiating installment payment"
        );
        self.gateway.initiate_payment(request).await
    }

    /// Browser return after checkout. Feedback only: nothing is settled here.
    pub fn handle_return(&self, raw: &RawCallback) -> ReturnOutcome {
        debug!("installment payment browser return");
        match self.gateway.verify_return(raw) {
            Ok(_) => ReturnOutcome::PaymentSucceeded,
            Err(e) => {
                warn!(error = %e, "browser return failed verification");
                ReturnOutcome::DataInvalid
            }
        }
    }

    /// Authoritative settlement path for asynchronous gateway notifications.
    ///
    /// Returns `Ok(NotificationAck::Failure)` for notifications that cannot be
    /// matched to a step and `Err` for verification and storage failures; in
    /// neither case has anything been written, and the gateway must not be
    /// told the notification succeeded.
    pub async fn handle_notification(&self, raw: &RawCallback) -> Result<NotificationAck> {
        let payload = match self.gateway.verify_notification(raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    out_trade_no = raw.get("out_trade_no").unwrap_or_default(),
                    trade_no = raw.get("trade_no").unwrap_or_default(),
                    error = %e,
                    "rejected unverifiable gateway notification"
                );
                return Err(e);
            }
        };

        if !payload.trade_status.is_settled() {
            debug!(
                out_trade_no = %payload.out_trade_no,
                trade_status = ?payload.trade_status,
                "ignoring notification for unsettled trade"
            );
            return Ok(self.success());
        }

        match self.reconcile(&payload).await {
            Ok(ack) => Ok(ack),
            Err(InstallmentError::Matching(failure)) => {
                error!(
                    out_trade_no = %payload.out_trade_no,
                    trade_no = %payload.trade_no,
                    %failure,
                    "gateway notification does not match any repayment step"
                );
                Ok(NotificationAck::Failure)
            }
            Err(e) => {
                error!(
                    out_trade_no = %payload.out_trade_no,
                    trade_no = %payload.trade_no,
                    error = %e,
                    "failed to settle repayment step"
                );
                Err(e)
            }
        }
    }

    async fn reconcile(&self, payload: &GatewayPayload) -> Result<NotificationAck> {
        let key: CorrelationKey = payload.out_trade_no.parse()?;
        info!(
            plan = %key.plan_reference,
            sequence = key.sequence,
            trade_no = %payload.trade_no,
            "installment notification received"
        );

        let plan = self
            .store
            .get_plan(&key.plan_reference)
            .await?
            .ok_or_else(|| MatchingFailure::UnknownPlan(key.plan_reference.to_string()))?;
        let item = self
            .store
            .get_item(&plan.reference, key.sequence)
            .await?
            .ok_or_else(|| MatchingFailure::UnknownStep {
                plan: plan.reference.to_string(),
                sequence: key.sequence,
            })?;

        // Fast path for redeliveries; the store re-checks under its own lock.
        if item.is_settled() {
            debug!(plan = %plan.reference, sequence = item.sequence, "step already settled");
            return Ok(self.success());
        }

        let settlement = Settlement {
            key,
            settled_at: Utc::now(),
            payment_method: self.gateway.method_tag().to_string(),
            payment_no: payload.trade_no.clone(),
        };

        match self.store.settle(&settlement).await? {
            SettlementOutcome::AlreadySettled => {
                debug!(
                    plan = %settlement.key.plan_reference,
                    sequence = settlement.key.sequence,
                    "concurrent delivery settled the step first"
                );
            }
            SettlementOutcome::Applied(effects) => self.after_commit(&effects).await,
        }
        Ok(self.success())
    }

    async fn after_commit(&self, effects: &SettlementEffects) {
        info!(
            plan = %effects.plan_reference,
            sequence = effects.sequence,
            status = effects.status.as_str(),
            "repayment step settled"
        );

        if effects.first_payment() && !effects.order_marked_paid {
            warn!(
                plan = %effects.plan_reference,
                order = %effects.order_reference,
                "first repayment settled without paying the closed or prepaid order"
            );
        }

        if effects.publishes_order_paid() {
            let event = DomainEvent::OrderPaid {
                order_reference: effects.order_reference.clone(),
                plan_reference: effects.plan_reference.to_string(),
            };
            // Already committed: publish failures are logged, not returned.
            if let Err(e) = self.publisher.publish(event).await {
                error!(
                    order = %effects.order_reference,
                    error = %e,
                    "failed to publish order paid event"
                );
            }
        }
    }

    fn success(&self) -> NotificationAck {
        NotificationAck::Success(self.gateway.ack_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventKind;
    use crate::domain::gateway::TradeStatus;
    use crate::domain::item::RepaymentItem;
    use crate::domain::money::Amount;
    use crate::domain::order::Order;
    use crate::domain::plan::{InstallmentPlan, PlanStatus};
    use crate::domain::ports::{PaymentGateway, PlanStore};
    use crate::infrastructure::event_bus::{EventBus, RecordingEventHandler};
    use crate::infrastructure::in_memory::InMemoryPlanStore;
    use crate::infrastructure::sandbox_gateway::SandboxGateway;
    use rand::seq::SliceRandom;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const OWNER: u64 = 7;

    struct Harness {
        engine: Arc<ReconciliationEngine>,
        store: Arc<InMemoryPlanStore>,
        gateway: Arc<SandboxGateway>,
        events: RecordingEventHandler,
    }

    impl Harness {
        async fn new(count: u32) -> Self {
            let store = Arc::new(InMemoryPlanStore::new());
            let plan = InstallmentPlan::new(reference(), OWNER, "O1", count, Utc::now());
            let items = (0..count)
                .map(|seq| RepaymentItem::new(reference(), seq, Amount::new(dec!(100)).unwrap()))
                .collect();
            store.insert_plan(plan, items).await.unwrap();
            store.insert_order(Order::new("O1", OWNER)).await.unwrap();

            let settings = GatewaySettings {
                secret: "engine-test".to_string(),
                ..GatewaySettings::default()
            };
            let gateway = Arc::new(SandboxGateway::new(settings.clone()));
            let events = RecordingEventHandler::new();
            let bus = EventBus::new().subscribe(EventKind::OrderPaid, Arc::new(events.clone()));
            let engine = Arc::new(ReconciliationEngine::new(
                store.clone(),
                gateway.clone(),
                Arc::new(bus),
                settings,
            ));
            Self {
                engine,
                store,
                gateway,
                events,
            }
        }

        fn notification(&self, out_trade_no: &str, status: &str) -> RawCallback {
            let trade_no = format!("GW-{out_trade_no}");
            let raw = RawCallback::from_pairs([
                ("out_trade_no", out_trade_no),
                ("trade_no", trade_no.as_str()),
                ("trade_status", status),
            ]);
            self.gateway.signed(&raw).unwrap()
        }

        async fn deliver(&self, sequence: u32) -> NotificationAck {
            let raw = self.notification(&format!("P1_{sequence}"), "TRADE_SUCCESS");
            self.engine.handle_notification(&raw).await.unwrap()
        }

        async fn plan(&self) -> InstallmentPlan {
            self.store.get_plan(&reference()).await.unwrap().unwrap()
        }

        async fn order(&self) -> Order {
            self.store.get_order("O1").await.unwrap().unwrap()
        }

        async fn assert_invariant(&self) {
            let plan = self.plan().await;
            let items = self.store.get_items(&reference()).await.unwrap();
            let all_settled = items.iter().all(|item| item.is_settled());
            assert_eq!(plan.status == PlanStatus::Finished, all_settled);
        }
    }

    fn reference() -> PlanReference {
        PlanReference::new("P1").unwrap()
    }

    #[tokio::test]
    async fn test_first_step_starts_repaying_and_publishes() {
        let h = Harness::new(3).await;

        assert!(h.deliver(0).await.is_success());

        assert_eq!(h.plan().await.status, PlanStatus::Repaying);
        let order = h.order().await;
        assert!(order.paid_at.is_some());
        assert_eq!(order.payment_method.as_deref(), Some("installment"));
        assert_eq!(order.payment_no.as_deref(), Some("P1"));
        let item = h.store.get_item(&reference(), 0).await.unwrap().unwrap();
        assert_eq!(item.payment_method.as_deref(), Some("alipay"));
        assert_eq!(item.payment_no.as_deref(), Some("GW-P1_0"));

        let events = h.events.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].order_reference(), "O1");
        h.assert_invariant().await;
    }

    #[tokio::test]
    async fn test_last_step_finishes_without_event() {
        let h = Harness::new(3).await;
        h.deliver(0).await;
        h.deliver(1).await;
        assert_eq!(h.plan().await.status, PlanStatus::Repaying);

        h.deliver(2).await;

        assert_eq!(h.plan().await.status, PlanStatus::Finished);
        assert_eq!(h.events.events().await.len(), 1);
        h.assert_invariant().await;
    }

    #[tokio::test]
    async fn test_single_step_plan_finishes_in_one_delivery() {
        let h = Harness::new(1).await;

        assert!(h.deliver(0).await.is_success());

        assert_eq!(h.plan().await.status, PlanStatus::Finished);
        assert!(h.order().await.paid_at.is_some());
        assert_eq!(h.events.events().await.len(), 1);
        h.assert_invariant().await;
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let h = Harness::new(3).await;
        h.deliver(0).await;
        let paid_at = h.order().await.paid_at;

        for _ in 0..5 {
            assert!(h.deliver(0).await.is_success());
        }

        assert_eq!(h.order().await.paid_at, paid_at);
        assert_eq!(h.events.events().await.len(), 1);
        assert_eq!(h.plan().await.status, PlanStatus::Repaying);
    }

    #[tokio::test]
    async fn test_out_of_order_last_step_does_not_finish() {
        let h = Harness::new(3).await;
        h.deliver(0).await;
        h.deliver(2).await;

        assert_eq!(h.plan().await.status, PlanStatus::Repaying);
        let middle = h.store.get_item(&reference(), 1).await.unwrap().unwrap();
        assert!(middle.paid_at.is_none());
        h.assert_invariant().await;

        h.deliver(1).await;
        assert_eq!(h.plan().await.status, PlanStatus::Finished);
        h.assert_invariant().await;
    }

    #[tokio::test]
    async fn test_any_delivery_order_reaches_the_same_state() {
        let mut sequences: Vec<u32> = (0..6).chain(0..6).collect();
        sequences.shuffle(&mut rand::thread_rng());

        let h = Harness::new(6).await;
        for sequence in sequences {
            assert!(h.deliver(sequence).await.is_success());
            h.assert_invariant().await;
        }

        assert_eq!(h.plan().await.status, PlanStatus::Finished);
        assert_eq!(h.events.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_settle_once() {
        let h = Harness::new(2).await;
        let raw = h.notification("P1_0", "TRADE_SUCCESS");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = h.engine.clone();
                let raw = raw.clone();
                tokio::spawn(async move { engine.handle_notification(&raw).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_success());
        }

        assert_eq!(h.events.events().await.len(), 1);
        assert_eq!(h.plan().await.status, PlanStatus::Repaying);
    }

    #[tokio::test]
    async fn test_non_terminal_status_is_acknowledged_without_mutation() {
        let h = Harness::new(2).await;
        let raw = h.notification("P1_0", "WAIT_BUYER_PAY");

        let ack = h.engine.handle_notification(&raw).await.unwrap();

        assert!(ack.is_success());
        assert_eq!(h.plan().await.status, PlanStatus::Pending);
        assert!(h.order().await.paid_at.is_none());
        assert!(h.events.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_notifications_are_never_acknowledged() {
        let h = Harness::new(2).await;
        for key in ["P1", "P1_0_1", "P1_x", "P9_0", "P1_2"] {
            let raw = h.notification(key, "TRADE_SUCCESS");
            let ack = h.engine.handle_notification(&raw).await.unwrap();
            assert_eq!(ack, NotificationAck::Failure, "{key} must not be acknowledged");
        }
        assert_eq!(h.plan().await.status, PlanStatus::Pending);
        assert!(h.events.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_unverifiable_notification_is_an_error() {
        let h = Harness::new(2).await;
        let mut raw = h.notification("P1_0", "TRADE_SUCCESS");
        raw.params.insert("trade_status".to_string(), "TRADE_FINISHED".to_string());

        let result = h.engine.handle_notification(&raw).await;

        assert!(matches!(result, Err(InstallmentError::Verification(_))));
        assert!(h.order().await.paid_at.is_none());
    }

    #[tokio::test]
    async fn test_closed_order_is_settled_but_not_paid() {
        let h = Harness::new(2).await;
        let mut order = h.order().await;
        order.closed = true;
        h.store.insert_order(order).await.unwrap();

        assert!(h.deliver(0).await.is_success());

        assert_eq!(h.plan().await.status, PlanStatus::Repaying);
        assert!(h.order().await.paid_at.is_none());
        assert_eq!(h.events.events().await.len(), 1);

        assert!(h.deliver(0).await.is_success());
        assert!(h.deliver(1).await.is_success());
        assert_eq!(h.events.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_prepaid_order_still_publishes_once() {
        let h = Harness::new(3).await;
        let mut order = h.order().await;
        let earlier = Utc::now() - chrono::Duration::days(1);
        order.mark_paid_by_installment(earlier, "P0");
        h.store.insert_order(order).await.unwrap();

        assert!(h.deliver(0).await.is_success());
        assert!(h.deliver(0).await.is_success());

        assert_eq!(h.plan().await.status, PlanStatus::Repaying);
        assert_eq!(h.order().await.paid_at, Some(earlier));
        assert_eq!(
            h.events.events().await,
            vec![DomainEvent::OrderPaid {
                order_reference: "O1".to_string(),
                plan_reference: "P1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_initiate_targets_next_unpaid_step() {
        let h = Harness::new(3).await;
        h.deliver(0).await;

        let directive = h
            .engine
            .initiate(&Principal::new(OWNER), &reference())
            .await
            .unwrap();

        assert_eq!(directive.fields["out_trade_no"], "P1_1");
        assert_eq!(directive.fields["total_amount"], "100.00");
        assert_eq!(directive.fields["subject"], "Installment plan P1");
        assert_eq!(directive.fields["notify_url"], h.engine.settings.notify_url);
    }

    #[tokio::test]
    async fn test_initiate_preconditions() {
        let h = Harness::new(1).await;

        let result = h.engine.initiate(&Principal::new(OWNER + 1), &reference()).await;
        assert!(matches!(result, Err(InstallmentError::Authorization { .. })));

        h.deliver(0).await;
        let result = h.engine.initiate(&Principal::new(OWNER), &reference()).await;
        assert!(matches!(
            result,
            Err(InstallmentError::InvalidRequest(msg)) if msg == PLAN_SETTLED
        ));

        let mut order = h.order().await;
        order.closed = true;
        h.store.insert_order(order).await.unwrap();
        let result = h.engine.initiate(&Principal::new(OWNER), &reference()).await;
        assert!(matches!(
            result,
            Err(InstallmentError::InvalidRequest(msg)) if msg == ORDER_CLOSED
        ));
    }

    #[tokio::test]
    async fn test_initiate_refuses_fully_paid_schedule_under_open_plan() {
        let h = Harness::new(2).await;
        // Settle every item directly, then roll the plan status back to simulate drift.
        for sequence in 0..2 {
            h.store
                .settle(&Settlement {
                    key: CorrelationKey::new(reference(), sequence),
                    settled_at: Utc::now(),
                    payment_method: "alipay".to_string(),
                    payment_no: format!("T{sequence}"),
                })
                .await
                .unwrap();
        }
        let mut plan = h.plan().await;
        plan.status = PlanStatus::Repaying;
        let items = h.store.get_items(&reference()).await.unwrap();
        h.store.insert_plan(plan, items).await.unwrap();

        let result = h.engine.initiate(&Principal::new(OWNER), &reference()).await;
        assert!(matches!(
            result,
            Err(InstallmentError::InvalidRequest(msg)) if msg == PLAN_SETTLED
        ));
    }

    #[tokio::test]
    async fn test_return_handler_only_verifies() {
        let h = Harness::new(2).await;
        let valid = h.notification("P1_0", "TRADE_SUCCESS");
        let mut tampered = valid.clone();
        tampered.params.insert("trade_no".to_string(), "forged".to_string());

        assert_eq!(h.engine.handle_return(&valid), ReturnOutcome::PaymentSucceeded);
        assert_eq!(h.engine.handle_return(&tampered), ReturnOutcome::DataInvalid);
        assert_eq!(h.plan().await.status, PlanStatus::Pending);
    }

    #[test]
    fn test_trade_status_gate() {
        assert!(!TradeStatus::Closed.is_settled());
        let gateway = SandboxGateway::new(GatewaySettings::default());
        assert_eq!(gateway.method_tag(), "alipay");
    }
}
