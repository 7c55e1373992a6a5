use crate::domain::correlation::{PlanReference, SEPARATOR};
use crate::domain::item::RepaymentItem;
use crate::domain::order::Order;
use crate::domain::plan::InstallmentPlan;
use crate::domain::ports::PlanStore;
use crate::domain::settlement::{self, Settlement, SettlementOutcome};
use crate::error::{InstallmentError, MatchingFailure, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, TransactionDB,
    TransactionDBOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Column Family for storing installment plans.
pub const CF_PLANS: &str = "plans";
/// Column Family for storing repayment items.
pub const CF_ITEMS: &str = "items";
/// Column Family for storing orders.
pub const CF_ORDERS: &str = "orders";

/// A persistent store implementation using a RocksDB `TransactionDB`.
///
/// Plans, items and orders live in separate Column Families. Settlement runs
/// in a pessimistic transaction that locks the plan row before anything else,
/// so concurrent settlements of the same plan (from this or any other
/// handle on the database) are serialised and commit all-or-nothing.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
}

/// Item keys are `<plan>_<sequence>` with a zero-padded sequence; plan
/// references never contain the separator, so keys cannot collide.
fn item_key(reference: &PlanReference, sequence: u32) -> Vec<u8> {
    format!("{reference}{SEPARATOR}{sequence:010}").into_bytes()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("plans", "items" and "orders") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_PLANS, CF_ITEMS, CF_ORDERS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            descriptors,
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            InstallmentError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn scan_plans(&self) -> Result<Vec<InstallmentPlan>> {
        let cf = self.cf(CF_PLANS)?;
        let mut plans = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = entry?;
            plans.push(decode(&value)?);
        }
        Ok(plans)
    }
}

#[async_trait]
impl PlanStore for RocksDBStore {
    async fn insert_plan(
        &self,
        plan: InstallmentPlan,
        mut items: Vec<RepaymentItem>,
    ) -> Result<()> {
        items.sort_by_key(|item| item.sequence);
        plan.validate_items(&items).map_err(InstallmentError::ValidationError)?;

        let plans = self.cf(CF_PLANS)?;
        let items_cf = self.cf(CF_ITEMS)?;

        let txn = self.db.transaction();
        for item in &items {
            txn.put_cf(items_cf, item_key(&item.plan_reference, item.sequence), encode(item)?)?;
        }
        txn.put_cf(plans, plan.reference.as_str().as_bytes(), encode(&plan)?)?;
        txn.commit()?;
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let cf = self.cf(CF_ORDERS)?;
        self.db.put_cf(cf, order.reference.as_bytes(), encode(&order)?)?;
        Ok(())
    }

    async fn get_plan(&self, reference: &PlanReference) -> Result<Option<InstallmentPlan>> {
        let cf = self.cf(CF_PLANS)?;
        self.db
            .get_cf(cf, reference.as_str().as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn get_items(&self, reference: &PlanReference) -> Result<Vec<RepaymentItem>> {
        let Some(plan) = self.get_plan(reference).await? else {
            return Ok(Vec::new());
        };
        let cf = self.cf(CF_ITEMS)?;
        let mut items = Vec::with_capacity(plan.count as usize);
        for sequence in 0..plan.count {
            if let Some(bytes) = self.db.get_cf(cf, item_key(reference, sequence))? {
                items.push(decode(&bytes)?);
            }
        }
        Ok(items)
    }

    async fn get_item(
        &self,
        reference: &PlanReference,
        sequence: u32,
    ) -> Result<Option<RepaymentItem>> {
        let cf = self.cf(CF_ITEMS)?;
        self.db
            .get_cf(cf, item_key(reference, sequence))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn get_order(&self, reference: &str) -> Result<Option<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        self.db
            .get_cf(cf, reference.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn list_by_owner(
        &self,
        owner_id: u64,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<InstallmentPlan>, usize)> {
        let mut owned: Vec<InstallmentPlan> = self
            .scan_plans()?
            .into_iter()
            .filter(|plan| plan.is_owned_by(owner_id))
            .collect();
        owned.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        let total = owned.len();
        let page = owned.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn get_all(&self) -> Result<Vec<InstallmentPlan>> {
        // Keys are plan references, so iteration order is already by reference.
        self.scan_plans()
    }

    async fn settle(&self, settlement: &Settlement) -> Result<SettlementOutcome> {
        let plans = self.cf(CF_PLANS)?;
        let items_cf = self.cf(CF_ITEMS)?;
        let orders = self.cf(CF_ORDERS)?;
        let reference = &settlement.key.plan_reference;

        // Dropping the transaction on any early return rolls it back.
        let txn = self.db.transaction();

        let plan_bytes = txn
            .get_for_update_cf(plans, reference.as_str().as_bytes(), true)?
            .ok_or_else(|| MatchingFailure::UnknownPlan(reference.to_string()))?;
        let mut plan: InstallmentPlan = decode(&plan_bytes)?;

        let mut items = Vec::with_capacity(plan.count as usize);
        for sequence in 0..plan.count {
            let key = item_key(reference, sequence);
            if let Some(bytes) = txn.get_for_update_cf(items_cf, key, true)? {
                items.push(decode::<RepaymentItem>(&bytes)?);
            }
        }

        let mut order: Option<Order> = txn
            .get_for_update_cf(orders, plan.order_reference.as_bytes(), true)?
            .map(|bytes| decode(&bytes))
            .transpose()?;

        let outcome = settlement::apply(settlement, &mut plan, &mut items, order.as_mut())?;

        match &outcome {
            SettlementOutcome::Applied(effects) => {
                if let Some(item) = items.iter().find(|item| item.sequence == effects.sequence) {
                    txn.put_cf(items_cf, item_key(reference, item.sequence), encode(item)?)?;
                }
                txn.put_cf(plans, reference.as_str().as_bytes(), encode(&plan)?)?;
                if let Some(order) = &order
                    && effects.order_marked_paid
                {
                    txn.put_cf(orders, order.reference.as_bytes(), encode(order)?)?;
                }
                txn.commit()?;
            }
            SettlementOutcome::AlreadySettled => {
                debug!(
                    plan = %reference,
                    sequence = settlement.key.sequence,
                    "step already settled inside transaction"
                );
                txn.rollback()?;
            }
        }

        Ok(outcome)
    }
}
