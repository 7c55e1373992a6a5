//! JSON seed files that load orders and installment plans into a store.

use crate::domain::correlation::PlanReference;
use crate::domain::item::RepaymentItem;
use crate::domain::money::Amount;
use crate::domain::order::Order;
use crate::domain::plan::InstallmentPlan;
use crate::domain::ports::PlanStore;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct SeedOrder {
    pub reference: String,
    pub owner_id: u64,
    #[serde(default)]
    pub closed: bool,
}

/// A plan with its schedule; step sequences follow the order of `items`.
#[derive(Debug, Deserialize)]
pub struct SeedPlan {
    pub reference: PlanReference,
    pub owner_id: u64,
    pub order_reference: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub items: Vec<Amount>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub orders: Vec<SeedOrder>,
    #[serde(default)]
    pub plans: Vec<SeedPlan>,
}

impl Seed {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    /// Inserts every order, then every plan, skipping records the store
    /// already holds. Returns the number of plans loaded.
    pub async fn import(self, store: &dyn PlanStore) -> Result<usize> {
        for seed in self.orders {
            if store.get_order(&seed.reference).await?.is_some() {
                continue;
            }
            let mut order = Order::new(seed.reference, seed.owner_id);
            order.closed = seed.closed;
            store.insert_order(order).await?;
        }

        let mut loaded = 0;
        for seed in self.plans {
            if store.get_plan(&seed.reference).await?.is_some() {
                debug!(plan = %seed.reference, "plan already stored, keeping it");
                continue;
            }
            let items: Vec<RepaymentItem> = seed
                .items
                .into_iter()
                .zip(0u32..)
                .map(|(total, sequence)| {
                    RepaymentItem::new(seed.reference.clone(), sequence, total)
                })
                .collect();
            let count = u32::try_from(items.len()).unwrap_or(u32::MAX);
            let plan = InstallmentPlan::new(
                seed.reference,
                seed.owner_id,
                seed.order_reference,
                count,
                seed.created_at,
            );
            debug!(plan = %plan.reference, count, "seeding installment plan");
            store.insert_plan(plan, items).await?;
            loaded += 1;
        }
        Ok(loaded)
    }
}
