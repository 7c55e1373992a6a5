use serde::{Deserialize, Serialize};

/// Event types that handlers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderPaid,
}

/// Domain events emitted by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// The first step of an installment plan was settled and its order is now paid.
    OrderPaid {
        order_reference: String,
        plan_reference: String,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::OrderPaid { .. } => EventKind::OrderPaid,
        }
    }

    pub fn order_reference(&self) -> &str {
        match self {
            Self::OrderPaid {
                order_reference, ..
            } => order_reference,
        }
    }
}
