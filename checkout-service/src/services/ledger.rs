//! In-memory order ledger.
//!
//! Orders are indexed by id, with a secondary index by payment intent
//! id. At most one order may reference a given live intent id; after an
//! intent replacement the old id stays in the index as superseded, so a
//! stale lookup resolves to "superseded" instead of another order.
//!
//! Status transitions are validated atomically inside the index entry,
//! and a per-order async mutex is handed out for callers whose
//! read-then-write sequences span an await point (intent updates and
//! webhook reconciliation for the same order must not interleave).

use crate::models::{Order, OrderStatus};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("no order for payment intent {0}")]
    IntentNotFound(String),

    #[error("payment intent {intent_id} is already linked to order {order_id}")]
    IntentInUse { intent_id: String, order_id: Uuid },

    #[error("payment intent {intent_id} was superseded on order {order_id}")]
    IntentSuperseded { intent_id: String, order_id: Uuid },

    #[error("invalid status transition {from:?} -> {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

/// Result of a status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The order was already in the requested state. Duplicate webhook
    /// deliveries land here.
    Unchanged,
}

#[derive(Debug, Clone)]
enum IntentLink {
    Live(Uuid),
    Superseded(Uuid),
}

#[derive(Default)]
pub struct OrderLedger {
    orders: DashMap<Uuid, Order>,
    intents: DashMap<String, IntentLink>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new order, claiming its intent id in the secondary
    /// index. Rejects an order whose intent id is already known: intent
    /// ids are provider-unique and never shared between orders.
    pub fn insert(&self, order: Order) -> Result<(), LedgerError> {
        match self.intents.entry(order.provider_intent_id.clone()) {
            Entry::Occupied(existing) => {
                let order_id = match existing.get() {
                    IntentLink::Live(id) | IntentLink::Superseded(id) => *id,
                };
                return Err(LedgerError::IntentInUse {
                    intent_id: order.provider_intent_id.clone(),
                    order_id,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(IntentLink::Live(order.id));
            }
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<Order> {
        self.orders.get(&id).map(|o| o.clone())
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Resolve an intent id to its live order. Superseded ids report
    /// themselves as such rather than resolving anywhere.
    pub fn find_by_intent(&self, intent_id: &str) -> Result<Order, LedgerError> {
        let link = self
            .intents
            .get(intent_id)
            .map(|l| l.clone())
            .ok_or_else(|| LedgerError::IntentNotFound(intent_id.to_string()))?;

        match link {
            IntentLink::Live(order_id) => self
                .orders
                .get(&order_id)
                .map(|o| o.clone())
                .ok_or(LedgerError::OrderNotFound(order_id)),
            IntentLink::Superseded(order_id) => Err(LedgerError::IntentSuperseded {
                intent_id: intent_id.to_string(),
                order_id,
            }),
        }
    }

    /// Apply a status transition. Same-state writes are reported as
    /// `Unchanged` so replayed webhooks stay side-effect free;
    /// transitions outside the allowed set are refused.
    pub fn update_status(&self, id: Uuid, to: OrderStatus) -> Result<Transition, LedgerError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or(LedgerError::OrderNotFound(id))?;

        if order.status == to {
            return Ok(Transition::Unchanged);
        }
        if !order.status.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                from: order.status,
                to,
            });
        }
        order.status = to;
        Ok(Transition::Applied)
    }

    /// Record recomputed base and tax amounts after an intent update.
    pub fn record_amounts(&self, id: Uuid, amount: i64, tax_amount: i64) -> Result<(), LedgerError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or(LedgerError::OrderNotFound(id))?;
        order.amount = amount;
        order.tax_amount = tax_amount;
        Ok(())
    }

    /// Swap an order onto a replacement intent. The new id is claimed
    /// before the old one is downgraded, so there is no window in which
    /// neither id resolves; the old id stays in the index as superseded.
    pub fn relink_intent(
        &self,
        id: Uuid,
        new_intent_id: &str,
        previous_intent_id: &str,
    ) -> Result<(), LedgerError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or(LedgerError::OrderNotFound(id))?;

        match self.intents.entry(new_intent_id.to_string()) {
            Entry::Occupied(existing) => {
                let order_id = match existing.get() {
                    IntentLink::Live(other) | IntentLink::Superseded(other) => *other,
                };
                return Err(LedgerError::IntentInUse {
                    intent_id: new_intent_id.to_string(),
                    order_id,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(IntentLink::Live(id));
            }
        }

        if let Some(mut link) = self.intents.get_mut(previous_intent_id) {
            *link = IntentLink::Superseded(id);
        }

        order.provider_intent_id = new_intent_id.to_string();
        order.previous_intent_id = Some(previous_intent_id.to_string());
        Ok(())
    }

    /// Per-order mutex serializing mutations whose read-then-write
    /// sequence spans an await point.
    pub fn order_mutex(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
