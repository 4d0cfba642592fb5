use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Currency;

/// An order in the checkout ledger.
///
/// `amount` and `tax_amount` are integer minor units; their sum is the
/// total charged at the provider for the current payment intent.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    pub id: Uuid,
    pub user_id: i64,
    pub product_id: i64,
    pub status: OrderStatus,
    pub amount: i64,
    pub tax_amount: i64,
    pub currency: Currency,
    pub coupon_code: Option<String>,
    pub tracking_number: Option<String>,
    /// The live payment intent. Exactly one order owns a given live
    /// intent id at any time.
    pub provider_intent_id: String,
    /// Superseded intent id, retained for audit after a replacement.
    pub previous_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn total(&self) -> i64 {
        self.amount + self.tax_amount
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Allowed transitions: pending -> completed | failed (webhook) and
    /// pending -> cancelled (explicit action). Terminal states never
    /// revert.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        matches!(self, OrderStatus::Pending) && to != OrderStatus::Pending
    }
}
