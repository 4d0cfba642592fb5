//! Payment intent orchestration.
//!
//! Creates provider intents for tax-inclusive totals and keeps them in
//! step with the cart. Quantity updates preserve the unit price and tax
//! rate agreed at intent-creation time: both are recovered from the
//! metadata snapshot stored on the intent, never re-derived from the
//! catalog or a fresh tax lookup, so a customer is never re-quoted mid
//! checkout.

use crate::models::{Currency, Order, OrderStatus};
use crate::services::ledger::{LedgerError, OrderLedger};
use crate::services::stripe::StripeClient;
use crate::services::users::UserDirectory;
use crate::services::{metrics, tax};
use anyhow::anyhow;
use chrono::Utc;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Snapshot attached to every intent as provider metadata. Sufficient
/// to reconstruct the quote later without recomputation drift.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentMetadata {
    pub quantity: u32,
    pub unit_price: i64,
    pub base_amount: i64,
    pub tax_amount: i64,
    pub tax_rate: f64,
    pub tax_label: String,
    pub country_code: Option<String>,
}

impl IntentMetadata {
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("quantity".to_string(), self.quantity.to_string()),
            ("unitPrice".to_string(), self.unit_price.to_string()),
            ("baseAmount".to_string(), self.base_amount.to_string()),
            ("taxAmount".to_string(), self.tax_amount.to_string()),
            ("taxRate".to_string(), self.tax_rate.to_string()),
            ("taxLabel".to_string(), self.tax_label.clone()),
            (
                "countryCode".to_string(),
                self.country_code.clone().unwrap_or_default(),
            ),
        ]
    }

    pub fn from_pairs(metadata: &HashMap<String, String>) -> anyhow::Result<Self> {
        fn field<'a>(
            metadata: &'a HashMap<String, String>,
            key: &str,
        ) -> anyhow::Result<&'a str> {
            metadata
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| anyhow!("intent metadata missing {}", key))
        }

        Ok(Self {
            quantity: field(metadata, "quantity")?.parse()?,
            unit_price: field(metadata, "unitPrice")?.parse()?,
            base_amount: field(metadata, "baseAmount")?.parse()?,
            tax_amount: field(metadata, "taxAmount")?.parse()?,
            tax_rate: field(metadata, "taxRate")?.parse()?,
            tax_label: field(metadata, "taxLabel")?.to_string(),
            country_code: match metadata.get("countryCode") {
                Some(code) if !code.is_empty() => Some(code.clone()),
                _ => None,
            },
        })
    }
}

/// Inputs for creating a payment intent, already past DTO validation.
#[derive(Debug)]
pub struct CreateIntentCommand {
    pub amount: i64,
    pub currency: Currency,
    pub quantity: u32,
    pub user_id: i64,
    pub product_id: i64,
    pub coupon_code: Option<String>,
    pub body_country: Option<String>,
    pub query_country: Option<String>,
    pub force_country: bool,
}

#[derive(Debug)]
pub struct UpdateIntentCommand {
    pub payment_intent_id: String,
    pub quantity: u32,
    pub user_id: i64,
}

/// Everything a checkout response needs, shared by create and update.
#[derive(Debug, Clone)]
pub struct CheckoutQuote {
    pub intent_id: String,
    pub client_secret: Option<String>,
    pub order_id: Uuid,
    pub amount: i64,
    pub tax_amount: i64,
    pub total: i64,
    pub tax_rate: f64,
    pub tax_label: String,
    pub country_code: Option<String>,
    pub quantity: u32,
    pub unit_price: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntentAction {
    Updated,
    Replaced,
}

/// Resolve the taxable country for a create request.
///
/// Precedence: explicit force flag with a request country, then the
/// authenticated profile's stored country, then the request body, then
/// the query string. The stored profile wins over whatever the client
/// sends unless the caller explicitly forces an override.
pub fn resolve_country(
    force_country: bool,
    body_country: Option<&str>,
    query_country: Option<&str>,
    profile_country: Option<&str>,
) -> Option<String> {
    let non_empty = |c: Option<&str>| {
        c.map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    };

    if force_country {
        if let Some(country) = non_empty(body_country) {
            return Some(country);
        }
    }
    non_empty(profile_country)
        .or_else(|| non_empty(body_country))
        .or_else(|| non_empty(query_country))
}

pub struct PaymentIntentOrchestrator {
    ledger: Arc<OrderLedger>,
    provider: StripeClient,
    users: Arc<dyn UserDirectory>,
}

impl PaymentIntentOrchestrator {
    pub fn new(
        ledger: Arc<OrderLedger>,
        provider: StripeClient,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            ledger,
            provider,
            users,
        }
    }

    /// Create a provider intent for the tax-inclusive total and insert
    /// the pending order. One provider call, one ledger insertion.
    pub async fn create(&self, cmd: CreateIntentCommand) -> Result<CheckoutQuote, AppError> {
        let profile_country = self.users.country_of(cmd.user_id).await;
        let country = resolve_country(
            cmd.force_country,
            cmd.body_country.as_deref(),
            cmd.query_country.as_deref(),
            profile_country.as_deref(),
        );
        let quote = tax::quote(country.as_deref());

        let unit_price = (cmd.amount as f64 / cmd.quantity as f64).round() as i64;
        let tax_amount = tax::tax_amount(cmd.amount, quote.rate);
        let total = cmd.amount + tax_amount;

        let metadata = IntentMetadata {
            quantity: cmd.quantity,
            unit_price,
            base_amount: cmd.amount,
            tax_amount,
            tax_rate: quote.rate,
            tax_label: quote.label.to_string(),
            country_code: quote.country_code.clone(),
        };

        let intent = self
            .provider
            .create_payment_intent(total, cmd.currency.code(), &metadata.to_pairs())
            .await
            .map_err(AppError::Provider)?;

        let order = Order {
            id: Uuid::new_v4(),
            user_id: cmd.user_id,
            product_id: cmd.product_id,
            status: OrderStatus::Pending,
            amount: cmd.amount,
            tax_amount,
            currency: cmd.currency,
            coupon_code: cmd.coupon_code,
            tracking_number: None,
            provider_intent_id: intent.id.clone(),
            previous_intent_id: None,
            created_at: Utc::now(),
        };
        let order_id = order.id;

        // The intent id is the source of truth for what the customer
        // will be charged; if the insert fails the record can be
        // reconstructed from it.
        if let Err(err) = self.ledger.insert(order) {
            tracing::error!(
                intent_id = %intent.id,
                user_id = cmd.user_id,
                error = %err,
                "intent created but order insert failed"
            );
            return Err(AppError::InternalError(anyhow!(err)));
        }

        tracing::info!(
            %order_id,
            intent_id = %intent.id,
            amount = cmd.amount,
            tax_amount,
            total,
            country = ?quote.country_code,
            "payment intent created for pending order"
        );
        metrics::record_intent(cmd.currency.code(), "created");

        Ok(CheckoutQuote {
            intent_id: intent.id,
            client_secret: intent.client_secret,
            order_id,
            amount: cmd.amount,
            tax_amount,
            total,
            tax_rate: quote.rate,
            tax_label: quote.label.to_string(),
            country_code: quote.country_code,
            quantity: cmd.quantity,
            unit_price,
            currency: cmd.currency,
        })
    }

    /// Recompute the intent for a new quantity. Mutable intents are
    /// amended in place; anything else gets a replacement intent and the
    /// order is relinked. Touches exactly one order, never creates one.
    pub async fn update(&self, cmd: UpdateIntentCommand) -> Result<CheckoutQuote, AppError> {
        let order = match self.ledger.find_by_intent(&cmd.payment_intent_id) {
            Ok(order) => order,
            Err(err @ LedgerError::IntentSuperseded { .. }) => {
                return Err(AppError::Conflict(anyhow!(err)));
            }
            Err(err) => return Err(AppError::NotFound(anyhow!(err))),
        };
        if order.user_id != cmd.user_id {
            return Err(AppError::Forbidden(anyhow!(
                "order does not belong to the caller"
            )));
        }

        let lock = self.ledger.order_mutex(order.id);
        let _guard = lock.lock().await;

        // Re-read under the lock: a webhook or a concurrent update may
        // have landed between lookup and acquisition.
        let order = self
            .ledger
            .get(order.id)
            .ok_or_else(|| AppError::NotFound(anyhow!("order {} not found", order.id)))?;

        let intent = self
            .provider
            .retrieve_payment_intent(&order.provider_intent_id)
            .await
            .map_err(AppError::Provider)?;
        let stored = IntentMetadata::from_pairs(&intent.metadata).map_err(|err| {
            AppError::InternalError(anyhow!(
                "intent {} has an unreadable metadata snapshot: {}",
                intent.id,
                err
            ))
        })?;

        // Unit price and tax rate are frozen at creation time; only the
        // base scales with the new quantity.
        let new_base = stored.unit_price * cmd.quantity as i64;
        let new_tax = tax::tax_amount(new_base, stored.tax_rate);
        let new_total = new_base + new_tax;

        let new_metadata = IntentMetadata {
            quantity: cmd.quantity,
            base_amount: new_base,
            tax_amount: new_tax,
            ..stored.clone()
        };
        let pairs = new_metadata.to_pairs();

        let (intent, action) = if intent.status.is_mutable() {
            match self
                .provider
                .update_payment_intent(&order.provider_intent_id, new_total, &pairs)
                .await
            {
                Ok(updated) => (updated, IntentAction::Updated),
                Err(err) => {
                    tracing::warn!(
                        intent_id = %order.provider_intent_id,
                        error = %err,
                        "in-place intent update rejected, creating replacement"
                    );
                    let replacement = self
                        .provider
                        .create_payment_intent(new_total, order.currency.code(), &pairs)
                        .await
                        .map_err(AppError::Provider)?;
                    (replacement, IntentAction::Replaced)
                }
            }
        } else {
            tracing::info!(
                intent_id = %order.provider_intent_id,
                status = ?intent.status,
                "intent no longer mutable, creating replacement"
            );
            let replacement = self
                .provider
                .create_payment_intent(new_total, order.currency.code(), &pairs)
                .await
                .map_err(AppError::Provider)?;
            (replacement, IntentAction::Replaced)
        };

        if action == IntentAction::Replaced {
            self.ledger
                .relink_intent(order.id, &intent.id, &order.provider_intent_id)
                .map_err(|err| AppError::InternalError(anyhow!(err)))?;
            tracing::info!(
                order_id = %order.id,
                new_intent_id = %intent.id,
                previous_intent_id = %order.provider_intent_id,
                "order relinked to replacement intent"
            );
        }
        self.ledger
            .record_amounts(order.id, new_base, new_tax)
            .map_err(|err| AppError::InternalError(anyhow!(err)))?;

        let action_label = match action {
            IntentAction::Updated => "updated",
            IntentAction::Replaced => "replaced",
        };
        tracing::info!(
            order_id = %order.id,
            intent_id = %intent.id,
            quantity = cmd.quantity,
            new_base,
            new_tax,
            new_total,
            action = action_label,
            "payment intent recomputed for quantity change"
        );
        metrics::record_intent(order.currency.code(), action_label);

        Ok(CheckoutQuote {
            intent_id: intent.id,
            client_secret: intent.client_secret,
            order_id: order.id,
            amount: new_base,
            tax_amount: new_tax,
            total: new_total,
            tax_rate: stored.tax_rate,
            tax_label: stored.tax_label,
            country_code: stored.country_code,
            quantity: cmd.quantity,
            unit_price: stored.unit_price,
            currency: order.currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_country_wins_over_request() {
        let resolved = resolve_country(false, Some("DE"), Some("FR"), Some("SE"));
        assert_eq!(resolved.as_deref(), Some("SE"));
    }

    #[test]
    fn force_flag_overrides_the_profile() {
        let resolved = resolve_country(true, Some("DE"), None, Some("SE"));
        assert_eq!(resolved.as_deref(), Some("DE"));
    }

    #[test]
    fn force_flag_without_a_body_country_falls_through() {
        let resolved = resolve_country(true, None, Some("FR"), Some("SE"));
        assert_eq!(resolved.as_deref(), Some("SE"));
    }

    #[test]
    fn body_then_query_when_no_profile() {
        assert_eq!(
            resolve_country(false, Some("DE"), Some("FR"), None).as_deref(),
            Some("DE")
        );
        assert_eq!(
            resolve_country(false, None, Some("FR"), None).as_deref(),
            Some("FR")
        );
        assert_eq!(resolve_country(false, None, None, None), None);
    }

    #[test]
    fn blank_countries_are_ignored() {
        assert_eq!(
            resolve_country(false, Some("  "), Some("FR"), None).as_deref(),
            Some("FR")
        );
        assert_eq!(resolve_country(true, Some(""), None, None), None);
    }

    #[test]
    fn metadata_snapshot_round_trips() {
        let metadata = IntentMetadata {
            quantity: 3,
            unit_price: 10_000,
            base_amount: 30_000,
            tax_amount: 5_700,
            tax_rate: 0.19,
            tax_label: "MwSt. 19%".to_string(),
            country_code: Some("DE".to_string()),
        };

        let map: HashMap<String, String> = metadata.to_pairs().into_iter().collect();
        assert_eq!(IntentMetadata::from_pairs(&map).unwrap(), metadata);
    }

    #[test]
    fn metadata_without_country_round_trips_as_none() {
        let metadata = IntentMetadata {
            quantity: 1,
            unit_price: 50_000,
            base_amount: 50_000,
            tax_amount: 0,
            tax_rate: 0.0,
            tax_label: "No VAT/Tax".to_string(),
            country_code: None,
        };

        let map: HashMap<String, String> = metadata.to_pairs().into_iter().collect();
        assert_eq!(IntentMetadata::from_pairs(&map).unwrap().country_code, None);
    }

    #[test]
    fn missing_metadata_fields_are_an_error() {
        let mut map: HashMap<String, String> = HashMap::new();
        map.insert("quantity".to_string(), "1".to_string());
        assert!(IntentMetadata::from_pairs(&map).is_err());
    }
}
