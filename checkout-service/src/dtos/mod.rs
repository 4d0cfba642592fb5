use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Currency, Order, OrderStatus};
use crate::services::orchestrator::CheckoutQuote;
use crate::utils::format_minor_units;

/// Request to create a payment intent for a cart.
///
/// All amounts are integer minor units; anything else is rejected at
/// this boundary rather than guessed at.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    #[validate(range(min = 1, message = "amount must be a positive integer in minor units"))]
    pub amount: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub currency: String,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: u32,
    pub country: Option<String>,
    #[serde(default, rename = "force_country")]
    pub force_country: bool,
    pub coupon_code: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentResponse {
    /// Provider intent id (use with the client secret in checkout).
    pub id: String,
    pub client_secret: Option<String>,
    pub order_id: Uuid,
    /// Base amount in minor units.
    pub amount: i64,
    pub tax_amount: i64,
    pub total_with_tax: i64,
    pub tax_rate: f64,
    pub quantity: u32,
    pub unit_price: i64,
    pub currency: Currency,
    pub tax: TaxBreakdown,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    pub amount: i64,
    pub rate: f64,
    pub label: String,
    pub display: String,
}

impl From<CheckoutQuote> for CreatePaymentIntentResponse {
    fn from(quote: CheckoutQuote) -> Self {
        let display = format!(
            "{} ({})",
            quote.tax_label,
            format_minor_units(quote.tax_amount, quote.currency)
        );
        Self {
            id: quote.intent_id,
            client_secret: quote.client_secret,
            order_id: quote.order_id,
            amount: quote.amount,
            tax_amount: quote.tax_amount,
            total_with_tax: quote.total,
            tax_rate: quote.tax_rate,
            quantity: quote.quantity,
            unit_price: quote.unit_price,
            currency: quote.currency,
            tax: TaxBreakdown {
                amount: quote.tax_amount,
                rate: quote.tax_rate,
                label: quote.tax_label,
                display,
            },
        }
    }
}

/// Request to recompute an intent after a cart quantity change.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentIntentRequest {
    pub payment_intent_id: String,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: u32,
    pub user_id: i64,
    pub product_id: Option<i64>,
    /// Accepted for wire compatibility with older clients; the quantity
    /// field governs the recomputation.
    #[serde(default)]
    pub new_items: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentIntentResponse {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
    pub quantity: u32,
}

impl From<CheckoutQuote> for UpdatePaymentIntentResponse {
    fn from(quote: CheckoutQuote) -> Self {
        Self {
            id: quote.intent_id,
            client_secret: quote.client_secret,
            amount: quote.amount,
            tax_amount: quote.tax_amount,
            total_amount: quote.total,
            quantity: quote.quantity,
        }
    }
}

/// Administrative status transition, not provider-driven.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[serde(default = "default_true")]
    pub send_notification: bool,
    #[serde(default)]
    pub send_email: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: i64,
    pub product_id: i64,
    pub status: OrderStatus,
    pub amount: i64,
    pub tax_amount: i64,
    pub total: i64,
    pub currency: Currency,
    pub coupon_code: Option<String>,
    pub tracking_number: Option<String>,
    pub provider_intent_id: String,
    pub previous_intent_id: Option<String>,
    pub created_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            product_id: order.product_id,
            status: order.status,
            amount: order.amount,
            tax_amount: order.tax_amount,
            total: order.amount + order.tax_amount,
            currency: order.currency,
            coupon_code: order.coupon_code,
            tracking_number: order.tracking_number,
            provider_intent_id: order.provider_intent_id,
            previous_intent_id: order.previous_intent_id,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

/// Webhook acknowledgement body.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}
