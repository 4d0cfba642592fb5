//! Stripe payment provider client.
//!
//! Implements the Payment Intents API for checkout initiation and
//! in-place amount updates, plus webhook signature verification for
//! asynchronous payment confirmation.

use crate::config::StripeConfig;
use anyhow::{anyhow, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

/// Stripe client for interacting with the Stripe API.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

/// A payment intent as returned by the provider. The provider is
/// authoritative for `id` and `client_secret`; the metadata snapshot is
/// what we attached at creation time.
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl PaymentIntentStatus {
    /// An intent can only be amended in place before confirmation.
    pub fn is_mutable(&self) -> bool {
        matches!(
            self,
            PaymentIntentStatus::RequiresPaymentMethod | PaymentIntentStatus::RequiresConfirmation
        )
    }
}

/// Stripe API error response.
#[derive(Debug, Deserialize)]
pub struct StripeApiError {
    pub error: StripeApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct StripeApiErrorDetail {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}

/// The closed set of webhook events this service reacts to. Everything
/// else lands in `Unhandled` and is acknowledged without a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    PaymentIntentSucceeded { intent_id: String },
    PaymentIntentFailed { intent_id: String },
    Unhandled { kind: String },
}

impl ProviderEvent {
    pub fn kind(&self) -> &str {
        match self {
            ProviderEvent::PaymentIntentSucceeded { .. } => "payment_intent.succeeded",
            ProviderEvent::PaymentIntentFailed { .. } => "payment_intent.payment_failed",
            ProviderEvent::Unhandled { kind } => kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

type HmacSha256 = Hmac<Sha256>;

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Check if Stripe is configured (secret key is set).
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    pub fn has_webhook_secret(&self) -> bool {
        !self.config.webhook_secret.expose_secret().is_empty()
    }

    /// Create a payment intent for `amount` minor units of `currency`,
    /// attaching the metadata snapshot.
    pub async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &[(String, String)],
    ) -> Result<PaymentIntent> {
        if !self.is_configured() {
            return Err(anyhow!("Stripe credentials not configured"));
        }

        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), currency.to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        push_metadata(&mut form, metadata);

        let url = format!("{}/payment_intents", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;

        let intent = self.decode_intent_response(response, "create").await?;
        tracing::info!(
            intent_id = %intent.id,
            amount = intent.amount,
            currency = %intent.currency,
            "payment intent created"
        );
        Ok(intent)
    }

    /// Amend an existing intent's amount and metadata in place. Only
    /// valid while the intent is in a pre-confirmation state; the
    /// provider rejects the call otherwise.
    pub async fn update_payment_intent(
        &self,
        intent_id: &str,
        amount: i64,
        metadata: &[(String, String)],
    ) -> Result<PaymentIntent> {
        if !self.is_configured() {
            return Err(anyhow!("Stripe credentials not configured"));
        }

        let mut form: Vec<(String, String)> = vec![("amount".to_string(), amount.to_string())];
        push_metadata(&mut form, metadata);

        let url = format!("{}/payment_intents/{}", self.config.api_base_url, intent_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;

        let intent = self.decode_intent_response(response, "update").await?;
        tracing::info!(
            intent_id = %intent.id,
            amount = intent.amount,
            "payment intent updated in place"
        );
        Ok(intent)
    }

    /// Fetch an intent by id, including its stored metadata snapshot.
    pub async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        if !self.is_configured() {
            return Err(anyhow!("Stripe credentials not configured"));
        }

        let url = format!("{}/payment_intents/{}", self.config.api_base_url, intent_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await?;

        self.decode_intent_response(response, "retrieve").await
    }

    async fn decode_intent_response(
        &self,
        response: reqwest::Response,
        action: &str,
    ) -> Result<PaymentIntent> {
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, action, "Stripe payment_intents response");

        if status.is_success() {
            let intent: PaymentIntent = serde_json::from_str(&body)?;
            Ok(intent)
        } else {
            let error: StripeApiError =
                serde_json::from_str(&body).unwrap_or_else(|_| StripeApiError {
                    error: StripeApiErrorDetail {
                        kind: None,
                        code: None,
                        message: Some(body.clone()),
                    },
                });
            let code = error.error.code.as_deref().unwrap_or("unknown");
            let message = error.error.message.as_deref().unwrap_or("no message");
            tracing::error!(code, message, action, "Stripe payment intent call failed");
            Err(anyhow!("Stripe error: {} - {}", code, message))
        }
    }

    /// Verify a `Stripe-Signature` header against the raw request body.
    ///
    /// The header carries `t=<unix ts>,v1=<hex hmac>`; the signature is
    /// `HMAC-SHA256("{t}.{body}", webhook_secret)`. Timestamps outside
    /// the tolerance window are rejected to blunt replay. Malformed
    /// headers are an error; a well-formed but wrong signature is
    /// `Ok(false)`.
    pub fn verify_webhook_signature(&self, payload: &[u8], header: &str) -> Result<bool> {
        let mut timestamp: Option<i64> = None;
        let mut signature: Option<&str> = None;

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(
                        value
                            .parse()
                            .map_err(|_| anyhow!("invalid timestamp in signature header"))?,
                    );
                }
                Some(("v1", value)) => signature = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| anyhow!("signature header missing timestamp"))?;
        let signature = signature.ok_or_else(|| anyhow!("signature header missing v1 signature"))?;

        let age = (Utc::now().timestamp() - timestamp).abs();
        if age > self.config.webhook_tolerance_seconds {
            tracing::warn!(age, "webhook signature timestamp outside tolerance");
            return Ok(false);
        }

        let mut mac =
            HmacSha256::new_from_slice(self.config.webhook_secret.expose_secret().as_bytes())
                .map_err(|_| anyhow!("invalid webhook secret length"))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let signature_bytes = signature.as_bytes();
        if expected_bytes.len() != signature_bytes.len() {
            tracing::warn!("webhook signature verification failed");
            return Ok(false);
        }

        let is_valid: bool = expected_bytes.ct_eq(signature_bytes).into();
        if !is_valid {
            tracing::warn!("webhook signature verification failed");
        }
        Ok(is_valid)
    }

    /// Parse a webhook body into the closed event union.
    pub fn parse_event(&self, body: &str) -> Result<ProviderEvent> {
        let envelope: EventEnvelope = serde_json::from_str(body)?;
        match envelope.kind.as_str() {
            "payment_intent.succeeded" => Ok(ProviderEvent::PaymentIntentSucceeded {
                intent_id: intent_id_of(&envelope)?,
            }),
            "payment_intent.payment_failed" => Ok(ProviderEvent::PaymentIntentFailed {
                intent_id: intent_id_of(&envelope)?,
            }),
            _ => Ok(ProviderEvent::Unhandled {
                kind: envelope.kind,
            }),
        }
    }
}

fn intent_id_of(envelope: &EventEnvelope) -> Result<String> {
    envelope
        .data
        .object
        .get("id")
        .and_then(|id| id.as_str())
        .map(|id| id.to_string())
        .ok_or_else(|| anyhow!("event object missing payment intent id"))
}

fn push_metadata(form: &mut Vec<(String, String)>, metadata: &[(String, String)]) {
    for (key, value) in metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
    }
}
