//! Provider webhook handler.
//!
//! Signature verification gates all processing; once an event is
//! authentic and structurally valid it is always acknowledged with 200,
//! whatever the reconciliation outcome, so the provider never builds a
//! redelivery backlog against us.

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use service_core::error::AppError;

use crate::{dtos::WebhookAck, AppState};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, AppError> {
    if state.config.webhook.insecure_skip_verification {
        tracing::warn!(
            "webhook signature verification BYPASSED (insecure dev mode, never in production)"
        );
    } else {
        if !state.stripe.has_webhook_secret() {
            tracing::error!("webhook received but no webhook secret is configured");
            return Err(AppError::Signature(anyhow::anyhow!(
                "webhook secret not configured"
            )));
        }

        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::warn!("missing {} header", SIGNATURE_HEADER);
                AppError::Signature(anyhow::anyhow!("missing webhook signature header"))
            })?;

        let is_valid = state
            .stripe
            .verify_webhook_signature(body.as_bytes(), signature)
            .map_err(AppError::Signature)?;
        if !is_valid {
            tracing::warn!("invalid webhook signature");
            return Err(AppError::Signature(anyhow::anyhow!(
                "invalid webhook signature"
            )));
        }
    }

    let event = state.stripe.parse_event(&body).map_err(|err| {
        tracing::error!(error = %err, "failed to parse webhook event");
        AppError::BadRequest(anyhow::anyhow!("invalid webhook payload: {}", err))
    })?;

    tracing::info!(event_type = %event.kind(), "processing provider webhook");

    let outcome = state.reconciler.apply(&event).await;
    tracing::debug!(event_type = %event.kind(), ?outcome, "webhook reconciled");

    Ok(Json(WebhookAck { received: true }))
}
