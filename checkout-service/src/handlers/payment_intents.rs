//! Payment intent handlers.
//!
//! Thin over the orchestrator: validate the wire shape, normalize the
//! currency, hand over to the engine.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        CreatePaymentIntentRequest, CreatePaymentIntentResponse, UpdatePaymentIntentRequest,
        UpdatePaymentIntentResponse,
    },
    models::Currency,
    services::orchestrator::{CreateIntentCommand, UpdateIntentCommand},
    AppState,
};

/// Country hint carried on the query string, lowest in the resolution
/// precedence.
#[derive(Debug, Deserialize)]
pub struct CountryQuery {
    pub country: Option<String>,
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Query(query): Query<CountryQuery>,
    Json(payload): Json<CreatePaymentIntentRequest>,
) -> Result<Json<CreatePaymentIntentResponse>, AppError> {
    payload.validate()?;

    let currency = Currency::parse(&payload.currency).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "invalid currency {:?}: must be usd or eur",
            payload.currency
        ))
    })?;

    tracing::info!(
        user_id = payload.user_id,
        product_id = payload.product_id,
        amount = payload.amount,
        quantity = payload.quantity,
        currency = %currency,
        "creating payment intent"
    );

    let quote = state
        .orchestrator
        .create(CreateIntentCommand {
            amount: payload.amount,
            currency,
            quantity: payload.quantity,
            user_id: payload.user_id,
            product_id: payload.product_id,
            coupon_code: payload.coupon_code,
            body_country: payload.country,
            query_country: query.country,
            force_country: payload.force_country,
        })
        .await?;

    Ok(Json(quote.into()))
}

pub async fn update_payment_intent(
    State(state): State<AppState>,
    Json(payload): Json<UpdatePaymentIntentRequest>,
) -> Result<Json<UpdatePaymentIntentResponse>, AppError> {
    payload.validate()?;

    if payload.new_items.is_some() {
        tracing::debug!("newItems present on update request, quantity governs");
    }

    tracing::info!(
        intent_id = %payload.payment_intent_id,
        user_id = payload.user_id,
        quantity = payload.quantity,
        "updating payment intent"
    );

    let quote = state
        .orchestrator
        .update(UpdateIntentCommand {
            payment_intent_id: payload.payment_intent_id,
            quantity: payload.quantity,
            user_id: payload.user_id,
        })
        .await?;

    Ok(Json(quote.into()))
}
