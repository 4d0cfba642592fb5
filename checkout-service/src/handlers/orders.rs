//! Order endpoints: status checking and administrative transitions.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{OrderResponse, UpdateOrderStatusRequest},
    services::ledger::{LedgerError, Transition},
    services::metrics,
    AppState,
};

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .ledger
        .get(order_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("order {} not found", order_id)))?;

    Ok(Json(OrderResponse::from(order)))
}

/// Administrative status transition. Unlike the webhook path, a refused
/// transition here surfaces to the caller as a conflict.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .ledger
        .get(order_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("order {} not found", order_id)))?;

    tracing::info!(
        %order_id,
        from = ?order.status,
        to = ?payload.status,
        "administrative order status update"
    );

    let lock = state.ledger.order_mutex(order_id);
    let _guard = lock.lock().await;

    match state.ledger.update_status(order_id, payload.status) {
        Ok(Transition::Applied) => {
            metrics::record_order_status(payload.status.as_str());
            if payload.send_notification || payload.send_email {
                state
                    .notifier
                    .notify_order_status(order.user_id, order_id, payload.status)
                    .await;
            }
        }
        Ok(Transition::Unchanged) => {
            tracing::debug!(%order_id, status = ?payload.status, "status unchanged");
        }
        Err(err @ LedgerError::InvalidTransition { .. }) => {
            return Err(AppError::Conflict(anyhow::anyhow!(err)));
        }
        Err(err) => {
            return Err(AppError::NotFound(anyhow::anyhow!(err)));
        }
    }

    let updated = state
        .ledger
        .get(order_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("order {} not found", order_id)))?;
    Ok(Json(OrderResponse::from(updated)))
}
