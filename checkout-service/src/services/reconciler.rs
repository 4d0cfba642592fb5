//! Webhook reconciliation into the order state machine.
//!
//! Every event is acknowledged to the provider once its signature and
//! structure check out; reconciliation problems (unknown intents,
//! refused transitions) are logged, never bounced, so redelivery storms
//! cannot build up. Notifications fire only on an applied transition,
//! which keeps them exactly-once under duplicate delivery.

use crate::models::OrderStatus;
use crate::services::ledger::{LedgerError, OrderLedger, Transition};
use crate::services::metrics;
use crate::services::notifier::NotificationDispatcher;
use crate::services::stripe::ProviderEvent;
use std::sync::Arc;

/// How an event landed against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The order transitioned and a notification was dispatched.
    Applied,
    /// Duplicate delivery, the order was already in the target state.
    AlreadyApplied,
    /// Out-of-order delivery against a terminal state, refused.
    Refused,
    /// No order references this intent.
    UnknownIntent,
    /// The intent was superseded by a replacement; the live intent
    /// governs the order.
    Superseded,
    /// Event type outside the handled set.
    Unhandled,
}

impl ReconcileOutcome {
    fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::AlreadyApplied => "duplicate",
            ReconcileOutcome::Refused => "refused",
            ReconcileOutcome::UnknownIntent => "unknown_intent",
            ReconcileOutcome::Superseded => "superseded",
            ReconcileOutcome::Unhandled => "unhandled",
        }
    }
}

pub struct WebhookReconciler {
    ledger: Arc<OrderLedger>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl WebhookReconciler {
    pub fn new(ledger: Arc<OrderLedger>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { ledger, notifier }
    }

    pub async fn apply(&self, event: &ProviderEvent) -> ReconcileOutcome {
        let outcome = match event {
            ProviderEvent::PaymentIntentSucceeded { intent_id } => {
                self.transition(intent_id, OrderStatus::Completed).await
            }
            ProviderEvent::PaymentIntentFailed { intent_id } => {
                self.transition(intent_id, OrderStatus::Failed).await
            }
            ProviderEvent::Unhandled { kind } => {
                tracing::debug!(event_type = %kind, "unhandled webhook event type");
                ReconcileOutcome::Unhandled
            }
        };
        metrics::record_webhook(event.kind(), outcome.label());
        outcome
    }

    async fn transition(&self, intent_id: &str, target: OrderStatus) -> ReconcileOutcome {
        let order = match self.ledger.find_by_intent(intent_id) {
            Ok(order) => order,
            Err(LedgerError::IntentSuperseded { order_id, .. }) => {
                tracing::warn!(
                    intent_id,
                    %order_id,
                    "webhook for superseded payment intent, ignoring"
                );
                return ReconcileOutcome::Superseded;
            }
            Err(err) => {
                tracing::warn!(intent_id, error = %err, "webhook for unknown payment intent");
                return ReconcileOutcome::UnknownIntent;
            }
        };

        let lock = self.ledger.order_mutex(order.id);
        let _guard = lock.lock().await;

        match self.ledger.update_status(order.id, target) {
            Ok(Transition::Applied) => {
                tracing::info!(
                    order_id = %order.id,
                    intent_id,
                    status = ?target,
                    "order reconciled from webhook"
                );
                metrics::record_order_status(target.as_str());
                self.notifier
                    .notify_order_status(order.user_id, order.id, target)
                    .await;
                ReconcileOutcome::Applied
            }
            Ok(Transition::Unchanged) => {
                tracing::info!(
                    order_id = %order.id,
                    intent_id,
                    status = ?target,
                    "duplicate webhook delivery, state already reached"
                );
                ReconcileOutcome::AlreadyApplied
            }
            Err(LedgerError::InvalidTransition { from, to }) => {
                tracing::warn!(
                    order_id = %order.id,
                    intent_id,
                    ?from,
                    ?to,
                    "refusing out-of-order webhook transition"
                );
                ReconcileOutcome::Refused
            }
            Err(err) => {
                tracing::warn!(intent_id, error = %err, "webhook reconciliation failed");
                ReconcileOutcome::UnknownIntent
            }
        }
    }
}
