//! Notification dispatch after order state transitions.
//!
//! Delivery (push, email) is another service's concern; this side only
//! fires the call. Failures are logged and swallowed: a missed
//! notification never fails the payment flow.

use crate::models::OrderStatus;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_order_status(&self, user_id: i64, order_id: Uuid, status: OrderStatus);
}

/// Posts order status notifications to the notification service.
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    endpoint: Option<String>,
}

impl HttpNotifier {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotifier {
    async fn notify_order_status(&self, user_id: i64, order_id: Uuid, status: OrderStatus) {
        let Some(endpoint) = &self.endpoint else {
            tracing::debug!(
                %order_id,
                "notification endpoint not configured, skipping dispatch"
            );
            return;
        };

        let payload = json!({
            "userId": user_id,
            "orderId": order_id,
            "status": status,
        });

        match self.client.post(endpoint).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(%order_id, ?status, "order status notification dispatched");
            }
            Ok(response) => {
                tracing::warn!(
                    %order_id,
                    status_code = %response.status(),
                    "notification service rejected order status dispatch"
                );
            }
            Err(err) => {
                tracing::warn!(%order_id, error = %err, "failed to dispatch order status notification");
            }
        }
    }
}
