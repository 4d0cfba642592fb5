use async_trait::async_trait;
use checkout_service::config::{
    Config, NotificationConfig, ServerConfig, StripeConfig, WebhookConfig,
};
use checkout_service::models::OrderStatus;
use checkout_service::services::notifier::NotificationDispatcher;
use checkout_service::services::users::InMemoryUserDirectory;
use checkout_service::{AppState, Application};
use hmac::{Hmac, Mac};
use secrecy::Secret;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_USER_ID: i64 = 7;
pub const TEST_PRODUCT_ID: i64 = 42;

/// Spy dispatcher recording every notification instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(i64, Uuid, OrderStatus)>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(i64, Uuid, OrderStatus)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify_order_status(&self, user_id: i64, order_id: Uuid, status: OrderStatus) {
        self.calls.lock().unwrap().push((user_id, order_id, status));
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub state: AppState,
    pub users: Arc<InMemoryUserDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub provider: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_verification(true).await
    }

    /// Spawn with the development webhook bypass enabled.
    pub async fn spawn_insecure() -> Self {
        Self::spawn_with_verification(false).await
    }

    async fn spawn_with_verification(verify_webhooks: bool) -> Self {
        let provider = MockServer::start().await;

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
            },
            stripe: StripeConfig {
                secret_key: Secret::new("sk_test_key".to_string()),
                webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
                api_base_url: provider.uri(),
                webhook_tolerance_seconds: 300,
            },
            webhook: WebhookConfig {
                insecure_skip_verification: !verify_webhooks,
            },
            notifications: NotificationConfig { endpoint: None },
            service_name: "checkout-service-test".to_string(),
        };

        let users = Arc::new(InMemoryUserDirectory::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let app = Application::build_with(config, users.clone(), notifier.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let state = app.state();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            client,
            state,
            users,
            notifier,
            provider,
        }
    }

    pub async fn post_json(&self, path_and_query: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path_and_query))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path_and_query: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path_and_query))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Mount a one-shot mock for intent creation.
    pub async fn mount_create_intent(&self, intent: Value) {
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(intent))
            .up_to_n_times(1)
            .mount(&self.provider)
            .await;
    }

    pub async fn mount_retrieve_intent(&self, intent_id: &str, intent: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/payment_intents/{}", intent_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(intent))
            .mount(&self.provider)
            .await;
    }

    pub async fn mount_update_intent(&self, intent_id: &str, intent: Value) {
        Mock::given(method("POST"))
            .and(path(format!("/payment_intents/{}", intent_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(intent))
            .mount(&self.provider)
            .await;
    }

    pub async fn mount_update_intent_rejection(&self, intent_id: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/payment_intents/{}", intent_id)))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "type": "invalid_request_error",
                    "code": "payment_intent_unexpected_state",
                    "message": "The payment intent cannot be updated in its current state"
                }
            })))
            .mount(&self.provider)
            .await;
    }

    /// Deliver a correctly signed webhook body.
    pub async fn post_webhook(&self, body: &str) -> reqwest::Response {
        self.post_webhook_signed(body, &stripe_signature(body)).await
    }

    pub async fn post_webhook_signed(&self, body: &str, signature: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/webhook", self.address))
            .header("stripe-signature", signature)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_webhook_unsigned(&self, body: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/webhook", self.address))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }
}

pub fn stripe_signature(body: &str) -> String {
    stripe_signature_at(body, WEBHOOK_SECRET, chrono::Utc::now().timestamp())
}

pub fn stripe_signature_at(body: &str, secret: &str, timestamp: i64) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}.{}", timestamp, body).as_bytes());
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Provider payment intent body as wiremock response material.
pub fn intent_json(id: &str, amount: i64, currency: &str, status: &str, metadata: Value) -> Value {
    json!({
        "id": id,
        "object": "payment_intent",
        "amount": amount,
        "currency": currency,
        "status": status,
        "client_secret": format!("{}_secret_test", id),
        "metadata": metadata
    })
}

/// Metadata snapshot for a German (19% VAT) order. Stripe metadata
/// values are strings on the wire.
pub fn de_metadata(quantity: u32, unit_price: i64, base: i64, tax: i64) -> Value {
    json!({
        "quantity": quantity.to_string(),
        "unitPrice": unit_price.to_string(),
        "baseAmount": base.to_string(),
        "taxAmount": tax.to_string(),
        "taxRate": "0.19",
        "taxLabel": "MwSt. 19%",
        "countryCode": "DE"
    })
}

pub fn succeeded_event(intent_id: &str) -> String {
    json!({
        "id": "evt_succeeded",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    })
    .to_string()
}

pub fn failed_event(intent_id: &str) -> String {
    json!({
        "id": "evt_failed",
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    })
    .to_string()
}

/// Create a pending German order through the API, with the provider
/// mocked to hand back `intent_id`.
pub async fn create_de_order(
    app: &TestApp,
    intent_id: &str,
    amount: i64,
    quantity: u32,
    tax: i64,
) -> Uuid {
    let unit_price = (amount as f64 / quantity as f64).round() as i64;
    app.mount_create_intent(intent_json(
        intent_id,
        amount + tax,
        "eur",
        "requires_payment_method",
        de_metadata(quantity, unit_price, amount, tax),
    ))
    .await;

    let response = app
        .post_json(
            "/create-payment-intent",
            &json!({
                "amount": amount,
                "userId": TEST_USER_ID,
                "productId": TEST_PRODUCT_ID,
                "currency": "eur",
                "quantity": quantity,
                "country": "DE"
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200, "order creation failed");

    let body: Value = response.json().await.expect("invalid create response");
    Uuid::parse_str(body["orderId"].as_str().expect("missing orderId"))
        .expect("orderId is not a uuid")
}
