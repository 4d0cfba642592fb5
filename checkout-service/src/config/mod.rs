use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub stripe: StripeConfig,
    pub webhook: WebhookConfig,
    pub notifications: NotificationConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    pub webhook_tolerance_seconds: i64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct WebhookConfig {
    /// Accept unsigned webhook deliveries. Development only; the
    /// application logs loudly when this is on.
    pub insecure_skip_verification: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NotificationConfig {
    pub endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("CHECKOUT_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("CHECKOUT_SERVICE_PORT")
            .unwrap_or_else(|_| "3005".to_string())
            .parse()?;

        let secret_key = env::var("STRIPE_SECRET_KEY").unwrap_or_default();
        let webhook_secret = env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();
        let api_base_url = env::var("STRIPE_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string());
        let webhook_tolerance_seconds = env::var("CHECKOUT_WEBHOOK_TOLERANCE_SECONDS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()?;

        let insecure_skip_verification = env::var("CHECKOUT_WEBHOOK_INSECURE_SKIP_VERIFY")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let notification_endpoint = env::var("NOTIFICATION_SERVICE_URL").ok();

        Ok(Self {
            server: ServerConfig { host, port },
            stripe: StripeConfig {
                secret_key: Secret::new(secret_key),
                webhook_secret: Secret::new(webhook_secret),
                api_base_url,
                webhook_tolerance_seconds,
            },
            webhook: WebhookConfig {
                insecure_skip_verification,
            },
            notifications: NotificationConfig {
                endpoint: notification_endpoint,
            },
            service_name: "checkout-service".to_string(),
        })
    }
}
