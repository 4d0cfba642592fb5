pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, tracing::request_id_middleware,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use config::Config;
use services::notifier::{HttpNotifier, NotificationDispatcher};
use services::users::{InMemoryUserDirectory, UserDirectory};
use services::{
    OrderLedger, PaymentIntentOrchestrator, StripeClient, WebhookReconciler,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ledger: Arc<OrderLedger>,
    pub stripe: StripeClient,
    pub orchestrator: Arc<PaymentIntentOrchestrator>,
    pub reconciler: Arc<WebhookReconciler>,
    pub notifier: Arc<dyn NotificationDispatcher>,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let users: Arc<dyn UserDirectory> = Arc::new(InMemoryUserDirectory::new());
        let notifier: Arc<dyn NotificationDispatcher> =
            Arc::new(HttpNotifier::new(config.notifications.endpoint.clone()));
        Self::build_with(config, users, notifier).await
    }

    /// Build with injected collaborators (profile directory and
    /// notification dispatcher); tests substitute their own.
    pub async fn build_with(
        config: Config,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> anyhow::Result<Self> {
        services::init_metrics();

        let stripe = StripeClient::new(config.stripe.clone());
        if stripe.is_configured() {
            tracing::info!("Stripe client initialized");
        } else {
            tracing::warn!("Stripe credentials not configured - payment features will be limited");
        }
        if config.webhook.insecure_skip_verification {
            tracing::warn!(
                "WEBHOOK SIGNATURE VERIFICATION IS DISABLED - acceptable only in development"
            );
        }

        let ledger = Arc::new(OrderLedger::new());
        let orchestrator = Arc::new(PaymentIntentOrchestrator::new(
            ledger.clone(),
            stripe.clone(),
            users,
        ));
        let reconciler = Arc::new(WebhookReconciler::new(ledger.clone(), notifier.clone()));

        let state = AppState {
            config: config.clone(),
            ledger,
            stripe,
            orchestrator,
            reconciler,
            notifier,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics))
            // Checkout endpoints
            .route(
                "/create-payment-intent",
                post(handlers::payment_intents::create_payment_intent),
            )
            .route(
                "/update-payment-intent",
                post(handlers::payment_intents::update_payment_intent),
            )
            // Provider webhook
            .route("/webhook", post(handlers::webhooks::provider_webhook))
            // Order endpoints
            .route("/orders/:id", get(handlers::orders::get_order))
            .route(
                "/orders/:id/update-status",
                post(handlers::orders::update_order_status),
            )
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state.clone());

        // port 0 binds a random port for tests
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Application state, shared with tests for direct ledger access.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
