pub mod ledger;
pub mod metrics;
pub mod notifier;
pub mod orchestrator;
pub mod reconciler;
pub mod stripe;
pub mod tax;
pub mod users;

pub use ledger::OrderLedger;
pub use metrics::{get_metrics, init_metrics};
pub use orchestrator::PaymentIntentOrchestrator;
pub use reconciler::WebhookReconciler;
pub use stripe::StripeClient;
