//! Services module for order-service.

pub mod gateway;
pub mod metrics;
pub mod notifier;
pub mod orders;
pub mod payments;
pub mod storage;

pub use gateway::{PaymentGateway, PaymentIntent, PaymentIntentRequest, StripeClient};
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{NotificationRequest, NotificationSink, SmtpSink};
pub use orders::OrderService;
pub use payments::{PaymentHandle, PaymentService};
pub use storage::{
    Catalog, MemoryStore, NewCartItem, OrderStore, OutcomeApplication, PgStore, UserDirectory,
};
