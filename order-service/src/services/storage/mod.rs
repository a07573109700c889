//! Transactional storage boundary for the ordering workflow.
//!
//! Both orchestration paths (placement and reconciliation) share exactly two
//! composite operations, and each one is a single unit of work: either every
//! write in it lands or none do. No caller ever read-modify-writes order
//! fields outside these composites.

pub mod memory;
pub mod postgres;

use crate::models::{Cart, MenuItem, Order, OutcomeTransition, Payment, PaymentOutcome, UserProfile};
use async_trait::async_trait;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Input for adding a line to a cart. The price is the catalog price at add
/// time; it is snapshotted, not referenced.
#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Result of applying a gateway outcome: the order after the unit of work,
/// and whether state actually moved or the delivery was a duplicate.
#[derive(Debug, Clone)]
pub struct OutcomeApplication {
    pub order: Order,
    pub transition: OutcomeTransition,
}

/// Storage for carts, orders and payment attempts.
///
/// `convert_cart_to_order` and `record_payment_outcome` are the two
/// transactional composites; implementations must serialize them per cart
/// row / order row respectively.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Liveness probe against the backing store.
    async fn health_check(&self) -> Result<(), AppError>;

    async fn load_cart(&self, user_id: Uuid) -> Result<Option<Cart>, AppError>;

    /// Add an item to the user's cart, creating the cart lazily. Adding the
    /// same menu item again merges quantities.
    async fn add_cart_item(&self, user_id: Uuid, item: NewCartItem) -> Result<Cart, AppError>;

    /// Atomic cart-to-order conversion: lock the cart, snapshot its items
    /// into a new order, clear the cart, all in one unit of work. Fails with
    /// not-found when the user has no cart and bad-request when it is empty;
    /// on failure nothing is persisted and the cart is untouched.
    async fn convert_cart_to_order(&self, user_id: Uuid) -> Result<Order, AppError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, AppError>;

    async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, AppError>;

    /// Atomic outcome application: append the payment attempt row and run
    /// the terminal-state guard plus state transition in the same unit of
    /// work, so duplicate deliveries can never double-transition an order.
    async fn record_payment_outcome(
        &self,
        outcome: PaymentOutcome,
    ) -> Result<OutcomeApplication, AppError>;

    /// Payment attempt audit trail for an order, most recent first.
    async fn list_payments(&self, order_id: Uuid) -> Result<Vec<Payment>, AppError>;

    /// Fulfillment trigger: `CONFIRMED -> DELIVERED`, validated against the
    /// order state machine inside the unit of work.
    async fn mark_delivered(&self, order_id: Uuid) -> Result<Order, AppError>;
}

/// Identity lookup for the actor placing orders. Identity is always passed
/// explicitly; there is no ambient session state.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppError>;
}

/// Read-only menu lookup. Prices flow from here into cart lines by value;
/// nothing downstream ever dereferences the catalog again.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_menu_item(&self, menu_item_id: Uuid) -> Result<Option<MenuItem>, AppError>;
}
