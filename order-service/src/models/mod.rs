//! Domain models for the ordering workflow.

pub mod cart;
pub mod order;
pub mod payment;

pub use cart::{Cart, CartItem};
pub use order::{Order, OrderItem, OrderStatus, OutcomeTransition};
pub use payment::{Payment, PaymentOutcome, PaymentStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Read-only view of the actor placing orders. Resolved through the
/// `UserDirectory` collaborator; never mutated by this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Catalog entry as seen by the cart. Price and availability are read at
/// add-to-cart time and snapshotted into the cart line.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MenuItem {
    pub menu_item_id: Uuid,
    pub name: String,
    pub price: rust_decimal::Decimal,
    pub available: bool,
}
