use super::cart::CartItem;
use super::payment::PaymentStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

/// Order lifecycle states.
///
/// `Initialized -> Confirmed` on payment success, `Initialized -> Cancelled`
/// on payment failure, `Confirmed -> Delivered` on fulfillment. Everything
/// else is illegal and rejected with a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Initialized,
    Confirmed,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::Confirmed => "CONFIRMED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "INITIALIZED" => Ok(Self::Initialized),
            "CONFIRMED" => Ok(Self::Confirmed),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(AppError::InternalError(anyhow::anyhow!(
                "unknown order status '{}'",
                other
            ))),
        }
    }

    /// Validate a transition against the order state machine.
    pub fn ensure_transition(self, next: OrderStatus) -> Result<(), AppError> {
        let legal = matches!(
            (self, next),
            (Self::Initialized, Self::Confirmed)
                | (Self::Initialized, Self::Cancelled)
                | (Self::Confirmed, Self::Delivered)
        );

        if legal {
            Ok(())
        } else {
            Err(AppError::Conflict(anyhow::anyhow!(
                "illegal order status transition {} -> {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

/// Whether applying a gateway outcome changed order state or was a
/// duplicate delivery of an outcome already reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeTransition {
    Applied,
    Duplicate,
}

/// Value snapshot of a cart line at checkout time. Decoupled from the
/// catalog so later price changes never alter a placed order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub order_item_id: Uuid,
    pub order_id: Uuid,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

impl OrderItem {
    fn snapshot(order_id: Uuid, item: &CartItem) -> Self {
        Self {
            order_item_id: Uuid::new_v4(),
            order_id,
            menu_item_id: item.menu_item_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: item.subtotal,
        }
    }
}

/// An immutable record of a completed checkout. After creation only
/// `order_status` and `payment_status` may change, and only through the
/// documented state machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    pub placed_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Snapshot cart lines into a new order. The total is fixed here and
    /// never recomputed from the cart afterward.
    pub fn from_cart_items(user_id: Uuid, cart_items: &[CartItem]) -> Result<Self, AppError> {
        if cart_items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "cart is empty for user {}",
                user_id
            )));
        }

        let order_id = Uuid::new_v4();
        let items: Vec<OrderItem> = cart_items
            .iter()
            .map(|item| OrderItem::snapshot(order_id, item))
            .collect();
        let total_amount: Decimal = items.iter().map(|item| item.subtotal).sum();
        let now = Utc::now();

        Ok(Self {
            order_id,
            user_id,
            order_status: OrderStatus::Initialized,
            payment_status: PaymentStatus::Pending,
            total_amount,
            placed_utc: now,
            updated_utc: now,
            items,
        })
    }

    /// Merge a gateway outcome into this order.
    ///
    /// Idempotent under at-least-once delivery: once `payment_status` left
    /// `Pending` the order is terminal for payment purposes and any further
    /// outcome is reported as a duplicate without touching state.
    pub fn apply_payment_outcome(&mut self, success: bool) -> Result<OutcomeTransition, AppError> {
        if self.payment_status != PaymentStatus::Pending {
            return Ok(OutcomeTransition::Duplicate);
        }

        let next = if success {
            OrderStatus::Confirmed
        } else {
            OrderStatus::Cancelled
        };
        self.order_status.ensure_transition(next)?;

        self.payment_status = if success {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };
        self.order_status = next;
        self.updated_utc = Utc::now();

        Ok(OutcomeTransition::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cart_items(prices: &[(i32, Decimal)]) -> Vec<CartItem> {
        let cart_id = Uuid::new_v4();
        prices
            .iter()
            .map(|(qty, price)| CartItem::new(cart_id, Uuid::new_v4(), *qty, *price))
            .collect()
    }

    #[test]
    fn snapshot_fixes_total_from_subtotals() {
        let items = cart_items(&[(2, dec!(10.00)), (1, dec!(5.50))]);
        let order = Order::from_cart_items(Uuid::new_v4(), &items).unwrap();

        assert_eq!(order.total_amount, dec!(25.50));
        assert_eq!(order.order_status, OrderStatus::Initialized);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.items.len(), 2);

        let sum: Decimal = order.items.iter().map(|i| i.subtotal).sum();
        assert_eq!(order.total_amount, sum);
    }

    #[test]
    fn snapshot_of_empty_cart_is_rejected() {
        let err = Order::from_cart_items(Uuid::new_v4(), &[]).unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn success_outcome_confirms_order() {
        let items = cart_items(&[(1, dec!(20.00))]);
        let mut order = Order::from_cart_items(Uuid::new_v4(), &items).unwrap();

        let transition = order.apply_payment_outcome(true).unwrap();
        assert_eq!(transition, OutcomeTransition::Applied);
        assert_eq!(order.order_status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn failure_outcome_cancels_order() {
        let items = cart_items(&[(1, dec!(45.00))]);
        let mut order = Order::from_cart_items(Uuid::new_v4(), &items).unwrap();

        let transition = order.apply_payment_outcome(false).unwrap();
        assert_eq!(transition, OutcomeTransition::Applied);
        assert_eq!(order.order_status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Failed);
    }

    #[test]
    fn repeated_outcome_is_duplicate_and_leaves_state_alone() {
        let items = cart_items(&[(1, dec!(20.00))]);
        let mut order = Order::from_cart_items(Uuid::new_v4(), &items).unwrap();

        order.apply_payment_outcome(true).unwrap();
        let transition = order.apply_payment_outcome(true).unwrap();
        assert_eq!(transition, OutcomeTransition::Duplicate);
        assert_eq!(order.order_status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn failure_after_completion_does_not_reverse_terminal_state() {
        let items = cart_items(&[(1, dec!(20.00))]);
        let mut order = Order::from_cart_items(Uuid::new_v4(), &items).unwrap();

        order.apply_payment_outcome(true).unwrap();
        let transition = order.apply_payment_outcome(false).unwrap();
        assert_eq!(transition, OutcomeTransition::Duplicate);
        assert_eq!(order.payment_status, PaymentStatus::Completed);
        assert_eq!(order.order_status, OrderStatus::Confirmed);
    }

    #[test]
    fn delivery_requires_confirmed() {
        assert!(OrderStatus::Confirmed
            .ensure_transition(OrderStatus::Delivered)
            .is_ok());
        assert!(OrderStatus::Initialized
            .ensure_transition(OrderStatus::Delivered)
            .is_err());
        assert!(OrderStatus::Cancelled
            .ensure_transition(OrderStatus::Delivered)
            .is_err());
        assert!(OrderStatus::Delivered
            .ensure_transition(OrderStatus::Confirmed)
            .is_err());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OrderStatus::Initialized,
            OrderStatus::Confirmed,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(OrderStatus::parse("SHIPPED").is_err());
    }
}
