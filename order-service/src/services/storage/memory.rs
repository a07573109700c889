//! In-memory storage backend.
//!
//! One `tokio::sync::Mutex` guards the whole state, so every trait method is
//! naturally a serialized unit of work. Used by tests and local runs where a
//! PostgreSQL instance is not available.

use super::{Catalog, NewCartItem, OrderStore, OutcomeApplication, UserDirectory};
use crate::models::{
    Cart, CartItem, MenuItem, Order, OrderStatus, Payment, PaymentOutcome, UserProfile,
};
use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemInner {
    users: HashMap<Uuid, UserProfile>,
    menu: HashMap<Uuid, MenuItem>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Vec<Payment>>,
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user profile. Address may be absent to exercise the
    /// missing-delivery-address precondition.
    pub async fn put_user(&self, user: UserProfile) {
        let mut inner = self.inner.lock().await;
        inner.users.insert(user.user_id, user);
    }

    /// Seed a catalog entry.
    pub async fn put_menu_item(&self, item: MenuItem) {
        let mut inner = self.inner.lock().await;
        inner.menu.insert(item.menu_item_id, item);
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn load_cart(&self, user_id: Uuid) -> Result<Option<Cart>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.carts.get(&user_id).cloned())
    }

    async fn add_cart_item(&self, user_id: Uuid, item: NewCartItem) -> Result<Cart, AppError> {
        let mut inner = self.inner.lock().await;
        let cart = inner
            .carts
            .entry(user_id)
            .or_insert_with(|| Cart::new(user_id));

        match cart
            .items
            .iter_mut()
            .find(|line| line.menu_item_id == item.menu_item_id)
        {
            Some(line) => line.add_quantity(item.quantity),
            None => {
                let line = CartItem::new(cart.cart_id, item.menu_item_id, item.quantity, item.unit_price);
                cart.items.push(line);
            }
        }
        cart.updated_utc = Utc::now();

        Ok(cart.clone())
    }

    async fn convert_cart_to_order(&self, user_id: Uuid) -> Result<Order, AppError> {
        let mut inner = self.inner.lock().await;

        let cart = inner
            .carts
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Cart not found for user {}", user_id)))?;

        let order = Order::from_cart_items(user_id, &cart.items)?;

        // Order insert and cart clear happen under the same lock: the
        // conversion is all-or-nothing here just as in the SQL backend.
        cart.items.clear();
        cart.updated_utc = Utc::now();
        inner.orders.insert(order.order_id, order.clone());

        Ok(order)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(&order_id).cloned())
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, AppError> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.placed_utc.cmp(&a.placed_utc));
        Ok(orders)
    }

    async fn record_payment_outcome(
        &self,
        outcome: PaymentOutcome,
    ) -> Result<OutcomeApplication, AppError> {
        let mut inner = self.inner.lock().await;

        let order = inner.orders.get_mut(&outcome.order_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Order not found with id {}", outcome.order_id))
        })?;

        let transition = order.apply_payment_outcome(outcome.success)?;
        let order = order.clone();

        inner
            .payments
            .entry(outcome.order_id)
            .or_default()
            .push(outcome.to_payment());

        Ok(OutcomeApplication { order, transition })
    }

    async fn list_payments(&self, order_id: Uuid) -> Result<Vec<Payment>, AppError> {
        let inner = self.inner.lock().await;
        let mut payments = inner.payments.get(&order_id).cloned().unwrap_or_default();
        payments.reverse();
        Ok(payments)
    }

    async fn mark_delivered(&self, order_id: Uuid) -> Result<Order, AppError> {
        let mut inner = self.inner.lock().await;

        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found with id {}", order_id)))?;

        order.order_status.ensure_transition(OrderStatus::Delivered)?;
        order.order_status = OrderStatus::Delivered;
        order.updated_utc = Utc::now();

        Ok(order.clone())
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn get_menu_item(&self, menu_item_id: Uuid) -> Result<Option<MenuItem>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.menu.get(&menu_item_id).cloned())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;
    use rust_decimal_macros::dec;

    fn seed_item(menu_item_id: Uuid, quantity: i32, price: rust_decimal::Decimal) -> NewCartItem {
        NewCartItem {
            menu_item_id,
            quantity,
            unit_price: price,
        }
    }

    #[tokio::test]
    async fn cart_is_created_lazily_and_merges_lines() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let menu_item = Uuid::new_v4();

        assert!(store.load_cart(user_id).await.unwrap().is_none());

        store
            .add_cart_item(user_id, seed_item(menu_item, 1, dec!(3.00)))
            .await
            .unwrap();
        let cart = store
            .add_cart_item(user_id, seed_item(menu_item, 2, dec!(3.00)))
            .await
            .unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.subtotal(), dec!(9.00));
    }

    #[tokio::test]
    async fn conversion_clears_cart_and_keeps_it() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();

        store
            .add_cart_item(user_id, seed_item(Uuid::new_v4(), 2, dec!(10.00)))
            .await
            .unwrap();

        let order = store.convert_cart_to_order(user_id).await.unwrap();
        assert_eq!(order.total_amount, dec!(20.00));

        // Cart row survives, emptied.
        let cart = store.load_cart(user_id).await.unwrap().unwrap();
        assert!(cart.is_empty());

        // A second conversion now fails with an empty cart, not a missing one.
        let err = store.convert_cart_to_order(user_id).await.unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[tokio::test]
    async fn outcome_rows_append_even_for_duplicates() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .add_cart_item(user_id, seed_item(Uuid::new_v4(), 1, dec!(20.00)))
            .await
            .unwrap();
        let order = store.convert_cart_to_order(user_id).await.unwrap();

        let outcome = PaymentOutcome {
            order_id: order.order_id,
            transaction_id: "tx_1".to_string(),
            amount: dec!(20.00),
            gateway: "stripe".to_string(),
            success: true,
            failure_reason: None,
        };

        store.record_payment_outcome(outcome.clone()).await.unwrap();
        store.record_payment_outcome(outcome).await.unwrap();

        let payments = store.list_payments(order.order_id).await.unwrap();
        assert_eq!(payments.len(), 2);
        assert!(payments.iter().all(|p| p.status == PaymentStatus::Completed));
    }
}
