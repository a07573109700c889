//! Order placement orchestrator.
//!
//! Converts a user's cart into an immutable order. All validation happens
//! before the storage composite runs; the confirmation email is
//! fire-and-forget and can never undo a placed order.

use crate::config::LinkConfig;
use crate::models::{Cart, Order, UserProfile};
use crate::services::metrics::{record_notification, record_order_placed};
use crate::services::notifier::{NotificationRequest, NotificationSink};
use crate::services::storage::{Catalog, NewCartItem, OrderStore, UserDirectory};
use chrono::Datelike;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn Catalog>,
    sink: Arc<dyn NotificationSink>,
    links: LinkConfig,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn Catalog>,
        sink: Arc<dyn NotificationSink>,
        links: LinkConfig,
    ) -> Self {
        Self {
            store,
            users,
            catalog,
            sink,
            links,
        }
    }

    /// Add a menu item to the user's cart, snapshotting the catalog price
    /// into the cart line. Repeat adds of the same item merge quantities.
    #[instrument(skip(self), fields(user_id = %user_id, menu_item_id = %menu_item_id))]
    pub async fn add_to_cart(
        &self,
        user_id: Uuid,
        menu_item_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, AppError> {
        if quantity < 1 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Quantity must be at least 1, got {}",
                quantity
            )));
        }

        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found with id {}", user_id)))?;

        let item = self
            .catalog
            .get_menu_item(menu_item_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Menu item not found with id {}", menu_item_id))
            })?;

        if !item.available {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Menu item {} is not available",
                item.name
            )));
        }

        self.store
            .add_cart_item(
                user_id,
                NewCartItem {
                    menu_item_id,
                    quantity,
                    unit_price: item.price,
                },
            )
            .await
    }

    /// Current cart contents. A user who never added anything has no cart.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<Cart, AppError> {
        self.store
            .load_cart(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Cart not found for user {}", user_id)))
    }

    /// Place an order from the user's cart.
    ///
    /// Preconditions (checked before anything mutates): the user exists and
    /// has a delivery address. The cart conversion itself is one unit of
    /// work in the store; a failure there leaves cart and orders untouched.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn place_order_from_cart(&self, user_id: Uuid) -> Result<Order, AppError> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found with id {}", user_id)))?;

        let Some(address) = user.address.clone() else {
            record_order_placed("rejected");
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "No delivery address on file for user {}",
                user.name
            )));
        };

        let order = match self.store.convert_cart_to_order(user_id).await {
            Ok(order) => order,
            Err(e) => {
                record_order_placed("rejected");
                return Err(e);
            }
        };
        record_order_placed("placed");

        tracing::info!(
            order_id = %order.order_id,
            total_amount = %order.total_amount,
            item_count = order.items.len(),
            "Order placed"
        );

        let note = render_order_confirmation(&user, &order, &address, &self.links);
        self.dispatch("order_confirmation", note).await;

        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, AppError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found with id {}", order_id)))
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, AppError> {
        self.store.list_orders_for_user(user_id).await
    }

    /// Fulfillment trigger: only `CONFIRMED -> DELIVERED` is legal; anything
    /// else is a conflict surfaced to the caller.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<Order, AppError> {
        let order = self.store.mark_delivered(order_id).await?;
        tracing::info!(order_id = %order.order_id, "Order marked delivered");
        Ok(order)
    }

    async fn dispatch(&self, kind: &str, note: NotificationRequest) {
        match self.sink.send(note).await {
            Ok(()) => record_notification(kind, "sent"),
            Err(e) => {
                tracing::warn!(error = %e, kind = kind, "Notification delivery failed");
                record_notification(kind, "failed");
            }
        }
    }
}

fn render_order_confirmation(
    user: &UserProfile,
    order: &Order,
    address: &str,
    links: &LinkConfig,
) -> NotificationRequest {
    let mut rows = String::new();
    for item in &order.items {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            item.menu_item_id, item.quantity, item.unit_price, item.subtotal
        ));
    }

    let payment_link = format!(
        "{}{}&amount={}",
        links.payment_base_url, order.order_id, order.total_amount
    );

    let body = format!(
        r#"<html><body>
<p>Hi {name},</p>
<p>Your order <strong>{order_id}</strong> was placed on {placed}.</p>
<table><tr><th>Item</th><th>Qty</th><th>Unit price</th><th>Subtotal</th></tr>{rows}</table>
<p>Total: <strong>{total}</strong></p>
<p>Delivery address: {address}</p>
<p><a href="{payment_link}">Pay for your order</a></p>
<p>&copy; {year}</p>
</body></html>"#,
        name = user.name,
        order_id = order.order_id,
        placed = order.placed_utc.format("%d %B %Y %H:%M:%S"),
        rows = rows,
        total = order.total_amount,
        address = address,
        payment_link = payment_link,
        year = order.placed_utc.year(),
    );

    NotificationRequest {
        recipient: user.email.clone(),
        subject: format!("Order Confirmation - Order ID: {}", order.order_id),
        body,
        is_html: true,
    }
}
