//! PostgreSQL storage backend.
//!
//! All composite operations open an explicit transaction and take a
//! `FOR UPDATE` row lock on the cart or order they mutate, so concurrent
//! checkouts for one user and duplicate outcome deliveries for one order
//! are serialized by the database.

use super::{Catalog, NewCartItem, OrderStore, OutcomeApplication, UserDirectory};
use crate::models::{
    Cart, CartItem, MenuItem, Order, OrderItem, OrderStatus, OutcomeTransition, Payment,
    PaymentOutcome, PaymentStatus, UserProfile,
};
use crate::services::metrics::STORE_OP_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    order_id: Uuid,
    user_id: Uuid,
    order_status: String,
    payment_status: String,
    total_amount: Decimal,
    placed_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, AppError> {
        Ok(Order {
            order_id: self.order_id,
            user_id: self.user_id,
            order_status: OrderStatus::parse(&self.order_status)?,
            payment_status: PaymentStatus::parse(&self.payment_status)?,
            total_amount: self.total_amount,
            placed_utc: self.placed_utc,
            updated_utc: self.updated_utc,
            items,
        })
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    order_id: Uuid,
    amount: Decimal,
    gateway: String,
    transaction_id: String,
    status: String,
    failure_reason: Option<String>,
    recorded_utc: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, AppError> {
        Ok(Payment {
            payment_id: self.payment_id,
            order_id: self.order_id,
            amount: self.amount,
            gateway: self.gateway,
            transaction_id: self.transaction_id,
            status: PaymentStatus::parse(&self.status)?,
            failure_reason: self.failure_reason,
            recorded_utc: self.recorded_utc,
        })
    }
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "order-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn load_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, AppError> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT order_item_id, order_id, menu_item_id, quantity, unit_price, subtotal
            FROM order_items WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load order items: {}", e)))?;
        Ok(items)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn load_cart(&self, user_id: Uuid) -> Result<Option<Cart>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["load_cart"])
            .start_timer();

        let row = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT cart_id, user_id, created_utc, updated_utc FROM carts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load cart: {}", e)))?;

        let Some((cart_id, user_id, created_utc, updated_utc)) = row else {
            timer.observe_duration();
            return Ok(None);
        };

        let items = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT cart_item_id, cart_id, menu_item_id, quantity, unit_price, subtotal
            FROM cart_items WHERE cart_id = $1
            "#,
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load cart items: {}", e)))?;

        timer.observe_duration();
        Ok(Some(Cart {
            cart_id,
            user_id,
            created_utc,
            updated_utc,
            items,
        }))
    }

    #[instrument(skip(self, item), fields(user_id = %user_id, menu_item_id = %item.menu_item_id))]
    async fn add_cart_item(&self, user_id: Uuid, item: NewCartItem) -> Result<Cart, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["add_cart_item"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing_cart = sqlx::query_scalar::<_, Uuid>(
            "SELECT cart_id FROM carts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock cart: {}", e)))?;

        let cart_id = match existing_cart {
            Some(id) => id,
            None => {
                let cart = Cart::new(user_id);
                sqlx::query(
                    "INSERT INTO carts (cart_id, user_id, created_utc, updated_utc) VALUES ($1, $2, $3, $4)",
                )
                .bind(cart.cart_id)
                .bind(user_id)
                .bind(cart.created_utc)
                .bind(cart.updated_utc)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to create cart: {}", e))
                })?;
                cart.cart_id
            }
        };

        let existing_line = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT cart_item_id, cart_id, menu_item_id, quantity, unit_price, subtotal
            FROM cart_items WHERE cart_id = $1 AND menu_item_id = $2
            "#,
        )
        .bind(cart_id)
        .bind(item.menu_item_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read cart line: {}", e)))?;

        match existing_line {
            Some(mut line) => {
                line.add_quantity(item.quantity);
                sqlx::query(
                    "UPDATE cart_items SET quantity = $1, subtotal = $2 WHERE cart_item_id = $3",
                )
                .bind(line.quantity)
                .bind(line.subtotal)
                .bind(line.cart_item_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to merge cart line: {}", e))
                })?;
            }
            None => {
                let line = CartItem::new(cart_id, item.menu_item_id, item.quantity, item.unit_price);
                sqlx::query(
                    r#"
                    INSERT INTO cart_items (cart_item_id, cart_id, menu_item_id, quantity, unit_price, subtotal)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(line.cart_item_id)
                .bind(line.cart_id)
                .bind(line.menu_item_id)
                .bind(line.quantity)
                .bind(line.unit_price)
                .bind(line.subtotal)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to insert cart line: {}", e))
                })?;
            }
        }

        sqlx::query("UPDATE carts SET updated_utc = $1 WHERE cart_id = $2")
            .bind(Utc::now())
            .bind(cart_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to touch cart: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        self.load_cart(user_id).await?.ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!("Cart vanished after insert"))
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn convert_cart_to_order(&self, user_id: Uuid) -> Result<Order, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["convert_cart_to_order"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Row lock on the cart: the second of two concurrent checkouts
        // blocks here and then observes an already-emptied cart.
        let cart_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT cart_id FROM carts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock cart: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Cart not found for user {}", user_id)))?;

        let cart_items = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT cart_item_id, cart_id, menu_item_id, quantity, unit_price, subtotal
            FROM cart_items WHERE cart_id = $1
            "#,
        )
        .bind(cart_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read cart items: {}", e)))?;

        let order = Order::from_cart_items(user_id, &cart_items)?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, user_id, order_status, payment_status, total_amount, placed_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.order_id)
        .bind(order.user_id)
        .bind(order.order_status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.total_amount)
        .bind(order.placed_utc)
        .bind(order.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert order: {}", e)))?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_item_id, order_id, menu_item_id, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.order_item_id)
            .bind(item.order_id)
            .bind(item.menu_item_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.subtotal)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert order item: {}", e))
            })?;
        }

        // Clearing the cart is part of the same unit of work as the order
        // insert: both land or neither does.
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to clear cart: {}", e)))?;

        sqlx::query("UPDATE carts SET updated_utc = $1 WHERE cart_id = $2")
            .bind(Utc::now())
            .bind(cart_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to touch cart: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(order_id = %order.order_id, total = %order.total_amount, "Order created from cart");
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, AppError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT order_id, user_id, order_status, payment_status, total_amount, placed_utc, updated_utc
            FROM orders WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load order: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = self.load_order_items(order_id).await?;
        Ok(Some(row.into_order(items)?))
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, AppError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT order_id, user_id, order_status, payment_status, total_amount, placed_utc, updated_utc
            FROM orders WHERE user_id = $1 ORDER BY placed_utc DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list orders: {}", e)))?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.load_order_items(row.order_id).await?;
            orders.push(row.into_order(items)?);
        }
        Ok(orders)
    }

    #[instrument(skip(self, outcome), fields(order_id = %outcome.order_id, transaction_id = %outcome.transaction_id))]
    async fn record_payment_outcome(
        &self,
        outcome: PaymentOutcome,
    ) -> Result<OutcomeApplication, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["record_payment_outcome"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // The terminal-state guard and the payment row write share this
        // transaction; duplicate deliveries serialize on the order row.
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT order_id, user_id, order_status, payment_status, total_amount, placed_utc, updated_utc
            FROM orders WHERE order_id = $1 FOR UPDATE
            "#,
        )
        .bind(outcome.order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock order: {}", e)))?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Order not found with id {}", outcome.order_id))
        })?;

        let mut order = row.into_order(Vec::new())?;

        let payment = outcome.to_payment();
        sqlx::query(
            r#"
            INSERT INTO payments (payment_id, order_id, amount, gateway, transaction_id, status, failure_reason, recorded_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.order_id)
        .bind(payment.amount)
        .bind(&payment.gateway)
        .bind(&payment.transaction_id)
        .bind(payment.status.as_str())
        .bind(&payment.failure_reason)
        .bind(payment.recorded_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e)))?;

        let transition = order.apply_payment_outcome(outcome.success)?;

        if transition == OutcomeTransition::Applied {
            sqlx::query(
                "UPDATE orders SET order_status = $1, payment_status = $2, updated_utc = $3 WHERE order_id = $4",
            )
            .bind(order.order_status.as_str())
            .bind(order.payment_status.as_str())
            .bind(order.updated_utc)
            .bind(order.order_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update order status: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        Ok(OutcomeApplication { order, transition })
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn list_payments(&self, order_id: Uuid) -> Result<Vec<Payment>, AppError> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, order_id, amount, gateway, transaction_id, status, failure_reason, recorded_utc
            FROM payments WHERE order_id = $1 ORDER BY recorded_utc DESC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn mark_delivered(&self, order_id: Uuid) -> Result<Order, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT order_id, user_id, order_status, payment_status, total_amount, placed_utc, updated_utc
            FROM orders WHERE order_id = $1 FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock order: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found with id {}", order_id)))?;

        let mut order = row.into_order(Vec::new())?;
        order.order_status.ensure_transition(OrderStatus::Delivered)?;
        order.order_status = OrderStatus::Delivered;
        order.updated_utc = Utc::now();

        sqlx::query("UPDATE orders SET order_status = $1, updated_utc = $2 WHERE order_id = $3")
            .bind(order.order_status.as_str())
            .bind(order.updated_utc)
            .bind(order.order_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update order status: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        order.items = self.load_order_items(order_id).await?;
        Ok(order)
    }
}

#[async_trait]
impl Catalog for PgStore {
    #[instrument(skip(self), fields(menu_item_id = %menu_item_id))]
    async fn get_menu_item(&self, menu_item_id: Uuid) -> Result<Option<MenuItem>, AppError> {
        let item = sqlx::query_as::<_, MenuItem>(
            "SELECT menu_item_id, name, price, available FROM menu_items WHERE menu_item_id = $1",
        )
        .bind(menu_item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load menu item: {}", e)))?;
        Ok(item)
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppError> {
        let user = sqlx::query_as::<_, UserProfile>(
            "SELECT user_id, name, email, address, created_utc FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load user: {}", e)))?;
        Ok(user)
    }
}
