//! Order placement and fulfillment handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::Order;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
}

/// Convert the user's cart into an order. Atomic: on any failure the cart is
/// left untouched and no order exists.
pub async fn checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    tracing::info!(user_id = %payload.user_id, "Checkout requested");

    let order = state.orders.place_order_from_cart(payload.user_id).await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// Get an order by ID.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.get_order(order_id).await?;
    Ok(Json(order))
}

/// List a user's orders, most recent first.
pub async fn list_user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = state.orders.list_orders_for_user(user_id).await?;
    Ok(Json(orders))
}

/// Mark an order delivered. Only `CONFIRMED` orders can move here; anything
/// else is a conflict.
pub async fn mark_delivered(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    tracing::info!(order_id = %order_id, "Delivery confirmation requested");

    let order = state.orders.mark_delivered(order_id).await?;
    Ok(Json(order))
}
