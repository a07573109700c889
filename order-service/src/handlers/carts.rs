//! Cart handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::models::Cart;
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct AddCartItemRequest {
    pub menu_item_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

/// Add a menu item to the user's cart. The catalog price is snapshotted into
/// the cart line at this point.
pub async fn add_cart_item(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<Cart>), AppError> {
    payload.validate()?;

    tracing::info!(
        user_id = %user_id,
        menu_item_id = %payload.menu_item_id,
        quantity = payload.quantity,
        "Adding item to cart"
    );

    let cart = state
        .orders
        .add_to_cart(user_id, payload.menu_item_id, payload.quantity)
        .await?;

    Ok((StatusCode::OK, Json(cart)))
}

/// Fetch the user's current cart.
pub async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Cart>, AppError> {
    let cart = state.orders.get_cart(user_id).await?;
    Ok(Json(cart))
}
