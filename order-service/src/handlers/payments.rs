//! Payment initiation and gateway-outcome handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{OutcomeTransition, Payment, PaymentOutcome};
use crate::services::PaymentHandle;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,
    pub amount: Option<Decimal>,
}

/// Create a payment attempt against the gateway. Returns the handle the
/// client uses to complete the payment; no local state changes here.
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentHandle>), AppError> {
    let amount = payload.amount.ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Payment amount is required"))
    })?;

    tracing::info!(order_id = %payload.order_id, amount = %amount, "Payment initiation requested");

    let handle = state
        .payments
        .initiate_payment(payload.order_id, amount)
        .await?;

    Ok((StatusCode::CREATED, Json(handle)))
}

/// Gateway outcome delivery, webhook-style. At-least-once: duplicates are
/// acknowledged with `transition = "duplicate"` and change nothing.
#[derive(Debug, Deserialize)]
pub struct PaymentOutcomeRequest {
    pub order_id: Uuid,
    pub transaction_id: String,
    pub amount: Decimal,
    #[serde(default = "default_gateway")]
    pub gateway: String,
    pub success: bool,
    pub failure_reason: Option<String>,
}

fn default_gateway() -> String {
    "stripe".to_string()
}

#[derive(Debug, Serialize)]
pub struct PaymentOutcomeResponse {
    pub order_id: Uuid,
    pub order_status: String,
    pub payment_status: String,
    pub transition: String,
}

pub async fn record_payment_outcome(
    State(state): State<AppState>,
    Json(payload): Json<PaymentOutcomeRequest>,
) -> Result<Json<PaymentOutcomeResponse>, AppError> {
    tracing::info!(
        order_id = %payload.order_id,
        transaction_id = %payload.transaction_id,
        success = payload.success,
        "Payment outcome received"
    );

    let outcome = PaymentOutcome {
        order_id: payload.order_id,
        transaction_id: payload.transaction_id,
        amount: payload.amount,
        gateway: payload.gateway,
        success: payload.success,
        failure_reason: payload.failure_reason,
    };

    let application = state.payments.apply_payment_outcome(outcome).await?;

    let transition = match application.transition {
        OutcomeTransition::Applied => "applied",
        OutcomeTransition::Duplicate => "duplicate",
    };

    Ok(Json(PaymentOutcomeResponse {
        order_id: application.order.order_id,
        order_status: application.order.order_status.as_str().to_string(),
        payment_status: application.order.payment_status.as_str().to_string(),
        transition: transition.to_string(),
    }))
}

/// Payment attempt audit trail for an order.
pub async fn list_payments(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let payments = state.payments.list_payments(order_id).await?;
    Ok(Json(payments))
}
