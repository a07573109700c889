//! Stripe payment gateway client.
//!
//! Creates payment intents scoped to an order's exact total, tagged with the
//! order id as correlation metadata. The client never mutates local state;
//! a timeout or transport failure is a retryable gateway error.

use crate::config::StripeConfig;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::error::AppError;
use std::time::Duration;
use uuid::Uuid;

/// Gateway-facing request: the amount is already converted to the minor
/// currency unit expected on the wire.
#[derive(Debug, Clone)]
pub struct PaymentIntentRequest {
    pub amount_minor_units: u64,
    pub currency: String,
    pub order_id: Uuid,
}

/// Opaque handle returned to the caller of payment initiation. The client
/// secret is what the customer-facing checkout uses to complete payment.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub transaction_id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, AppError>;
}

/// Convert a decimal amount to the gateway's minor currency unit (cents).
///
/// The conversion must be exact: amounts with sub-cent precision are caller
/// errors, not rounding candidates.
pub fn to_minor_units(amount: Decimal) -> Result<u64, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "payment amount must be positive, got {}",
            amount
        )));
    }

    let minor = amount * Decimal::ONE_HUNDRED;
    if minor.normalize().scale() > 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "payment amount {} has sub-cent precision",
            amount
        )));
    }

    minor.to_u64().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("payment amount {} out of range", amount))
    })
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

/// Client for Stripe's payment-intent API.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, AppError> {
        if !self.is_configured() {
            return Err(AppError::Gateway(
                "Stripe credentials not configured".to_string(),
            ));
        }

        let url = format!("{}/v1/payment_intents", self.config.api_base_url);
        let order_id = request.order_id.to_string();
        let amount = request.amount_minor_units.to_string();
        let params = [
            ("amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("metadata[order_id]", order_id.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, order_id = %request.order_id, "Gateway call failed");
                AppError::Gateway(format!("payment intent request failed: {}", e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Gateway(format!("failed to read gateway response: {}", e)))?;

        tracing::debug!(status = %status, "Stripe create_payment_intent response");

        if status.is_success() {
            let intent: StripeIntent = serde_json::from_str(&body).map_err(|e| {
                AppError::Gateway(format!("unexpected gateway response shape: {}", e))
            })?;
            tracing::info!(
                transaction_id = %intent.id,
                order_id = %request.order_id,
                "Payment intent created"
            );
            Ok(PaymentIntent {
                transaction_id: intent.id,
                client_secret: intent.client_secret,
            })
        } else {
            let detail = serde_json::from_str::<StripeErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(StripeErrorDetail {
                    code: None,
                    message: body,
                });
            tracing::error!(
                code = ?detail.code,
                message = %detail.message,
                "Payment intent creation rejected"
            );
            Err(AppError::Gateway(detail.message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minor_units_are_exact_cents() {
        assert_eq!(to_minor_units(dec!(20.00)).unwrap(), 2000);
        assert_eq!(to_minor_units(dec!(45.50)).unwrap(), 4550);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(100)).unwrap(), 10000);
    }

    #[test]
    fn sub_cent_precision_is_rejected() {
        assert!(to_minor_units(dec!(19.999)).is_err());
        assert!(to_minor_units(dec!(0.005)).is_err());
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert!(to_minor_units(Decimal::ZERO).is_err());
        assert!(to_minor_units(dec!(-5.00)).is_err());
    }
}
