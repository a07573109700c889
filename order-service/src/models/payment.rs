use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Payment lifecycle for an order. `Completed` and `Failed` are both
/// terminal: an order that reached either accepts no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(AppError::InternalError(anyhow::anyhow!(
                "unknown payment status '{}'",
                other
            ))),
        }
    }
}

/// One recorded payment attempt against an order. Append-only: outcome
/// deliveries always add a row, duplicates included, so the gateway history
/// stays auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub gateway: String,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub recorded_utc: DateTime<Utc>,
}

/// A gateway outcome as delivered to the reconciler.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub order_id: Uuid,
    pub transaction_id: String,
    pub amount: Decimal,
    pub gateway: String,
    pub success: bool,
    pub failure_reason: Option<String>,
}

impl PaymentOutcome {
    pub fn status(&self) -> PaymentStatus {
        if self.success {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        }
    }

    /// Build the audit row for this delivery.
    pub fn to_payment(&self) -> Payment {
        Payment {
            payment_id: Uuid::new_v4(),
            order_id: self.order_id,
            amount: self.amount,
            gateway: self.gateway.clone(),
            transaction_id: self.transaction_id.clone(),
            status: self.status(),
            failure_reason: if self.success {
                None
            } else {
                self.failure_reason.clone()
            },
            recorded_utc: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn failure_reason_is_kept_only_for_failures() {
        let outcome = PaymentOutcome {
            order_id: Uuid::new_v4(),
            transaction_id: "tx_1".to_string(),
            amount: dec!(45.00),
            gateway: "stripe".to_string(),
            success: false,
            failure_reason: Some("card_declined".to_string()),
        };
        let payment = outcome.to_payment();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("card_declined"));

        let success = PaymentOutcome {
            success: true,
            ..outcome
        };
        let payment = success.to_payment();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.failure_reason.is_none());
    }
}
