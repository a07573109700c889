//! Payment orchestrator and reconciler.
//!
//! `initiate_payment` validates everything up front and mutates nothing
//! locally: the order stays `PENDING` until a gateway outcome is reconciled,
//! so a failed or timed-out gateway call is safely retryable.
//! `apply_payment_outcome` is the webhook-analogous transition point and is
//! idempotent under at-least-once delivery.

use crate::models::{Order, OutcomeTransition, Payment, PaymentOutcome, PaymentStatus, UserProfile};
use crate::services::gateway::{to_minor_units, PaymentGateway, PaymentIntentRequest};
use crate::services::metrics::{record_notification, record_payment_intent, record_payment_outcome};
use crate::services::notifier::{NotificationRequest, NotificationSink};
use crate::services::storage::{OrderStore, OutcomeApplication, UserDirectory};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Opaque client-side handle for completing a payment attempt.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentHandle {
    pub order_id: Uuid,
    pub transaction_id: String,
    pub client_secret: String,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn OrderStore>,
    users: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    sink: Arc<dyn NotificationSink>,
    currency: String,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        users: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        sink: Arc<dyn NotificationSink>,
        currency: String,
    ) -> Self {
        Self {
            store,
            users,
            gateway,
            sink,
            currency,
        }
    }

    /// Create a payment attempt for an order against the gateway.
    ///
    /// The amount must equal the order total exactly, by decimal
    /// comparison. No local state changes on this path.
    #[instrument(skip(self), fields(order_id = %order_id, amount = %amount))]
    pub async fn initiate_payment(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<PaymentHandle, AppError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found with id {}", order_id)))?;

        if order.payment_status == PaymentStatus::Completed {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Payment already completed for order {}",
                order_id
            )));
        }

        if amount != order.total_amount {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount {} does not match order total {} for order {}",
                amount,
                order.total_amount,
                order_id
            )));
        }

        let request = PaymentIntentRequest {
            amount_minor_units: to_minor_units(amount)?,
            currency: self.currency.clone(),
            order_id,
        };

        let intent = match self.gateway.create_payment_intent(request).await {
            Ok(intent) => {
                record_payment_intent("created");
                intent
            }
            Err(e) => {
                record_payment_intent("failed");
                return Err(e);
            }
        };

        Ok(PaymentHandle {
            order_id,
            transaction_id: intent.transaction_id,
            client_secret: intent.client_secret,
        })
    }

    /// Apply a gateway outcome to the order and its payment history.
    ///
    /// Duplicate deliveries are acknowledged, not errors: the attempt row is
    /// still appended for audit, but state stays put and no notification
    /// goes out a second time.
    #[instrument(skip(self, outcome), fields(order_id = %outcome.order_id, transaction_id = %outcome.transaction_id, success = outcome.success))]
    pub async fn apply_payment_outcome(
        &self,
        outcome: PaymentOutcome,
    ) -> Result<OutcomeApplication, AppError> {
        let success = outcome.success;
        let failure_reason = outcome.failure_reason.clone();
        let transaction_id = outcome.transaction_id.clone();
        let amount = outcome.amount;

        let application = self.store.record_payment_outcome(outcome).await?;

        let result = if success { "success" } else { "failure" };
        let transition = match application.transition {
            OutcomeTransition::Applied => "applied",
            OutcomeTransition::Duplicate => "duplicate",
        };
        record_payment_outcome(result, transition);

        if application.transition == OutcomeTransition::Duplicate {
            tracing::info!(
                order_id = %application.order.order_id,
                transaction_id = %transaction_id,
                "Duplicate outcome delivery acknowledged"
            );
            return Ok(application);
        }

        tracing::info!(
            order_id = %application.order.order_id,
            order_status = application.order.order_status.as_str(),
            payment_status = application.order.payment_status.as_str(),
            "Payment outcome applied"
        );

        match self.users.get_user(application.order.user_id).await {
            Ok(Some(user)) => {
                let note = if success {
                    render_payment_success(&user, &application.order, &transaction_id, amount)
                } else {
                    render_payment_failed(&user, &application.order, failure_reason.as_deref())
                };
                let kind = if success {
                    "payment_success"
                } else {
                    "payment_failed"
                };
                self.dispatch(kind, note).await;
            }
            Ok(None) => {
                tracing::warn!(
                    user_id = %application.order.user_id,
                    "No user profile for order, skipping payment notification"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "User lookup failed, skipping payment notification");
            }
        }

        Ok(application)
    }

    /// Payment attempt audit trail for an order, most recent first.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn list_payments(&self, order_id: Uuid) -> Result<Vec<Payment>, AppError> {
        if self.store.get_order(order_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Order not found with id {}",
                order_id
            )));
        }
        self.store.list_payments(order_id).await
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

fn render_payment_success(
    user: &UserProfile,
    order: &Order,
    transaction_id: &str,
    amount: Decimal,
) -> NotificationRequest {
    let body = format!(
        r#"<html><body>
<p>Hi {name},</p>
<p>Your payment of <strong>{amount}</strong> for order <strong>{order_id}</strong> was successful.</p>
<p>Transaction: {transaction_id}</p>
<p>Date: {date}</p>
</body></html>"#,
        name = user.name,
        amount = amount,
        order_id = order.order_id,
        transaction_id = transaction_id,
        date = Utc::now().format("%d %B %Y %H:%M:%S"),
    );

    NotificationRequest {
        recipient: user.email.clone(),
        subject: format!("Payment Successful for Order #{}", order.order_id),
        body,
        is_html: true,
    }
}

fn render_payment_failed(
    user: &UserProfile,
    order: &Order,
    failure_reason: Option<&str>,
) -> NotificationRequest {
    let body = format!(
        r#"<html><body>
<p>Hi {name},</p>
<p>Your payment for order <strong>{order_id}</strong> failed.</p>
<p>Reason: {reason}</p>
<p>No money was taken. You can retry payment from your order page.</p>
</body></html>"#,
        name = user.name,
        order_id = order.order_id,
        reason = failure_reason.unwrap_or("unknown"),
    );

    NotificationRequest {
        recipient: user.email.clone(),
        subject: format!("Payment Failed for Order #{}", order.order_id),
        body,
        is_html: true,
    }
}
