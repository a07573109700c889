//! Gateway-outcome reconciliation integration tests.

mod common;

use common::{harness, seed_menu_item, seed_user, TestHarness};
use order_service::models::{Order, OrderStatus, OutcomeTransition, PaymentOutcome, PaymentStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn placed_order(h: &TestHarness, total: Decimal) -> Order {
    let user = seed_user(&h.store, true).await;
    let item = seed_menu_item(&h.store, total).await;
    h.orders
        .add_to_cart(user.user_id, item.menu_item_id, 1)
        .await
        .unwrap();
    h.orders.place_order_from_cart(user.user_id).await.unwrap()
}

fn outcome(order_id: Uuid, transaction_id: &str, success: bool) -> PaymentOutcome {
    PaymentOutcome {
        order_id,
        transaction_id: transaction_id.to_string(),
        amount: dec!(20.00),
        gateway: "stripe".to_string(),
        success,
        failure_reason: (!success).then(|| "card_declined".to_string()),
    }
}

#[tokio::test]
async fn successful_outcome_confirms_order() {
    let h = harness();
    let order = placed_order(&h, dec!(20.00)).await;
    let emails_before = h.sink.count();

    let application = h
        .payments
        .apply_payment_outcome(outcome(order.order_id, "tx_ok", true))
        .await
        .unwrap();

    assert_eq!(application.transition, OutcomeTransition::Applied);
    assert_eq!(application.order.order_status, OrderStatus::Confirmed);
    assert_eq!(application.order.payment_status, PaymentStatus::Completed);

    let payments = h.payments.list_payments(order.order_id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Completed);
    assert!(payments[0].failure_reason.is_none());

    let sent = h.sink.sent();
    assert_eq!(sent.len(), emails_before + 1);
    assert_eq!(
        sent.last().unwrap().subject,
        format!("Payment Successful for Order #{}", order.order_id)
    );
}

#[tokio::test]
async fn duplicate_delivery_is_acknowledged_without_retransition() {
    let h = harness();
    let order = placed_order(&h, dec!(20.00)).await;

    h.payments
        .apply_payment_outcome(outcome(order.order_id, "tx_ok", true))
        .await
        .unwrap();
    let emails_after_first = h.sink.count();

    let second = h
        .payments
        .apply_payment_outcome(outcome(order.order_id, "tx_ok", true))
        .await
        .unwrap();

    assert_eq!(second.transition, OutcomeTransition::Duplicate);
    assert_eq!(second.order.order_status, OrderStatus::Confirmed);
    assert_eq!(second.order.payment_status, PaymentStatus::Completed);

    // The attempt row is still appended for audit; no second email.
    let payments = h.payments.list_payments(order.order_id).await.unwrap();
    assert_eq!(payments.len(), 2);
    assert_eq!(h.sink.count(), emails_after_first);
}

#[tokio::test]
async fn late_failure_after_completion_changes_nothing() {
    let h = harness();
    let order = placed_order(&h, dec!(20.00)).await;

    h.payments
        .apply_payment_outcome(outcome(order.order_id, "tx_ok", true))
        .await
        .unwrap();

    let late = h
        .payments
        .apply_payment_outcome(outcome(order.order_id, "tx_late", false))
        .await
        .unwrap();

    assert_eq!(late.transition, OutcomeTransition::Duplicate);
    assert_eq!(late.order.order_status, OrderStatus::Confirmed);
    assert_eq!(late.order.payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn failed_outcome_cancels_order_and_records_reason() {
    let h = harness();
    let order = placed_order(&h, dec!(20.00)).await;
    let emails_before = h.sink.count();

    let application = h
        .payments
        .apply_payment_outcome(outcome(order.order_id, "tx_bad", false))
        .await
        .unwrap();

    assert_eq!(application.transition, OutcomeTransition::Applied);
    assert_eq!(application.order.order_status, OrderStatus::Cancelled);
    assert_eq!(application.order.payment_status, PaymentStatus::Failed);

    let payments = h.payments.list_payments(order.order_id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);
    assert_eq!(payments[0].failure_reason.as_deref(), Some("card_declined"));

    let sent = h.sink.sent();
    assert_eq!(sent.len(), emails_before + 1);
    assert_eq!(
        sent.last().unwrap().subject,
        format!("Payment Failed for Order #{}", order.order_id)
    );
    assert!(sent.last().unwrap().body.contains("card_declined"));
}

#[tokio::test]
async fn outcome_for_unknown_order_is_not_found() {
    let h = harness();

    let err = h
        .payments
        .apply_payment_outcome(outcome(Uuid::new_v4(), "tx_ghost", true))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn confirmed_order_can_be_delivered() {
    let h = harness();
    let order = placed_order(&h, dec!(20.00)).await;

    h.payments
        .apply_payment_outcome(outcome(order.order_id, "tx_ok", true))
        .await
        .unwrap();

    let delivered = h.orders.mark_delivered(order.order_id).await.unwrap();
    assert_eq!(delivered.order_status, OrderStatus::Delivered);
}

#[tokio::test]
async fn unpaid_order_cannot_be_delivered() {
    let h = harness();
    let order = placed_order(&h, dec!(20.00)).await;

    let err = h.orders.mark_delivered(order.order_id).await.unwrap_err();
    assert_eq!(err.code(), "conflict");
}

#[tokio::test]
async fn cancelled_order_cannot_be_delivered() {
    let h = harness();
    let order = placed_order(&h, dec!(20.00)).await;

    h.payments
        .apply_payment_outcome(outcome(order.order_id, "tx_bad", false))
        .await
        .unwrap();

    let err = h.orders.mark_delivered(order.order_id).await.unwrap_err();
    assert_eq!(err.code(), "conflict");
}
