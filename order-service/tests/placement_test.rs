//! Order placement integration tests.

mod common;

use common::{harness, seed_menu_item, seed_unavailable_item, seed_user};
use order_service::models::{OrderStatus, PaymentStatus};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn checkout_snapshots_cart_into_order_and_empties_cart() {
    let h = harness();
    let user = seed_user(&h.store, true).await;
    let pizza = seed_menu_item(&h.store, dec!(12.50)).await;
    let soda = seed_menu_item(&h.store, dec!(2.75)).await;

    h.orders
        .add_to_cart(user.user_id, pizza.menu_item_id, 2)
        .await
        .unwrap();
    h.orders
        .add_to_cart(user.user_id, soda.menu_item_id, 3)
        .await
        .unwrap();

    let order = h.orders.place_order_from_cart(user.user_id).await.unwrap();

    assert_eq!(order.order_status, OrderStatus::Initialized);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.total_amount, dec!(33.25));
    assert_eq!(order.items.len(), 2);

    // Cart survives as an empty row.
    let cart = h.orders.get_cart(user.user_id).await.unwrap();
    assert!(cart.is_empty());

    // Exactly one confirmation email, carrying the payment link.
    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].subject,
        format!("Order Confirmation - Order ID: {}", order.order_id)
    );
    assert!(sent[0]
        .body
        .contains(&format!("orderId={}&amount={}", order.order_id, order.total_amount)));
}

#[tokio::test]
async fn checkout_with_empty_cart_creates_nothing() {
    let h = harness();
    let user = seed_user(&h.store, true).await;
    let pizza = seed_menu_item(&h.store, dec!(9.00)).await;

    // Place once to leave an empty cart behind.
    h.orders
        .add_to_cart(user.user_id, pizza.menu_item_id, 1)
        .await
        .unwrap();
    h.orders.place_order_from_cart(user.user_id).await.unwrap();

    let err = h.orders.place_order_from_cart(user.user_id).await.unwrap_err();
    assert_eq!(err.code(), "bad_request");

    // Only the first order exists, only one email went out.
    let orders = h.orders.list_orders_for_user(user.user_id).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(h.sink.count(), 1);
}

#[tokio::test]
async fn checkout_without_cart_is_not_found() {
    let h = harness();
    let user = seed_user(&h.store, true).await;

    let err = h.orders.place_order_from_cart(user.user_id).await.unwrap_err();
    assert_eq!(err.code(), "not_found");
    assert_eq!(h.sink.count(), 0);
}

#[tokio::test]
async fn checkout_requires_delivery_address() {
    let h = harness();
    let user = seed_user(&h.store, false).await;
    let pizza = seed_menu_item(&h.store, dec!(9.00)).await;

    h.orders
        .add_to_cart(user.user_id, pizza.menu_item_id, 1)
        .await
        .unwrap();

    let err = h.orders.place_order_from_cart(user.user_id).await.unwrap_err();
    assert_eq!(err.code(), "bad_request");

    // Precondition failure leaves the cart intact.
    let cart = h.orders.get_cart(user.user_id).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(h.sink.count(), 0);
}

#[tokio::test]
async fn checkout_for_unknown_user_is_not_found() {
    let h = harness();

    let err = h
        .orders
        .place_order_from_cart(Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn concurrent_checkouts_produce_exactly_one_order() {
    let h = harness();
    let user = seed_user(&h.store, true).await;
    let pizza = seed_menu_item(&h.store, dec!(15.00)).await;

    h.orders
        .add_to_cart(user.user_id, pizza.menu_item_id, 2)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.orders.place_order_from_cart(user.user_id),
        h.orders.place_order_from_cart(user.user_id),
    );

    // One wins, one observes an already-emptied cart.
    assert_eq!(
        a.is_ok() as usize + b.is_ok() as usize,
        1,
        "exactly one checkout should win"
    );

    let orders = h.orders.list_orders_for_user(user.user_id).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].total_amount, dec!(30.00));
    assert_eq!(h.sink.count(), 1);
}

#[tokio::test]
async fn unavailable_items_cannot_be_added() {
    let h = harness();
    let user = seed_user(&h.store, true).await;
    let item = seed_unavailable_item(&h.store, dec!(5.00)).await;

    let err = h
        .orders
        .add_to_cart(user.user_id, item.menu_item_id, 1)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "bad_request");
}

#[tokio::test]
async fn cart_snapshots_catalog_price_at_add_time() {
    let h = harness();
    let user = seed_user(&h.store, true).await;
    let pizza = seed_menu_item(&h.store, dec!(10.00)).await;

    h.orders
        .add_to_cart(user.user_id, pizza.menu_item_id, 1)
        .await
        .unwrap();

    // A later catalog price change does not retouch the cart line.
    h.store
        .put_menu_item(order_service::models::MenuItem {
            price: dec!(99.00),
            ..pizza
        })
        .await;

    let order = h.orders.place_order_from_cart(user.user_id).await.unwrap();
    assert_eq!(order.total_amount, dec!(10.00));
}
