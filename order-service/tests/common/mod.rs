//! Common test utilities for order-service integration tests.
//!
//! Tests run against the in-memory store with recording collaborators, so
//! they need neither a database nor live SMTP/gateway endpoints.

use async_trait::async_trait;
use order_service::config::LinkConfig;
use order_service::models::{MenuItem, UserProfile};
use order_service::services::{
    MemoryStore, NotificationRequest, NotificationSink, OrderService, PaymentGateway,
    PaymentIntent, PaymentIntentRequest, PaymentService,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Once;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,order_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Notification sink that records every request instead of sending it.
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<NotificationRequest>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, note: NotificationRequest) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(note);
        Ok(())
    }
}

/// Gateway stub that always returns a fixed intent.
pub struct StaticGateway;

#[async_trait]
impl PaymentGateway for StaticGateway {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, AppError> {
        Ok(PaymentIntent {
            transaction_id: format!("pi_test_{}", request.order_id.simple()),
            client_secret: "pi_test_secret".to_string(),
        })
    }
}

/// Gateway stub that always fails with a retryable gateway error.
pub struct FailingGateway;

#[async_trait]
impl PaymentGateway for FailingGateway {
    async fn create_payment_intent(
        &self,
        _request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, AppError> {
        Err(AppError::Gateway("gateway unavailable".to_string()))
    }
}

/// Fully wired services over one shared in-memory store.
pub struct TestHarness {
    pub store: MemoryStore,
    pub sink: RecordingSink,
    pub orders: OrderService,
    pub payments: PaymentService,
}

pub fn harness() -> TestHarness {
    harness_with_gateway(Arc::new(StaticGateway))
}

pub fn harness_with_gateway(gateway: Arc<dyn PaymentGateway>) -> TestHarness {
    init_tracing();

    let store = MemoryStore::new();
    let sink = RecordingSink::new();

    let store_arc = Arc::new(store.clone());
    let sink_arc = Arc::new(sink.clone());

    let links = LinkConfig {
        payment_base_url: "http://localhost:3000/pay?orderId=".to_string(),
        frontend_base_url: "http://localhost:3000".to_string(),
    };

    let orders = OrderService::new(
        store_arc.clone(),
        store_arc.clone(),
        store_arc.clone(),
        sink_arc.clone(),
        links,
    );
    let payments = PaymentService::new(
        store_arc.clone(),
        store_arc,
        gateway,
        sink_arc,
        "eur".to_string(),
    );

    TestHarness {
        store,
        sink,
        orders,
        payments,
    }
}

/// Seed a user, optionally without a delivery address.
pub async fn seed_user(store: &MemoryStore, with_address: bool) -> UserProfile {
    let user = UserProfile {
        user_id: Uuid::new_v4(),
        name: "Ada Test".to_string(),
        email: "ada@example.com".to_string(),
        address: with_address.then(|| "1 Test Lane, Dublin".to_string()),
        created_utc: chrono::Utc::now(),
    };
    store.put_user(user.clone()).await;
    user
}

/// Seed an available menu item at the given price.
pub async fn seed_menu_item(store: &MemoryStore, price: Decimal) -> MenuItem {
    let item = MenuItem {
        menu_item_id: Uuid::new_v4(),
        name: "Margherita".to_string(),
        price,
        available: true,
    };
    store.put_menu_item(item.clone()).await;
    item
}

/// Seed an unavailable menu item.
pub async fn seed_unavailable_item(store: &MemoryStore, price: Decimal) -> MenuItem {
    let item = MenuItem {
        menu_item_id: Uuid::new_v4(),
        name: "SoldOut Special".to_string(),
        price,
        available: false,
    };
    store.put_menu_item(item.clone()).await;
    item
}
