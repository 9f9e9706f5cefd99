//! Test utilities and fixtures for tienda integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::HeaderMap;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use tienda::config::{FlowConfig, MercadoPagoConfig};
pub use tienda::db::{init_db, queries, AppState};
pub use tienda::handlers::webhooks::common::{
    apply_report, process_webhook, ReconcileOutcome, WebhookGateway, WebhookRequest,
};
pub use tienda::models::*;
pub use tienda::payments::{FlowClient, GatewayError, GatewayReport, MercadoPagoClient};

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

pub fn test_flow_config() -> FlowConfig {
    FlowConfig {
        api_key: "flow_test_key".to_string(),
        secret_key: "flow_test_secret".to_string(),
        api_url: "https://flow.invalid/api".to_string(),
    }
}

pub fn test_mercadopago_config() -> MercadoPagoConfig {
    MercadoPagoConfig {
        access_token: "TEST-access-token".to_string(),
        webhook_secret: "mp_test_secret".to_string(),
        api_url: "https://mercadopago.invalid".to_string(),
    }
}

/// Application state over a single-connection in-memory pool, so every
/// handler call observes the same database.
pub fn test_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to build test pool");
    {
        let conn = pool.get().expect("Failed to get test connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    AppState {
        db: pool,
        base_url: "http://localhost:3000".to_string(),
        store_url: "http://localhost:3000".to_string(),
        currency: "CLP".to_string(),
        shipping_flat: 0,
        admin_api_key: Some("test-admin-key".to_string()),
        mercadopago: test_mercadopago_config(),
        flow: test_flow_config(),
    }
}

pub fn create_test_product(conn: &Connection, name: &str, price: i64, stock: i64) -> Product {
    queries::create_product(
        conn,
        &CreateProduct {
            name: name.to_string(),
            price,
            currency: "CLP".to_string(),
            stock,
        },
    )
    .expect("Failed to create test product")
}

pub fn create_test_variant(
    conn: &Connection,
    product_id: &str,
    name: &str,
    units: i64,
    price: i64,
) -> ProductVariant {
    queries::create_variant(
        conn,
        &CreateVariant {
            product_id: product_id.to_string(),
            name: name.to_string(),
            units,
            price,
        },
    )
    .expect("Failed to create test variant")
}

/// Create a PENDING order with one line plus its payment row, correlated to
/// `provider` under `correlation_id` (as a completed checkout would leave it).
pub fn create_test_order(
    conn: &Connection,
    product: &Product,
    variant: Option<&ProductVariant>,
    quantity: i64,
    provider: &str,
    correlation_id: &str,
) -> (Order, Payment) {
    let unit_price = variant.map(|v| v.price).unwrap_or(product.price);
    let order = queries::create_order_with_items(
        conn,
        &queries::NewOrder {
            user_id: "user-1",
            subtotal: unit_price * quantity,
            shipping: 0,
            currency: "CLP",
            shipping_address_id: None,
        },
        &[queries::NewOrderItem {
            product_id: &product.id,
            product_variant_id: variant.map(|v| v.id.as_str()),
            quantity,
            unit_price,
        }],
    )
    .expect("Failed to create test order");

    let payment = queries::create_payment(
        conn,
        &CreatePayment {
            order_id: order.id.clone(),
            provider: provider.to_string(),
            amount: order.total,
            currency: order.currency.clone(),
        },
    )
    .expect("Failed to create test payment");
    queries::set_payment_session(conn, &payment.id, correlation_id, Some(correlation_id))
        .expect("Failed to set test payment session");

    let payment = queries::get_payment(conn, &payment.id)
        .expect("Failed to reload test payment")
        .expect("Test payment missing");
    (order, payment)
}

/// Gateway report as the engine would receive it after a status fetch.
pub fn make_report(correlation_id: &str, status: PaymentStatus, status_raw: &str) -> GatewayReport {
    GatewayReport {
        correlation_id: correlation_id.to_string(),
        payment_reference: None,
        status_raw: status_raw.to_string(),
        status,
        status_detail: None,
        amount: None,
        currency: Some("CLP".to_string()),
        payment_method: None,
        raw: serde_json::json!({ "status": status_raw }),
    }
}

pub fn product_stock(conn: &Connection, product_id: &str) -> i64 {
    queries::get_product(conn, product_id)
        .expect("Failed to load product")
        .expect("Product missing")
        .stock
}

/// Scriptable gateway double for engine-level tests. Counts status-fetch
/// calls so fail-closed behavior is assertable.
pub struct MockGateway {
    pub name: &'static str,
    pub verify_ok: bool,
    pub correlation: Option<String>,
    pub fetch: MockFetch,
    pub fetch_calls: AtomicUsize,
}

pub enum MockFetch {
    Report(GatewayReport),
    NotFound,
    Transient,
}

impl MockGateway {
    pub fn new(name: &'static str, correlation: &str, fetch: MockFetch) -> Self {
        Self {
            name,
            verify_ok: true,
            correlation: Some(correlation.to_string()),
            fetch,
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookGateway for MockGateway {
    fn gateway_name(&self) -> &'static str {
        self.name
    }

    fn verify(&self, _req: &WebhookRequest) -> tienda::error::Result<bool> {
        Ok(self.verify_ok)
    }

    fn correlation_id(&self, _req: &WebhookRequest) -> Option<String> {
        self.correlation.clone()
    }

    async fn fetch_status(
        &self,
        _correlation_id: &str,
    ) -> Result<GatewayReport, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match &self.fetch {
            MockFetch::Report(report) => Ok(report.clone()),
            MockFetch::NotFound => Err(GatewayError::NotFound),
            MockFetch::Transient => Err(GatewayError::Transient("mock outage".to_string())),
        }
    }
}

/// Empty webhook request for engine-level tests where the mock gateway
/// supplies verification and correlation itself.
pub fn empty_request() -> WebhookRequest {
    WebhookRequest::new(HeaderMap::new(), HashMap::new(), Bytes::new())
}
