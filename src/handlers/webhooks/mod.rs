pub mod common;
pub mod flow;
pub mod mercadopago;

pub use flow::handle_flow_webhook;
pub use mercadopago::handle_mercadopago_webhook;

use axum::{
    routing::{get, post},
    Router,
};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/webhooks/mercadopago",
            get(handle_mercadopago_webhook).post(handle_mercadopago_webhook),
        )
        .route("/webhooks/flow", post(handle_flow_webhook))
}
