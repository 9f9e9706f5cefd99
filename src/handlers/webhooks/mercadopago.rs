use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use std::collections::HashMap;

use crate::db::AppState;
use crate::error::Result;
use crate::payments::{GatewayError, GatewayReport, MercadoPagoClient};

use super::common::{process_webhook, WebhookGateway, WebhookRequest};

/// Mercado Pago notifications: JSON POST with `x-signature`/`x-request-id`
/// headers and the payment id in the `data.id` query parameter, plus a
/// legacy GET ping that carries `id` in the query string.
pub struct MercadoPagoWebhookGateway {
    client: MercadoPagoClient,
}

impl MercadoPagoWebhookGateway {
    pub fn new(client: MercadoPagoClient) -> Self {
        Self { client }
    }

    fn data_id(req: &WebhookRequest) -> Option<String> {
        req.query
            .get("data.id")
            .or_else(|| req.query.get("id"))
            .cloned()
            .or_else(|| {
                // Fall back to the JSON body for callers that omit the
                // query parameter.
                serde_json::from_slice::<serde_json::Value>(&req.body)
                    .ok()?
                    .pointer("/data/id")
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
            })
    }
}

#[async_trait]
impl WebhookGateway for MercadoPagoWebhookGateway {
    fn gateway_name(&self) -> &'static str {
        "mercadopago"
    }

    fn verify(&self, req: &WebhookRequest) -> Result<bool> {
        // The signed manifest is built from the query's data.id; a call
        // without it cannot be authenticated.
        let Some(data_id) = Self::data_id(req) else {
            return Ok(false);
        };
        self.client.verify_webhook_signature(&req.headers, &data_id)
    }

    fn correlation_id(&self, req: &WebhookRequest) -> Option<String> {
        Self::data_id(req)
    }

    async fn fetch_status(
        &self,
        correlation_id: &str,
    ) -> std::result::Result<GatewayReport, GatewayError> {
        self.client.get_payment(correlation_id).await
    }
}

/// Axum handler for Mercado Pago notifications (POST and legacy GET ping).
pub async fn handle_mercadopago_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let gateway = MercadoPagoWebhookGateway::new(MercadoPagoClient::new(&state.mercadopago));
    let req = WebhookRequest::new(headers, query, body);
    process_webhook(&gateway, &state, &req).await
}
