use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};
use std::collections::HashMap;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::payments::{FlowClient, GatewayError, GatewayReport};

use super::common::{process_webhook, WebhookGateway, WebhookRequest};

/// Flow confirmation callbacks: form-encoded POST carrying the payment
/// `token` and its signature `s`.
pub struct FlowWebhookGateway {
    client: FlowClient,
}

impl FlowWebhookGateway {
    pub fn new(client: FlowClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookGateway for FlowWebhookGateway {
    fn gateway_name(&self) -> &'static str {
        "flow"
    }

    fn verify(&self, req: &WebhookRequest) -> Result<bool> {
        let token = req
            .form
            .get("token")
            .ok_or_else(|| AppError::BadRequest("Missing token".into()))?;
        let Some(signature) = req.form.get("s") else {
            return Ok(false);
        };
        self.client.verify_webhook_token(token, signature)
    }

    fn correlation_id(&self, req: &WebhookRequest) -> Option<String> {
        req.form.get("token").cloned()
    }

    async fn fetch_status(
        &self,
        correlation_id: &str,
    ) -> std::result::Result<GatewayReport, GatewayError> {
        self.client.get_status(correlation_id).await
    }
}

/// Axum handler for Flow confirmation callbacks.
pub async fn handle_flow_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let gateway = FlowWebhookGateway::new(FlowClient::new(&state.flow));
    let req = WebhookRequest::new(headers, HashMap::new(), body);
    process_webhook(&gateway, &state, &req).await
}
