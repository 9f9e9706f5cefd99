use std::time::Duration;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::MercadoPagoConfig;
use crate::error::{msg, AppError, Result};
use crate::models::PaymentStatus;

use super::{GatewayError, GatewayReport};

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct PreferenceRequest<'a> {
    items: &'a [PreferenceItem],
    payer: PreferencePayer<'a>,
    external_reference: &'a str,
    notification_url: &'a str,
    back_urls: PreferenceBackUrls<'a>,
    auto_return: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PreferenceItem {
    pub title: String,
    pub quantity: i64,
    /// Amount per unit in currency units. CLP carries no minor unit, so this
    /// matches the stored integer amounts directly.
    pub unit_price: f64,
    pub currency_id: String,
}

#[derive(Debug, Serialize)]
struct PreferencePayer<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PreferenceBackUrls<'a> {
    success: &'a str,
    failure: &'a str,
    pending: &'a str,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
}

/// Checkout session created at Mercado Pago.
#[derive(Debug, Clone)]
pub struct MercadoPagoSession {
    pub preference_id: String,
    pub redirect_url: String,
}

/// Parameters for a preference-create call.
#[derive(Debug)]
pub struct CreatePreference<'a> {
    /// Internal payment id, echoed back as `external_reference` on the
    /// payment resource so webhooks can be matched before the payment id is
    /// known locally.
    pub reference: &'a str,
    pub payer_email: &'a str,
    pub items: Vec<PreferenceItem>,
    pub notification_url: &'a str,
    pub success_url: &'a str,
    pub failure_url: &'a str,
    pub pending_url: &'a str,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    access_token: String,
    webhook_secret: String,
    api_url: String,
}

impl MercadoPagoClient {
    pub fn new(config: &MercadoPagoConfig) -> Self {
        Self {
            client: Client::new(),
            access_token: config.access_token.clone(),
            webhook_secret: config.webhook_secret.clone(),
            api_url: config.api_url.clone(),
        }
    }

    /// Verify the `x-signature` header of a webhook call.
    ///
    /// The header carries `ts=<timestamp>,v1=<hex-hmac>`. The signed manifest
    /// is `id:<data.id lowercased>;request-id:<x-request-id>;ts:<ts>;` with
    /// the request-id segment omitted when the header is absent. Fails closed
    /// on any missing part.
    pub fn verify_webhook_signature(&self, headers: &HeaderMap, data_id: &str) -> Result<bool> {
        let signature = headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        let mut timestamp = None;
        let mut sig_v1 = None;
        for part in signature.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("ts=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        let request_id = headers.get("x-request-id").and_then(|v| v.to_str().ok());

        let manifest = match request_id {
            Some(rid) => format!(
                "id:{};request-id:{};ts:{};",
                data_id.to_lowercase(),
                rid,
                timestamp
            ),
            None => format!("id:{};ts:{};", data_id.to_lowercase(), timestamp),
        };

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(manifest.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison to prevent timing attacks.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    /// Create a checkout preference. Returns the preference id and the
    /// customer redirect URL.
    pub async fn create_preference(
        &self,
        input: &CreatePreference<'_>,
    ) -> std::result::Result<MercadoPagoSession, GatewayError> {
        let request = PreferenceRequest {
            items: &input.items,
            payer: PreferencePayer {
                email: input.payer_email,
            },
            external_reference: input.reference,
            notification_url: input.notification_url,
            back_urls: PreferenceBackUrls {
                success: input.success_url,
                failure: input.failure_url,
                pending: input.pending_url,
            },
            auto_return: "approved",
        };

        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.api_url))
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(GatewayError::from_request_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Transient(format!(
                "Mercado Pago returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!(
                "Mercado Pago returned {}: {}",
                status, body
            )));
        }

        let preference: PreferenceResponse = response.json().await.map_err(|e| {
            GatewayError::Rejected(format!("Invalid Mercado Pago response: {}", e))
        })?;

        Ok(MercadoPagoSession {
            preference_id: preference.id,
            redirect_url: preference.init_point,
        })
    }

    /// Fetch the authoritative payment resource for a payment id.
    pub async fn get_payment(
        &self,
        payment_id: &str,
    ) -> std::result::Result<GatewayReport, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{}", self.api_url, payment_id))
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(GatewayError::from_request_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }
        if status.is_server_error() {
            return Err(GatewayError::Transient(format!(
                "Mercado Pago returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!(
                "Mercado Pago returned {}: {}",
                status, body
            )));
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::Rejected(format!("Invalid Mercado Pago response: {}", e))
        })?;

        let status_raw = raw
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                GatewayError::Rejected("Mercado Pago payment missing status".into())
            })?
            .to_string();

        Ok(GatewayReport {
            correlation_id: payment_id.to_string(),
            payment_reference: raw
                .get("external_reference")
                .and_then(|v| v.as_str())
                .map(String::from),
            status: PaymentStatus::from_mercadopago(&status_raw),
            status_detail: raw
                .get("status_detail")
                .and_then(|v| v.as_str())
                .map(String::from),
            amount: raw
                .get("transaction_amount")
                .and_then(|v| v.as_f64())
                .map(|f| f.round() as i64),
            currency: raw
                .get("currency_id")
                .and_then(|v| v.as_str())
                .map(String::from),
            payment_method: raw
                .get("payment_method_id")
                .and_then(|v| v.as_str())
                .map(String::from),
            status_raw,
            raw,
        })
    }
}
