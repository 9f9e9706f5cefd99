use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::FlowConfig;
use crate::error::{msg, AppError, Result};
use crate::models::PaymentStatus;
use crate::util::shorten_reference;

use super::{GatewayError, GatewayReport};

type HmacSha256 = Hmac<Sha256>;

/// Flow caps merchant order references at 45 characters.
const COMMERCE_ORDER_MAX_LEN: usize = 45;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Flow reports an unknown payment token with this API error code.
const FLOW_ERR_PAYMENT_NOT_FOUND: i64 = 354;

#[derive(Debug, Deserialize)]
struct FlowCreateResponse {
    url: String,
    token: String,
    #[serde(rename = "flowOrder")]
    #[allow(dead_code)]
    flow_order: i64,
}

#[derive(Debug, Deserialize)]
struct FlowApiError {
    code: Option<i64>,
    message: Option<String>,
}

/// Checkout session created at Flow.
#[derive(Debug, Clone)]
pub struct FlowSession {
    /// Payment token; doubles as the webhook correlation id.
    pub token: String,
    pub redirect_url: String,
}

/// Parameters for a Flow payment-create call.
#[derive(Debug)]
pub struct CreateFlowPayment<'a> {
    /// Internal payment id; shortened to Flow's reference ceiling before
    /// submission.
    pub reference: &'a str,
    pub subject: &'a str,
    pub amount: i64,
    pub currency: &'a str,
    pub payer_email: &'a str,
    pub url_confirmation: &'a str,
    pub url_return: &'a str,
}

#[derive(Debug, Clone)]
pub struct FlowClient {
    client: Client,
    api_key: String,
    secret_key: String,
    api_url: String,
}

impl FlowClient {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            api_url: config.api_url.clone(),
        }
    }

    /// Sign a parameter set the Flow way: sort lexicographically by key,
    /// concatenate `key` + `value` pairs with no separator, HMAC-SHA256 with
    /// the shared secret, hex-encode. The same canonicalization serves
    /// outbound signing and inbound reconstruction.
    pub fn sign(&self, params: &[(&str, &str)]) -> Result<String> {
        let mut sorted: Vec<(&str, &str)> = params.to_vec();
        sorted.sort_by_key(|&(k, _)| k);

        let mut payload = String::new();
        for (key, value) in sorted {
            payload.push_str(key);
            payload.push_str(value);
        }

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a confirmation callback. Flow signs only the payment token:
    /// the expected signature is `HMAC-SHA256(secret, token)` in hex.
    pub fn verify_webhook_token(&self, token: &str, signature: &str) -> Result<bool> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(token.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison to prevent timing attacks. Length is not
        // secret (always 64 hex chars for SHA-256), so the length check can
        // short-circuit.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = signature.as_bytes();
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    /// Create a payment order at Flow. Returns the token (which later
    /// confirmation callbacks carry) and the customer redirect URL.
    pub async fn create_payment(
        &self,
        input: &CreateFlowPayment<'_>,
    ) -> std::result::Result<FlowSession, GatewayError> {
        let commerce_order = shorten_reference(input.reference, COMMERCE_ORDER_MAX_LEN);
        let amount = input.amount.to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("apiKey", &self.api_key),
            ("commerceOrder", &commerce_order),
            ("subject", input.subject),
            ("currency", input.currency),
            ("amount", &amount),
            ("email", input.payer_email),
            ("urlConfirmation", input.url_confirmation),
            ("urlReturn", input.url_return),
        ];
        let signature = self
            .sign(&params)
            .map_err(|e| GatewayError::Rejected(e.to_string()))?;
        params.push(("s", &signature));

        let response = self
            .client
            .post(format!("{}/payment/create", self.api_url))
            .timeout(REQUEST_TIMEOUT)
            .form(&params)
            .send()
            .await
            .map_err(GatewayError::from_request_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Transient(format!("Flow returned {}", status)));
        }
        if !status.is_success() {
            let error: FlowApiError = response.json().await.unwrap_or(FlowApiError {
                code: None,
                message: None,
            });
            return Err(GatewayError::Rejected(
                error.message.unwrap_or_else(|| format!("Flow returned {}", status)),
            ));
        }

        let created: FlowCreateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("Invalid Flow response: {}", e)))?;

        Ok(FlowSession {
            redirect_url: format!("{}?token={}", created.url, created.token),
            token: created.token,
        })
    }

    /// Fetch the authoritative payment status for a token.
    pub async fn get_status(
        &self,
        token: &str,
    ) -> std::result::Result<GatewayReport, GatewayError> {
        let params: Vec<(&str, &str)> = vec![("apiKey", &self.api_key), ("token", token)];
        let signature = self
            .sign(&params)
            .map_err(|e| GatewayError::Rejected(e.to_string()))?;

        let response = self
            .client
            .get(format!("{}/payment/getStatus", self.api_url))
            .timeout(REQUEST_TIMEOUT)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("token", token),
                ("s", signature.as_str()),
            ])
            .send()
            .await
            .map_err(GatewayError::from_request_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Transient(format!("Flow returned {}", status)));
        }
        if !status.is_success() {
            let error: FlowApiError = response.json().await.unwrap_or(FlowApiError {
                code: None,
                message: None,
            });
            if error.code == Some(FLOW_ERR_PAYMENT_NOT_FOUND) {
                return Err(GatewayError::NotFound);
            }
            return Err(GatewayError::Rejected(
                error.message.unwrap_or_else(|| format!("Flow returned {}", status)),
            ));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("Invalid Flow response: {}", e)))?;

        let code = raw
            .get("status")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| GatewayError::Rejected("Flow status payload missing status".into()))?;

        // Flow serializes amounts as strings.
        let amount = raw.get("amount").and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64().map(|f| f.round() as i64),
            serde_json::Value::String(s) => s.parse::<f64>().ok().map(|f| f.round() as i64),
            _ => None,
        });

        Ok(GatewayReport {
            correlation_id: token.to_string(),
            payment_reference: raw
                .get("commerceOrder")
                .and_then(|v| v.as_str())
                .map(String::from),
            status_raw: code.to_string(),
            status: PaymentStatus::from_flow_code(code),
            status_detail: None,
            amount,
            currency: raw.get("currency").and_then(|v| v.as_str()).map(String::from),
            payment_method: raw
                .pointer("/paymentData/media")
                .and_then(|v| v.as_str())
                .map(String::from),
            raw,
        })
    }
}
