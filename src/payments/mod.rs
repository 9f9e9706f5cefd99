mod flow;
mod mercadopago;

pub use flow::*;
pub use mercadopago::*;

use thiserror::Error;

use crate::models::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentProvider {
    MercadoPago,
    Flow,
}

impl PaymentProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mercadopago" | "mp" => Some(PaymentProvider::MercadoPago),
            "flow" => Some(PaymentProvider::Flow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::MercadoPago => "mercadopago",
            PaymentProvider::Flow => "flow",
        }
    }
}

/// Failure modes of outbound gateway calls. The reconciliation engine treats
/// these differently: `NotFound` acks the webhook as ignorable, `Transient`
/// surfaces a 5xx so the gateway redelivers, `Rejected` is a hard error on
/// the request we built.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("resource not found at gateway")]
    NotFound,

    #[error("gateway rejected request: {0}")]
    Rejected(String),

    #[error("transient gateway failure: {0}")]
    Transient(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    /// Classify an outbound HTTP failure: timeouts and connection errors are
    /// retryable, anything else is not.
    pub fn from_request_error(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            GatewayError::Transient(e.to_string())
        } else {
            GatewayError::Rejected(e.to_string())
        }
    }
}

/// Authoritative payment state fetched from a gateway, normalized for the
/// reconciliation engine. The webhook itself is only a poke; this is the
/// source of truth.
#[derive(Debug, Clone)]
pub struct GatewayReport {
    /// Gateway id the internal payment row is matched on.
    pub correlation_id: String,
    /// Our own payment id as echoed back by the gateway (Flow commerceOrder,
    /// Mercado Pago external_reference). Used to bind a correlation id the
    /// first time the gateway reports it.
    pub payment_reference: Option<String>,
    /// Gateway-native status, verbatim, for the display mirror.
    pub status_raw: String,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    /// Amount in the smallest currency unit, when the gateway reports one.
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    /// Full gateway payload, retained on the payment row for audit.
    pub raw: serde_json::Value,
}
