use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// Internal payment vocabulary, the union of what both gateways can report.
///
/// APPROVED, REJECTED, CANCELLED, REFUNDED and CHARGED_BACK are terminal: a
/// payment that reached one of them is only ever refined with more detail,
/// never reverted to PENDING for the same correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Authorized,
    InProcess,
    InMediation,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::InProcess => "IN_PROCESS",
            PaymentStatus::InMediation => "IN_MEDIATION",
            PaymentStatus::Rejected => "REJECTED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::ChargedBack => "CHARGED_BACK",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "APPROVED" => Some(PaymentStatus::Approved),
            "AUTHORIZED" => Some(PaymentStatus::Authorized),
            "IN_PROCESS" => Some(PaymentStatus::InProcess),
            "IN_MEDIATION" => Some(PaymentStatus::InMediation),
            "REJECTED" => Some(PaymentStatus::Rejected),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            "CHARGED_BACK" => Some(PaymentStatus::ChargedBack),
            _ => None,
        }
    }

    /// Map a Flow status code. Unrecognized codes degrade to PENDING with a
    /// warning instead of dropping the notification.
    pub fn from_flow_code(code: i64) -> Self {
        match code {
            1 => PaymentStatus::Pending,
            2 => PaymentStatus::Approved,
            3 => PaymentStatus::Rejected,
            4 => PaymentStatus::Cancelled,
            other => {
                tracing::warn!("Unrecognized Flow status code {}, treating as PENDING", other);
                PaymentStatus::Pending
            }
        }
    }

    /// Map a Mercado Pago status string. Unknown values degrade to PENDING.
    pub fn from_mercadopago(status: &str) -> Self {
        match status {
            "approved" => PaymentStatus::Approved,
            "authorized" => PaymentStatus::Authorized,
            "in_process" => PaymentStatus::InProcess,
            "in_mediation" => PaymentStatus::InMediation,
            "rejected" => PaymentStatus::Rejected,
            "cancelled" => PaymentStatus::Cancelled,
            "refunded" => PaymentStatus::Refunded,
            "charged_back" => PaymentStatus::ChargedBack,
            other => {
                tracing::warn!("Unrecognized Mercado Pago status '{}', treating as PENDING", other);
                PaymentStatus::Pending
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved
                | PaymentStatus::Rejected
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
                | PaymentStatus::ChargedBack
        )
    }

    /// Order status this payment status drives. Total: the pending family
    /// maps to PENDING, which the reconciliation engine treats as "leave the
    /// order where it is".
    pub fn order_status(&self) -> OrderStatus {
        match self {
            PaymentStatus::Approved | PaymentStatus::Authorized => OrderStatus::Paid,
            PaymentStatus::Rejected
            | PaymentStatus::Cancelled
            | PaymentStatus::Refunded
            | PaymentStatus::ChargedBack => OrderStatus::Cancelled,
            PaymentStatus::Pending | PaymentStatus::InProcess | PaymentStatus::InMediation => {
                OrderStatus::Pending
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub provider: String,
    /// Gateway id a webhook is matched on: the Flow token, or the Mercado
    /// Pago payment id once the first notification binds it.
    pub correlation_id: Option<String>,
    /// Checkout session handle returned at creation (Flow token, Mercado
    /// Pago preference id).
    pub session_token: Option<String>,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub payment_method: Option<String>,
    /// Last raw gateway payload, retained for audit and debugging.
    #[serde(skip_serializing)]
    pub raw_response: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug)]
pub struct CreatePayment {
    pub order_id: String,
    pub provider: String,
    pub amount: i64,
    pub currency: String,
}
