//! Gateway-agnostic webhook reconciliation.
//!
//! Both gateways funnel through [`process_webhook`]: verify the caller,
//! extract the correlation id, fetch the authoritative status from the
//! gateway, then apply the transition to the internal payment/order/stock
//! records in a single database transaction. The webhook payload itself is
//! treated as a poke; the status fetch is the source of truth.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    Json,
};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::{OrderStatus, PaymentStatus};
use crate::payments::{GatewayError, GatewayReport};
use crate::stock;
use crate::util::{retry_with_backoff, RetryPolicy};

/// Normalized inbound webhook call: headers plus whatever parameter encodings
/// the gateway uses (query string, form body, raw body).
pub struct WebhookRequest {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub form: HashMap<String, String>,
    pub body: Bytes,
}

impl WebhookRequest {
    pub fn new(headers: HeaderMap, query: HashMap<String, String>, body: Bytes) -> Self {
        // Flow posts form-encoded; parsing eagerly keeps the trait impls pure.
        let form = serde_urlencoded::from_bytes(&body).unwrap_or_default();
        Self {
            headers,
            query,
            form,
            body,
        }
    }
}

/// JSON ack returned to the gateway.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
}

pub type WebhookResponse = (StatusCode, Json<WebhookAck>);

fn ack(status: StatusCode, message: impl Into<String>) -> WebhookResponse {
    (
        status,
        Json(WebhookAck {
            message: message.into(),
            payment_status: None,
            order_status: None,
        }),
    )
}

/// Gateway-specific half of webhook handling: authenticity, correlation id
/// extraction, and the authoritative status fetch.
#[async_trait]
pub trait WebhookGateway: Send + Sync {
    /// Provider name as stored on payment rows ("mercadopago", "flow").
    fn gateway_name(&self) -> &'static str;

    /// Prove the call originates from the gateway. Pure check, no side
    /// effects. `Ok(false)` means a well-formed but wrong signature; `Err`
    /// means required signature material is missing or malformed.
    fn verify(&self, req: &WebhookRequest) -> Result<bool>;

    /// Gateway correlation id (token or payment id) from the notification.
    fn correlation_id(&self, req: &WebhookRequest) -> Option<String>;

    /// Fetch the authoritative payment state for a correlation id.
    async fn fetch_status(
        &self,
        correlation_id: &str,
    ) -> std::result::Result<GatewayReport, GatewayError>;
}

/// What a reconciliation pass did.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// No matching internal payment; nothing was touched.
    Ignored,
    Applied {
        payment_status: PaymentStatus,
        order_status: OrderStatus,
        /// True when this pass moved stock (decrement on approval, restore
        /// on reversal).
        stock_adjusted: bool,
    },
}

/// Process one webhook delivery end to end.
pub async fn process_webhook<G: WebhookGateway>(
    gateway: &G,
    state: &AppState,
    req: &WebhookRequest,
) -> WebhookResponse {
    // 1. Authenticity. Nothing runs on failure: no gateway call, no write.
    match gateway.verify(req) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("{} webhook rejected: invalid signature", gateway.gateway_name());
            return ack(StatusCode::UNAUTHORIZED, "invalid signature");
        }
        Err(e) => {
            tracing::warn!("{} webhook rejected: {}", gateway.gateway_name(), e);
            return ack(StatusCode::BAD_REQUEST, "missing or malformed signature");
        }
    }

    // 2. Correlation id.
    let Some(correlation_id) = gateway.correlation_id(req) else {
        return ack(StatusCode::BAD_REQUEST, "missing correlation id");
    };

    // 3. Authoritative status, with bounded retry on transient failures. A
    //    gateway-side "does not exist" is acked as ignored so stale or test
    //    callbacks don't turn into retry storms.
    let report = match retry_with_backoff(&RetryPolicy::default(), GatewayError::is_transient, || {
        gateway.fetch_status(&correlation_id)
    })
    .await
    {
        Ok(report) => report,
        Err(GatewayError::NotFound) => {
            tracing::info!(
                "{} webhook ignored: {} unknown at gateway",
                gateway.gateway_name(),
                correlation_id
            );
            return ack(StatusCode::OK, "ignored: unknown at gateway");
        }
        Err(e) => {
            tracing::error!(
                "{} status fetch failed for {}: {}",
                gateway.gateway_name(),
                correlation_id,
                e
            );
            return ack(StatusCode::BAD_GATEWAY, "gateway status fetch failed");
        }
    };

    // 4-8. Transactional apply.
    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return ack(StatusCode::INTERNAL_SERVER_ERROR, "database error");
        }
    };

    match apply_report(&mut conn, gateway.gateway_name(), &correlation_id, &report) {
        Ok(ReconcileOutcome::Ignored) => {
            tracing::info!(
                "{} webhook ignored: no payment for correlation id {}",
                gateway.gateway_name(),
                correlation_id
            );
            ack(StatusCode::OK, "ignored: unknown payment")
        }
        Ok(ReconcileOutcome::Applied {
            payment_status,
            order_status,
            stock_adjusted,
        }) => {
            tracing::info!(
                "{} webhook applied: correlation={}, payment={}, order={}, stock_adjusted={}",
                gateway.gateway_name(),
                correlation_id,
                payment_status.as_str(),
                order_status.as_str(),
                stock_adjusted
            );
            (
                StatusCode::OK,
                Json(WebhookAck {
                    message: "ok".into(),
                    payment_status: Some(payment_status),
                    order_status: Some(order_status),
                }),
            )
        }
        Err(e) => {
            // 5xx so the gateway's retry policy redelivers; the transaction
            // rolled back, so no partial state is observable.
            tracing::error!(
                "{} reconciliation failed for {}: {}",
                gateway.gateway_name(),
                correlation_id,
                e
            );
            ack(StatusCode::INTERNAL_SERVER_ERROR, "reconciliation failed")
        }
    }
}

/// Apply an authoritative gateway report to the matching payment and order.
///
/// Everything happens in one transaction: the conditional order-status
/// updates are the concurrency boundary, so two concurrent deliveries of the
/// same approval cannot both pass the stock gate.
pub fn apply_report(
    conn: &mut Connection,
    provider: &str,
    correlation_id: &str,
    report: &GatewayReport,
) -> Result<ReconcileOutcome> {
    let tx = conn.transaction()?;

    // Match the payment by correlation id, falling back to the internal
    // reference the gateway echoes back (binds the correlation id on the
    // first notification for gateways that assign payment ids late).
    let payment = match queries::get_payment_by_correlation(&tx, provider, correlation_id)? {
        Some(p) => p,
        None => {
            let by_reference = report
                .payment_reference
                .as_deref()
                .map(|reference| queries::get_payment(&tx, reference))
                .transpose()?
                .flatten();
            match by_reference {
                Some(p) if p.provider == provider => {
                    queries::bind_payment_correlation(&tx, &p.id, correlation_id)?;
                    p
                }
                _ => return Ok(ReconcileOutcome::Ignored),
            }
        }
    };

    let order = queries::get_order(&tx, &payment.order_id)?.ok_or_else(|| {
        crate::error::AppError::Internal(format!(
            "payment {} references missing order {}",
            payment.id, payment.order_id
        ))
    })?;
    let items = queries::get_order_items_detail(&tx, &order.id)?;

    // Terminal payment statuses are only ever refined, never reverted to
    // PENDING by a late or out-of-order notification.
    let new_status = if payment.status.is_terminal() && report.status == PaymentStatus::Pending {
        payment.status
    } else {
        report.status
    };

    let mut order_status = order.status;
    let mut stock_adjusted = false;

    match new_status.order_status() {
        OrderStatus::Paid => {
            // Stock moves iff this delivery performs the PENDING→PAID
            // transition. Duplicate approvals find the order already PAID
            // and fall through as a no-op.
            if queries::try_transition_pending_to_paid(&tx, &order.id)? {
                for item in &items {
                    queries::decrement_stock(&tx, &item.product_id, stock::units_for_item(item))?;
                }
                order_status = OrderStatus::Paid;
                stock_adjusted = true;
            }
        }
        OrderStatus::Cancelled => {
            let reversal = matches!(
                new_status,
                PaymentStatus::Refunded | PaymentStatus::ChargedBack
            );
            if reversal && queries::try_transition_to_cancelled_after_stock_commit(&tx, &order.id)? {
                // The order had consumed stock; give back exactly what the
                // approval took.
                for item in &items {
                    queries::restore_stock(&tx, &item.product_id, stock::units_for_item(item))?;
                }
                order_status = OrderStatus::Cancelled;
                stock_adjusted = true;
            } else if queries::try_transition_pending_to_cancelled(&tx, &order.id)? {
                order_status = OrderStatus::Cancelled;
            }
            // Otherwise the order is DELIVERED or already CANCELLED: the
            // payment record still gets refined below, the order stays put.
        }
        // Pending family: leave the order where it is.
        _ => {}
    }

    queries::update_payment_from_gateway(
        &tx,
        &payment.id,
        new_status,
        report.status_detail.as_deref(),
        report.payment_method.as_deref(),
        &report.raw.to_string(),
    )?;
    queries::set_order_payment_mirror(&tx, &order.id, &report.status_raw, correlation_id)?;

    tx.commit()?;

    Ok(ReconcileOutcome::Applied {
        payment_status: new_status,
        order_status,
        stock_adjusted,
    })
}
