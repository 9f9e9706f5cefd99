//! Checkout: price the cart, create order + payment rows, open a gateway
//! session, hand the redirect URL back to the storefront.

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{msg, AppError, Result};
use crate::models::{CheckoutRequest, CreatePayment};
use crate::payments::{
    CreateFlowPayment, CreatePreference, FlowClient, MercadoPagoClient, PaymentProvider,
    PreferenceItem,
};

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub payment_id: String,
    /// Gateway session handle (Flow token / Mercado Pago preference id).
    pub session_token: String,
    /// Where to send the customer to complete payment.
    pub redirect_url: String,
}

struct PricedLine<'a> {
    item: &'a crate::models::CheckoutItem,
    unit_price: i64,
    title: String,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    req.validate()?;
    let provider = PaymentProvider::from_str(&req.provider)
        .ok_or_else(|| AppError::BadRequest(msg::UNKNOWN_PROVIDER.into()))?;

    // The pooled SQLite connection is not Send, so it must not be held across
    // the gateway await below. Scope all synchronous DB work here; the
    // connection is released at the end of this block. A fresh connection is
    // taken from the pool afterward to persist the gateway session handle.
    let (lines, order, payment) = {
        let mut conn = state.db.get()?;

        // Price the lines from the catalog; the client never supplies amounts.
        let mut lines = Vec::with_capacity(req.items.len());
        for item in &req.items {
            let product = queries::get_product(&conn, &item.product_id)?
                .ok_or_else(|| AppError::NotFound(format!("Product {}", item.product_id)))?;
            let (unit_price, title) = match &item.product_variant_id {
                Some(variant_id) => {
                    let variant = queries::get_variant(&conn, variant_id)?
                        .ok_or_else(|| AppError::NotFound(format!("Variant {}", variant_id)))?;
                    if variant.product_id != product.id {
                        return Err(AppError::BadRequest(format!(
                            "Variant {} does not belong to product {}",
                            variant_id, product.id
                        )));
                    }
                    (variant.price, format!("{} - {}", product.name, variant.name))
                }
                None => (product.price, product.name.clone()),
            };
            lines.push(PricedLine {
                item,
                unit_price,
                title,
            });
        }

        let subtotal: i64 = lines
            .iter()
            .map(|l| l.unit_price * l.item.quantity)
            .sum();

        // Order, items and the pending payment land together or not at all.
        let tx = conn.transaction()?;
        let order = queries::create_order_with_items(
            &tx,
            &queries::NewOrder {
                user_id: &req.user_id,
                subtotal,
                shipping: state.shipping_flat,
                currency: &state.currency,
                shipping_address_id: req.shipping_address_id.as_deref(),
            },
            &lines
                .iter()
                .map(|l| queries::NewOrderItem {
                    product_id: &l.item.product_id,
                    product_variant_id: l.item.product_variant_id.as_deref(),
                    quantity: l.item.quantity,
                    unit_price: l.unit_price,
                })
                .collect::<Vec<_>>(),
        )?;
        let payment = queries::create_payment(
            &tx,
            &CreatePayment {
                order_id: order.id.clone(),
                provider: provider.as_str().to_string(),
                amount: order.total,
                currency: order.currency.clone(),
            },
        )?;
        tx.commit()?;

        (lines, order, payment)
    };

    // Open the gateway session. On failure the order stays PENDING and the
    // storefront can retry checkout; nothing has moved yet.
    let (session_token, redirect_url) = match provider {
        PaymentProvider::Flow => {
            let client = FlowClient::new(&state.flow);
            let session = client
                .create_payment(&CreateFlowPayment {
                    reference: &payment.id,
                    subject: &format!("Order {}", order.id),
                    amount: order.total,
                    currency: &order.currency,
                    payer_email: &req.email,
                    url_confirmation: &format!("{}/webhooks/flow", state.base_url),
                    url_return: &format!("{}/checkout/return", state.store_url),
                })
                .await
                .map_err(|e| AppError::Gateway(e.to_string()))?;
            // The Flow token is the correlation id future webhooks carry.
            let conn = state.db.get()?;
            queries::set_payment_session(&conn, &payment.id, &session.token, Some(&session.token))?;
            (session.token, session.redirect_url)
        }
        PaymentProvider::MercadoPago => {
            let client = MercadoPagoClient::new(&state.mercadopago);
            let items = lines
                .iter()
                .map(|l| PreferenceItem {
                    title: l.title.clone(),
                    quantity: l.item.quantity,
                    unit_price: l.unit_price as f64,
                    currency_id: order.currency.clone(),
                })
                .collect();
            let session = client
                .create_preference(&CreatePreference {
                    reference: &payment.id,
                    payer_email: &req.email,
                    items,
                    notification_url: &format!("{}/webhooks/mercadopago", state.base_url),
                    success_url: &format!("{}/checkout/success", state.store_url),
                    failure_url: &format!("{}/checkout/failure", state.store_url),
                    pending_url: &format!("{}/checkout/pending", state.store_url),
                })
                .await
                .map_err(|e| AppError::Gateway(e.to_string()))?;
            // The payment id arrives with the first webhook; only the
            // preference id is known here.
            let conn = state.db.get()?;
            queries::set_payment_session(&conn, &payment.id, &session.preference_id, None)?;
            (session.preference_id, session.redirect_url)
        }
    };

    tracing::info!(
        "Checkout created: order={}, payment={}, provider={}, total={} {}",
        order.id,
        payment.id,
        provider.as_str(),
        order.total,
        order.currency
    );

    Ok(Json(CheckoutResponse {
        order_id: order.id,
        payment_id: payment.id,
        session_token,
        redirect_url,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/checkout", post(create_checkout))
}
