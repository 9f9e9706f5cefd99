use serde::{Deserialize, Serialize};

use crate::error::{msg, AppError, Result};

/// Order lifecycle. Gateway reconciliation drives PENDING→PAID and
/// PENDING/PAID/PREPARING→CANCELLED; the remaining forward transitions are
/// operator-driven fulfillment steps. DELIVERED and CANCELLED are terminal
/// on the gateway path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Preparing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "PAID" => Some(OrderStatus::Paid),
            "PREPARING" => Some(OrderStatus::Preparing),
            "SHIPPED" => Some(OrderStatus::Shipped),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: String,
    /// Opaque member identifier from the storefront's auth provider.
    pub user_id: String,
    pub status: OrderStatus,
    /// Raw gateway status string, mirrored for display. Internal meaning
    /// lives in the typed enums; this is never parsed back.
    pub payment_status: Option<String>,
    pub subtotal: i64,
    pub shipping: i64,
    pub total: i64,
    pub currency: String,
    pub shipping_address_id: Option<String>,
    /// Gateway correlation id of the payment that last touched this order.
    pub gateway_reference: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// None means an individual-unit sale; Some points at a multi-unit pack.
    pub product_variant_id: Option<String>,
    pub quantity: i64,
    pub unit_price: i64,
    pub total: i64,
}

/// Order line joined with the variant multiplier, as the reconciliation
/// engine consumes it.
#[derive(Debug, Clone)]
pub struct OrderItemDetail {
    pub product_id: String,
    pub product_variant_id: Option<String>,
    pub quantity: i64,
    /// `units` from the referenced variant, None for individual-unit lines.
    pub variant_units: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutItem {
    pub product_id: String,
    #[serde(default)]
    pub product_variant_id: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub provider: String,
    pub user_id: String,
    pub email: String,
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub shipping_address_id: Option<String>,
}

impl CheckoutRequest {
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(AppError::BadRequest(msg::EMPTY_ORDER.into()));
        }
        if self.items.iter().any(|i| i.quantity <= 0) {
            return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatus {
    pub status: String,
}
