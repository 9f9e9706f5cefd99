use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ row mapping ============

const ORDER_COLS: &str = "id, user_id, status, payment_status, subtotal, shipping, total, \
                          currency, shipping_address_id, gateway_reference, created_at, updated_at";

fn order_from_row(row: &Row) -> rusqlite::Result<Order> {
    let status: String = row.get(2)?;
    Ok(Order {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: OrderStatus::from_str(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("invalid order status: {}", status).into(),
            )
        })?,
        payment_status: row.get(3)?,
        subtotal: row.get(4)?,
        shipping: row.get(5)?,
        total: row.get(6)?,
        currency: row.get(7)?,
        shipping_address_id: row.get(8)?,
        gateway_reference: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const PAYMENT_COLS: &str = "id, order_id, provider, correlation_id, session_token, status, \
                            status_detail, amount, currency, payment_method, raw_response, \
                            created_at, updated_at";

fn payment_from_row(row: &Row) -> rusqlite::Result<Payment> {
    let status: String = row.get(5)?;
    Ok(Payment {
        id: row.get(0)?,
        order_id: row.get(1)?,
        provider: row.get(2)?,
        correlation_id: row.get(3)?,
        session_token: row.get(4)?,
        status: PaymentStatus::from_str(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                format!("invalid payment status: {}", status).into(),
            )
        })?,
        status_detail: row.get(6)?,
        amount: row.get(7)?,
        currency: row.get(8)?,
        payment_method: row.get(9)?,
        raw_response: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn product_from_row(row: &Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        currency: row.get(3)?,
        stock: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

// ============ products ============

pub fn create_product(conn: &Connection, input: &CreateProduct) -> Result<Product> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO products (id, name, price, currency, stock, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![&id, &input.name, input.price, &input.currency, input.stock, now, now],
    )?;
    Ok(Product {
        id,
        name: input.name.clone(),
        price: input.price,
        currency: input.currency.clone(),
        stock: input.stock,
        created_at: now,
        updated_at: now,
    })
}

pub fn create_variant(conn: &Connection, input: &CreateVariant) -> Result<ProductVariant> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO product_variants (id, product_id, name, units, price)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, &input.product_id, &input.name, input.units, input.price],
    )?;
    Ok(ProductVariant {
        id,
        product_id: input.product_id.clone(),
        name: input.name.clone(),
        units: input.units,
        price: input.price,
    })
}

pub fn get_product(conn: &Connection, id: &str) -> Result<Option<Product>> {
    let product = conn
        .query_row(
            "SELECT id, name, price, currency, stock, created_at, updated_at
             FROM products WHERE id = ?1",
            params![id],
            product_from_row,
        )
        .optional()?;
    Ok(product)
}

pub fn get_variant(conn: &Connection, id: &str) -> Result<Option<ProductVariant>> {
    let variant = conn
        .query_row(
            "SELECT id, product_id, name, units, price FROM product_variants WHERE id = ?1",
            params![id],
            |row| {
                Ok(ProductVariant {
                    id: row.get(0)?,
                    product_id: row.get(1)?,
                    name: row.get(2)?,
                    units: row.get(3)?,
                    price: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(variant)
}

/// Decrement product stock by `units`, clamping at zero. Reconciliation must
/// never drive stock negative even if inventory records lag behind sales.
pub fn decrement_stock(conn: &Connection, product_id: &str, units: i64) -> Result<()> {
    conn.execute(
        "UPDATE products SET stock = MAX(stock - ?1, 0), updated_at = ?2 WHERE id = ?3",
        params![units, now(), product_id],
    )?;
    Ok(())
}

/// Return previously consumed stock to inventory (refund/chargeback path).
pub fn restore_stock(conn: &Connection, product_id: &str, units: i64) -> Result<()> {
    conn.execute(
        "UPDATE products SET stock = stock + ?1, updated_at = ?2 WHERE id = ?3",
        params![units, now(), product_id],
    )?;
    Ok(())
}

// ============ orders ============

pub struct NewOrder<'a> {
    pub user_id: &'a str,
    pub subtotal: i64,
    pub shipping: i64,
    pub currency: &'a str,
    pub shipping_address_id: Option<&'a str>,
}

pub struct NewOrderItem<'a> {
    pub product_id: &'a str,
    pub product_variant_id: Option<&'a str>,
    pub quantity: i64,
    pub unit_price: i64,
}

/// Insert an order and its lines. Caller wraps this in a transaction so the
/// order never exists without its items.
pub fn create_order_with_items(
    conn: &Connection,
    order: &NewOrder,
    items: &[NewOrderItem],
) -> Result<Order> {
    let id = gen_id();
    let now = now();
    let total = order.subtotal + order.shipping;
    conn.execute(
        "INSERT INTO orders (id, user_id, status, subtotal, shipping, total, currency,
                             shipping_address_id, created_at, updated_at)
         VALUES (?1, ?2, 'PENDING', ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            order.user_id,
            order.subtotal,
            order.shipping,
            total,
            order.currency,
            order.shipping_address_id,
            now,
            now
        ],
    )?;

    for item in items {
        conn.execute(
            "INSERT INTO order_items (id, order_id, product_id, product_variant_id,
                                      quantity, unit_price, total)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                gen_id(),
                &id,
                item.product_id,
                item.product_variant_id,
                item.quantity,
                item.unit_price,
                item.quantity * item.unit_price
            ],
        )?;
    }

    get_order(conn, &id)?.ok_or_else(|| {
        crate::error::AppError::Internal(format!("order {} vanished after insert", id))
    })
}

pub fn get_order(conn: &Connection, id: &str) -> Result<Option<Order>> {
    let order = conn
        .query_row(
            &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
            params![id],
            order_from_row,
        )
        .optional()?;
    Ok(order)
}

pub fn get_order_items(conn: &Connection, order_id: &str) -> Result<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, order_id, product_id, product_variant_id, quantity, unit_price, total
         FROM order_items WHERE order_id = ?1 ORDER BY rowid",
    )?;
    let items = stmt
        .query_map(params![order_id], |row| {
            Ok(OrderItem {
                id: row.get(0)?,
                order_id: row.get(1)?,
                product_id: row.get(2)?,
                product_variant_id: row.get(3)?,
                quantity: row.get(4)?,
                unit_price: row.get(5)?,
                total: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

/// Order lines joined with the variant `units` multiplier, as the stock
/// adjustment helper consumes them.
pub fn get_order_items_detail(conn: &Connection, order_id: &str) -> Result<Vec<OrderItemDetail>> {
    let mut stmt = conn.prepare(
        "SELECT oi.product_id, oi.product_variant_id, oi.quantity, pv.units
         FROM order_items oi
         LEFT JOIN product_variants pv ON pv.id = oi.product_variant_id
         WHERE oi.order_id = ?1 ORDER BY oi.rowid",
    )?;
    let items = stmt
        .query_map(params![order_id], |row| {
            Ok(OrderItemDetail {
                product_id: row.get(0)?,
                product_variant_id: row.get(1)?,
                quantity: row.get(2)?,
                variant_units: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

/// Conditional PENDING→PAID transition. Returns true iff this call performed
/// the transition; a false return means another delivery already claimed it
/// (or the order had moved on), so stock must not be touched again.
pub fn try_transition_pending_to_paid(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'PAID', updated_at = ?1 WHERE id = ?2 AND status = 'PENDING'",
        params![now(), order_id],
    )?;
    Ok(affected > 0)
}

/// Conditional cancel for orders whose stock was never committed.
pub fn try_transition_pending_to_cancelled(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'CANCELLED', updated_at = ?1
         WHERE id = ?2 AND status = 'PENDING'",
        params![now(), order_id],
    )?;
    Ok(affected > 0)
}

/// Conditional cancel for orders that already consumed stock (PAID or a later
/// fulfillment stage). A true return obliges the caller to restore stock in
/// the same transaction.
pub fn try_transition_to_cancelled_after_stock_commit(
    conn: &Connection,
    order_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'CANCELLED', updated_at = ?1
         WHERE id = ?2 AND status IN ('PAID', 'PREPARING', 'SHIPPED')",
        params![now(), order_id],
    )?;
    Ok(affected > 0)
}

/// Mirror the raw gateway status string and correlation reference onto the
/// order row for display. Does not touch the typed status column.
pub fn set_order_payment_mirror(
    conn: &Connection,
    order_id: &str,
    raw_status: &str,
    gateway_reference: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE orders SET payment_status = ?1, gateway_reference = ?2, updated_at = ?3
         WHERE id = ?4",
        params![raw_status, gateway_reference, now(), order_id],
    )?;
    Ok(())
}

/// Operator-driven status override. No stock side effects by design; stock
/// only ever moves on the gateway-driven path.
pub fn update_order_status(conn: &Connection, order_id: &str, status: OrderStatus) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now(), order_id],
    )?;
    Ok(affected > 0)
}

// ============ payments ============

pub fn create_payment(conn: &Connection, input: &CreatePayment) -> Result<Payment> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO payments (id, order_id, provider, status, amount, currency, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'PENDING', ?4, ?5, ?6, ?7)",
        params![&id, &input.order_id, &input.provider, input.amount, &input.currency, now, now],
    )?;
    Ok(Payment {
        id,
        order_id: input.order_id.clone(),
        provider: input.provider.clone(),
        correlation_id: None,
        session_token: None,
        status: PaymentStatus::Pending,
        status_detail: None,
        amount: input.amount,
        currency: input.currency.clone(),
        payment_method: None,
        raw_response: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_payment(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    let payment = conn
        .query_row(
            &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLS),
            params![id],
            payment_from_row,
        )
        .optional()?;
    Ok(payment)
}

pub fn get_payment_by_correlation(
    conn: &Connection,
    provider: &str,
    correlation_id: &str,
) -> Result<Option<Payment>> {
    let payment = conn
        .query_row(
            &format!(
                "SELECT {} FROM payments WHERE provider = ?1 AND correlation_id = ?2",
                PAYMENT_COLS
            ),
            params![provider, correlation_id],
            payment_from_row,
        )
        .optional()?;
    Ok(payment)
}

pub fn get_current_payment_for_order(
    conn: &Connection,
    order_id: &str,
) -> Result<Option<Payment>> {
    let payment = conn
        .query_row(
            &format!(
                "SELECT {} FROM payments WHERE order_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                PAYMENT_COLS
            ),
            params![order_id],
            payment_from_row,
        )
        .optional()?;
    Ok(payment)
}

/// Record the gateway session handle after checkout creation. Flow hands the
/// correlation token up front; Mercado Pago's payment id arrives with the
/// first webhook instead.
pub fn set_payment_session(
    conn: &Connection,
    payment_id: &str,
    session_token: &str,
    correlation_id: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET session_token = ?1,
                             correlation_id = COALESCE(?2, correlation_id),
                             updated_at = ?3
         WHERE id = ?4",
        params![session_token, correlation_id, now(), payment_id],
    )?;
    Ok(())
}

/// Bind a gateway correlation id to a payment the first time a webhook
/// references it.
pub fn bind_payment_correlation(
    conn: &Connection,
    payment_id: &str,
    correlation_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET correlation_id = ?1, updated_at = ?2
         WHERE id = ?3 AND correlation_id IS NULL",
        params![correlation_id, now(), payment_id],
    )?;
    Ok(())
}

/// Persist the authoritative gateway report onto the payment row: status,
/// detail, payment-method metadata and the raw payload.
pub fn update_payment_from_gateway(
    conn: &Connection,
    payment_id: &str,
    status: PaymentStatus,
    status_detail: Option<&str>,
    payment_method: Option<&str>,
    raw_response: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET status = ?1, status_detail = ?2, payment_method = ?3,
                             raw_response = ?4, updated_at = ?5
         WHERE id = ?6",
        params![status.as_str(), status_detail, payment_method, raw_response, now(), payment_id],
    )?;
    Ok(())
}
