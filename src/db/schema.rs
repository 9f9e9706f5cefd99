use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Catalog (stock is unit-granular; variants sell packs of units)
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price INTEGER NOT NULL,
            currency TEXT NOT NULL,
            stock INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS product_variants (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            units INTEGER NOT NULL CHECK (units > 0),
            price INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_variants_product ON product_variants(product_id);

        -- Orders: created PENDING at checkout, transitioned by webhook
        -- reconciliation or operator override, never deleted
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'PAID', 'PREPARING', 'SHIPPED', 'DELIVERED', 'CANCELLED')),
            payment_status TEXT,
            subtotal INTEGER NOT NULL,
            shipping INTEGER NOT NULL,
            total INTEGER NOT NULL,
            currency TEXT NOT NULL,
            shipping_address_id TEXT,
            gateway_reference TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);

        -- Order lines: immutable once written
        CREATE TABLE IF NOT EXISTS order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL REFERENCES products(id),
            product_variant_id TEXT REFERENCES product_variants(id),
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            unit_price INTEGER NOT NULL,
            total INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);

        -- One payment row per gateway correlation id; an order can accumulate
        -- several over retried checkouts
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            provider TEXT NOT NULL CHECK (provider IN ('mercadopago', 'flow')),
            correlation_id TEXT,
            session_token TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'APPROVED', 'AUTHORIZED', 'IN_PROCESS', 'IN_MEDIATION',
                                  'REJECTED', 'CANCELLED', 'REFUNDED', 'CHARGED_BACK')),
            status_detail TEXT,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            payment_method TEXT,
            raw_response TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payments_order ON payments(order_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_correlation
            ON payments(provider, correlation_id) WHERE correlation_id IS NOT NULL;
        "#,
    )
}
