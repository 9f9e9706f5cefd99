use serde::{Deserialize, Serialize};

/// Catalog row. `stock` is unit-granular; reconciliation is the only writer
/// that may decrement it, and never below zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub stock: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A multi-unit packaging of a product (e.g. a 6-pack) with its own price.
/// `units` converts purchased quantity into consumed inventory units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub units: i64,
    pub price: i64,
}

#[derive(Debug)]
pub struct CreateProduct {
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub stock: i64,
}

#[derive(Debug)]
pub struct CreateVariant {
    pub product_id: String,
    pub name: String,
    pub units: i64,
    pub price: i64,
}
