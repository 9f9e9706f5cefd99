//! Inventory unit accounting for order lines.
//!
//! Stock is tracked at single-unit granularity on the product. A line that
//! references a variant sells packs: the variant's `units` multiplier converts
//! purchased quantity into consumed inventory units.

use crate::models::OrderItemDetail;

/// Inventory units a purchased line consumes (and a reversal restores).
pub fn units_for_line(quantity: i64, variant_units: Option<i64>) -> i64 {
    match variant_units {
        Some(units) => quantity * units,
        None => quantity,
    }
}

pub fn units_for_item(item: &OrderItemDetail) -> i64 {
    units_for_line(item.quantity, item.variant_units)
}
