//! Property-based test generators using proptest.

use crate::fixtures::{SalesOrder, SalesOrderDetail};
use proptest::prelude::*;

/// Events of the sales order lifecycle.
pub const SALES_ORDER_EVENT_NAMES: [&str; 6] = [
    "confirm",
    "partDelivery",
    "allDelivery",
    "signFor",
    "back",
    "returnGoods",
];

/// Strategy for sales order business codes.
pub fn order_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("SO[0-9]{6}").expect("Invalid regex")
}

/// Strategy for customer names, sometimes padded with whitespace.
pub fn customer_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex(" ?[A-Z][a-z]{1,12}( [A-Z][a-z]{1,12})? ?").expect("Invalid regex")
}

/// Strategy for lifecycle statuses.
pub fn status_strategy() -> impl Strategy<Value = i64> {
    0i64..=6
}

/// Strategy for lifecycle event names.
pub fn event_name_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(SALES_ORDER_EVENT_NAMES.to_vec())
}

/// Strategy for unsaved order lines.
pub fn detail_strategy() -> impl Strategy<Value = SalesOrderDetail> {
    (
        prop::string::string_regex("SKU[0-9]{3}").expect("Invalid regex"),
        1u32..1000,
    )
        .prop_map(|(sku_code, quantity)| SalesOrderDetail {
            product_name: format!("Product {sku_code}"),
            sku_code,
            order_quantity: f64::from(quantity),
            ..SalesOrderDetail::default()
        })
}

/// Strategy for unsaved orders with up to `max_lines` lines.
pub fn sales_order_strategy(max_lines: usize) -> impl Strategy<Value = SalesOrder> {
    (
        order_id_strategy(),
        customer_name_strategy(),
        prop::collection::vec(detail_strategy(), 0..=max_lines),
    )
        .prop_map(|(order_id, customer_name, sales_order_details)| SalesOrder {
            order_id,
            customer_name,
            address: "1 Harbour Road".to_string(),
            sales_order_details,
            ..SalesOrder::default()
        })
}

/// Strategy for `(order_id, customer_name)` key candidates drawn from a small
/// alphabet so that duplicates are likely.
pub fn key_candidates_strategy(max: usize) -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["A", "B", "C"]),
            prop::sample::select(vec!["X", "Y"]),
        )
            .prop_map(|(a, b)| (a.to_string(), b.to_string())),
        0..=max,
    )
}
