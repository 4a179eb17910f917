use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Timestamp layout used in the first two store columns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of columns in a store row (A..E).
pub const ROW_WIDTH: usize = 5;

/// A product as scraped in the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub original_price: Decimal,
    pub sale_price: Decimal,
}

impl Product {
    pub fn new(name: impl Into<String>, original_price: Decimal, sale_price: Decimal) -> Self {
        Self {
            name: name.into(),
            original_price,
            sale_price,
        }
    }
}

/// One tracked product in the store: `first_seen, last_seen, name, original_price, sale_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRow {
    pub first_seen: String,
    pub last_seen: String,
    pub name: String,
    pub original_price: Decimal,
    pub sale_price: Decimal,
}

impl StoreRow {
    pub fn first_sighting(product: &Product, now: &str) -> Self {
        Self {
            first_seen: now.to_string(),
            last_seen: now.to_string(),
            name: product.name.clone(),
            original_price: product.original_price,
            sale_price: product.sale_price,
        }
    }
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Wall-clock "now" in store format.
pub fn now_timestamp() -> String {
    format_timestamp(chrono::Local::now().naive_local())
}
