//! Domain events
//!
//! Aggregates record what happened; services drain the events after a
//! successful write and turn them into notifications and stock movements.

use crate::domain::aggregates::ArtworkStatus;
use chrono::{DateTime, Utc};

#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProductEvent {
    StockChanged { product_id: String, before: u32, after: u32 },
    LowStock { product_id: String, name: String, remaining: u32, threshold: u32 },
    Restocked { product_id: String, name: String, available: u32 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    Created { order_id: String, email: String },
    Paid { order_id: String, paid_at: DateTime<Utc> },
    Shipped { order_id: String, tracking_reference: String },
    Delivered { order_id: String, delivered_at: DateTime<Utc> },
    Cancelled { order_id: String, restock: bool },
    ArtworkReviewed { order_id: String, status: ArtworkStatus, notes: Option<String> },
    ArtworkResubmitted { order_id: String },
}
