//! CustomiseMe UK commerce service
//!
//! Order, inventory and notification workflow behind the Creative Merch UK /
//! CustomiseMe UK storefront.
//!
//! ## Features
//! - Atomic, all-or-nothing stock transactions with low-stock and restock alerts
//! - Order lifecycle state machine with a custom-artwork review workflow
//! - Server-side pricing and payment-intent reconciliation
//! - Templated notifications appended to an outbound mail queue
//! - Scheduled abandoned-cart and review-request sweeps

pub mod api;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod payment;
pub mod scheduler;
pub mod store;

use thiserror::Error;
use crate::domain::aggregates::{CartError, OrderError, ProductError};
use crate::domain::value_objects::{EmailError, MoneyError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Cart not found: {0}")]
    CartNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: String, requested: u32, available: u32 },

    #[error("Product {product_id} is out of stock: requested {requested}, available {available}")]
    OutOfStock { product_id: String, requested: u32, available: u32 },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Authentication required")]
    Authentication,

    #[error("Not authorised")]
    Authorization,

    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    #[error("Payment provider error: {0}")]
    Payment(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Mail queue error: {0}")]
    MailQueue(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CommerceError>;

impl From<ProductError> for CommerceError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::InsufficientStock { product_id, requested, available } => Self::InsufficientStock { product_id, requested, available },
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<OrderError> for CommerceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from: from.to_string(), to: to.to_string() },
            OrderError::InvalidArtworkTransition { from, to } => Self::InvalidTransition { from: format!("artwork {from}"), to: format!("artwork {to}") },
            OrderError::ArtworkNotApproved(_) => Self::InvalidTransition { from: err.to_string(), to: "shipped".to_string() },
            OrderError::PaymentReferenceMismatch => Self::PaymentVerificationFailed(err.to_string()),
            OrderError::UnknownStatus(_) => Self::Storage(err.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<CartError> for CommerceError {
    fn from(err: CartError) -> Self { Self::Validation(err.to_string()) }
}

impl From<MoneyError> for CommerceError {
    fn from(err: MoneyError) -> Self { Self::Validation(err.to_string()) }
}

impl From<EmailError> for CommerceError {
    fn from(err: EmailError) -> Self { Self::Validation(err.to_string()) }
}

impl From<validator::ValidationErrors> for CommerceError {
    fn from(err: validator::ValidationErrors) -> Self { Self::Validation(err.to_string()) }
}

impl From<sqlx::Error> for CommerceError {
    fn from(err: sqlx::Error) -> Self { Self::Storage(err.to_string()) }
}

impl From<serde_json::Error> for CommerceError {
    fn from(err: serde_json::Error) -> Self { Self::Storage(format!("document encoding: {err}")) }
}

impl From<reqwest::Error> for CommerceError {
    fn from(err: reqwest::Error) -> Self { Self::Payment(err.to_string()) }
}
