//! Persistence seams.
//!
//! Every collection the workflow touches sits behind a trait so services can
//! run against Postgres in production and the in-memory store in tests.

pub mod memory;
pub mod nats;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use crate::domain::aggregates::{Cart, Order, Product, StockChange};
use crate::domain::records::{ContactMessage, Review, WishlistEntry};
use crate::domain::value_objects::EmailAddress;
use crate::inventory::StockOperation;
use crate::notifications::OutboundMail;
use crate::Result;

pub use memory::MemoryStore;
pub use nats::NatsMailQueue;
pub use postgres::PgStore;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub search: Option<String>,
    pub in_stock: Option<bool>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        self.category.as_deref().map_or(true, |c| product.category().eq_ignore_ascii_case(c))
            && self.subcategory.as_deref().map_or(true, |s| product.subcategory().is_some_and(|ps| ps.eq_ignore_ascii_case(s)))
            && self.search.as_deref().map_or(true, |q| {
                let q = q.to_lowercase();
                product.name().to_lowercase().contains(&q) || product.description().to_lowercase().contains(&q)
            })
            && self.in_stock.map_or(true, |wanted| product.is_in_stock() == wanted)
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn get_product(&self, id: &str) -> Result<Option<Product>>;
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>>;
    /// Applies every operation or none of them, serialised against other stock writers.
    async fn apply_stock(&self, operations: &[StockOperation]) -> Result<Vec<StockChange>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order and stamps it with its first version.
    async fn insert_order(&self, order: &mut Order) -> Result<()>;
    /// Writes the order only if nobody else has since; fails with `Conflict` otherwise.
    async fn update_order(&self, order: &mut Order) -> Result<()>;
    async fn get_order(&self, id: &str) -> Result<Option<Order>>;
    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>>;
    async fn delivered_unreviewed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn save_cart(&self, cart: &Cart) -> Result<()>;
    async fn get_cart(&self, id: &str) -> Result<Option<Cart>>;
    async fn delete_cart(&self, id: &str) -> Result<bool>;
    async fn idle_carts_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Cart>>;
    async fn reminded_carts_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Cart>>;
    /// Flags the cart only if it still carries the `seen` activity timestamp.
    /// Returns false when the customer touched or removed the cart in between.
    async fn mark_reminder_sent(&self, id: &str, seen: DateTime<Utc>, at: DateTime<Utc>) -> Result<bool>;
    async fn mark_discount_sent(&self, id: &str, seen: DateTime<Utc>, at: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait WaitlistStore: Send + Sync {
    /// Returns false when the address was already waiting.
    async fn join_waitlist(&self, product_id: &str, email: &EmailAddress) -> Result<bool>;
    /// Removes and returns every subscriber for the product.
    async fn drain_waitlist(&self, product_id: &str) -> Result<Vec<EmailAddress>>;
}

#[async_trait]
pub trait StorefrontStore: Send + Sync {
    async fn add_review(&self, review: &Review) -> Result<()>;
    async fn list_reviews(&self, product_id: &str) -> Result<Vec<Review>>;
    async fn subscribe_newsletter(&self, email: &EmailAddress) -> Result<bool>;
    async fn unsubscribe_newsletter(&self, email: &EmailAddress) -> Result<bool>;
    async fn save_contact_message(&self, message: &ContactMessage) -> Result<()>;
    async fn wishlist(&self, email: &EmailAddress) -> Result<Vec<WishlistEntry>>;
    async fn add_to_wishlist(&self, email: &EmailAddress, product_id: &str) -> Result<bool>;
    async fn remove_from_wishlist(&self, email: &EmailAddress, product_id: &str) -> Result<bool>;
}

/// Outbound mail collection. An external consumer performs delivery.
#[async_trait]
pub trait MailQueue: Send + Sync {
    async fn enqueue(&self, mail: &OutboundMail) -> Result<()>;
}

/// One handle per collection, all usually backed by the same store.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub orders: Arc<dyn OrderStore>,
    pub carts: Arc<dyn CartStore>,
    pub waitlist: Arc<dyn WaitlistStore>,
    pub storefront: Arc<dyn StorefrontStore>,
    pub mail: Arc<dyn MailQueue>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>, mail: Arc<dyn MailQueue>) -> Self
    where
        S: CatalogStore + OrderStore + CartStore + WaitlistStore + StorefrontStore + 'static,
    {
        Self {
            catalog: backend.clone(),
            orders: backend.clone(),
            carts: backend.clone(),
            waitlist: backend.clone(),
            storefront: backend,
            mail,
        }
    }
}
