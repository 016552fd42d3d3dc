//! In-process store used for local development and tests.
//!
//! A single lock guards every collection, so each trait call is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use crate::domain::aggregates::{Cart, Order, OrderStatus, Product, StockChange};
use crate::domain::records::{ContactMessage, Review, WishlistEntry};
use crate::domain::value_objects::EmailAddress;
use crate::inventory::{apply_operations, StockOperation};
use crate::notifications::OutboundMail;
use crate::store::{CartStore, CatalogStore, MailQueue, OrderStore, ProductFilter, StorefrontStore, WaitlistStore};
use crate::{CommerceError, Result};

#[derive(Default)]
struct Collections {
    products: HashMap<String, Product>,
    orders: HashMap<String, Order>,
    carts: HashMap<String, Cart>,
    waitlists: HashMap<String, BTreeSet<EmailAddress>>,
    reviews: Vec<Review>,
    newsletter: BTreeSet<EmailAddress>,
    contact_messages: Vec<ContactMessage>,
    wishlists: HashMap<EmailAddress, Vec<WishlistEntry>>,
    outbox: Vec<OutboundMail>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Everything queued for delivery so far, oldest first.
    pub async fn outbox(&self) -> Vec<OutboundMail> { self.inner.read().await.outbox.clone() }

    pub async fn contact_messages(&self) -> Vec<ContactMessage> { self.inner.read().await.contact_messages.clone() }
}

fn without_events(order: &Order) -> Order {
    let mut stored = order.clone();
    stored.take_events();
    stored
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.products.contains_key(product.id()) {
            return Err(CommerceError::Conflict(format!("product {} already exists", product.id())));
        }
        inner.products.insert(product.id().to_string(), product.clone());
        Ok(())
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        Ok(self.inner.read().await.products.get(id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let inner = self.inner.read().await;
        let mut products: Vec<Product> = inner.products.values().filter(|p| filter.matches(p)).cloned().collect();
        products.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(products)
    }

    async fn apply_stock(&self, operations: &[StockOperation]) -> Result<Vec<StockChange>> {
        let mut inner = self.inner.write().await;
        let mut working: HashMap<String, Product> = operations.iter()
            .filter_map(|op| inner.products.get(&op.product_id).map(|p| (op.product_id.clone(), p.clone())))
            .collect();
        let changes = apply_operations(&mut working, operations)?;
        inner.products.extend(working);
        Ok(changes)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &mut Order) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.orders.contains_key(order.id()) {
            return Err(CommerceError::Conflict(format!("order {} already exists", order.id())));
        }
        order.set_version(1);
        inner.orders.insert(order.id().to_string(), without_events(order));
        Ok(())
    }

    async fn update_order(&self, order: &mut Order) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner.orders.get(order.id()).ok_or_else(|| CommerceError::OrderNotFound(order.id().to_string()))?;
        if stored.version() != order.version() {
            return Err(CommerceError::Conflict(format!("order {} was modified concurrently", order.id())));
        }
        order.set_version(order.version() + 1);
        inner.orders.insert(order.id().to_string(), without_events(order));
        Ok(())
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(id).cloned())
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.values().find(|o| o.payment_intent_id() == Some(intent_id)).cloned())
    }

    async fn delivered_unreviewed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut due: Vec<Order> = inner.orders.values()
            .filter(|o| o.status() == OrderStatus::Delivered && !o.review_requested() && o.delivered_at().is_some_and(|at| at <= cutoff))
            .cloned()
            .collect();
        due.sort_by_key(|o| o.delivered_at());
        Ok(due)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.inner.write().await.carts.insert(cart.id().to_string(), cart.clone());
        Ok(())
    }

    async fn get_cart(&self, id: &str) -> Result<Option<Cart>> {
        Ok(self.inner.read().await.carts.get(id).cloned())
    }

    async fn delete_cart(&self, id: &str) -> Result<bool> {
        Ok(self.inner.write().await.carts.remove(id).is_some())
    }

    async fn idle_carts_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Cart>> {
        let inner = self.inner.read().await;
        Ok(inner.carts.values()
            .filter(|c| c.email().is_some() && !c.is_empty() && c.reminder_sent_at().is_none() && c.updated_at() <= cutoff)
            .cloned()
            .collect())
    }

    async fn reminded_carts_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Cart>> {
        let inner = self.inner.read().await;
        Ok(inner.carts.values()
            .filter(|c| c.email().is_some() && !c.is_empty() && c.discount_sent_at().is_none() && c.reminder_sent_at().is_some_and(|at| at <= cutoff))
            .cloned()
            .collect())
    }

    async fn mark_reminder_sent(&self, id: &str, seen: DateTime<Utc>, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.carts.get_mut(id).filter(|c| c.updated_at() == seen) {
            Some(cart) => { cart.mark_reminder_sent(at); Ok(true) }
            None => Ok(false),
        }
    }

    async fn mark_discount_sent(&self, id: &str, seen: DateTime<Utc>, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.carts.get_mut(id).filter(|c| c.updated_at() == seen) {
            Some(cart) => { cart.mark_discount_sent(at); Ok(true) }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl WaitlistStore for MemoryStore {
    async fn join_waitlist(&self, product_id: &str, email: &EmailAddress) -> Result<bool> {
        Ok(self.inner.write().await.waitlists.entry(product_id.to_string()).or_default().insert(email.clone()))
    }

    async fn drain_waitlist(&self, product_id: &str) -> Result<Vec<EmailAddress>> {
        Ok(self.inner.write().await.waitlists.remove(product_id).map(|s| s.into_iter().collect()).unwrap_or_default())
    }
}

#[async_trait]
impl StorefrontStore for MemoryStore {
    async fn add_review(&self, review: &Review) -> Result<()> {
        self.inner.write().await.reviews.push(review.clone());
        Ok(())
    }

    async fn list_reviews(&self, product_id: &str) -> Result<Vec<Review>> {
        let inner = self.inner.read().await;
        let mut reviews: Vec<Review> = inner.reviews.iter().filter(|r| r.product_id == product_id).cloned().collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn subscribe_newsletter(&self, email: &EmailAddress) -> Result<bool> {
        Ok(self.inner.write().await.newsletter.insert(email.clone()))
    }

    async fn unsubscribe_newsletter(&self, email: &EmailAddress) -> Result<bool> {
        Ok(self.inner.write().await.newsletter.remove(email))
    }

    async fn save_contact_message(&self, message: &ContactMessage) -> Result<()> {
        self.inner.write().await.contact_messages.push(message.clone());
        Ok(())
    }

    async fn wishlist(&self, email: &EmailAddress) -> Result<Vec<WishlistEntry>> {
        Ok(self.inner.read().await.wishlists.get(email).cloned().unwrap_or_default())
    }

    async fn add_to_wishlist(&self, email: &EmailAddress, product_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let entries = inner.wishlists.entry(email.clone()).or_default();
        if entries.iter().any(|e| e.product_id == product_id) { return Ok(false); }
        entries.push(WishlistEntry { email: email.clone(), product_id: product_id.to_string(), added_at: Utc::now() });
        Ok(true)
    }

    async fn remove_from_wishlist(&self, email: &EmailAddress, product_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(entries) = inner.wishlists.get_mut(email) else { return Ok(false) };
        let before = entries.len();
        entries.retain(|e| e.product_id != product_id);
        Ok(entries.len() != before)
    }
}

#[async_trait]
impl MailQueue for MemoryStore {
    async fn enqueue(&self, mail: &OutboundMail) -> Result<()> {
        self.inner.write().await.outbox.push(mail.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Address, OrderItem};
    use crate::domain::pricing::PricingPolicy;
    use crate::domain::value_objects::Money;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        let items = vec![OrderItem { product_id: "P1".into(), name: "Mug".into(), quantity: 1, unit_price: Money::gbp(dec!(8)), customization: Default::default() }];
        let totals = PricingPolicy::default().price(&items).unwrap();
        Order::place(EmailAddress::parse("jo@example.com").unwrap(), items, totals, Address::default()).unwrap()
    }

    #[tokio::test]
    async fn test_stale_order_write_conflicts() {
        let store = MemoryStore::new();
        let mut o = order();
        store.insert_order(&mut o).await.unwrap();
        let mut first = store.get_order(o.id()).await.unwrap().unwrap();
        let mut second = first.clone();
        first.attach_payment_intent("pi_1").unwrap();
        store.update_order(&mut first).await.unwrap();
        assert_eq!(first.version(), 2);
        second.attach_payment_intent("pi_2").unwrap();
        assert!(matches!(store.update_order(&mut second).await, Err(CommerceError::Conflict(_))));
        assert_eq!(store.find_by_payment_intent("pi_1").await.unwrap().unwrap().id(), o.id());
    }

    #[tokio::test]
    async fn test_stored_orders_carry_no_pending_events() {
        let store = MemoryStore::new();
        let mut o = order();
        store.insert_order(&mut o).await.unwrap();
        let mut loaded = store.get_order(o.id()).await.unwrap().unwrap();
        assert!(loaded.take_events().is_empty());
    }

    #[tokio::test]
    async fn test_product_filter() {
        let store = MemoryStore::new();
        store.insert_product(&Product::create("Photo Mug", Money::gbp(dec!(12)), "Mugs").with_stock(3)).await.unwrap();
        store.insert_product(&Product::create("Tote Bag", Money::gbp(dec!(15)), "Bags").with_subcategory(Some("Canvas".into()))).await.unwrap();
        let mugs = store.list_products(&ProductFilter { category: Some("mugs".into()), ..Default::default() }).await.unwrap();
        assert_eq!(mugs.len(), 1);
        let canvas = store.list_products(&ProductFilter { subcategory: Some("canvas".into()), ..Default::default() }).await.unwrap();
        assert_eq!(canvas[0].name(), "Tote Bag");
        let in_stock = store.list_products(&ProductFilter { in_stock: Some(true), ..Default::default() }).await.unwrap();
        assert_eq!(in_stock.len(), 1);
        let search = store.list_products(&ProductFilter { search: Some("TOTE".into()), ..Default::default() }).await.unwrap();
        assert_eq!(search.len(), 1);
    }

    #[tokio::test]
    async fn test_wishlist_is_idempotent() {
        let store = MemoryStore::new();
        let jo = EmailAddress::parse("jo@example.com").unwrap();
        assert!(store.add_to_wishlist(&jo, "P1").await.unwrap());
        assert!(!store.add_to_wishlist(&jo, "P1").await.unwrap());
        assert_eq!(store.wishlist(&jo).await.unwrap().len(), 1);
        assert!(store.remove_from_wishlist(&jo, "P1").await.unwrap());
        assert!(!store.remove_from_wishlist(&jo, "P1").await.unwrap());
    }
}
