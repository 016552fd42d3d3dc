//! Cart Aggregate
//!
//! Carts are best-effort state kept only so abandoned checkouts can be
//! chased by email. Checkout supersedes the cart with an order.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::domain::aggregates::product::Customization;
use crate::domain::value_objects::{EmailAddress, Money};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    id: String,
    email: Option<EmailAddress>,
    items: Vec<CartItem>,
    subtotal: Money,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    reminder_sent_at: Option<DateTime<Utc>>,
    discount_sent_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub customization: Customization,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

impl Cart {
    pub fn new(id: impl Into<String>, currency: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(), email: None, items: vec![], subtotal: Money::zero(currency), currency: currency.to_string(),
            created_at: at, updated_at: at, reminder_sent_at: None, discount_sent_at: None,
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn email(&self) -> Option<&EmailAddress> { self.email.as_ref() }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn reminder_sent_at(&self) -> Option<DateTime<Utc>> { self.reminder_sent_at }
    pub fn discount_sent_at(&self) -> Option<DateTime<Utc>> { self.discount_sent_at }

    pub fn set_email(&mut self, email: Option<EmailAddress>, at: DateTime<Utc>) {
        if email.is_some() { self.email = email; }
        self.touch(at);
    }

    pub fn add_item(&mut self, item: CartItem, at: DateTime<Utc>) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id && i.customization == item.customization) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
        } else {
            self.items.push(item);
        }
        self.recalculate(at);
    }

    /// Replaces the contents wholesale, merging repeated lines.
    pub fn replace_items(&mut self, items: Vec<CartItem>, at: DateTime<Utc>) {
        self.items.clear();
        for item in items.into_iter().filter(|i| i.quantity > 0) { self.add_item(item, at); }
        self.recalculate(at);
    }

    pub fn update_quantity(&mut self, product_id: &str, quantity: u32, at: DateTime<Utc>) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| i.product_id != product_id); }
        else { item.quantity = quantity; }
        self.recalculate(at);
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str, at: DateTime<Utc>) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.recalculate(at);
        Ok(())
    }

    pub fn clear(&mut self, at: DateTime<Utc>) { self.items.clear(); self.recalculate(at); }

    /// Eligible for the first reminder: contactable, non-empty, idle past `delay`, not yet chased.
    pub fn is_abandoned(&self, now: DateTime<Utc>, delay: Duration) -> bool {
        self.email.is_some() && !self.items.is_empty() && self.reminder_sent_at.is_none() && self.updated_at <= now - delay
    }

    pub fn is_discount_due(&self, now: DateTime<Utc>, delay: Duration) -> bool {
        self.email.is_some() && !self.items.is_empty() && self.discount_sent_at.is_none()
            && self.reminder_sent_at.is_some_and(|at| at <= now - delay)
    }

    pub fn mark_reminder_sent(&mut self, at: DateTime<Utc>) { self.reminder_sent_at = Some(at); }
    pub fn mark_discount_sent(&mut self, at: DateTime<Utc>) { self.discount_sent_at = Some(at); }

    fn recalculate(&mut self, at: DateTime<Utc>) {
        self.subtotal = self.items.iter().fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()).unwrap_or(acc));
        self.touch(at);
    }

    /// Any customer activity restarts the abandonment clock.
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
        self.reminder_sent_at = None;
        self.discount_sent_at = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("item not found in cart")]
    ItemNotFound,
}
