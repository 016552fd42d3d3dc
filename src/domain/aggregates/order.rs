//! Order Aggregate
//!
//! Status only ever moves forward:
//! `pending_payment -> paid -> shipped -> delivered`, with `cancelled` as the
//! terminal alternative from `pending_payment`, or from `paid` when custom
//! artwork is rejected. Orders carrying uploaded artwork also track a review
//! sub-state that must reach `approved_mockup` before the order can ship.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::product::Customization;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::pricing::OrderTotals;
use crate::domain::value_objects::{EmailAddress, Money};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: String,
    email: EmailAddress,
    items: Vec<OrderItem>,
    subtotal: Money,
    shipping: Money,
    tax: Money,
    total: Money,
    status: OrderStatus,
    shipping_address: Address,
    payment_intent_id: Option<String>,
    tracking_reference: Option<String>,
    artwork: Option<ArtworkReview>,
    review_requested: bool,
    stock_committed: bool,
    version: i64,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// One purchased line. `unit_price` is the catalog price at checkout and is never recomputed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub customization: Customization,
}

impl OrderItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub county: Option<String>,
    #[validate(length(min = 2, max = 12))]
    pub postcode: String,
    #[validate(length(min = 2, max = 2))]
    pub country: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] PendingPayment, Paid, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtworkStatus { Submitted, ApprovedMockup, ChangesRequested, Rejected }

impl ArtworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::ApprovedMockup => "approved_mockup",
            Self::ChangesRequested => "changes_requested",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ArtworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtworkDecision { Approve, RequestChanges, Reject }

impl ArtworkDecision {
    pub fn target(&self) -> ArtworkStatus {
        match self {
            Self::Approve => ArtworkStatus::ApprovedMockup,
            Self::RequestChanges => ArtworkStatus::ChangesRequested,
            Self::Reject => ArtworkStatus::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkReview { pub status: ArtworkStatus, pub notes: Option<String>, pub updated_at: DateTime<Utc> }

impl Order {
    pub fn place(email: EmailAddress, items: Vec<OrderItem>, totals: OrderTotals, shipping_address: Address) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let artwork = items.iter().any(|i| i.customization.has_artwork())
            .then(|| ArtworkReview { status: ArtworkStatus::Submitted, notes: None, updated_at: now });
        let mut order = Self {
            id: id.clone(), email: email.clone(), items,
            subtotal: totals.subtotal, shipping: totals.shipping, tax: totals.tax, total: totals.total,
            status: OrderStatus::PendingPayment, shipping_address, payment_intent_id: None, tracking_reference: None,
            artwork, review_requested: false, stock_committed: false, version: 0,
            created_at: now, paid_at: None, shipped_at: None, delivered_at: None, cancelled_at: None, updated_at: now,
            events: vec![],
        };
        order.raise_event(OrderEvent::Created { order_id: id, email: email.to_string() });
        Ok(order)
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn email(&self) -> &EmailAddress { &self.email }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn shipping(&self) -> &Money { &self.shipping }
    pub fn tax(&self) -> &Money { &self.tax }
    pub fn total(&self) -> &Money { &self.total }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn payment_intent_id(&self) -> Option<&str> { self.payment_intent_id.as_deref() }
    pub fn tracking_reference(&self) -> Option<&str> { self.tracking_reference.as_deref() }
    pub fn artwork(&self) -> Option<&ArtworkReview> { self.artwork.as_ref() }
    pub fn has_custom_artwork(&self) -> bool { self.artwork.is_some() }
    pub fn review_requested(&self) -> bool { self.review_requested }
    pub fn stock_committed(&self) -> bool { self.stock_committed }
    pub fn version(&self) -> i64 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn paid_at(&self) -> Option<DateTime<Utc>> { self.paid_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }

    pub fn attach_payment_intent(&mut self, intent_id: impl Into<String>) -> Result<(), OrderError> {
        if self.status != OrderStatus::PendingPayment { return Err(self.invalid(OrderStatus::PendingPayment)); }
        self.payment_intent_id = Some(intent_id.into());
        self.touch();
        Ok(())
    }

    pub fn mark_paid(&mut self, intent_id: &str, at: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::PendingPayment { return Err(self.invalid(OrderStatus::Paid)); }
        if self.payment_intent_id.as_deref() != Some(intent_id) { return Err(OrderError::PaymentReferenceMismatch); }
        self.status = OrderStatus::Paid;
        self.paid_at = Some(at);
        self.touch();
        self.raise_event(OrderEvent::Paid { order_id: self.id.clone(), paid_at: at });
        Ok(())
    }

    pub fn ship(&mut self, tracking_reference: &str, at: DateTime<Utc>) -> Result<(), OrderError> {
        let tracking_reference = tracking_reference.trim();
        if tracking_reference.is_empty() { return Err(OrderError::MissingTracking); }
        if self.status != OrderStatus::Paid { return Err(self.invalid(OrderStatus::Shipped)); }
        if let Some(artwork) = &self.artwork {
            if artwork.status != ArtworkStatus::ApprovedMockup { return Err(OrderError::ArtworkNotApproved(artwork.status)); }
        }
        self.status = OrderStatus::Shipped;
        self.tracking_reference = Some(tracking_reference.to_string());
        self.shipped_at = Some(at);
        self.touch();
        self.raise_event(OrderEvent::Shipped { order_id: self.id.clone(), tracking_reference: tracking_reference.to_string() });
        Ok(())
    }

    pub fn deliver(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Shipped { return Err(self.invalid(OrderStatus::Delivered)); }
        self.status = OrderStatus::Delivered;
        self.delivered_at = Some(at);
        self.touch();
        self.raise_event(OrderEvent::Delivered { order_id: self.id.clone(), delivered_at: at });
        Ok(())
    }

    /// Admin cancellation; only orders that were never paid.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::PendingPayment { return Err(self.invalid(OrderStatus::Cancelled)); }
        self.force_cancel(at);
        Ok(())
    }

    pub fn review_artwork(&mut self, decision: ArtworkDecision, notes: Option<String>, at: DateTime<Utc>) -> Result<(), OrderError> {
        let target = decision.target();
        let current = self.artwork.as_ref().map(|a| a.status).ok_or(OrderError::NoArtwork)?;
        if !matches!(self.status, OrderStatus::PendingPayment | OrderStatus::Paid) { return Err(self.invalid(self.status)); }
        if current != ArtworkStatus::Submitted { return Err(OrderError::InvalidArtworkTransition { from: current, to: target }); }
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.artwork = Some(ArtworkReview { status: target, notes: notes.clone(), updated_at: at });
        self.touch();
        self.raise_event(OrderEvent::ArtworkReviewed { order_id: self.id.clone(), status: target, notes });
        if target == ArtworkStatus::Rejected { self.force_cancel(at); }
        Ok(())
    }

    /// Customer sends revised artwork after changes were requested.
    pub fn resubmit_artwork(&mut self, artwork_url: Option<String>, at: DateTime<Utc>) -> Result<(), OrderError> {
        let current = self.artwork.as_ref().map(|a| a.status).ok_or(OrderError::NoArtwork)?;
        if !matches!(self.status, OrderStatus::PendingPayment | OrderStatus::Paid) { return Err(self.invalid(self.status)); }
        if current != ArtworkStatus::ChangesRequested {
            return Err(OrderError::InvalidArtworkTransition { from: current, to: ArtworkStatus::Submitted });
        }
        if let Some(url) = artwork_url.filter(|u| !u.trim().is_empty()) {
            for item in self.items.iter_mut().filter(|i| i.customization.has_artwork()) {
                item.customization.artwork_url = Some(url.clone());
            }
        }
        self.artwork = Some(ArtworkReview { status: ArtworkStatus::Submitted, notes: None, updated_at: at });
        self.touch();
        self.raise_event(OrderEvent::ArtworkResubmitted { order_id: self.id.clone() });
        Ok(())
    }

    pub fn mark_stock_committed(&mut self) { self.stock_committed = true; self.touch(); }
    pub fn mark_review_requested(&mut self) { self.review_requested = true; self.touch(); }

    pub fn is_review_due(&self, now: DateTime<Utc>, delay: Duration) -> bool {
        self.status == OrderStatus::Delivered
            && !self.review_requested
            && self.delivered_at.is_some_and(|at| at <= now - delay)
    }

    /// Called by the store after a successful versioned write.
    pub fn set_version(&mut self, version: i64) { self.version = version; }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    fn force_cancel(&mut self, at: DateTime<Utc>) {
        let restock = self.status == OrderStatus::Paid && self.stock_committed;
        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(at);
        if restock { self.stock_committed = false; }
        self.touch();
        self.raise_event(OrderEvent::Cancelled { order_id: self.id.clone(), restock });
    }

    fn invalid(&self, to: OrderStatus) -> OrderError { OrderError::InvalidTransition { from: self.status, to } }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(DomainEvent::Order(e)); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("cannot move artwork from {from} to {to}")]
    InvalidArtworkTransition { from: ArtworkStatus, to: ArtworkStatus },
    #[error("payment reference does not match this order")]
    PaymentReferenceMismatch,
    #[error("a tracking reference is required to ship")]
    MissingTracking,
    #[error("order has no custom artwork")]
    NoArtwork,
    #[error("artwork must be approved before shipping (currently {0})")]
    ArtworkNotApproved(ArtworkStatus),
    #[error("unknown order status: {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn totals() -> OrderTotals {
        OrderTotals { subtotal: Money::gbp(dec!(20)), shipping: Money::gbp(dec!(4.99)), tax: Money::gbp(dec!(0)), total: Money::gbp(dec!(24.99)) }
    }

    fn item(artwork: Option<&str>) -> OrderItem {
        OrderItem {
            product_id: "P1".into(), name: "Tote".into(), quantity: 2, unit_price: Money::gbp(dec!(10)),
            customization: Customization { artwork_url: artwork.map(String::from), ..Default::default() },
        }
    }

    fn order(artwork: Option<&str>) -> Order {
        let mut o = Order::place(EmailAddress::parse("jo@example.com").unwrap(), vec![item(artwork)], totals(), Address::default()).unwrap();
        o.attach_payment_intent("pi_1").unwrap();
        o
    }

    #[test]
    fn test_order_workflow() {
        let mut o = order(None);
        let now = Utc::now();
        o.mark_paid("pi_1", now).unwrap();
        o.ship("RM123", now).unwrap();
        o.deliver(now).unwrap();
        assert_eq!(o.status(), OrderStatus::Delivered);
        assert_eq!(o.tracking_reference(), Some("RM123"));
        let events = o.take_events();
        assert_eq!(events.len(), 4);
        assert!(o.take_events().is_empty());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let mut o = order(None);
        let now = Utc::now();
        assert!(matches!(o.ship("RM1", now), Err(OrderError::InvalidTransition { .. })));
        o.mark_paid("pi_1", now).unwrap();
        assert!(matches!(o.mark_paid("pi_1", now), Err(OrderError::InvalidTransition { from: OrderStatus::Paid, .. })));
        o.ship("RM1", now).unwrap();
        o.deliver(now).unwrap();
        assert!(o.mark_paid("pi_1", now).is_err());
        assert!(o.ship("RM2", now).is_err());
        assert!(o.cancel(now).is_err());
        assert_eq!(o.status(), OrderStatus::Delivered);
    }

    #[test]
    fn test_payment_reference_must_match() {
        let mut o = order(None);
        assert_eq!(o.mark_paid("pi_other", Utc::now()), Err(OrderError::PaymentReferenceMismatch));
        assert_eq!(o.status(), OrderStatus::PendingPayment);
    }

    #[test]
    fn test_ship_requires_tracking() {
        let mut o = order(None);
        o.mark_paid("pi_1", Utc::now()).unwrap();
        assert_eq!(o.ship("  ", Utc::now()), Err(OrderError::MissingTracking));
    }

    #[test]
    fn test_admin_cancel_only_before_payment() {
        let mut pending = order(None);
        pending.cancel(Utc::now()).unwrap();
        assert_eq!(pending.status(), OrderStatus::Cancelled);

        let mut paid = order(None);
        paid.mark_paid("pi_1", Utc::now()).unwrap();
        assert!(paid.cancel(Utc::now()).is_err());
    }

    #[test]
    fn test_artwork_rejection_cancels_paid_order_and_restocks() {
        let mut o = order(Some("https://cdn/art.png"));
        assert!(o.has_custom_artwork());
        o.mark_paid("pi_1", Utc::now()).unwrap();
        o.mark_stock_committed();
        o.take_events();
        o.review_artwork(ArtworkDecision::Reject, Some("Low resolution".into()), Utc::now()).unwrap();
        assert_eq!(o.status(), OrderStatus::Cancelled);
        assert_eq!(o.artwork().unwrap().status, ArtworkStatus::Rejected);
        let events = o.take_events();
        assert!(events.contains(&DomainEvent::Order(OrderEvent::Cancelled { order_id: o.id().to_string(), restock: true })));
    }

    #[test]
    fn test_artwork_must_be_approved_before_shipping() {
        let mut o = order(Some("https://cdn/art.png"));
        let now = Utc::now();
        o.mark_paid("pi_1", now).unwrap();
        assert_eq!(o.ship("RM1", now), Err(OrderError::ArtworkNotApproved(ArtworkStatus::Submitted)));
        o.review_artwork(ArtworkDecision::RequestChanges, Some("Move text up".into()), now).unwrap();
        assert!(o.review_artwork(ArtworkDecision::Approve, None, now).is_err());
        o.resubmit_artwork(Some("https://cdn/art-v2.png".into()), now).unwrap();
        assert_eq!(o.items()[0].customization.artwork_url.as_deref(), Some("https://cdn/art-v2.png"));
        o.review_artwork(ArtworkDecision::Approve, None, now).unwrap();
        o.ship("RM1", now).unwrap();
    }

    #[test]
    fn test_cancelled_order_artwork_is_frozen() {
        let mut o = order(Some("https://cdn/art.png"));
        let now = Utc::now();
        o.review_artwork(ArtworkDecision::RequestChanges, None, now).unwrap();
        o.cancel(now).unwrap();
        assert_eq!(
            o.resubmit_artwork(Some("https://cdn/art-v2.png".into()), now),
            Err(OrderError::InvalidTransition { from: OrderStatus::Cancelled, to: OrderStatus::Cancelled })
        );
        assert_eq!(o.artwork().unwrap().status, ArtworkStatus::ChangesRequested);
        assert_eq!(o.items()[0].customization.artwork_url.as_deref(), Some("https://cdn/art.png"));
    }

    #[test]
    fn test_review_due_after_delay() {
        let mut o = order(None);
        let t = Utc::now();
        o.mark_paid("pi_1", t).unwrap();
        o.ship("RM1", t).unwrap();
        o.deliver(t).unwrap();
        assert!(!o.is_review_due(t + Duration::days(6), Duration::days(7)));
        assert!(o.is_review_due(t + Duration::days(7), Duration::days(7)));
        o.mark_review_requested();
        assert!(!o.is_review_due(t + Duration::days(8), Duration::days(7)));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for s in [OrderStatus::PendingPayment, OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Cancelled] {
            assert_eq!(s.as_str().parse::<OrderStatus>().unwrap(), s);
        }
    }
}
