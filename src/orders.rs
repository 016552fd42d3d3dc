//! Admin-driven order lifecycle: fulfilment, cancellation and artwork review.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument};
use crate::domain::aggregates::{ArtworkDecision, Order};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::inventory::InventoryService;
use crate::notifications::templates::{ArtworkReviewData, ShippingData};
use crate::notifications::{Notification, NotificationDispatcher};
use crate::store::OrderStore;
use crate::{CommerceError, Result};

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    inventory: InventoryService,
    dispatcher: NotificationDispatcher,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderStore>, inventory: InventoryService, dispatcher: NotificationDispatcher) -> Self {
        Self { orders, inventory, dispatcher }
    }

    pub async fn get_order(&self, id: &str) -> Result<Order> {
        self.orders.get_order(id).await?.ok_or_else(|| CommerceError::OrderNotFound(id.to_string()))
    }

    #[instrument(name = "orders::ship", skip(self))]
    pub async fn ship(&self, id: &str, tracking_reference: &str) -> Result<Order> {
        let mut order = self.get_order(id).await?;
        order.ship(tracking_reference, Utc::now())?;
        self.save(&mut order).await?;
        let notice = ShippingData { order_id: order.id().to_string(), tracking_reference: order.tracking_reference().unwrap_or_default().to_string() };
        self.dispatcher.dispatch(order.email(), Notification::ShippingNotification(notice)).await;
        Ok(order)
    }

    #[instrument(name = "orders::deliver", skip(self))]
    pub async fn deliver(&self, id: &str) -> Result<Order> {
        let mut order = self.get_order(id).await?;
        order.deliver(Utc::now())?;
        self.save(&mut order).await?;
        Ok(order)
    }

    #[instrument(name = "orders::cancel", skip(self))]
    pub async fn cancel(&self, id: &str) -> Result<Order> {
        let mut order = self.get_order(id).await?;
        order.cancel(Utc::now())?;
        self.save(&mut order).await?;
        Ok(order)
    }

    /// Records the admin's verdict on uploaded artwork and tells the customer.
    #[instrument(name = "orders::review_artwork", skip(self, notes))]
    pub async fn review_artwork(&self, id: &str, decision: ArtworkDecision, notes: Option<String>) -> Result<Order> {
        let mut order = self.get_order(id).await?;
        order.review_artwork(decision, notes, Utc::now())?;
        self.save(&mut order).await?;

        let data = ArtworkReviewData {
            order_id: order.id().to_string(),
            notes: order.artwork().and_then(|a| a.notes.clone()).unwrap_or_else(|| "No further notes.".to_string()),
        };
        let notice = match decision {
            ArtworkDecision::Approve => Notification::CustomArtworkMockup(data),
            ArtworkDecision::RequestChanges => Notification::CustomArtworkChangesRequested(data),
            ArtworkDecision::Reject => Notification::CustomArtworkRejected(data),
        };
        self.dispatcher.dispatch(order.email(), notice).await;
        Ok(order)
    }

    #[instrument(name = "orders::resubmit_artwork", skip(self))]
    pub async fn resubmit_artwork(&self, id: &str, artwork_url: Option<String>) -> Result<Order> {
        let mut order = self.get_order(id).await?;
        order.resubmit_artwork(artwork_url, Utc::now())?;
        self.save(&mut order).await?;
        Ok(order)
    }

    /// Versioned write, then side effects for whatever the order recorded.
    async fn save(&self, order: &mut Order) -> Result<()> {
        self.orders.update_order(order).await?;
        for event in order.take_events() {
            let DomainEvent::Order(event) = event else { continue };
            info!(?event, "order updated");
            if let OrderEvent::Cancelled { order_id, restock: true } = event {
                let lines: Vec<(String, u32)> = order.items().iter().map(|i| (i.product_id.clone(), i.quantity)).collect();
                if let Err(e) = self.inventory.restore(&lines).await {
                    error!(%order_id, error = %e, "could not restore stock for cancelled order");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Address, ArtworkStatus, Customization, OrderItem, OrderStatus, Product};
    use crate::domain::pricing::PricingPolicy;
    use crate::domain::value_objects::{EmailAddress, Money};
    use crate::inventory::InventorySettings;
    use crate::notifications::TemplateName;
    use crate::store::{CatalogStore, MemoryStore};
    use rust_decimal_macros::dec;

    async fn setup() -> (Arc<MemoryStore>, OrderService) {
        let store = Arc::new(MemoryStore::new());
        store.insert_product(&Product::create("Tee", Money::gbp(dec!(15)), "clothing").with_id("T").with_stock(20)).await.unwrap();
        let dispatcher = NotificationDispatcher::new(store.clone());
        let inventory = InventoryService::new(store.clone(), store.clone(), dispatcher.clone(), InventorySettings {
            low_stock_threshold: 10,
            admin_email: EmailAddress::parse("admin@customiseme.co.uk").unwrap(),
            storefront_url: "https://customiseme.co.uk".into(),
        });
        (store.clone(), OrderService::new(store, inventory, dispatcher))
    }

    /// Inserts an order for 2 x T, optionally paid with stock already taken.
    async fn seed(store: &MemoryStore, artwork: bool, paid: bool) -> String {
        let customization = Customization { artwork_url: artwork.then(|| "https://cdn.example.com/art.png".to_string()), ..Default::default() };
        let items = vec![OrderItem { product_id: "T".into(), name: "Tee".into(), quantity: 2, unit_price: Money::gbp(dec!(15)), customization }];
        let totals = PricingPolicy::default().price(&items).unwrap();
        let mut order = Order::place(EmailAddress::parse("jo@example.com").unwrap(), items, totals, Address::default()).unwrap();
        order.attach_payment_intent("pi_1").unwrap();
        if paid {
            order.mark_paid("pi_1", Utc::now()).unwrap();
            store.apply_stock(&[crate::inventory::StockOperation::subtract("T", 2)]).await.unwrap();
            order.mark_stock_committed();
        }
        store.insert_order(&mut order).await.unwrap();
        order.id().to_string()
    }

    async fn templates(store: &MemoryStore) -> Vec<TemplateName> {
        store.outbox().await.into_iter().map(|m| m.template).collect()
    }

    #[tokio::test]
    async fn test_fulfilment_flow() {
        let (store, svc) = setup().await;
        let id = seed(&store, false, true).await;

        assert!(matches!(svc.ship(&id, "").await, Err(CommerceError::Validation(_))));
        let shipped = svc.ship(&id, "RM123456GB").await.unwrap();
        assert_eq!(shipped.status(), OrderStatus::Shipped);
        let outbox = store.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert!(outbox[0].text.contains("RM123456GB"));

        let delivered = svc.deliver(&id).await.unwrap();
        assert!(delivered.delivered_at().is_some());
        assert!(matches!(svc.ship(&id, "RM1").await, Err(CommerceError::InvalidTransition { .. })));
        assert_eq!(svc.get_order(&id).await.unwrap().version(), 3);
    }

    #[tokio::test]
    async fn test_cancel_only_unpaid_orders() {
        let (store, svc) = setup().await;
        let pending = seed(&store, false, false).await;
        assert_eq!(svc.cancel(&pending).await.unwrap().status(), OrderStatus::Cancelled);

        let paid = seed(&store, false, true).await;
        assert!(matches!(svc.cancel(&paid).await, Err(CommerceError::InvalidTransition { .. })));
        assert!(matches!(svc.cancel("missing").await, Err(CommerceError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_artwork_must_be_approved_before_shipping() {
        let (store, svc) = setup().await;
        let id = seed(&store, true, true).await;
        assert!(matches!(svc.ship(&id, "RM1").await, Err(CommerceError::InvalidTransition { .. })));

        svc.review_artwork(&id, ArtworkDecision::RequestChanges, Some("Logo is blurry".into())).await.unwrap();
        let order = svc.resubmit_artwork(&id, Some("https://cdn.example.com/art-v2.png".into())).await.unwrap();
        assert_eq!(order.artwork().unwrap().status, ArtworkStatus::Submitted);
        assert_eq!(order.items()[0].customization.artwork_url.as_deref(), Some("https://cdn.example.com/art-v2.png"));

        svc.review_artwork(&id, ArtworkDecision::Approve, None).await.unwrap();
        svc.ship(&id, "RM1").await.unwrap();
        assert_eq!(
            templates(&store).await,
            vec![TemplateName::CustomArtworkChangesRequested, TemplateName::CustomArtworkMockup, TemplateName::ShippingNotification]
        );
        assert!(store.outbox().await[0].text.contains("Logo is blurry"));
    }

    #[tokio::test]
    async fn test_rejected_artwork_cancels_and_restores_stock() {
        let (store, svc) = setup().await;
        let id = seed(&store, true, true).await;
        assert_eq!(store.get_product("T").await.unwrap().unwrap().stock(), 18);

        let order = svc.review_artwork(&id, ArtworkDecision::Reject, Some("Copyrighted image".into())).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(!order.stock_committed());
        assert_eq!(store.get_product("T").await.unwrap().unwrap().stock(), 20);
        assert_eq!(templates(&store).await, vec![TemplateName::CustomArtworkRejected]);

        assert!(svc.review_artwork(&id, ArtworkDecision::Approve, None).await.is_err());
    }

    #[tokio::test]
    async fn test_rejecting_unpaid_artwork_leaves_stock_alone() {
        let (store, svc) = setup().await;
        let id = seed(&store, true, false).await;
        svc.review_artwork(&id, ArtworkDecision::Reject, None).await.unwrap();
        assert_eq!(store.get_product("T").await.unwrap().unwrap().stock(), 20);
    }
}
