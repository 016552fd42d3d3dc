//! Periodic sweeps: abandoned-cart reminders and post-delivery review requests.
//!
//! Each sweep takes `now` explicitly so it can be driven from tests. Mail is
//! queued before the document is flagged, so a crash in between means the
//! customer may hear from us twice but never zero times.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};
use crate::domain::aggregates::{Cart, Order};
use crate::domain::value_objects::EmailAddress;
use crate::notifications::templates::{AbandonedCartData, AbandonedCartDiscountData, LineData, ReviewRequestData};
use crate::notifications::{Notification, NotificationDispatcher};
use crate::store::{CartStore, OrderStore};
use crate::Result;

#[derive(Clone, Debug)]
pub struct SweepSettings {
    pub abandoned_cart_delay: Duration,
    pub discount_followup_delay: Duration,
    pub discount_code: String,
    pub review_request_delay: Duration,
    pub cart_sweep_interval: std::time::Duration,
    pub review_sweep_interval: std::time::Duration,
    pub storefront_url: String,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            abandoned_cart_delay: Duration::minutes(30),
            discount_followup_delay: Duration::hours(24),
            discount_code: "COMEBACK10".to_string(),
            review_request_delay: Duration::days(7),
            cart_sweep_interval: std::time::Duration::from_secs(30 * 60),
            review_sweep_interval: std::time::Duration::from_secs(24 * 3600),
            storefront_url: "https://customiseme.co.uk".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CartSweepReport {
    pub reminders: SweepReport,
    pub discounts: SweepReport,
}

#[derive(Clone)]
pub struct Scheduler {
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    dispatcher: NotificationDispatcher,
    settings: SweepSettings,
}

impl Scheduler {
    pub fn new(carts: Arc<dyn CartStore>, orders: Arc<dyn OrderStore>, dispatcher: NotificationDispatcher, settings: SweepSettings) -> Self {
        Self { carts, orders, dispatcher, settings }
    }

    fn storefront(&self) -> &str { self.settings.storefront_url.trim_end_matches('/') }

    #[instrument(name = "scheduler::abandoned_carts", skip(self))]
    pub async fn abandoned_cart_sweep(&self, now: DateTime<Utc>) -> Result<CartSweepReport> {
        let mut report = CartSweepReport::default();

        let idle = self.carts.idle_carts_before(now - self.settings.abandoned_cart_delay).await?;
        for cart in idle.iter().filter(|c| c.is_abandoned(now, self.settings.abandoned_cart_delay)) {
            report.reminders.examined += 1;
            let Some(email) = cart.email() else { continue };
            let notice = Notification::AbandonedCart(AbandonedCartData {
                cart_id: cart.id().to_string(),
                items: cart.items().iter().map(LineData::from).collect(),
                subtotal: cart.subtotal().to_string(),
                cart_url: self.cart_url(cart),
            });
            if self.send_then_flag(email, notice, self.carts.mark_reminder_sent(cart.id(), cart.updated_at(), now)).await {
                report.reminders.sent += 1;
            } else {
                report.reminders.failed += 1;
            }
        }

        let reminded = self.carts.reminded_carts_before(now - self.settings.discount_followup_delay).await?;
        for cart in reminded.iter().filter(|c| c.is_discount_due(now, self.settings.discount_followup_delay)) {
            report.discounts.examined += 1;
            let Some(email) = cart.email() else { continue };
            let notice = Notification::AbandonedCartDiscount(AbandonedCartDiscountData {
                cart_id: cart.id().to_string(),
                items: cart.items().iter().map(LineData::from).collect(),
                subtotal: cart.subtotal().to_string(),
                cart_url: self.cart_url(cart),
                discount_code: self.settings.discount_code.clone(),
            });
            if self.send_then_flag(email, notice, self.carts.mark_discount_sent(cart.id(), cart.updated_at(), now)).await {
                report.discounts.sent += 1;
            } else {
                report.discounts.failed += 1;
            }
        }

        info!(?report, "abandoned cart sweep finished");
        Ok(report)
    }

    #[instrument(name = "scheduler::review_requests", skip(self))]
    pub async fn review_request_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let due = self.orders.delivered_unreviewed_before(now - self.settings.review_request_delay).await?;
        for mut order in due.into_iter().filter(|o| o.is_review_due(now, self.settings.review_request_delay)) {
            report.examined += 1;
            match self.request_review(&mut order).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!(order_id = %order.id(), error = %e, "review request failed, will retry next run");
                    report.failed += 1;
                }
            }
        }
        info!(?report, "review request sweep finished");
        Ok(report)
    }

    async fn request_review(&self, order: &mut Order) -> Result<()> {
        let Some(item) = order.items().first() else { return Ok(()) };
        let notice = Notification::ReviewRequest(ReviewRequestData {
            order_id: order.id().to_string(),
            product_id: item.product_id.clone(),
            product_name: item.name.clone(),
            review_url: format!("{}/products/{}/reviews?order={}", self.storefront(), item.product_id, order.id()),
        });
        self.dispatcher.try_dispatch(order.email(), notice).await?;
        order.mark_review_requested();
        self.orders.update_order(order).await
    }

    async fn send_then_flag(&self, to: &EmailAddress, notice: Notification, flag: impl std::future::Future<Output = Result<bool>>) -> bool {
        if let Err(e) = self.dispatcher.try_dispatch(to, notice).await {
            warn!(error = %e, "cart reminder not queued, will retry next run");
            return false;
        }
        match flag.await {
            Ok(true) => true,
            Ok(false) => {
                info!("cart changed while its reminder was queued, left unflagged for the new contents");
                true
            }
            Err(e) => {
                error!(error = %e, "cart reminder queued but flag not saved");
                false
            }
        }
    }

    fn cart_url(&self, cart: &Cart) -> String { format!("{}/cart/{}", self.storefront(), cart.id()) }

    /// Runs both sweeps on their intervals until the runtime shuts down.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let carts = self.clone();
        let cart_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(carts.settings.cart_sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = carts.abandoned_cart_sweep(Utc::now()).await {
                    error!(error = %e, "abandoned cart sweep aborted");
                }
            }
        });
        let reviews = self;
        let review_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reviews.settings.review_sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = reviews.review_request_sweep(Utc::now()).await {
                    error!(error = %e, "review request sweep aborted");
                }
            }
        });
        vec![cart_task, review_task]
    }
}
