//! Checkout and payment reconciliation.
//!
//! Prices and stock are always re-read from the catalog; nothing the client
//! sends about money is trusted. Stock is decremented exactly once, when a
//! payment is confirmed, and never at intent creation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;
use crate::domain::aggregates::{Address, Customization, Order, OrderItem, OrderStatus};
use crate::domain::pricing::PricingPolicy;
use crate::domain::value_objects::EmailAddress;
use crate::inventory::InventoryService;
use crate::notifications::templates::{LineData, OrderConfirmationData};
use crate::notifications::{Notification, NotificationDispatcher};
use crate::payment::{CreateIntent, IntentStatus, PaymentGateway, WebhookEvent, WebhookVerifier};
use crate::store::{CartStore, CatalogStore, OrderStore};
use crate::{CommerceError, Result};

const STOCK_FLAG_RETRIES: usize = 3;

/// Largest quantity accepted for one product in a single order.
pub const MAX_LINE_QUANTITY: u32 = 1_000;

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 50))]
    pub items: Vec<CheckoutLine>,
    #[validate]
    pub shipping_address: Address,
    #[serde(default)]
    pub cart_id: Option<String>,
}

/// What the client asks for. Any price it sends is ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub customization: Customization,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckoutSession {
    pub order: Order,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
}

#[derive(Clone, Debug)]
pub enum Confirmation {
    Confirmed(Order),
    /// The order was already past `pending_payment`; nothing was changed.
    AlreadyConfirmed(Order),
}

impl Confirmation {
    pub fn order(&self) -> &Order {
        match self {
            Self::Confirmed(o) | Self::AlreadyConfirmed(o) => o,
        }
    }
}

#[derive(Clone)]
pub struct PaymentAdapter {
    catalog: Arc<dyn CatalogStore>,
    orders: Arc<dyn OrderStore>,
    carts: Arc<dyn CartStore>,
    gateway: Arc<dyn PaymentGateway>,
    inventory: InventoryService,
    dispatcher: NotificationDispatcher,
    pricing: PricingPolicy,
    webhook: Option<WebhookVerifier>,
}

impl PaymentAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        orders: Arc<dyn OrderStore>,
        carts: Arc<dyn CartStore>,
        gateway: Arc<dyn PaymentGateway>,
        inventory: InventoryService,
        dispatcher: NotificationDispatcher,
        pricing: PricingPolicy,
        webhook: Option<WebhookVerifier>,
    ) -> Self {
        Self { catalog, orders, carts, gateway, inventory, dispatcher, pricing, webhook }
    }

    /// Prices the cart from the catalog, opens a payment intent and records a pending order.
    #[instrument(name = "checkout::create", skip(self, request), fields(lines = request.items.len()))]
    pub async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        request.validate()?;
        let email = EmailAddress::parse(&request.email)?;
        if let Some(line) = request.items.iter().find(|l| l.quantity == 0) {
            return Err(CommerceError::Validation(format!("quantity for {} must be greater than zero", line.product_id)));
        }

        let mut requested: HashMap<&str, u32> = HashMap::new();
        for line in &request.items {
            let total = requested.entry(line.product_id.as_str()).or_default();
            *total = total
                .checked_add(line.quantity)
                .filter(|q| *q <= MAX_LINE_QUANTITY)
                .ok_or_else(|| CommerceError::Validation(format!("quantity for {} must not exceed {MAX_LINE_QUANTITY}", line.product_id)))?;
        }

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = self.catalog.get_product(&line.product_id).await?.ok_or_else(|| CommerceError::ProductNotFound(line.product_id.clone()))?;
            let wanted = requested.get(line.product_id.as_str()).copied().unwrap_or(line.quantity);
            if wanted > product.stock() {
                return Err(CommerceError::OutOfStock { product_id: product.id().to_string(), requested: wanted, available: product.stock() });
            }
            product.validate_customization(&line.customization)?;
            if !product.price().currency().eq_ignore_ascii_case(&self.pricing.currency) {
                return Err(CommerceError::Validation(format!("product {} is not priced in {}", product.id(), self.pricing.currency)));
            }
            items.push(OrderItem {
                product_id: product.id().to_string(),
                name: product.name().to_string(),
                quantity: line.quantity,
                unit_price: product.price().clone(),
                customization: line.customization.clone(),
            });
        }

        let totals = self.pricing.price(&items)?;
        let amount_minor = totals.total.to_minor_units()?;
        let mut order = Order::place(email, items, totals, request.shipping_address)?;

        let intent = self
            .gateway
            .create_intent(CreateIntent {
                amount_minor,
                currency: order.total().currency().to_string(),
                order_id: order.id().to_string(),
                receipt_email: order.email().to_string(),
            })
            .await?;
        if intent.amount_minor != amount_minor {
            return Err(CommerceError::Payment(format!("processor created intent for {} instead of {amount_minor}", intent.amount_minor)));
        }
        order.attach_payment_intent(&intent.id)?;
        if let Err(e) = self.orders.insert_order(&mut order).await {
            error!(order_id = %order.id(), intent_id = %intent.id, error = %e, "order not stored, payment intent left without an order");
            return Err(e);
        }
        for event in order.take_events() {
            debug!(?event, "order event");
        }

        if let Some(cart_id) = request.cart_id.as_deref() {
            if let Err(e) = self.carts.delete_cart(cart_id).await {
                warn!(error = %e, cart_id, "could not remove cart after checkout");
            }
        }

        info!(order_id = %order.id(), intent_id = %intent.id, total = %order.total(), "checkout created");
        Ok(CheckoutSession { order, payment_intent_id: intent.id, client_secret: intent.client_secret })
    }

    /// Verifies the intent with the processor and, on success, moves the order to `paid`.
    ///
    /// Only the caller that wins the versioned write decrements stock, so a
    /// redelivered webhook racing a client-side confirmation cannot double count.
    #[instrument(name = "checkout::confirm", skip(self))]
    pub async fn confirm_payment(&self, intent_id: &str) -> Result<Confirmation> {
        let mut order = self
            .orders
            .find_by_payment_intent(intent_id)
            .await?
            .ok_or_else(|| CommerceError::OrderNotFound(format!("no order for payment intent {intent_id}")))?;
        if let Some(done) = already_settled(order.clone())? {
            return Ok(done);
        }

        let intent = self.gateway.retrieve_intent(intent_id).await?;
        if intent.status != IntentStatus::Succeeded {
            return Err(CommerceError::PaymentVerificationFailed(format!("payment intent status is {:?}", intent.status)));
        }
        let expected = order.total().to_minor_units()?;
        if intent.amount_minor != expected || !intent.currency.eq_ignore_ascii_case(order.total().currency()) {
            error!(order_id = %order.id(), expected, received = intent.amount_minor, "payment amount mismatch");
            return Err(CommerceError::PaymentVerificationFailed("payment amount does not match order total".into()));
        }

        order.mark_paid(intent_id, Utc::now())?;
        match self.orders.update_order(&mut order).await {
            Ok(()) => {}
            Err(CommerceError::Conflict(_)) => {
                let current = self.orders.get_order(order.id()).await?.ok_or_else(|| CommerceError::OrderNotFound(order.id().to_string()))?;
                return already_settled(current)?.ok_or_else(|| CommerceError::Conflict(format!("order {} changed during confirmation", order.id())));
            }
            Err(e) => return Err(e),
        }
        order.take_events();
        info!(order_id = %order.id(), "order paid");

        let lines: Vec<(String, u32)> = order.items().iter().map(|i| (i.product_id.clone(), i.quantity)).collect();
        match self.inventory.decrement(&lines).await {
            Ok(_) => order = self.flag_stock_committed(order).await,
            Err(e) => error!(order_id = %order.id(), error = %e, "stock not committed for paid order, needs manual reconciliation"),
        }

        self.dispatcher.dispatch(order.email(), confirmation_notice(&order)).await;
        Ok(Confirmation::Confirmed(order))
    }

    async fn flag_stock_committed(&self, mut order: Order) -> Order {
        for _ in 0..STOCK_FLAG_RETRIES {
            order.mark_stock_committed();
            match self.orders.update_order(&mut order).await {
                Ok(()) => return order,
                Err(CommerceError::Conflict(_)) => match self.orders.get_order(order.id()).await {
                    Ok(Some(fresh)) => order = fresh,
                    _ => break,
                },
                Err(e) => {
                    error!(order_id = %order.id(), error = %e, "could not record stock commitment");
                    return order;
                }
            }
        }
        error!(order_id = %order.id(), "gave up recording stock commitment");
        order
    }

    /// Verifies and acts on a processor callback.
    #[instrument(name = "checkout::webhook", skip_all)]
    pub async fn handle_webhook(&self, payload: &str, signature: Option<&str>) -> Result<WebhookEvent> {
        let verifier = self.webhook.as_ref().ok_or_else(|| CommerceError::Config("webhook secret is not configured".into()))?;
        let signature = signature.ok_or_else(|| CommerceError::Validation("missing Stripe-Signature header".into()))?;
        let event = verifier.parse(payload, signature, Utc::now().timestamp())?;
        match &event {
            WebhookEvent::PaymentSucceeded { intent_id } => {
                self.confirm_payment(intent_id).await?;
            }
            WebhookEvent::PaymentFailed { intent_id, reason } => {
                warn!(%intent_id, reason = reason.as_deref().unwrap_or("unknown"), "payment failed, order stays pending");
            }
            WebhookEvent::Ignored { event_type } => debug!(%event_type, "webhook event ignored"),
        }
        Ok(event)
    }
}

fn already_settled(order: Order) -> Result<Option<Confirmation>> {
    match order.status() {
        OrderStatus::PendingPayment => Ok(None),
        OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered => {
            info!(order_id = %order.id(), "payment already confirmed");
            Ok(Some(Confirmation::AlreadyConfirmed(order)))
        }
        OrderStatus::Cancelled => Err(CommerceError::InvalidTransition { from: OrderStatus::Cancelled.to_string(), to: OrderStatus::Paid.to_string() }),
    }
}

fn confirmation_notice(order: &Order) -> Notification {
    Notification::OrderConfirmation(OrderConfirmationData {
        order_id: order.id().to_string(),
        items: order.items().iter().map(LineData::from).collect(),
        subtotal: order.subtotal().to_string(),
        shipping: order.shipping().to_string(),
        tax: order.tax().to_string(),
        total: order.total().to_string(),
    })
}
