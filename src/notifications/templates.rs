//! The closed set of customer and staff notifications.
//!
//! Each template has a typed data record; the record is serialised and fed
//! to [`render`](super::render::render) together with the template text.

use serde::{Deserialize, Serialize};
use std::fmt;
use crate::domain::aggregates::{CartItem, OrderItem};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateName {
    OrderConfirmation,
    ShippingNotification,
    LowStockAlert,
    RestockNotification,
    AbandonedCart,
    AbandonedCartDiscount,
    ReviewRequest,
    CustomArtworkMockup,
    CustomArtworkChangesRequested,
    CustomArtworkRejected,
}

impl TemplateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderConfirmation => "order-confirmation",
            Self::ShippingNotification => "shipping-notification",
            Self::LowStockAlert => "low-stock-alert",
            Self::RestockNotification => "restock-notification",
            Self::AbandonedCart => "abandoned-cart",
            Self::AbandonedCartDiscount => "abandoned-cart-discount",
            Self::ReviewRequest => "review-request",
            Self::CustomArtworkMockup => "custom-artwork-mockup",
            Self::CustomArtworkChangesRequested => "custom-artwork-changes-requested",
            Self::CustomArtworkRejected => "custom-artwork-rejected",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::OrderConfirmation => "Order confirmed - #{{order_id}}",
            Self::ShippingNotification => "Your order #{{order_id}} is on its way",
            Self::LowStockAlert => "Low stock: {{product_name}} ({{remaining}} left)",
            Self::RestockNotification => "{{product_name}} is back in stock",
            Self::AbandonedCart => "You left something in your basket",
            Self::AbandonedCartDiscount => "Still thinking? Here's {{discount_code}} off your basket",
            Self::ReviewRequest => "How are you getting on with your {{product_name}}?",
            Self::CustomArtworkMockup => "Your mockup for order #{{order_id}} is approved",
            Self::CustomArtworkChangesRequested => "Changes needed on your artwork for order #{{order_id}}",
            Self::CustomArtworkRejected => "We can't print the artwork for order #{{order_id}}",
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            Self::OrderConfirmation => concat!(
                "Thanks for your order #{{order_id}}.\n\n",
                "{{#each items}}{{quantity}} x {{name}} @ {{unit_price}} = {{line_total}}\n{{/each}}\n",
                "Subtotal: {{subtotal}}\nShipping: {{shipping}}\nTax: {{tax}}\nTotal: {{total}}\n",
            ),
            Self::ShippingNotification => concat!(
                "Good news - order #{{order_id}} has shipped.\n",
                "Tracking reference: {{tracking_reference}}\n",
            ),
            Self::LowStockAlert => concat!(
                "{{product_name}} ({{product_id}}) has dropped to {{remaining}} units, ",
                "below the alert level of {{threshold}}.\n",
            ),
            Self::RestockNotification => concat!(
                "{{product_name}} is available again ({{available}} in stock).\n",
                "Grab yours: {{product_url}}\n",
            ),
            Self::AbandonedCart => concat!(
                "Your basket is waiting for you:\n\n",
                "{{#each items}}{{quantity}} x {{name}} - {{line_total}}\n{{/each}}\n",
                "Subtotal: {{subtotal}}\nPick up where you left off: {{cart_url}}\n",
            ),
            Self::AbandonedCartDiscount => concat!(
                "Your basket is still saved:\n\n",
                "{{#each items}}{{quantity}} x {{name}} - {{line_total}}\n{{/each}}\n",
                "Use code {{discount_code}} at checkout: {{cart_url}}\n",
            ),
            Self::ReviewRequest => concat!(
                "We hope you're enjoying your {{product_name}} from order #{{order_id}}.\n",
                "Leave a review: {{review_url}}\n",
            ),
            Self::CustomArtworkMockup => concat!(
                "Our designers have approved the mockup for order #{{order_id}}.\n",
                "Notes: {{notes}}\n",
            ),
            Self::CustomArtworkChangesRequested => concat!(
                "Our designers need a few changes to the artwork for order #{{order_id}}.\n",
                "Notes: {{notes}}\n",
                "Reply to this email with updated artwork and we'll take another look.\n",
            ),
            Self::CustomArtworkRejected => concat!(
                "Unfortunately we can't print the artwork supplied for order #{{order_id}}, ",
                "so the order has been cancelled.\n",
                "Notes: {{notes}}\n",
            ),
        }
    }
}

impl fmt::Display for TemplateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Pre-formatted line for item listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineData { pub name: String, pub quantity: u32, pub unit_price: String, pub line_total: String }

impl From<&OrderItem> for LineData {
    fn from(item: &OrderItem) -> Self {
        Self { name: item.name.clone(), quantity: item.quantity, unit_price: item.unit_price.to_string(), line_total: item.line_total().to_string() }
    }
}

impl From<&CartItem> for LineData {
    fn from(item: &CartItem) -> Self {
        Self { name: item.name.clone(), quantity: item.quantity, unit_price: item.unit_price.to_string(), line_total: item.line_total().to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderConfirmationData {
    pub order_id: String,
    pub items: Vec<LineData>,
    pub subtotal: String,
    pub shipping: String,
    pub tax: String,
    pub total: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShippingData { pub order_id: String, pub tracking_reference: String }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LowStockData { pub product_id: String, pub product_name: String, pub remaining: u32, pub threshold: u32 }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RestockData { pub product_id: String, pub product_name: String, pub available: u32, pub product_url: String }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AbandonedCartData { pub cart_id: String, pub items: Vec<LineData>, pub subtotal: String, pub cart_url: String }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AbandonedCartDiscountData {
    pub cart_id: String,
    pub items: Vec<LineData>,
    pub subtotal: String,
    pub cart_url: String,
    pub discount_code: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReviewRequestData { pub order_id: String, pub product_id: String, pub product_name: String, pub review_url: String }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtworkReviewData { pub order_id: String, pub notes: String }

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    OrderConfirmation(OrderConfirmationData),
    ShippingNotification(ShippingData),
    LowStockAlert(LowStockData),
    RestockNotification(RestockData),
    AbandonedCart(AbandonedCartData),
    AbandonedCartDiscount(AbandonedCartDiscountData),
    ReviewRequest(ReviewRequestData),
    CustomArtworkMockup(ArtworkReviewData),
    CustomArtworkChangesRequested(ArtworkReviewData),
    CustomArtworkRejected(ArtworkReviewData),
}

impl Notification {
    pub fn template(&self) -> TemplateName {
        match self {
            Self::OrderConfirmation(_) => TemplateName::OrderConfirmation,
            Self::ShippingNotification(_) => TemplateName::ShippingNotification,
            Self::LowStockAlert(_) => TemplateName::LowStockAlert,
            Self::RestockNotification(_) => TemplateName::RestockNotification,
            Self::AbandonedCart(_) => TemplateName::AbandonedCart,
            Self::AbandonedCartDiscount(_) => TemplateName::AbandonedCartDiscount,
            Self::ReviewRequest(_) => TemplateName::ReviewRequest,
            Self::CustomArtworkMockup(_) => TemplateName::CustomArtworkMockup,
            Self::CustomArtworkChangesRequested(_) => TemplateName::CustomArtworkChangesRequested,
            Self::CustomArtworkRejected(_) => TemplateName::CustomArtworkRejected,
        }
    }

    pub fn data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::OrderConfirmation(d) => serde_json::to_value(d),
            Self::ShippingNotification(d) => serde_json::to_value(d),
            Self::LowStockAlert(d) => serde_json::to_value(d),
            Self::RestockNotification(d) => serde_json::to_value(d),
            Self::AbandonedCart(d) => serde_json::to_value(d),
            Self::AbandonedCartDiscount(d) => serde_json::to_value(d),
            Self::ReviewRequest(d) => serde_json::to_value(d),
            Self::CustomArtworkMockup(d) | Self::CustomArtworkChangesRequested(d) | Self::CustomArtworkRejected(d) => serde_json::to_value(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::render::render;

    #[test]
    fn test_every_template_renders_without_leftover_placeholders() {
        let lines = vec![LineData { name: "Mug".into(), quantity: 2, unit_price: "£10.00".into(), line_total: "£20.00".into() }];
        let samples = vec![
            Notification::OrderConfirmation(OrderConfirmationData {
                order_id: "A1".into(), items: lines.clone(), subtotal: "£20.00".into(), shipping: "£4.99".into(), tax: "£0.00".into(), total: "£24.99".into(),
            }),
            Notification::ShippingNotification(ShippingData { order_id: "A1".into(), tracking_reference: "RM1".into() }),
            Notification::LowStockAlert(LowStockData { product_id: "P1".into(), product_name: "Mug".into(), remaining: 9, threshold: 10 }),
            Notification::RestockNotification(RestockData { product_id: "P1".into(), product_name: "Mug".into(), available: 5, product_url: "https://shop/p/P1".into() }),
            Notification::AbandonedCart(AbandonedCartData { cart_id: "c1".into(), items: lines.clone(), subtotal: "£20.00".into(), cart_url: "https://shop/cart".into() }),
            Notification::AbandonedCartDiscount(AbandonedCartDiscountData {
                cart_id: "c1".into(), items: lines, subtotal: "£20.00".into(), cart_url: "https://shop/cart".into(), discount_code: "COMEBACK10".into(),
            }),
            Notification::ReviewRequest(ReviewRequestData { order_id: "A1".into(), product_id: "P1".into(), product_name: "Mug".into(), review_url: "https://shop/p/P1#reviews".into() }),
            Notification::CustomArtworkMockup(ArtworkReviewData { order_id: "A1".into(), notes: "Looks great".into() }),
            Notification::CustomArtworkChangesRequested(ArtworkReviewData { order_id: "A1".into(), notes: "Bigger font".into() }),
            Notification::CustomArtworkRejected(ArtworkReviewData { order_id: "A1".into(), notes: "Copyrighted".into() }),
        ];
        for n in samples {
            let data = n.data().unwrap();
            let template = n.template();
            let subject = render(template.subject(), &data);
            let body = render(template.body(), &data);
            assert!(!subject.contains("{{"), "{template} subject: {subject}");
            assert!(!body.contains("{{"), "{template} body: {body}");
        }
    }

    #[test]
    fn test_confirmation_lists_items() {
        let n = Notification::OrderConfirmation(OrderConfirmationData {
            order_id: "A1".into(),
            items: vec![LineData { name: "Mug".into(), quantity: 2, unit_price: "£10.00".into(), line_total: "£20.00".into() }],
            subtotal: "£20.00".into(), shipping: "£4.99".into(), tax: "£0.00".into(), total: "£24.99".into(),
        });
        let body = render(n.template().body(), &n.data().unwrap());
        assert!(body.contains("2 x Mug @ £10.00 = £20.00"));
        assert!(body.contains("Total: £24.99"));
    }
}
