//! Payment processor seam.

pub mod simulated;
pub mod stripe;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::Result;

pub use simulated::SimulatedProcessor;
pub use stripe::StripeGateway;
pub use webhook::{WebhookEvent, WebhookVerifier};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Amount in minor units (pence for GBP).
    #[serde(rename = "amount")]
    pub amount_minor: i64,
    pub currency: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateIntent {
    pub amount_minor: i64,
    pub currency: String,
    pub order_id: String,
    pub receipt_email: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent>;
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent>;
}
