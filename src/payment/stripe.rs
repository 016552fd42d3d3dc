//! Stripe REST adapter (PaymentIntents API).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};
use crate::payment::{CreateIntent, PaymentGateway, PaymentIntent};
use crate::{CommerceError, Result};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Deserialize)]
struct StripeErrorBody { error: StripeErrorDetail }

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(secret_key, DEFAULT_API_BASE)
    }

    pub fn with_base_url(secret_key: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(20)).build()?;
        Ok(Self { client, secret_key: secret_key.into(), api_base: api_base.into().trim_end_matches('/').to_string() })
    }

    async fn parse(response: reqwest::Response) -> Result<PaymentIntent> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<PaymentIntent>().await?);
        }
        let detail = match response.json::<StripeErrorBody>().await {
            Ok(body) => format!("{} ({})", body.error.message.unwrap_or_default(), body.error.kind.unwrap_or_default()),
            Err(_) => "unreadable error body".to_string(),
        };
        warn!(%status, %detail, "stripe request failed");
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CommerceError::PaymentVerificationFailed(format!("unknown payment intent: {detail}")));
        }
        Err(CommerceError::Payment(format!("stripe returned {status}: {detail}")))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(name = "stripe::create_intent", skip(self, request), fields(order_id = %request.order_id, amount = request.amount_minor))]
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent> {
        let params = [
            ("amount", request.amount_minor.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("receipt_email", request.receipt_email),
            ("metadata[order_id]", request.order_id.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", format!("order-{}", request.order_id))
            .form(&params)
            .send()
            .await?;
        let intent = Self::parse(response).await?;
        info!(intent_id = %intent.id, "payment intent created");
        Ok(intent)
    }

    #[instrument(name = "stripe::retrieve_intent", skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        if intent_id.is_empty() || !intent_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CommerceError::Validation(format!("malformed payment intent id {intent_id:?}")));
        }
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{intent_id}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::parse(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::IntentStatus;

    #[test]
    fn test_intent_deserialises_from_stripe_shape() {
        let body = r#"{"id":"pi_123","object":"payment_intent","amount":4999,"currency":"gbp","status":"succeeded","client_secret":"pi_123_secret_x","livemode":false}"#;
        let intent: PaymentIntent = serde_json::from_str(body).unwrap();
        assert_eq!(intent.amount_minor, 4999);
        assert_eq!(intent.status, IntentStatus::Succeeded);
    }

    #[test]
    fn test_unknown_status_tolerated() {
        let body = r#"{"id":"pi_1","amount":1,"currency":"gbp","status":"requires_something_new"}"#;
        let intent: PaymentIntent = serde_json::from_str(body).unwrap();
        assert_eq!(intent.status, IntentStatus::Unknown);
        assert!(intent.client_secret.is_none());
    }

    #[tokio::test]
    async fn test_malformed_intent_id_rejected_before_request() {
        let gateway = StripeGateway::with_base_url("sk_test", "http://127.0.0.1:9").unwrap();
        assert!(matches!(gateway.retrieve_intent("../charges").await, Err(CommerceError::Validation(_))));
    }
}
