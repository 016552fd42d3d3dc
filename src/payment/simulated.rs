//! In-process stand-in for the processor, used in development and tests.
//!
//! Intents start in `requires_payment_method`; [`SimulatedProcessor::settle`]
//! plays the part of the customer completing payment.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;
use crate::payment::{CreateIntent, IntentStatus, PaymentGateway, PaymentIntent};
use crate::{CommerceError, Result};

#[derive(Default)]
pub struct SimulatedProcessor {
    intents: RwLock<HashMap<String, PaymentIntent>>,
}

impl SimulatedProcessor {
    pub fn new() -> Self { Self::default() }

    pub async fn settle(&self, intent_id: &str) -> Result<PaymentIntent> {
        self.set_status(intent_id, IntentStatus::Succeeded).await
    }

    pub async fn set_status(&self, intent_id: &str, status: IntentStatus) -> Result<PaymentIntent> {
        let mut intents = self.intents.write().await;
        let intent = intents.get_mut(intent_id).ok_or_else(|| CommerceError::PaymentVerificationFailed(format!("unknown payment intent {intent_id}")))?;
        intent.status = status;
        info!(intent_id, ?status, "simulated intent updated");
        Ok(intent.clone())
    }

    /// Overrides the stored amount, e.g. to model a tampered intent.
    pub async fn set_amount(&self, intent_id: &str, amount_minor: i64) -> Result<()> {
        let mut intents = self.intents.write().await;
        let intent = intents.get_mut(intent_id).ok_or_else(|| CommerceError::PaymentVerificationFailed(format!("unknown payment intent {intent_id}")))?;
        intent.amount_minor = amount_minor;
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedProcessor {
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent> {
        if request.amount_minor <= 0 {
            return Err(CommerceError::Payment("amount must be greater than zero".into()));
        }
        let id = format!("pi_sim_{}", Uuid::new_v4().simple());
        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret_{}", Uuid::new_v4().simple())),
            id,
            amount_minor: request.amount_minor,
            currency: request.currency.to_lowercase(),
            status: IntentStatus::RequiresPaymentMethod,
        };
        self.intents.write().await.insert(intent.id.clone(), intent.clone());
        info!(intent_id = %intent.id, order_id = %request.order_id, "simulated intent created");
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        self.intents
            .read()
            .await
            .get(intent_id)
            .cloned()
            .ok_or_else(|| CommerceError::PaymentVerificationFailed(format!("unknown payment intent {intent_id}")))
    }
}
