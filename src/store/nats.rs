//! Publishes outbound mail onto a NATS subject for the delivery worker.

use async_trait::async_trait;
use tracing::debug;
use crate::notifications::OutboundMail;
use crate::store::MailQueue;
use crate::{CommerceError, Result};

pub const DEFAULT_MAIL_SUBJECT: &str = "customiseme.mail.outbound";

#[derive(Clone)]
pub struct NatsMailQueue {
    client: async_nats::Client,
    subject: String,
}

impl NatsMailQueue {
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self { client, subject: subject.into() }
    }

    pub async fn connect(url: &str, subject: impl Into<String>) -> Result<Self> {
        let client = async_nats::connect(url).await.map_err(|e| CommerceError::MailQueue(e.to_string()))?;
        Ok(Self::new(client, subject))
    }
}

#[async_trait]
impl MailQueue for NatsMailQueue {
    async fn enqueue(&self, mail: &OutboundMail) -> Result<()> {
        let payload = serde_json::to_vec(mail)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| CommerceError::MailQueue(e.to_string()))?;
        debug!(mail_id = %mail.id, subject = %self.subject, "mail published");
        Ok(())
    }
}
