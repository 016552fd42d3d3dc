//! Queues rendered notifications. Delivery belongs to whatever consumes the queue.

use std::sync::Arc;
use tracing::{debug, error, instrument};
use crate::domain::value_objects::EmailAddress;
use crate::notifications::{Notification, OutboundMail};
use crate::store::MailQueue;
use crate::Result;

#[derive(Clone)]
pub struct NotificationDispatcher {
    queue: Arc<dyn MailQueue>,
}

impl NotificationDispatcher {
    pub fn new(queue: Arc<dyn MailQueue>) -> Self { Self { queue } }

    /// Renders and enqueues, returning any failure to the caller.
    #[instrument(name = "notifications::dispatch", skip(self, notification), fields(template = %notification.template()))]
    pub async fn try_dispatch(&self, recipient: &EmailAddress, notification: Notification) -> Result<OutboundMail> {
        let mail = OutboundMail::render(recipient, &notification)?;
        self.queue.enqueue(&mail).await?;
        debug!(mail_id = %mail.id, "notification queued");
        Ok(mail)
    }

    /// Fire-and-forget variant: a failed email must never fail the operation that triggered it.
    pub async fn dispatch(&self, recipient: &EmailAddress, notification: Notification) -> Option<OutboundMail> {
        let template = notification.template();
        match self.try_dispatch(recipient, notification).await {
            Ok(mail) => Some(mail),
            Err(e) => {
                error!(error = %e, %template, "failed to queue notification");
                None
            }
        }
    }
}
