//! Notification rendering and dispatch.

pub mod dispatcher;
pub mod render;
pub mod templates;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::EmailAddress;

pub use dispatcher::NotificationDispatcher;
pub use templates::{Notification, TemplateName};

/// One item on the outbound mail queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMail {
    pub id: String,
    pub to: EmailAddress,
    pub template: TemplateName,
    pub data: serde_json::Value,
    pub subject: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl OutboundMail {
    pub fn render(to: &EmailAddress, notification: &Notification) -> serde_json::Result<Self> {
        let template = notification.template();
        let data = notification.data()?;
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            to: to.clone(),
            template,
            subject: render::render(template.subject(), &data),
            text: render::render(template.body(), &data),
            data,
            created_at: Utc::now(),
        })
    }
}
