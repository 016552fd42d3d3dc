//! Plain storefront records with no lifecycle of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::EmailAddress;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub product_id: String,
    pub author: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(product_id: impl Into<String>, author: impl Into<String>, rating: u8, comment: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(), product_id: product_id.into(), author: author.into(),
            rating, comment: comment.into(), created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: String,
    pub name: String,
    pub email: EmailAddress,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl ContactMessage {
    pub fn new(name: impl Into<String>, email: EmailAddress, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(), name: name.into(), email, subject: subject.into(),
            message: message.into(), created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub email: EmailAddress,
    pub product_id: String,
    pub added_at: DateTime<Utc>,
}
