//! Checkout and processor callback endpoints.

use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::{json, Value};
use crate::api::extract::Json;
use crate::api::response::{created, ok, ApiResult};
use crate::api::AppState;
use crate::checkout::{CheckoutRequest, CheckoutSession};
use crate::payment::WebhookEvent;

pub async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> ApiResult<CheckoutSession> {
    let session = s.payments.create_checkout(r).await?;
    created("Order created, awaiting payment", session)
}

/// The raw body is needed verbatim for signature verification.
pub async fn webhook(State(s): State<AppState>, headers: HeaderMap, body: String) -> ApiResult<Value> {
    let signature = headers.get("stripe-signature").and_then(|v| v.to_str().ok());
    let event = s.payments.handle_webhook(&body, signature).await?;
    let kind = match event {
        WebhookEvent::PaymentSucceeded { .. } => "payment_succeeded",
        WebhookEvent::PaymentFailed { .. } => "payment_failed",
        WebhookEvent::Ignored { .. } => "ignored",
    };
    ok("Webhook received", json!({"received": true, "event": kind}))
}
