//! Processor callback verification.
//!
//! The `Stripe-Signature` header carries `t=<unix seconds>` and one or more
//! `v1=<hex>` entries, each an HMAC-SHA256 of `"{t}.{body}"` keyed by the
//! endpoint secret.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;
use crate::{CommerceError, Result};

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentSucceeded { intent_id: String },
    PaymentFailed { intent_id: String, reason: Option<String> },
    Ignored { event_type: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData { object: RawObject }

#[derive(Deserialize)]
struct RawObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    last_payment_error: Option<RawPaymentError>,
}

#[derive(Deserialize)]
struct RawPaymentError {
    #[serde(default)]
    message: Option<String>,
}

fn invalid(reason: &str) -> CommerceError { CommerceError::Validation(format!("invalid webhook signature: {reason}")) }

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into(), tolerance_secs: DEFAULT_TOLERANCE_SECS }
    }

    pub fn sign(&self, timestamp: i64, payload: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes()).map_err(|e| CommerceError::Config(e.to_string()))?;
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks the signature header against `payload` at time `now` (unix seconds).
    pub fn verify(&self, payload: &str, header: &str, now: i64) -> Result<()> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or_else(|| invalid("missing timestamp"))?;
        if signatures.is_empty() {
            return Err(invalid("no v1 signature"));
        }
        if (now - timestamp).abs() > self.tolerance_secs {
            return Err(invalid("timestamp outside tolerance"));
        }
        let expected = self.sign(timestamp, payload)?;
        if !signatures.iter().any(|candidate| constant_time_compare(&expected, candidate)) {
            return Err(invalid("signature mismatch"));
        }
        debug!("webhook signature verified");
        Ok(())
    }

    /// Verifies and then decodes the event.
    pub fn parse(&self, payload: &str, header: &str, now: i64) -> Result<WebhookEvent> {
        self.verify(payload, header, now)?;
        let raw: RawEvent = serde_json::from_str(payload).map_err(|e| CommerceError::Validation(format!("malformed webhook payload: {e}")))?;
        let intent_id = || raw.data.object.id.clone().ok_or_else(|| CommerceError::Validation("webhook payload has no object id".into()));
        Ok(match raw.event_type.as_str() {
            "payment_intent.succeeded" => WebhookEvent::PaymentSucceeded { intent_id: intent_id()? },
            "payment_intent.payment_failed" => WebhookEvent::PaymentFailed {
                intent_id: intent_id()?,
                reason: raw.data.object.last_payment_error.as_ref().and_then(|e| e.message.clone()),
            },
            other => WebhookEvent::Ignored { event_type: other.to_string() },
        })
    }
}

/// Constant-time string comparison.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000;

    fn payload(kind: &str) -> String {
        format!(r#"{{"id":"evt_1","type":"{kind}","data":{{"object":{{"id":"pi_42","last_payment_error":{{"message":"card declined"}}}}}}}}"#)
    }

    fn header(verifier: &WebhookVerifier, ts: i64, body: &str) -> String {
        format!("t={ts},v1={}", verifier.sign(ts, body).unwrap())
    }

    #[test]
    fn test_valid_signature_parses_event() {
        let v = WebhookVerifier::new("whsec_test");
        let body = payload("payment_intent.succeeded");
        let event = v.parse(&body, &header(&v, NOW, &body), NOW + 10).unwrap();
        assert_eq!(event, WebhookEvent::PaymentSucceeded { intent_id: "pi_42".into() });
    }

    #[test]
    fn test_failed_and_unrelated_events() {
        let v = WebhookVerifier::new("whsec_test");
        let body = payload("payment_intent.payment_failed");
        let event = v.parse(&body, &header(&v, NOW, &body), NOW).unwrap();
        assert_eq!(event, WebhookEvent::PaymentFailed { intent_id: "pi_42".into(), reason: Some("card declined".into()) });

        let body = payload("charge.refunded");
        let event = v.parse(&body, &header(&v, NOW, &body), NOW).unwrap();
        assert_eq!(event, WebhookEvent::Ignored { event_type: "charge.refunded".into() });
    }

    #[test]
    fn test_tampered_or_stale_requests_rejected() {
        let v = WebhookVerifier::new("whsec_test");
        let body = payload("payment_intent.succeeded");
        let good = header(&v, NOW, &body);

        assert!(v.verify(&body.replace("pi_42", "pi_43"), &good, NOW).is_err());
        assert!(v.verify(&body, &good, NOW + DEFAULT_TOLERANCE_SECS + 1).is_err());
        assert!(v.verify(&body, "v1=abc", NOW).is_err());
        assert!(v.verify(&body, &format!("t={NOW}"), NOW).is_err());
        assert!(WebhookVerifier::new("other").verify(&body, &good, NOW).is_err());
    }

    #[test]
    fn test_any_matching_v1_entry_accepted() {
        let v = WebhookVerifier::new("whsec_test");
        let body = payload("payment_intent.succeeded");
        let sig = v.sign(NOW, &body).unwrap();
        assert!(v.verify(&body, &format!("t={NOW},v1=deadbeef,v1={sig},v0=ignored"), NOW).is_ok());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "hell"));
        assert!(!constant_time_compare("hello", "world"));
    }
}
