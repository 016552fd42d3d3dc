//! Service configuration loaded from environment variables.
//!
//! `ADMIN_API_KEY` is the only required variable. Without `DATABASE_URL` the
//! service runs on the in-memory store, and without `STRIPE_SECRET_KEY` it
//! uses the simulated payment processor.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use crate::domain::pricing::PricingPolicy;
use crate::domain::value_objects::EmailAddress;
use crate::inventory::{InventorySettings, DEFAULT_LOW_STOCK_THRESHOLD};
use crate::scheduler::SweepSettings;
use crate::store::nats::DEFAULT_MAIL_SUBJECT;
use crate::{CommerceError, Result};

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub mail_subject: String,
    pub admin_api_key: String,
    pub admin_email: EmailAddress,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub storefront_url: String,
    pub pricing: PricingPolicy,
    pub low_stock_threshold: u32,
    pub abandoned_cart_delay_minutes: i64,
    pub discount_followup_hours: i64,
    pub discount_code: String,
    pub review_request_delay_days: i64,
    pub cart_sweep_interval_minutes: u64,
    pub review_sweep_interval_hours: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("nats_url", &self.nats_url)
            .field("mail_subject", &self.mail_subject)
            .field("admin_api_key", &"[REDACTED]")
            .field("admin_email", &self.admin_email)
            .field("stripe_secret_key", &self.stripe_secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("stripe_webhook_secret", &self.stripe_webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .field("storefront_url", &self.storefront_url)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let admin_api_key = get("ADMIN_API_KEY").ok_or_else(|| CommerceError::Config("missing environment variable ADMIN_API_KEY".into()))?;
        let admin_email = EmailAddress::parse(get("ADMIN_EMAIL").unwrap_or_else(|| "admin@customiseme.co.uk".into()))
            .map_err(|e| CommerceError::Config(format!("invalid ADMIN_EMAIL: {e}")))?;

        let pricing = PricingPolicy {
            currency: get("CURRENCY").unwrap_or_else(|| "GBP".into()).to_uppercase(),
            shipping_flat_fee: parse_or(&get, "SHIPPING_FLAT_FEE", Decimal::new(499, 2))?,
            free_shipping_threshold: parse_or(&get, "FREE_SHIPPING_THRESHOLD", Decimal::new(100, 0))?,
            tax_rate: parse_or(&get, "TAX_RATE", Decimal::ZERO)?,
        };
        if pricing.tax_rate.is_sign_negative() || pricing.shipping_flat_fee.is_sign_negative() {
            return Err(CommerceError::Config("TAX_RATE and SHIPPING_FLAT_FEE must not be negative".into()));
        }

        let config = Self {
            port: parse_or(&get, "PORT", 8083)?,
            environment: get("APP_ENV").unwrap_or_else(|| "development".into()),
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            mail_subject: get("MAIL_SUBJECT").unwrap_or_else(|| DEFAULT_MAIL_SUBJECT.into()),
            admin_api_key,
            admin_email,
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            storefront_url: get("STOREFRONT_URL").unwrap_or_else(|| "https://customiseme.co.uk".into()),
            pricing,
            low_stock_threshold: parse_or(&get, "LOW_STOCK_THRESHOLD", DEFAULT_LOW_STOCK_THRESHOLD)?,
            abandoned_cart_delay_minutes: parse_positive(&get, "ABANDONED_CART_DELAY_MINUTES", 30)?,
            discount_followup_hours: parse_positive(&get, "DISCOUNT_FOLLOWUP_HOURS", 24)?,
            discount_code: get("DISCOUNT_CODE").unwrap_or_else(|| "COMEBACK10".into()),
            review_request_delay_days: parse_positive(&get, "REVIEW_REQUEST_DELAY_DAYS", 7)?,
            cart_sweep_interval_minutes: parse_positive(&get, "CART_SWEEP_INTERVAL_MINUTES", 30)?,
            review_sweep_interval_hours: parse_positive(&get, "REVIEW_SWEEP_INTERVAL_HOURS", 24)?,
        };
        tracing::info!(environment = %config.environment, port = config.port, "configuration loaded");
        Ok(config)
    }

    pub fn is_production(&self) -> bool { self.environment.eq_ignore_ascii_case("production") }

    pub fn inventory_settings(&self) -> InventorySettings {
        InventorySettings {
            low_stock_threshold: self.low_stock_threshold,
            admin_email: self.admin_email.clone(),
            storefront_url: self.storefront_url.clone(),
        }
    }

    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            abandoned_cart_delay: chrono::Duration::minutes(self.abandoned_cart_delay_minutes),
            discount_followup_delay: chrono::Duration::hours(self.discount_followup_hours),
            discount_code: self.discount_code.clone(),
            review_request_delay: chrono::Duration::days(self.review_request_delay_days),
            cart_sweep_interval: std::time::Duration::from_secs(self.cart_sweep_interval_minutes * 60),
            review_sweep_interval: std::time::Duration::from_secs(self.review_sweep_interval_hours * 3600),
            storefront_url: self.storefront_url.clone(),
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| CommerceError::Config(format!("invalid {key} value {raw:?}: {e}"))),
        None => Ok(default),
    }
}

fn parse_positive<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let value = parse_or(get, key, default)?;
    if value <= T::default() {
        return Err(CommerceError::Config(format!("{key} must be greater than zero")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("ADMIN_API_KEY", "s3cret")]).unwrap();
        assert_eq!(config.port, 8083);
        assert!(config.database_url.is_none());
        assert_eq!(config.pricing, PricingPolicy::default());
        assert_eq!(config.low_stock_threshold, 10);
        assert_eq!(config.sweep_settings().review_request_delay, chrono::Duration::days(7));
        assert!(!config.is_production());
    }

    #[test]
    fn test_admin_key_required() {
        assert!(matches!(load(&[]), Err(CommerceError::Config(_))));
        assert!(matches!(load(&[("ADMIN_API_KEY", "  ")]), Err(CommerceError::Config(_))));
    }

    #[test]
    fn test_overrides_and_malformed_values() {
        let config = load(&[("ADMIN_API_KEY", "k"), ("TAX_RATE", "0.2"), ("PORT", "9000"), ("APP_ENV", "production")]).unwrap();
        assert_eq!(config.pricing.tax_rate, dec!(0.2));
        assert_eq!(config.port, 9000);
        assert!(config.is_production());

        assert!(matches!(load(&[("ADMIN_API_KEY", "k"), ("PORT", "http")]), Err(CommerceError::Config(_))));
        assert!(matches!(load(&[("ADMIN_API_KEY", "k"), ("ABANDONED_CART_DELAY_MINUTES", "0")]), Err(CommerceError::Config(_))));
        assert!(matches!(load(&[("ADMIN_API_KEY", "k"), ("ADMIN_EMAIL", "nope")]), Err(CommerceError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[("ADMIN_API_KEY", "topsecret"), ("STRIPE_SECRET_KEY", "sk_live_abc")]).unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("topsecret"));
        assert!(!printed.contains("sk_live_abc"));
    }
}
