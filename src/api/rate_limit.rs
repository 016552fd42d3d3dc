//! Per-client request throttling for the public write endpoints.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use crate::CommerceError;

pub type ClientRateLimiter = DefaultKeyedRateLimiter<IpAddr>;

/// Bucket shared by every request whose client address cannot be determined.
pub const UNKNOWN_CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// `per_minute` requests per client per minute.
pub fn client_rate_limiter(per_minute: u32) -> Arc<ClientRateLimiter> {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::keyed(quota))
}

/// First forwarded address, then `X-Real-IP`. Values that are not IP addresses
/// land in the shared [`UNKNOWN_CLIENT`] bucket.
pub fn client_key(headers: &HeaderMap) -> IpAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());
    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
        .unwrap_or(UNKNOWN_CLIENT)
}

pub async fn limit(State(limiter): State<Arc<ClientRateLimiter>>, request: Request, next: Next) -> Response {
    let key = client_key(request.headers());
    if limiter.check_key(&key).is_err() {
        warn!(client = %key, path = %request.uri().path(), "rate limit exceeded");
        return CommerceError::RateLimited.into_response();
    }
    next.run(request).await
}

/// Drops clients whose bucket has fully refilled. Returns the clients still tracked.
pub fn prune(limiter: &ClientRateLimiter) -> usize {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

pub fn spawn_pruner(limiter: Arc<ClientRateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let tracked = prune(&limiter);
            debug!(tracked, "rate limiter pruned");
        }
    })
}
