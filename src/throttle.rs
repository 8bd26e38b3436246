// src/throttle.rs
//! Rate limiting for outbound calls, kept separate from concurrency: a pool
//! of N workers still cannot exceed the configured rate.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Throttle: Send + Sync {
    /// Wait until one call is allowed
    async fn acquire(&self);
}

/// Token bucket shared by every caller of one external service
pub struct TokenBucket {
    limiter: DefaultDirectRateLimiter,
}

impl TokenBucket {
    /// Evenly spaced permits with no burst allowance
    pub fn per_second(rate: u32) -> Self {
        Self::with_burst(rate, 1)
    }

    pub fn with_burst(rate: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
        }
    }
}

#[async_trait]
impl Throttle for TokenBucket {
    async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

/// No limit; used by tests and one-off diagnostics
pub struct Unthrottled;

#[async_trait]
impl Throttle for Unthrottled {
    async fn acquire(&self) {}
}

/// Wait for a permit unless `cancel` fires first. Returns false on cancel.
pub async fn acquire_or_cancel(throttle: &dyn Throttle, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = throttle.acquire() => true,
    }
}
