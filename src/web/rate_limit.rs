//! Per-client rate limiting on top of `governor`.

use std::net::IpAddr;
use std::num::NonZeroU32;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

/// Drop idle client state once this many addresses are tracked.
const PRUNE_THRESHOLD: usize = 1024;

/// Keyed GCRA limiter: each client address may burst `limit` requests,
/// refilled evenly over a minute. A limit of zero disables limiting.
pub struct ClientRateLimiter {
    limiter: Option<DefaultKeyedRateLimiter<IpAddr>>,
}

impl ClientRateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            limiter: NonZeroU32::new(limit).map(|n| RateLimiter::keyed(Quota::per_minute(n))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Record a request from `client`. Returns false when it is over quota.
    pub fn check(&self, client: IpAddr) -> bool {
        let Some(limiter) = &self.limiter else {
            return true;
        };
        if limiter.len() > PRUNE_THRESHOLD {
            limiter.retain_recent();
        }
        limiter.check_key(&client).is_ok()
    }

    /// Number of client addresses currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.as_ref().map_or(0, |l| l.len())
    }
}
