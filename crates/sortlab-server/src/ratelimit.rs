//! Per-client token-bucket rate limiting.
//!
//! One bucket per client identity. Tokens are continuous: each admitted
//! request costs one token, and the bucket refills at a fixed per-minute
//! rate up to its capacity. The map is guarded by a coarse lock; each
//! bucket by its own lock, so a slow client never serializes the others.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Outcome of a limiter check.
#[derive(Debug, PartialEq)]
pub enum Decision {
    Admit,
    /// Refused; retry after roughly this many seconds.
    Refuse { retry_after_secs: u64 },
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket limiter keyed by client identity.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Arc<Mutex<Bucket>>>>,
    capacity: f64,
    refill_per_sec: f64,
}

impl RateLimiter {
    /// Creates a limiter admitting `rate_per_minute` sustained requests per
    /// minute with bursts up to `capacity`.
    pub fn new(rate_per_minute: f64, capacity: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity: capacity.max(1.0),
            refill_per_sec: rate_per_minute.max(0.0) / 60.0,
        }
    }

    /// Refills and spends one token for `identity`.
    pub fn check(&self, identity: &str) -> Decision {
        let bucket = {
            let mut map = self.buckets.lock().expect("rate limit map poisoned");
            Arc::clone(map.entry(identity.to_string()).or_insert_with(|| {
                Arc::new(Mutex::new(Bucket {
                    tokens: self.capacity,
                    last_refill: Instant::now(),
                }))
            }))
        };

        let mut bucket = bucket.lock().expect("rate limit bucket poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision::Admit
        } else {
            let deficit = 1.0 - bucket.tokens;
            let retry_after_secs = if self.refill_per_sec > 0.0 {
                (deficit / self.refill_per_sec).ceil() as u64
            } else {
                60
            };
            Decision::Refuse {
                retry_after_secs: retry_after_secs.max(1),
            }
        }
    }
}
