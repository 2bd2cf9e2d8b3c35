//! Token bucket rate limiter.
//!
//! Tokens accrue at `rate` per second up to `burst` capacity; each admitted
//! operation consumes one. A caller with no token available waits until the
//! next whole token accrues. The wait is indefinite; rate limiting never
//! fails a caller.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default extra instantaneous allowance
pub const DEFAULT_BURST: usize = 5;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket limiting admissions to `rate` per second plus `burst`
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket refilling at `rate` tokens/second up to `burst`
    ///
    /// The bucket starts full. A non-positive rate is clamped to a minimal
    /// positive value; a zero burst is clamped to one.
    #[must_use]
    pub fn new(rate: f64, burst: usize) -> Self {
        let burst = burst.max(1) as f64;
        Self {
            rate: rate.max(f64::MIN_POSITIVE),
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Get the refill rate in tokens per second
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Get the bucket capacity
    #[must_use]
    pub const fn burst(&self) -> f64 {
        self.burst
    }

    /// Currently available tokens after refill
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    /// Consume a token immediately if one is available
    pub async fn try_take(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Consume a token, waiting for the next refill if none is available
    pub async fn take(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;
    }
}
