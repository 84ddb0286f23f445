//! Client-side request throttling.
//!
//! A token bucket shared by every call a provider instance makes to its
//! control plane. The bucket holds at most `burst` tokens and refills at
//! `qps` tokens per second.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RequestThrottle {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RequestThrottle {
    /// Create a throttle starting with a full bucket.
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
            bucket.last_refill = now;
        }
    }

    /// Wait for a token and take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                if self.qps <= 0.0 {
                    // Validated configs never get here; fail open.
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.qps)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn qps(&self) -> f64 {
        self.qps
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }
}
