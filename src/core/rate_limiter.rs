//! Per-client-IP token-bucket rate limiting.
//!
//! Every client IP owns one [`TokenBucket`] living in a concurrent
//! `scc::HashMap`. Buckets are created full on first sight, refilled lazily
//! on each `allow` call, and evicted by a background sweeper once a client
//! has been idle longer than the configured timeout. Reads on the map are
//! lock-free; each bucket's counters are guarded by that bucket's own mutex,
//! so there is no global lock on the request path.
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use eyre::{Context, Result};
use tokio::{task::JoinHandle, time::Instant};

use crate::config::models::RateLimitConfig;

/// One client's bucket state. Mutated only under the bucket mutex.
struct BucketState {
    tokens: u32,
    last_refill: Instant,
    last_accessed: Instant,
}

/// Capacity-bounded token counter with lazy refill.
pub struct TokenBucket {
    capacity: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// New buckets start full so a fresh client gets its whole burst.
    fn new(capacity: u32, refill_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            capacity,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
                last_accessed: now,
            }),
        }
    }

    /// Try to take one token, refilling for elapsed full intervals first.
    ///
    /// `last_refill` advances to `now` rather than by whole intervals, so
    /// sub-interval progress is not carried over between calls.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        let refill_count = (elapsed.as_nanos() / self.refill_interval.as_nanos().max(1)) as u64;
        if refill_count > 0 {
            let refill = u32::try_from(refill_count).unwrap_or(u32::MAX);
            state.tokens = state.tokens.saturating_add(refill).min(self.capacity);
            state.last_refill = now;
        }

        if state.tokens > 0 {
            state.tokens -= 1;
            state.last_accessed = now;
            true
        } else {
            false
        }
    }

    /// When this bucket last admitted a request. Read by the sweeper.
    pub fn last_accessed(&self) -> Instant {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_accessed
    }
}

/// Concurrent map of client IP to bucket, plus the sweep parameters.
pub struct RateLimiterMap {
    buckets: scc::HashMap<String, TokenBucket>,
    capacity: u32,
    refill_interval: Duration,
    cleanup_interval: Duration,
    idle_timeout: Duration,
}

impl RateLimiterMap {
    pub fn new(cfg: &RateLimitConfig) -> Result<Self> {
        if cfg.capacity == 0 {
            eyre::bail!("rate limit capacity must be greater than 0");
        }
        let refill_interval = humantime::parse_duration(&cfg.refill_interval)
            .with_context(|| format!("invalid refill_interval '{}'", cfg.refill_interval))?;
        let cleanup_interval = humantime::parse_duration(&cfg.cleanup_interval)
            .with_context(|| format!("invalid cleanup_interval '{}'", cfg.cleanup_interval))?;
        let idle_timeout = humantime::parse_duration(&cfg.idle_timeout)
            .with_context(|| format!("invalid idle_timeout '{}'", cfg.idle_timeout))?;

        if refill_interval.is_zero() || cleanup_interval.is_zero() || idle_timeout.is_zero() {
            eyre::bail!("rate limit intervals must be greater than 0");
        }

        Ok(Self {
            buckets: scc::HashMap::new(),
            capacity: cfg.capacity,
            refill_interval,
            cleanup_interval,
            idle_timeout,
        })
    }

    /// Admit or reject one request from `client_ip`.
    ///
    /// Load-or-store on miss: the bucket is created full and inserted
    /// atomically; if a concurrent insert raced and won, the winner is used.
    pub async fn allow(&self, client_ip: &str) -> bool {
        let entry = self
            .buckets
            .entry_async(client_ip.to_string())
            .await
            .or_insert_with(|| TokenBucket::new(self.capacity, self.refill_interval));
        entry.get().allow()
    }

    /// Seconds until the next token accrues, formatted for `Retry-After`.
    pub fn retry_after_secs(&self) -> String {
        format!("{:.1}", self.refill_interval.as_secs_f64())
    }

    /// Number of tracked client IPs.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop every bucket idle for longer than the configured timeout.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let idle_timeout = self.idle_timeout;
        self.buckets
            .retain_async(|_, bucket| now.duration_since(bucket.last_accessed()) <= idle_timeout)
            .await;
    }

    /// Spawn the long-running sweeper task. One per gateway process; aborted
    /// when the server drains.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let map = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(map.cleanup_interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let before = map.len();
                map.sweep().await;
                let after = map.len();
                if after < before {
                    tracing::info!(
                        evicted = before - after,
                        remaining = after,
                        "evicted idle clients from rate-limit map"
                    );
                }
                crate::metrics::set_active_rate_buckets(after);
            }
        })
    }
}
