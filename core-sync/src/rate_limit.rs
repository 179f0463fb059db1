//! # Rate Limiter & Backpressure Monitor
//!
//! Throttles outbound remote calls to a configured steady rate with a burst
//! allowance, and watches remote health to slow or halt work when the API
//! degrades.
//!
//! ## Overview
//!
//! - [`TokenBucket`]: capacity = burst, steady refill = requests-per-second.
//!   Refill is computed lazily from elapsed clock time on each call — there
//!   is no background timer. The clock is injected so tests are
//!   deterministic.
//! - [`BackpressureMonitor`]: rolling windows of the last 100 outcomes and
//!   latencies; evaluates the configured trigger and honors an active
//!   cooldown from a prior trip.
//! - [`RateLimitedExecutor`]: the combination the pipeline drives — check
//!   backpressure, react per strategy, take a token, run the operation, feed
//!   the result back into the monitor.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use bridge_traits::error::{Result, SyncError};
use bridge_traits::time::Clock;

use crate::config::{BackpressureConfig, BackpressureStrategy, BackpressureTrigger, RateLimitConfig};

/// Stage recorded on errors raised by a backpressure abort; the coordinator
/// matches on it to terminate the run instead of failing one item.
pub const STAGE_BACKPRESSURE_ABORT: &str = "backpressure_abort";

/// Rolling window size for outcomes and latencies.
const WINDOW_SIZE: usize = 100;

/// Error-rate evaluation window.
const ERROR_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Triggers that need a population before they mean anything.
const MIN_SAMPLES: usize = 10;

struct BucketState {
    tokens: f64,
    last_update_ms: i64,
}

/// Token bucket limiter with lazy refill.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let burst = f64::from(config.burst);
        let last_update_ms = clock.unix_timestamp_millis();
        Self {
            rate: f64::from(config.requests_per_second),
            burst,
            clock,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_update_ms,
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now_ms = self.clock.unix_timestamp_millis();
        let elapsed = (now_ms - state.last_update_ms).max(0) as f64 / 1000.0;
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_update_ms = now_ms;
    }

    /// Take one token, waiting for the bucket to refill when empty.
    pub async fn acquire(&self) {
        let wait = {
            let mut state = self.state.lock().await;
            self.refill(&mut state);

            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return;
            }

            // Consume the deficit now and sleep it off outside the lock.
            let wait = (1.0 - state.tokens) / self.rate;
            state.tokens = 0.0;
            wait
        };

        tokio::time::sleep(Duration::from_secs_f64(wait)).await;
    }

    /// Take one token without waiting.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct MonitorState {
    consecutive_errors: u32,
    /// (timestamp ms, was_error)
    outcomes: VecDeque<(i64, bool)>,
    latencies_ms: VecDeque<f64>,
    cooldown_until_ms: i64,
}

/// Detects degraded remote health from observed outcomes.
pub struct BackpressureMonitor {
    config: BackpressureConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<MonitorState>,
}

impl BackpressureMonitor {
    pub fn new(config: BackpressureConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(MonitorState {
                consecutive_errors: 0,
                outcomes: VecDeque::with_capacity(WINDOW_SIZE),
                latencies_ms: VecDeque::with_capacity(WINDOW_SIZE),
                cooldown_until_ms: 0,
            }),
        }
    }

    fn push_outcome(state: &mut MonitorState, entry: (i64, bool)) {
        if state.outcomes.len() == WINDOW_SIZE {
            state.outcomes.pop_front();
        }
        state.outcomes.push_back(entry);
    }

    pub async fn record_success(&self, latency_ms: f64) {
        let now_ms = self.clock.unix_timestamp_millis();
        let mut state = self.state.lock().await;
        state.consecutive_errors = 0;
        Self::push_outcome(&mut state, (now_ms, false));
        if state.latencies_ms.len() == WINDOW_SIZE {
            state.latencies_ms.pop_front();
        }
        state.latencies_ms.push_back(latency_ms);
    }

    pub async fn record_error(&self) {
        let now_ms = self.clock.unix_timestamp_millis();
        let mut state = self.state.lock().await;
        state.consecutive_errors += 1;
        Self::push_outcome(&mut state, (now_ms, true));
    }

    /// Evaluate the configured trigger; also true while a cooldown from a
    /// prior trip is still active.
    pub async fn is_triggered(&self) -> bool {
        let now_ms = self.clock.unix_timestamp_millis();
        let state = self.state.lock().await;

        if now_ms < state.cooldown_until_ms {
            return true;
        }

        match self.config.trigger {
            BackpressureTrigger::ConsecutiveErrors => {
                state.consecutive_errors >= self.config.threshold
            }
            BackpressureTrigger::ErrorRate => {
                if state.outcomes.len() < MIN_SAMPLES {
                    return false;
                }
                let window_ms = ERROR_RATE_WINDOW.as_millis() as i64;
                let recent: Vec<bool> = state
                    .outcomes
                    .iter()
                    .filter(|(ts, _)| now_ms - ts < window_ms)
                    .map(|(_, is_error)| *is_error)
                    .collect();
                if recent.is_empty() {
                    return false;
                }
                let errors = recent.iter().filter(|e| **e).count();
                let rate = errors as f64 / recent.len() as f64 * 100.0;
                rate >= f64::from(self.config.threshold)
            }
            BackpressureTrigger::ResponseTime => {
                if state.latencies_ms.len() < MIN_SAMPLES {
                    return false;
                }
                let avg: f64 =
                    state.latencies_ms.iter().sum::<f64>() / state.latencies_ms.len() as f64;
                avg >= f64::from(self.config.threshold)
            }
        }
    }

    pub async fn start_cooldown(&self) {
        let now_ms = self.clock.unix_timestamp_millis();
        let mut state = self.state.lock().await;
        state.cooldown_until_ms = now_ms + self.config.cooldown.as_millis() as i64;
        state.consecutive_errors = 0;
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_errors = 0;
        state.outcomes.clear();
        state.latencies_ms.clear();
        state.cooldown_until_ms = 0;
    }

    pub fn strategy(&self) -> BackpressureStrategy {
        self.config.strategy
    }

    pub fn cooldown(&self) -> Duration {
        self.config.cooldown
    }
}

/// Result of an operation submitted to the [`RateLimitedExecutor`].
#[derive(Debug)]
pub enum Execution<T> {
    Completed(T),
    /// Not executed: the backpressure strategy was `Skip` while triggered
    Skipped,
}

/// Applies backpressure policy and token acquisition around one remote call.
pub struct RateLimitedExecutor {
    bucket: TokenBucket,
    monitor: BackpressureMonitor,
    clock: Arc<dyn Clock>,
}

impl RateLimitedExecutor {
    pub fn new(
        rate_limit: &RateLimitConfig,
        backpressure: BackpressureConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bucket: TokenBucket::new(rate_limit, Arc::clone(&clock)),
            monitor: BackpressureMonitor::new(backpressure, Arc::clone(&clock)),
            clock,
        }
    }

    /// Run one remote operation under rate limiting.
    ///
    /// The monitor is updated after every attempted operation: success
    /// records latency and clears the consecutive-error counter, failure
    /// increments it. The operation's own error is propagated untouched.
    pub async fn execute<T, F, Fut>(&self, sku: &str, op: F) -> Result<Execution<T>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if self.monitor.is_triggered().await {
            match self.monitor.strategy() {
                BackpressureStrategy::Pause => {
                    let cooldown = self.monitor.cooldown();
                    warn!(
                        sku,
                        cooldown_secs = cooldown.as_secs(),
                        "backpressure triggered, pausing"
                    );
                    tokio::time::sleep(cooldown).await;
                    self.monitor.reset().await;
                }
                BackpressureStrategy::Skip => {
                    return Ok(Execution::Skipped);
                }
                BackpressureStrategy::Abort => {
                    return Err(SyncError::transport(
                        sku,
                        STAGE_BACKPRESSURE_ABORT,
                        "backpressure abort triggered",
                    )
                    .with_retryable(false));
                }
            }
        }

        self.bucket.acquire().await;

        let start_ms = self.clock.unix_timestamp_millis();
        match op().await {
            Ok(value) => {
                let elapsed = (self.clock.unix_timestamp_millis() - start_ms).max(0) as f64;
                self.monitor.record_success(elapsed).await;
                Ok(Execution::Completed(value))
            }
            Err(e) => {
                self.monitor.record_error().await;
                Err(e)
            }
        }
    }

    pub fn monitor(&self) -> &BackpressureMonitor {
        &self.monitor
    }

    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }
}
