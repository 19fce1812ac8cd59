//! Wanderlust Query Queues
//! Copyright (c) 2026 Mamy Ratsimbazafy
//! Licensed and distributed under either of
//!   * MIT license (license terms at the root of the package or at http://opensource.org/licenses/MIT).
//!   * Apache v2 license (license terms at the root of the package or at http://www.apache.org/licenses/LICENSE-2.0).
//! at your option. This file may not be copied, modified, or distributed except according to those terms.

//! wanderlust-internals/query-queues
//! A small work queue for external service calls: bounded concurrency,
//! fixed-interval pacing between calls, and retries with backoff and jitter.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{self, Instant};

/// Custom error for the work queue
#[derive(Debug, Error)]
pub enum QueryQueueError {
    #[error("max retries exceeded: {0}")]
    MaxRetriesExceeded(#[source] anyhow::Error),
    #[error("queue is closed")]
    QueueClosed,
}

/// Rate limiting mode
///
/// `FixedInterval` spaces consecutive calls by at least `min_interval`,
/// whatever the number of waiting workers. There is no burst allowance.
#[derive(Clone, Debug, Default)]
enum RateLimit {
    #[default]
    ConcurrencyOnly,
    FixedInterval {
        min_interval: Duration,
        next_slot: Arc<Mutex<Instant>>,
    },
}

/// An async semaphore for limiting concurrent operations
#[derive(Clone, Debug)]
struct AsyncSemaphore {
    inner: Arc<Semaphore>,
    permits: usize,
}

impl AsyncSemaphore {
    fn new(permits: usize) -> Self {
        Self {
            inner: Arc::new(Semaphore::new(permits)),
            permits,
        }
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, tokio::sync::AcquireError> {
        self.inner.acquire().await
    }
}

/// A work queue that limits concurrent requests to an external service,
/// paces them at a fixed interval and retries failures with exponential
/// backoff and jitter.
///
/// # Examples
///
/// Two concurrent calls, at most 20 calls per minute:
/// ```ignore
/// let queue = QueryQueue::with_concurrency_limit(2).with_rate_per_minute(20);
/// ```
///
/// Sequential calls, no pacing, two retries:
/// ```ignore
/// let queue = QueryQueue::with_concurrency_limit(1).with_max_retries(2);
/// ```
#[derive(Clone, Debug)]
pub struct QueryQueue {
    semaphore: AsyncSemaphore,
    initial_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    max_retries: u32,
    exponential: bool,
    rate_limit: RateLimit,
}

impl Default for QueryQueue {
    fn default() -> Self {
        Self {
            semaphore: AsyncSemaphore::new(4),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(30000),
            jitter_factor: 0.5,
            max_retries: 0,
            exponential: true,
            rate_limit: RateLimit::ConcurrencyOnly,
        }
    }
}

impl QueryQueue {
    /// Create a new work queue with max concurrent requests
    pub fn with_concurrency_limit(max_concurrent: u64) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: AsyncSemaphore::new(max_concurrent as usize),
            ..Default::default()
        }
    }

    /// Space calls so that at most `per_minute` start in any minute.
    /// Zero disables pacing.
    pub fn with_rate_per_minute(self, per_minute: u32) -> Self {
        if per_minute == 0 {
            return Self {
                rate_limit: RateLimit::ConcurrencyOnly,
                ..self
            };
        }
        self.with_min_interval(Duration::from_secs_f64(60.0 / per_minute as f64))
    }

    /// Space calls by at least `min_interval`.
    pub fn with_min_interval(self, min_interval: Duration) -> Self {
        Self {
            rate_limit: RateLimit::FixedInterval {
                min_interval,
                next_slot: Arc::new(Mutex::new(Instant::now())),
            },
            ..self
        }
    }

    /// Number of retries after the first failed attempt.
    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    /// Initial backoff delay, doubled after each failed attempt.
    pub fn with_initial_delay(self, initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            ..self
        }
    }

    /// Jitter as a fraction of the current delay, 0.0 disables it.
    pub fn with_jitter_factor(self, jitter_factor: f64) -> Self {
        Self {
            jitter_factor: jitter_factor.max(0.0),
            ..self
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.semaphore.permits
    }

    pub fn min_interval(&self) -> Option<Duration> {
        match &self.rate_limit {
            RateLimit::ConcurrencyOnly => None,
            RateLimit::FixedInterval { min_interval, .. } => Some(*min_interval),
        }
    }

    /// Wait until the next pacing slot is ours.
    ///
    /// The slot is reserved under the lock, the sleep happens outside it so
    /// that other workers can queue up behind us.
    pub async fn wait_for_slot(&self) {
        let sleep_for = match &self.rate_limit {
            RateLimit::ConcurrencyOnly => return,
            RateLimit::FixedInterval {
                min_interval,
                next_slot,
            } => {
                let mut next = next_slot.lock().await;
                let now = Instant::now();
                if now < *next {
                    let wait = *next - now;
                    *next += *min_interval;
                    wait
                } else {
                    *next = now + *min_interval;
                    Duration::ZERO
                }
            }
        };
        if !sleep_for.is_zero() {
            time::sleep(sleep_for).await;
        }
    }

    /// Execute a function with concurrency control, pacing and retry
    ///
    /// Every attempt waits for its own pacing slot. If the function returns
    /// `Err`, it is retried with exponential backoff and jitter until
    /// `max_retries` is exhausted.
    pub async fn with_retry<T, F, Fut>(&self, mut f: F) -> Result<T, QueryQueueError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, anyhow::Error>> + Send,
    {
        // Acquire a permit (for concurrency control)
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| QueryQueueError::QueueClosed)?;

        let mut retry_count = 0;
        let mut delay = self.initial_delay;

        loop {
            self.wait_for_slot().await;
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.max_retries {
                        return Err(QueryQueueError::MaxRetriesExceeded(e));
                    }

                    let jittered_delay = self.apply_jitter(delay);
                    time::sleep(jittered_delay).await;

                    if self.exponential {
                        delay = std::cmp::min(delay * 2, self.max_delay);
                    }
                }
            }
        }
    }

    /// Apply jitter to the delay
    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 {
            return delay;
        }

        let jitter_ms = (delay.as_millis() as f64 * self.jitter_factor) as u64;
        let rand_jitter = rand::thread_rng().gen_range(0..=jitter_ms);

        Duration::from_millis(delay.as_millis() as u64 + rand_jitter)
    }
}
