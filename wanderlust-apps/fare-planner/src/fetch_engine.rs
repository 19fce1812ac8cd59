//!  Wanderlust Fare Planner
//!
//!  Copyright (C) 2026  Mamy Ratsimbazafy
//!
//!  This program is free software: you can redistribute it and/or modify
//!  it under the terms of the GNU Affero General Public License as published by
//!  the Free Software Foundation, either version 3 of the License, or
//!  (at your option) any later version.
//!
//!  This program is distributed in the hope that it will be useful,
//!  but WITHOUT ANY WARRANTY; without even the implied warranty of
//!  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//!  GNU Affero General Public License for more details.
//!
//!  You should have received a copy of the GNU Affero General Public License
//!  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! # Fetch Engine
//!
//! Prices requests through a [`PricingProvider`]:
//!
//! 1. cache lookup by fingerprint,
//! 2. in-flight coalescing: concurrent identical requests share one call,
//! 3. the query queue: bounded workers, fixed-interval pacing, optional retries,
//! 4. classification into `ok` / `empty` / `error`, dedupe and truncation.
//!
//! [`FetchEngine::fetch_all`] is the per-query barrier: every pair of a
//! query is dispatched, results come back in input order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::{StreamExt, stream};
use tokio::sync::watch;
use tracing::{debug, trace};
use wanderlust_query_queues::{QueryQueue, QueryQueueError};

use crate::fetch_cache::{FetchCache, fingerprint};
use crate::pricing_provider::{
    CacheSource, FetchResult, PricedResponse, PricingProvider, PricingRequest, ProviderError,
    dedupe_candidates,
};
use crate::run_progress::RunContext;

const INFLIGHT_FAILED: &str = "inflight failed";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub workers: usize,
    /// 0 disables pacing.
    pub rate_limit_per_minute: u32,
    /// Only honoured with a single worker.
    pub sleep_between_calls: Duration,
    pub max_retries: u32,
    /// 0 = keep every candidate.
    pub max_flight_options: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            rate_limit_per_minute: 0,
            sleep_between_calls: Duration::ZERO,
            max_retries: 0,
            max_flight_options: 0,
        }
    }
}

type Slot = watch::Receiver<Option<FetchResult>>;

#[derive(Default)]
struct InflightRegistry {
    entries: Mutex<HashMap<String, Slot>>,
}

enum InflightRole<'a> {
    Owner(InflightGuard<'a>),
    Waiter(Slot),
}

impl InflightRegistry {
    fn join(&self, key: &str) -> InflightRole<'_> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(slot) = entries.get(key) {
            return InflightRole::Waiter(slot.clone());
        }
        let (sender, receiver) = watch::channel(None);
        entries.insert(key.to_string(), receiver);
        InflightRole::Owner(InflightGuard {
            registry: self,
            key: key.to_string(),
            sender,
            completed: false,
        })
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Held by the one caller performing a live fetch for a key.
///
/// Waiters are always signalled exactly once: with the real result through
/// [`InflightGuard::complete`], or with a placeholder error if the owner is
/// dropped first. The marker is removed after signalling.
struct InflightGuard<'a> {
    registry: &'a InflightRegistry,
    key: String,
    sender: watch::Sender<Option<FetchResult>>,
    completed: bool,
}

impl InflightGuard<'_> {
    fn complete(mut self, result: &FetchResult) {
        self.sender.send_replace(Some(result.clone()));
        self.completed = true;
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.sender
                .send_replace(Some(FetchResult::error(INFLIGHT_FAILED)));
        }
        self.registry
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.key);
    }
}

async fn wait_inflight(mut slot: Slot) -> FetchResult {
    let result = match slot.wait_for(Option::is_some).await {
        Ok(value) => value.clone().unwrap_or_else(|| FetchResult::error(INFLIGHT_FAILED)),
        Err(_) => FetchResult::error(INFLIGHT_FAILED),
    };
    result.reused(CacheSource::Inflight)
}

pub struct FetchEngine {
    provider: Arc<dyn PricingProvider>,
    cache: Arc<FetchCache>,
    inflight: InflightRegistry,
    queue: QueryQueue,
    options: EngineOptions,
    external_calls: AtomicU64,
}

impl FetchEngine {
    pub fn new(provider: Arc<dyn PricingProvider>, cache: Arc<FetchCache>, options: EngineOptions) -> Self {
        let workers = options.workers.max(1);
        let queue = QueryQueue::with_concurrency_limit(workers as u64)
            .with_rate_per_minute(options.rate_limit_per_minute)
            .with_max_retries(options.max_retries);
        debug!(
            provider = provider.name(),
            workers,
            rate_per_minute = options.rate_limit_per_minute,
            max_retries = options.max_retries,
            "Fetch engine ready"
        );
        Self {
            provider,
            cache,
            inflight: InflightRegistry::default(),
            queue,
            options: EngineOptions { workers, ..options },
            external_calls: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    /// Provider invocations so far, retries included.
    pub fn external_calls(&self) -> u64 {
        self.external_calls.load(Ordering::Relaxed)
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    pub async fn fetch(&self, request: &PricingRequest) -> FetchResult {
        let key = fingerprint(request);
        if let Some(hit) = self.cache.get(&key) {
            trace!(key = %key, "Cache hit");
            return hit;
        }

        let guard = match self.inflight.join(&key) {
            InflightRole::Waiter(slot) => {
                trace!(key = %key, "Joining in-flight fetch");
                return wait_inflight(slot).await;
            }
            InflightRole::Owner(guard) => guard,
        };

        // Another owner may have finished between the lookup and the join.
        if let Some(hit) = self.cache.get(&key) {
            guard.complete(&hit);
            return hit;
        }

        let result = self.fetch_live(request).await;
        self.cache.insert(key, &result);
        guard.complete(&result);
        result
    }

    async fn fetch_live(&self, request: &PricingRequest) -> FetchResult {
        let start = Instant::now();
        let outcome = self
            .queue
            .with_retry(|| async move {
                self.external_calls.fetch_add(1, Ordering::Relaxed);
                match self.provider.fetch(request).await {
                    Ok(response) => Ok(Ok(response)),
                    Err(e @ ProviderError::NoResults(_)) => Ok(Err(e.to_string())),
                    Err(ProviderError::Failed(e)) => Err(e),
                }
            })
            .await;

        let result = match outcome {
            Ok(Ok(response)) => FetchResult::ok(self.trim_candidates(response)),
            Ok(Err(message)) => FetchResult::empty(&message),
            Err(QueryQueueError::MaxRetriesExceeded(e)) => FetchResult::error(&format!("{e:#}")),
            Err(e) => FetchResult::error(&e.to_string()),
        };
        debug!(
            origin = %request.origin,
            destination = %request.destination,
            date = %request.depart_date,
            status = result.status.as_str(),
            flights = result.flights.len(),
            "Fetched in {:.2?}",
            start.elapsed()
        );
        result
    }

    fn trim_candidates(&self, mut response: PricedResponse) -> PricedResponse {
        response.flights = dedupe_candidates(response.flights);
        if self.options.max_flight_options > 0 {
            response.flights.truncate(self.options.max_flight_options);
        }
        response
    }

    /// Price every request of one query and wait for all of them.
    ///
    /// Results keep the input order. A request not dispatched because the run
    /// was cancelled comes back as `None`; requests already dispatched finish.
    pub async fn fetch_all(&self, requests: &[PricingRequest], ctx: &RunContext) -> Vec<Option<FetchResult>> {
        if self.options.workers <= 1 {
            let mut results = Vec::with_capacity(requests.len());
            for (i, request) in requests.iter().enumerate() {
                if ctx.is_cancelled() {
                    results.push(None);
                    continue;
                }
                let result = self.fetch(request).await;
                let live = !result.from_cache;
                results.push(Some(result));
                let more = i + 1 < requests.len();
                if live && more && !self.options.sleep_between_calls.is_zero() {
                    tokio::time::sleep(self.options.sleep_between_calls).await;
                }
            }
            return results;
        }

        stream::iter(requests)
            .map(|request| async move {
                if ctx.is_cancelled() {
                    None
                } else {
                    Some(self.fetch(request).await)
                }
            })
            .buffered(self.options.workers)
            .collect()
            .await
    }
}
