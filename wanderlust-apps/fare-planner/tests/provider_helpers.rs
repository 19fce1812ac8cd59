//! Shared test helpers: a scripted pricing provider and plan fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use wanderlust_fare_planner::pricing_provider::{Passengers, Seat, TripType};
use wanderlust_fare_planner::{
    FlightCandidate, PlanConfig, PricedResponse, PricingProvider, PricingRequest, ProviderError,
    SweepPlan,
};

type Responder = Box<dyn Fn(&PricingRequest) -> Result<PricedResponse, ProviderError> + Send + Sync>;

/// Answers every request through a closure and counts the calls.
pub struct ScriptedProvider {
    responder: Responder,
    delay: Duration,
    calls: AtomicUsize,
    calls_by_mode: Mutex<HashMap<String, usize>>,
}

impl ScriptedProvider {
    pub fn new(
        responder: impl Fn(&PricingRequest) -> Result<PricedResponse, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            calls_by_mode: Mutex::new(HashMap::new()),
        }
    }

    /// Every request priced at `price`.
    pub fn always(price: &'static str) -> Self {
        Self::new(move |_| Ok(priced(price)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for_mode(&self, mode: &str) -> usize {
        self.calls_by_mode
            .lock()
            .unwrap()
            .get(mode)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl PricingProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, request: &PricingRequest) -> Result<PricedResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_mode
            .lock()
            .unwrap()
            .entry(request.fetch_mode.clone())
            .or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.responder)(request)
    }
}

pub fn candidate(name: &str, price: &str) -> FlightCandidate {
    FlightCandidate {
        is_best: true,
        name: name.to_string(),
        departure: "8:00 AM".to_string(),
        arrival: "10:30 AM".to_string(),
        arrival_time_ahead: None,
        duration: "2 hr 30 min".to_string(),
        stops: Some(0),
        delay: None,
        price: price.to_string(),
    }
}

pub fn priced(price: &str) -> PricedResponse {
    PricedResponse {
        current_price: Some("typical".to_string()),
        flights: vec![candidate("TestAir", price)],
    }
}

pub fn no_results() -> Result<PricedResponse, ProviderError> {
    Err(ProviderError::NoResults("nothing on this route".to_string()))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn now() -> NaiveDateTime {
    date(2026, 4, 1).and_hms_opt(9, 30, 0).unwrap()
}

pub fn request(origin: &str, destination: &str, depart: NaiveDate) -> PricingRequest {
    PricingRequest {
        origin: origin.to_string(),
        destination: destination.to_string(),
        depart_date: depart,
        return_date: None,
        trip_type: TripType::OneWay,
        seat: Seat::Economy,
        passengers: Passengers::default(),
        max_stops: None,
        currency: "EUR".to_string(),
        fetch_mode: "local".to_string(),
    }
}

/// A validated plan from `body`, writing its outputs under `dir`. Pacing is
/// off unless `body` sets its own concurrency.
pub fn plan_in(dir: &Path, mut body: serde_json::Value) -> SweepPlan {
    if body.get("concurrency").is_none() {
        body["concurrency"] = serde_json::json!({"max_workers": 2, "rate_limit_per_minute": 0});
    }
    body["output"] = serde_json::json!({
        "csv_path": dir.join("flights_raw.csv").to_string_lossy(),
        "summary_csv_path": dir.join("summary.csv").to_string_lossy(),
        "cache_path": dir.join("cache.json").to_string_lossy(),
    });
    PlanConfig::from_json_str(&body.to_string())
        .unwrap()
        .validate(now())
        .unwrap()
}
