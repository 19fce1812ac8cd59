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

//! # Pricing Provider
//!
//! The contract between the sweep and whatever actually prices a flight,
//! and the fetch results the engine hands back.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_ERROR_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TripType {
    OneWay,
    RoundTrip,
}

impl TripType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripType::OneWay => "one-way",
            TripType::RoundTrip => "round-trip",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    #[default]
    Economy,
    #[serde(alias = "premium-economy")]
    PremiumEconomy,
    Business,
    First,
}

impl Seat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Seat::Economy => "economy",
            Seat::PremiumEconomy => "premium_economy",
            Seat::Business => "business",
            Seat::First => "first",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Passengers {
    pub adults: u32,
    pub children: u32,
    pub infants_in_seat: u32,
    pub infants_on_lap: u32,
}

impl Default for Passengers {
    fn default() -> Self {
        Self {
            adults: 1,
            children: 0,
            infants_in_seat: 0,
            infants_on_lap: 0,
        }
    }
}

/// One concrete priced query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PricingRequest {
    pub origin: String,
    pub destination: String,
    pub depart_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub trip_type: TripType,
    pub seat: Seat,
    pub passengers: Passengers,
    pub max_stops: Option<u32>,
    pub currency: String,
    pub fetch_mode: String,
}

/// A flight option as reported by the provider, strings kept raw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightCandidate {
    pub is_best: bool,
    pub name: String,
    pub departure: String,
    pub arrival: String,
    pub arrival_time_ahead: Option<String>,
    pub duration: String,
    pub stops: Option<u32>,
    pub delay: Option<String>,
    pub price: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricedResponse {
    #[serde(default)]
    pub current_price: Option<String>,
    #[serde(default)]
    pub flights: Vec<FlightCandidate>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered but had nothing for this query.
    #[error("No flights found: {0}")]
    NoResults(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[async_trait]
pub trait PricingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, request: &PricingRequest) -> Result<PricedResponse, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Ok,
    Empty,
    Error,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Ok => "ok",
            FetchStatus::Empty => "empty",
            FetchStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Cache,
    Inflight,
}

/// Outcome of one fetch. `from_cache` and `cache_source` are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub status: FetchStatus,
    #[serde(default)]
    pub current_price: Option<String>,
    #[serde(default)]
    pub flights: Vec<FlightCandidate>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(skip)]
    pub from_cache: bool,
    #[serde(skip)]
    pub cache_source: Option<CacheSource>,
}

impl FetchResult {
    pub fn ok(response: PricedResponse) -> Self {
        Self {
            status: FetchStatus::Ok,
            current_price: response.current_price,
            flights: response.flights,
            error: None,
            from_cache: false,
            cache_source: None,
        }
    }

    pub fn empty(message: &str) -> Self {
        Self::failure(FetchStatus::Empty, message)
    }

    pub fn error(message: &str) -> Self {
        Self::failure(FetchStatus::Error, message)
    }

    fn failure(status: FetchStatus, message: &str) -> Self {
        let cleaned = clean_error(message);
        Self {
            status,
            current_price: None,
            flights: Vec::new(),
            error: (!cleaned.is_empty()).then_some(cleaned),
            from_cache: false,
            cache_source: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FetchStatus::Ok
    }

    /// Copy handed out to a caller that did not perform the call itself.
    pub fn reused(&self, source: CacheSource) -> Self {
        Self {
            from_cache: true,
            cache_source: Some(source),
            ..self.clone()
        }
    }
}

/// Collapse whitespace and truncate long provider messages.
/// The bare "no flights" wording carries no information and becomes empty.
pub fn clean_error(message: &str) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || collapsed.trim_end_matches([':', '.']) == "No flights found" {
        return String::new();
    }
    if collapsed.chars().count() > MAX_ERROR_CHARS {
        let truncated: String = collapsed.chars().take(MAX_ERROR_CHARS).collect();
        return format!("{truncated}...");
    }
    collapsed
}

/// Drop exact duplicates, keeping the first occurrence of each.
pub fn dedupe_candidates(flights: Vec<FlightCandidate>) -> Vec<FlightCandidate> {
    let mut seen = HashSet::new();
    flights
        .into_iter()
        .filter(|f| {
            seen.insert((
                f.name.clone(),
                f.departure.clone(),
                f.arrival.clone(),
                f.duration.clone(),
                f.price.clone(),
                f.stops,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, price: &str, best: bool) -> FlightCandidate {
        FlightCandidate {
            is_best: best,
            name: name.to_string(),
            departure: "10:00 AM".to_string(),
            arrival: "1:00 PM".to_string(),
            duration: "3 hr".to_string(),
            stops: Some(0),
            price: price.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn clean_error_collapses_and_truncates() {
        assert_eq!(clean_error("  timed \n out\t after  30s "), "timed out after 30s");
        let long = "x".repeat(400);
        let cleaned = clean_error(&long);
        assert_eq!(cleaned.len(), 303);
        assert!(cleaned.ends_with("..."));
        assert_eq!(clean_error("No flights found:"), "");
        assert_eq!(
            clean_error("No flights found: empty page"),
            "No flights found: empty page"
        );
    }

    #[test]
    fn dedupe_ignores_best_flag() {
        let flights = vec![
            candidate("Air A", "$100", true),
            candidate("Air A", "$100", false),
            candidate("Air B", "$100", false),
        ];
        let unique = dedupe_candidates(flights);
        assert_eq!(unique.len(), 2);
        assert!(unique[0].is_best);
    }

    #[test]
    fn failure_results_carry_cleaned_message() {
        let r = FetchResult::error("boom\n\nbang");
        assert_eq!(r.status, FetchStatus::Error);
        assert_eq!(r.error.as_deref(), Some("boom bang"));
        assert!(!r.is_ok());

        let reused = FetchResult::ok(PricedResponse::default()).reused(CacheSource::Inflight);
        assert!(reused.from_cache);
        assert_eq!(reused.cache_source, Some(CacheSource::Inflight));
    }

    #[test]
    fn runtime_tags_are_not_serialized() {
        let r = FetchResult::ok(PricedResponse::default()).reused(CacheSource::Cache);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("from_cache").is_none());
        assert_eq!(json["status"], "ok");
    }
}
