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

//! # Plan Configuration
//!
//! A sweep is described by a versioned JSON plan file. [`PlanConfig`] is the
//! file as written, with defaults for everything optional.
//! [`PlanConfig::validate`] resolves it into a [`SweepPlan`]: dates
//! expanded, groups normalized, concurrency resolved, warnings collected.
//! Anything that would make the sweep meaningless is a [`ConfigError`] and
//! aborts before the first fetch.
//!
//! ```json
//! {
//!   "version": 1,
//!   "groups": { "PAR": ["CDG", "ORY"], "TYO": ["HND", "NRT"] },
//!   "itineraries": [["PAR", "TYO", "PAR"]],
//!   "departure_dates": { "start": "2026-05-01", "end": "2026-05-07" },
//!   "stay_nights": { "TYO": { "min": 7, "max": 10 } },
//!   "trip_strategy": "round-trip-when-possible",
//!   "fetch": { "currency": "EUR", "seat": "economy" },
//!   "output": { "csv_path": "out/flights_raw_{timestamp}.csv" }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::warn;

use crate::fallback_orchestrator::{FetchModes, resolve_fetch_modes};
use crate::fetch_engine::EngineOptions;
use crate::itinerary_spec::{ItinerarySpec, RawNode, is_airport_code, normalize_codes};
use crate::itinerary_scoring::ScoringWeights;
use crate::pricing_provider::{Passengers, Seat};
use crate::schedule_generator::{DateFilter, ScheduleLimits, StayNightsSpec, TripNightsRange};
use crate::sweep_output::format_output_path;
use crate::trip_request_planner::TripStrategy;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read plan file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed plan: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported plan version {0} (expected {CONFIG_VERSION})")]
    UnsupportedVersion(u32),
    #[error("invalid itinerary node {0:?}")]
    InvalidNode(String),
    #[error("itinerary {0:?} needs at least two nodes")]
    ShortItinerary(String),
    #[error("no itineraries configured")]
    NoItineraries,
    #[error("unknown group {0}")]
    MissingGroup(String),
    #[error("missing stay_nights for stop group {0}")]
    MissingStayNights(String),
    #[error("{field} must be positive, got {step}")]
    InvalidStep { field: &'static str, step: i64 },
    #[error("{0} needs start/end (or offsets) or an explicit dates list")]
    IncompleteDateRange(&'static str),
    #[error("no departure dates resolved")]
    NoDepartureDates,
    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Number or `"auto"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoOr {
    #[default]
    Auto,
    Value(u64),
}

impl<'de> Deserialize<'de> for AutoOr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(AutoOr::Value(n)),
            Repr::Text(t) if t.trim().eq_ignore_ascii_case("auto") || t.trim().is_empty() => {
                Ok(AutoOr::Auto)
            }
            Repr::Text(t) => t
                .trim()
                .parse()
                .map(AutoOr::Value)
                .map_err(|_| serde::de::Error::custom(format!("expected a number or \"auto\", got {t:?}"))),
        }
    }
}

impl AutoOr {
    /// `zero_is_auto` folds an explicit 0 into the automatic value.
    pub fn resolve(self, auto: u64, zero_is_auto: bool) -> u64 {
        match self {
            AutoOr::Auto => auto,
            AutoOr::Value(0) if zero_is_auto => auto,
            AutoOr::Value(n) => n,
        }
    }
}

/// `{start, end, step_days}` with dates or day offsets from today.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DateBounds {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub start_offset_days: Option<i64>,
    pub end_offset_days: Option<i64>,
    pub step_days: Option<i64>,
}

impl DateBounds {
    fn resolve(&self, today: NaiveDate, field: &'static str) -> Result<(NaiveDate, NaiveDate), ConfigError> {
        let start = self
            .start
            .or_else(|| self.start_offset_days.and_then(|d| offset(today, d)))
            .ok_or(ConfigError::IncompleteDateRange(field))?;
        let end = self
            .end
            .or_else(|| self.end_offset_days.and_then(|d| offset(today, d)))
            .ok_or(ConfigError::IncompleteDateRange(field))?;
        Ok(if start > end { (end, start) } else { (start, end) })
    }
}

fn offset(today: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        today.checked_add_days(Days::new(days as u64))
    } else {
        today.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DateListSpec {
    List(Vec<NaiveDate>),
    Explicit { dates: Vec<NaiveDate> },
    Range(DateBounds),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReturnDatesSpec {
    List(Vec<NaiveDate>),
    Explicit { dates: Vec<NaiveDate> },
    Range(DateBounds),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub max_itineraries: usize,
    pub max_combinations_per_itinerary: usize,
    pub max_airports_per_group: usize,
    pub max_airport_pairs_per_leg: usize,
    pub max_flight_options_per_segment: usize,
    pub max_calls: usize,
    pub trip_nights_range: Option<TripNightsRange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub mode: String,
    pub fallback_mode: Option<String>,
    pub currency: String,
    pub seat: Seat,
    pub max_stops: Option<u32>,
    pub sleep_seconds: f64,
    pub language: String,
    pub timeout_seconds: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            mode: "local".to_string(),
            fallback_mode: None,
            currency: String::new(),
            seat: Seat::Economy,
            max_stops: None,
            sleep_seconds: 0.0,
            language: "en".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConcurrencySettings {
    pub max_workers: AutoOr,
    pub rate_limit_per_minute: AutoOr,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub weights: ScoringWeights,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub verbose: bool,
    pub progress: Option<bool>,
    pub log_every_calls: Option<usize>,
    pub log_every_schedules: Option<usize>,
    pub progress_every_seconds: f64,
    pub count_schedules_for_progress: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            verbose: false,
            progress: None,
            log_every_calls: None,
            log_every_schedules: None,
            progress_every_seconds: 0.2,
            count_schedules_for_progress: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub csv_path: String,
    pub summary_csv_path: Option<String>,
    pub cache_path: Option<String>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            csv_path: "flights_raw.csv".to_string(),
            summary_csv_path: None,
            cache_path: None,
        }
    }
}

/// The plan file as written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub version: Option<u32>,
    pub groups: BTreeMap<String, Vec<String>>,
    pub itineraries: Vec<Vec<RawNode>>,
    pub departure_dates: Option<DateListSpec>,
    pub return_dates: Option<ReturnDatesSpec>,
    pub return_date_range: Option<DateBounds>,
    pub stay_nights: BTreeMap<String, StayNightsSpec>,
    pub constraints: Constraints,
    pub trip_strategy: TripStrategy,
    pub fetch: FetchSettings,
    pub passengers: Passengers,
    pub concurrency: ConcurrencySettings,
    pub scoring: ScoringSettings,
    pub logging: LoggingSettings,
    pub output: OutputSettings,
}

/// Resolved logging knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSettings {
    pub verbose: bool,
    pub display: bool,
    /// 0 = never
    pub log_every_calls: usize,
    /// 0 = never
    pub log_every_schedules: usize,
    pub refresh: Duration,
    pub count_schedules: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub raw_csv: PathBuf,
    pub summary_csv: Option<PathBuf>,
    pub cache: Option<PathBuf>,
}

/// A validated plan, ready to sweep.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub groups: HashMap<String, Vec<String>>,
    pub itineraries: Vec<ItinerarySpec>,
    pub departure_dates: Vec<NaiveDate>,
    pub return_filter: Option<DateFilter>,
    pub stay_nights: HashMap<String, StayNightsSpec>,
    pub constraints: Constraints,
    pub trip_strategy: TripStrategy,
    pub fetch: FetchSettings,
    pub passengers: Passengers,
    pub concurrency: ConcurrencySettings,
    pub weights: ScoringWeights,
    pub progress: ProgressSettings,
    pub output: OutputPaths,
    pub warnings: Vec<String>,
}

impl PlanConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: PlanConfig = serde_json::from_str(text)?;
        match config.version {
            None | Some(CONFIG_VERSION) => Ok(config),
            Some(other) => Err(ConfigError::UnsupportedVersion(other)),
        }
    }

    /// Resolve against `now` (dates relative to today, output path placeholders).
    pub fn validate(&self, now: NaiveDateTime) -> Result<SweepPlan, ConfigError> {
        let today = now.date();
        let mut warnings = Vec::new();

        let groups: HashMap<String, Vec<String>> = self
            .groups
            .iter()
            .map(|(name, codes)| (name.trim().to_uppercase(), normalize_codes(codes)))
            .collect();
        for (name, codes) in &groups {
            if codes.is_empty() {
                warnings.push(format!("group {name} has no airports"));
            }
            for code in codes.iter().filter(|c| !is_airport_code(c)) {
                warnings.push(format!("group {name}: {code:?} does not look like an airport code"));
            }
        }

        if self.itineraries.is_empty() {
            return Err(ConfigError::NoItineraries);
        }
        let itineraries = self
            .itineraries
            .iter()
            .map(|raw| ItinerarySpec::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        for node in itineraries.iter().flat_map(|i| i.nodes()) {
            if node.airports_override.is_none() && !groups.contains_key(&node.group) {
                return Err(ConfigError::MissingGroup(node.group.clone()));
            }
        }

        let stay_nights: HashMap<String, StayNightsSpec> = self
            .stay_nights
            .iter()
            .map(|(group, spec)| (group.trim().to_uppercase(), spec.clone()))
            .collect();
        for stop in itineraries.iter().flat_map(|i| i.stops()) {
            stay_nights
                .get(&stop.group)
                .ok_or_else(|| ConfigError::MissingStayNights(stop.group.clone()))?
                .expand(&stop.group)?;
        }

        let departure_dates = self.resolve_departure_dates(today)?;
        let return_filter = self.resolve_return_filter(today)?;
        if return_filter.as_ref().is_some_and(DateFilter::is_empty) {
            warnings.push("return_dates is empty, no schedule can match".to_string());
        }

        let passengers = self.passengers;
        if passengers.adults == 0 {
            return Err(ConfigError::InvalidValue {
                field: "passengers.adults",
                value: "at least one adult is required".to_string(),
            });
        }
        if passengers.infants_on_lap > passengers.adults {
            return Err(ConfigError::InvalidValue {
                field: "passengers.infants_on_lap",
                value: format!(
                    "{} infants on lap for {} adults",
                    passengers.infants_on_lap, passengers.adults
                ),
            });
        }

        let mut fetch = self.fetch.clone();
        fetch.currency = fetch.currency.trim().to_uppercase();
        if !fetch.sleep_seconds.is_finite() || fetch.sleep_seconds < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "fetch.sleep_seconds",
                value: fetch.sleep_seconds.to_string(),
            });
        }

        let weights = self.scoring.weights;
        if weights.normalized().is_none() {
            warnings.push("scoring weights sum to zero, ranking by price only".to_string());
        }

        let logging = &self.logging;
        let display = logging.progress.unwrap_or(logging.verbose);
        let progress = ProgressSettings {
            verbose: logging.verbose,
            display,
            log_every_calls: logging
                .log_every_calls
                .unwrap_or(if logging.verbose { 10 } else { 0 }),
            log_every_schedules: logging
                .log_every_schedules
                .unwrap_or(if logging.verbose { 1 } else { 0 }),
            refresh: Duration::from_secs_f64(logging.progress_every_seconds.max(0.05)),
            count_schedules: logging.count_schedules_for_progress,
        };

        let output = OutputPaths {
            raw_csv: PathBuf::from(format_output_path(&self.output.csv_path, now)),
            summary_csv: self
                .output
                .summary_csv_path
                .as_deref()
                .map(|p| PathBuf::from(format_output_path(p, now))),
            cache: self
                .output
                .cache_path
                .as_deref()
                .map(|p| PathBuf::from(format_output_path(p, now))),
        };

        for warning in &warnings {
            warn!("{warning}");
        }

        Ok(SweepPlan {
            groups,
            itineraries,
            departure_dates,
            return_filter,
            stay_nights,
            constraints: self.constraints.clone(),
            trip_strategy: self.trip_strategy,
            fetch,
            passengers,
            concurrency: self.concurrency.clone(),
            weights,
            progress,
            output,
            warnings,
        })
    }

    fn resolve_departure_dates(&self, today: NaiveDate) -> Result<Vec<NaiveDate>, ConfigError> {
        let spec = self
            .departure_dates
            .as_ref()
            .ok_or(ConfigError::NoDepartureDates)?;
        let dates: Vec<NaiveDate> = match spec {
            DateListSpec::List(dates) | DateListSpec::Explicit { dates } => {
                dates.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
            }
            DateListSpec::Range(bounds) => {
                let (start, end) = bounds.resolve(today, "departure_dates")?;
                let step = bounds.step_days.unwrap_or(1);
                if step <= 0 {
                    return Err(ConfigError::InvalidStep {
                        field: "departure_dates.step_days",
                        step,
                    });
                }
                start
                    .iter_days()
                    .take_while(|d| *d <= end)
                    .step_by(step as usize)
                    .collect()
            }
        };
        if dates.is_empty() {
            return Err(ConfigError::NoDepartureDates);
        }
        Ok(dates)
    }

    fn resolve_return_filter(&self, today: NaiveDate) -> Result<Option<DateFilter>, ConfigError> {
        match (&self.return_dates, &self.return_date_range) {
            (Some(ReturnDatesSpec::List(dates)), _)
            | (Some(ReturnDatesSpec::Explicit { dates }), _) => {
                Ok(Some(DateFilter::Set(dates.iter().copied().collect())))
            }
            (Some(ReturnDatesSpec::Range(bounds)), _) | (None, Some(bounds)) => {
                let (start, end) = bounds.resolve(today, "return_dates")?;
                Ok(Some(DateFilter::range(start, end)))
            }
            (None, None) => Ok(None),
        }
    }
}

/// Workers and calls per minute picked from the machine's parallelism.
pub fn auto_concurrency(fetch_mode: &str, cores: usize) -> (usize, u32) {
    let mut workers = match cores {
        0..=2 => 1,
        3..=4 => 2,
        5..=8 => 3,
        _ => 4,
    };
    if fetch_mode.eq_ignore_ascii_case("local") {
        workers = workers.min(2);
    }
    let rate = (workers as u32 * 8).max(6);
    (workers, rate)
}

impl SweepPlan {
    pub fn schedule_limits(&self) -> ScheduleLimits {
        ScheduleLimits {
            max_combinations: self.constraints.max_combinations_per_itinerary,
            trip_nights: self.constraints.trip_nights_range,
        }
    }

    /// Primary and fallback fetch modes, honouring an override
    /// (environment variable or command line).
    pub fn fetch_modes(&self, override_mode: Option<&str>) -> FetchModes {
        resolve_fetch_modes(
            &self.fetch.mode,
            self.fetch.fallback_mode.as_deref(),
            override_mode,
        )
    }

    /// Worker pool and pacing for a sweep in `fetch_mode`.
    pub fn engine_options(&self, fetch_mode: &str) -> EngineOptions {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let (auto_workers, auto_rate) = auto_concurrency(fetch_mode, cores);
        let workers = self
            .concurrency
            .max_workers
            .resolve(auto_workers as u64, true)
            .max(1) as usize;
        let rate = self
            .concurrency
            .rate_limit_per_minute
            .resolve(auto_rate as u64, false)
            .min(u32::MAX as u64) as u32;
        let sleep_between_calls = if workers > 1 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.fetch.sleep_seconds)
        };
        EngineOptions {
            workers,
            rate_limit_per_minute: rate,
            sleep_between_calls,
            max_retries: self.concurrency.max_retries,
            max_flight_options: self.constraints.max_flight_options_per_segment,
        }
    }

    pub fn now_local() -> NaiveDateTime {
        Local::now().naive_local()
    }
}
