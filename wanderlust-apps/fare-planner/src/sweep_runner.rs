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

//! # Sweep
//!
//! One full pass over a plan under a single fetch mode:
//! schedules, trip requests, airport pairs, fetches, raw rows, summary,
//! cleaning. Queries run one after the other; the pairs of a query run
//! concurrently and are written back in pair order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fetch_cache::FetchCache;
use crate::fetch_engine::FetchEngine;
use crate::flights_cleaning::{CleaningReport, clean_flights};
use crate::itinerary_scoring::{rank_rows, score_rows};
use crate::itinerary_spec::{AirportPair, ItinerarySpec, airport_pairs, airports_for_node};
use crate::plan_config::{ConfigError, SweepPlan};
use crate::pricing_provider::{CacheSource, FetchResult, FetchStatus, PricingProvider, PricingRequest};
use crate::run_progress::{RunContext, RunState};
use crate::schedule_generator::{Schedule, ScheduleGenerator};
use crate::summary_aggregator::{ItineraryMeta, SUMMARY_HEADERS, SummaryAggregator, SummaryRow};
use crate::sweep_output::{RawCsvWriter, RawRow, write_csv};
use crate::trip_request_planner::{TripRequest, plan_trip_requests};
use crate::value_parsers::parse_price;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("required artefact missing after cleaning: {}", .0.display())]
    MissingArtifact(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    MaxCalls,
    MaxItineraries,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub schedules: usize,
    pub queries: usize,
    pub pairs_submitted: usize,
    pub external_calls: u64,
    pub cache_hits: usize,
    pub inflight_hits: usize,
    pub ok: usize,
    pub empty: usize,
    pub errors: usize,
    pub raw_rows: usize,
}

impl SweepStats {
    fn record(&mut self, result: &FetchResult) {
        match result.cache_source {
            Some(CacheSource::Cache) => self.cache_hits += 1,
            Some(CacheSource::Inflight) => self.inflight_hits += 1,
            None => {}
        }
        match result.status {
            FetchStatus::Ok => self.ok += 1,
            FetchStatus::Empty => self.empty += 1,
            FetchStatus::Error => self.errors += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepReport {
    pub fetch_mode: String,
    pub state: RunState,
    pub stopped: Option<StopReason>,
    pub stats: SweepStats,
    pub raw_csv: PathBuf,
    pub summary_csv: Option<PathBuf>,
    /// Summary of the raw rows, ranked.
    pub summary: Vec<SummaryRow>,
    pub cleaning: Option<CleaningReport>,
}

impl SweepReport {
    /// Rows that survived the cleaning pass.
    pub fn priced_rows(&self) -> usize {
        self.cleaning.as_ref().map_or(0, |c| c.kept)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == RunState::Cancelled
    }

    /// Clean ranking when available, raw ranking otherwise.
    pub fn ranked(&self) -> &[SummaryRow] {
        match &self.cleaning {
            Some(c) => &c.ranked,
            None => &self.summary,
        }
    }
}

fn schedules_of<'a>(
    plan: &'a SweepPlan,
    itinerary: &'a ItinerarySpec,
) -> Result<ScheduleGenerator<'a>, ConfigError> {
    ScheduleGenerator::new(
        itinerary,
        &plan.departure_dates,
        &plan.stay_nights,
        plan.return_filter.as_ref(),
        plan.schedule_limits(),
    )
}

/// Number of schedules a sweep would visit, honouring every cap.
pub fn count_schedules(plan: &SweepPlan) -> Result<usize, ConfigError> {
    let mut total = 0usize;
    for itinerary in &plan.itineraries {
        total += schedules_of(plan, itinerary)?.count();
    }
    let cap = plan.constraints.max_itineraries;
    Ok(if cap > 0 { total.min(cap) } else { total })
}

fn expand_pairs(plan: &SweepPlan, trip: &TripRequest) -> Result<Vec<AirportPair>, ConfigError> {
    let max_airports = plan.constraints.max_airports_per_group;
    let from = airports_for_node(&trip.from, &plan.groups, max_airports)?;
    let to = airports_for_node(&trip.to, &plan.groups, max_airports)?;
    Ok(airport_pairs(&from, &to, plan.constraints.max_airport_pairs_per_leg))
}

fn pricing_request(plan: &SweepPlan, trip: &TripRequest, pair: &AirportPair, fetch_mode: &str) -> PricingRequest {
    PricingRequest {
        origin: pair.origin.clone(),
        destination: pair.destination.clone(),
        depart_date: trip.depart_date,
        return_date: trip.return_date,
        trip_type: trip.trip_type,
        seat: plan.fetch.seat,
        passengers: plan.passengers,
        max_stops: plan.fetch.max_stops,
        currency: plan.fetch.currency.clone(),
        fetch_mode: fetch_mode.to_string(),
    }
}

/// Where a row comes from: which schedule, which query, which pair.
struct RowOrigin<'a> {
    itinerary_id: &'a str,
    schedule: &'a Schedule<'a>,
    query_index: usize,
    trip: &'a TripRequest,
    request: &'a PricingRequest,
}

impl RowOrigin<'_> {
    fn base_row(&self, result: &FetchResult) -> RawRow {
        let r = self.request;
        RawRow {
            itinerary_id: self.itinerary_id.to_string(),
            itinerary_route: self.schedule.itinerary.label().to_string(),
            segment_index: self.trip.segment_index,
            segment_span: self.trip.segment_span,
            query_index: self.query_index,
            trip_type: self.trip.trip_type,
            segment_route_group: self.trip.route_group(),
            from_group: self.trip.from.group.clone(),
            to_group: self.trip.to.group.clone(),
            from_airport: r.origin.clone(),
            to_airport: r.destination.clone(),
            segment_date: self.trip.depart_date,
            return_date: self.trip.return_date,
            stay_nights: self.trip.stay_nights,
            trip_start_date: self.schedule.trip_start(),
            trip_end_date: self.schedule.trip_end(),
            trip_nights: self.schedule.trip_nights(),
            flight_is_best: None,
            flight_name: None,
            departure: None,
            arrival: None,
            arrival_time_ahead: None,
            duration: None,
            stops: None,
            delay: None,
            price_raw: None,
            price_value: None,
            price_currency: None,
            current_price_label: result.current_price.clone(),
            seat: r.seat.as_str().to_string(),
            adults: r.passengers.adults,
            children: r.passengers.children,
            infants_in_seat: r.passengers.infants_in_seat,
            infants_on_lap: r.passengers.infants_on_lap,
            status: result.status,
            error: result.error.clone(),
        }
    }

    /// One row per candidate, or a single row for an empty/failed pair.
    fn rows(&self, result: &FetchResult) -> Vec<RawRow> {
        let base = self.base_row(result);
        if result.flights.is_empty() {
            return vec![base];
        }
        result
            .flights
            .iter()
            .map(|f| {
                let (value, symbol) = parse_price(&f.price);
                let currency = if symbol.is_empty() {
                    self.request.currency.clone()
                } else {
                    symbol
                };
                RawRow {
                    flight_is_best: Some(f.is_best),
                    flight_name: Some(f.name.clone()),
                    departure: Some(f.departure.clone()),
                    arrival: Some(f.arrival.clone()),
                    arrival_time_ahead: f.arrival_time_ahead.clone(),
                    duration: Some(f.duration.clone()),
                    stops: f.stops,
                    delay: f.delay.clone(),
                    price_raw: Some(f.price.clone()),
                    price_value: value,
                    price_currency: (!currency.is_empty()).then_some(currency),
                    ..base.clone()
                }
            })
            .collect()
    }
}

/// Run one sweep of `plan` under `fetch_mode`.
///
/// Configuration problems surfacing here abort the sweep and leave the run
/// `Failed`. Provider failures never do: they become `empty`/`error` rows.
/// On cancellation the raw CSV and cache keep what was fetched and no
/// summary is produced.
pub async fn run_sweep(
    plan: &SweepPlan,
    provider: Arc<dyn PricingProvider>,
    fetch_mode: &str,
    ctx: &RunContext,
) -> Result<SweepReport> {
    sweep(plan, provider, fetch_mode, ctx)
        .await
        .inspect_err(|_| ctx.enter(RunState::Failed))
}

async fn sweep(
    plan: &SweepPlan,
    provider: Arc<dyn PricingProvider>,
    fetch_mode: &str,
    ctx: &RunContext,
) -> Result<SweepReport> {
    let start = Instant::now();
    ctx.enter(RunState::Validating);
    for itinerary in &plan.itineraries {
        schedules_of(plan, itinerary)?;
    }
    ctx.enter(RunState::GeneratingSchedules);

    let schedules_total = match plan.constraints.max_itineraries {
        0 if plan.progress.count_schedules => Some(count_schedules(plan)? as u64),
        0 => None,
        cap => Some(cap as u64),
    };
    ctx.progress.reset(schedules_total);
    ctx.progress.set_calls_bound(Some(plan.constraints.max_calls as u64));

    let cache = Arc::new(FetchCache::load(plan.output.cache.clone()));
    let engine = FetchEngine::new(provider.clone(), cache.clone(), plan.engine_options(fetch_mode));
    let mut writer = RawCsvWriter::create(&plan.output.raw_csv)?;
    let mut aggregator = SummaryAggregator::new(&plan.fetch.currency);
    let mut stats = SweepStats::default();
    let mut stopped = None;

    info!(
        provider = provider.name(),
        fetch_mode,
        itineraries = plan.itineraries.len(),
        workers = engine.options().workers,
        rate_per_minute = engine.options().rate_limit_per_minute,
        raw_csv = %plan.output.raw_csv.display(),
        "Starting sweep"
    );

    let max_itineraries = plan.constraints.max_itineraries;
    let max_calls = plan.constraints.max_calls;
    'sweep: for itinerary in &plan.itineraries {
        for schedule in schedules_of(plan, itinerary)? {
            if ctx.checkpoint().is_err() {
                stopped = Some(StopReason::Cancelled);
                break 'sweep;
            }
            if max_itineraries > 0 && stats.schedules >= max_itineraries {
                stopped = Some(StopReason::MaxItineraries);
                break 'sweep;
            }
            stats.schedules += 1;
            let itinerary_id = format!("it{:04}", stats.schedules);
            let trips = plan_trip_requests(&schedule, plan.trip_strategy);
            aggregator.register(ItineraryMeta {
                itinerary_id: itinerary_id.clone(),
                route: itinerary.label().to_string(),
                trip_start: schedule.trip_start(),
                trip_end: schedule.trip_end(),
                trip_nights: schedule.trip_nights(),
                segments: itinerary.segment_count(),
                trip_types: trips.iter().map(|t| t.trip_type).collect(),
            });
            ctx.enter(RunState::Fetching);

            for (query_index, trip) in trips.iter().enumerate() {
                if max_calls > 0 && stats.pairs_submitted >= max_calls {
                    info!(max_calls, "Reached max_calls, stopping early");
                    stopped = Some(StopReason::MaxCalls);
                    break 'sweep;
                }
                let mut pairs = expand_pairs(plan, trip)?;
                if pairs.is_empty() {
                    warn!(itinerary_id = %itinerary_id, route = %trip.route_group(), "No airport pair to price");
                }
                if max_calls > 0 {
                    pairs.truncate(max_calls - stats.pairs_submitted);
                }
                let requests: Vec<PricingRequest> = pairs
                    .iter()
                    .map(|pair| pricing_request(plan, trip, pair, fetch_mode))
                    .collect();
                stats.queries += 1;
                stats.pairs_submitted += requests.len();
                ctx.progress.add_planned_calls(requests.len() as u64);

                let results = engine.fetch_all(&requests, ctx).await;
                for (request, result) in requests.iter().zip(results) {
                    let Some(result) = result else { continue };
                    stats.record(&result);
                    let calls_done = ctx.progress.call_done(result.from_cache);
                    let origin = RowOrigin {
                        itinerary_id: &itinerary_id,
                        schedule: &schedule,
                        query_index,
                        trip,
                        request,
                    };
                    for row in origin.rows(&result) {
                        if row.status == FetchStatus::Ok {
                            aggregator.observe_row(&row);
                        }
                        writer.write(&row)?;
                    }
                    let every = plan.progress.log_every_calls;
                    if every > 0 && calls_done % every as u64 == 0 {
                        info!("{}", ctx.progress.snapshot());
                    }
                }
                writer.flush()?;

                if ctx.is_cancelled() {
                    stopped = Some(StopReason::Cancelled);
                    break 'sweep;
                }
            }

            let schedules_done = ctx.progress.schedule_done();
            let every = plan.progress.log_every_schedules;
            if every > 0 && schedules_done % every as u64 == 0 {
                debug!(itinerary_id = %itinerary_id, route = itinerary.label(), "{}", ctx.progress.snapshot());
            }
        }
    }
    writer.flush()?;
    stats.raw_rows = writer.rows();
    stats.external_calls = engine.external_calls();

    if let Err(e) = cache.flush() {
        warn!("Could not persist fetch cache: {e:#}");
    }

    let mut report = SweepReport {
        fetch_mode: fetch_mode.to_string(),
        state: RunState::Done,
        stopped,
        stats,
        raw_csv: plan.output.raw_csv.clone(),
        summary_csv: plan.output.summary_csv.clone(),
        summary: Vec::new(),
        cleaning: None,
    };

    if stopped == Some(StopReason::Cancelled) {
        ctx.enter(RunState::Cancelled);
        report.state = RunState::Cancelled;
        info!(rows = report.stats.raw_rows, "Sweep cancelled, partial output kept");
        return Ok(report);
    }

    ctx.enter(RunState::Aggregating);
    let mut summary = aggregator.build_rows();
    ctx.enter(RunState::Scoring);
    score_rows(&mut summary, &plan.weights);
    rank_rows(&mut summary);
    if let Some(path) = &plan.output.summary_csv {
        write_csv(path, SUMMARY_HEADERS, &summary)
            .with_context(|| format!("writing summary {}", path.display()))?;
    }
    report.summary = summary;

    let cleaning = clean_flights(
        &plan.output.raw_csv,
        plan.output.summary_csv.as_deref(),
        &plan.fetch.currency,
        &plan.weights,
    )?;
    if plan.output.summary_csv.is_some() {
        match &cleaning.clean_summary {
            Some(path) if path.exists() => {}
            Some(path) => return Err(SweepError::MissingArtifact(path.clone()).into()),
            None => {
                let raw = plan.output.raw_csv.clone();
                return Err(SweepError::MissingArtifact(raw).into());
            }
        }
    }
    report.cleaning = Some(cleaning);

    let s = &report.stats;
    info!(
        fetch_mode,
        schedules = s.schedules,
        queries = s.queries,
        pairs = s.pairs_submitted,
        external_calls = s.external_calls,
        cache_hits = s.cache_hits,
        inflight_hits = s.inflight_hits,
        ok = s.ok,
        empty = s.empty,
        errors = s.errors,
        priced_rows = report.priced_rows(),
        "Sweep finished in {:.2?}",
        start.elapsed()
    );
    Ok(report)
}
