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

//! # Summary Aggregation
//!
//! Best candidate per planned query, rolled up per itinerary. Totals are
//! all-or-nothing: one unpriced query leaves every total empty, the row is
//! still kept.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pricing_provider::TripType;
use crate::sweep_output::RawRow;
use crate::value_parsers::{is_night_segment, parse_duration_minutes, parse_price};

pub const SUMMARY_HEADERS: &[&str] = &[
    "itinerary_id",
    "itinerary_route",
    "trip_start_date",
    "trip_end_date",
    "trip_nights",
    "segments",
    "query_count",
    "trip_types",
    "priced_segments",
    "min_total_price",
    "total_duration_min",
    "total_stops",
    "night_segments",
    "score",
    "price_currency",
    "segment_min_prices",
    "segment_best_airports",
    "segment_best_airlines",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub itinerary_id: String,
    pub itinerary_route: String,
    pub trip_start_date: NaiveDate,
    pub trip_end_date: NaiveDate,
    pub trip_nights: i64,
    pub segments: usize,
    pub query_count: usize,
    pub trip_types: String,
    pub priced_segments: usize,
    pub min_total_price: Option<f64>,
    pub total_duration_min: Option<u32>,
    pub total_stops: Option<u32>,
    pub night_segments: Option<u32>,
    pub score: Option<f64>,
    pub price_currency: String,
    pub segment_min_prices: String,
    pub segment_best_airports: String,
    pub segment_best_airlines: String,
}

impl SummaryRow {
    /// Rows with complete totals take part in scoring.
    pub fn is_complete(&self) -> bool {
        self.min_total_price.is_some()
            && self.total_duration_min.is_some()
            && self.total_stops.is_some()
            && self.night_segments.is_some()
    }
}

/// Shape of one itinerary instance, known before anything is fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct ItineraryMeta {
    pub itinerary_id: String,
    pub route: String,
    pub trip_start: NaiveDate,
    pub trip_end: NaiveDate,
    pub trip_nights: i64,
    pub segments: usize,
    pub trip_types: Vec<TripType>,
}

impl ItineraryMeta {
    pub fn query_count(&self) -> usize {
        self.trip_types.len()
    }
}

/// Best priced candidate seen for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct BestCandidate {
    pub price: f64,
    pub duration_min: Option<u32>,
    pub stops: Option<u32>,
    pub night: bool,
    pub from_airport: String,
    pub to_airport: String,
    pub airline: String,
}

impl BestCandidate {
    /// Priced candidate from a raw row; `None` for rows without a price.
    pub fn from_row(row: &RawRow) -> Option<Self> {
        let price = row
            .price_value
            .or_else(|| row.price_raw.as_deref().and_then(|raw| parse_price(raw).0))?;
        Some(Self {
            price,
            duration_min: row.duration.as_deref().and_then(parse_duration_minutes),
            stops: row.stops,
            night: is_night_segment(
                row.departure.as_deref().unwrap_or_default(),
                row.arrival.as_deref().unwrap_or_default(),
                row.arrival_time_ahead.as_deref(),
            ),
            from_airport: row.from_airport.clone(),
            to_airport: row.to_airport.clone(),
            airline: row.flight_name.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Default)]
pub struct SummaryAggregator {
    currency: String,
    metas: Vec<ItineraryMeta>,
    index: HashMap<String, usize>,
    best: HashMap<(String, usize), BestCandidate>,
}

impl SummaryAggregator {
    pub fn new(currency: &str) -> Self {
        Self {
            currency: currency.to_string(),
            ..Default::default()
        }
    }

    pub fn register(&mut self, meta: ItineraryMeta) {
        if let Some(&i) = self.index.get(&meta.itinerary_id) {
            self.metas[i] = meta;
        } else {
            self.index.insert(meta.itinerary_id.clone(), self.metas.len());
            self.metas.push(meta);
        }
    }

    /// Rebuild an itinerary's shape from its raw rows.
    pub fn register_row(&mut self, row: &RawRow) {
        let i = match self.index.get(&row.itinerary_id) {
            Some(&i) => i,
            None => {
                self.register(ItineraryMeta {
                    itinerary_id: row.itinerary_id.clone(),
                    route: row.itinerary_route.clone(),
                    trip_start: row.trip_start_date,
                    trip_end: row.trip_end_date,
                    trip_nights: row.trip_nights,
                    segments: 0,
                    trip_types: Vec::new(),
                });
                self.metas.len() - 1
            }
        };
        let meta = &mut self.metas[i];
        meta.segments = meta.segments.max(row.segment_index + 1);
        if meta.trip_types.len() <= row.query_index {
            meta.trip_types.resize(row.query_index + 1, row.trip_type);
        }
        meta.trip_types[row.query_index] = row.trip_type;
    }

    /// Keep `candidate` if it is the cheapest so far for that query.
    pub fn observe(&mut self, itinerary_id: &str, query_index: usize, candidate: BestCandidate) {
        let key = (itinerary_id.to_string(), query_index);
        match self.best.get(&key) {
            Some(current) if current.price <= candidate.price => {}
            _ => {
                self.best.insert(key, candidate);
            }
        }
    }

    pub fn observe_row(&mut self, row: &RawRow) -> bool {
        match BestCandidate::from_row(row) {
            Some(candidate) => {
                self.observe(&row.itinerary_id, row.query_index, candidate);
                true
            }
            None => false,
        }
    }

    pub fn itineraries(&self) -> usize {
        self.metas.len()
    }

    /// One row per registered itinerary, in registration order, unscored.
    pub fn build_rows(&self) -> Vec<SummaryRow> {
        self.metas.iter().map(|meta| self.build_row(meta)).collect()
    }

    fn build_row(&self, meta: &ItineraryMeta) -> SummaryRow {
        let picks: Vec<Option<&BestCandidate>> = (0..meta.query_count())
            .map(|q| self.best.get(&(meta.itinerary_id.clone(), q)))
            .collect();
        let priced = picks.iter().flatten().count();
        let complete = meta.query_count() > 0 && priced == meta.query_count();

        let (mut price, mut duration, mut stops, mut nights) = (None, None, None, None);
        if complete {
            let all: Vec<&BestCandidate> = picks.iter().flatten().copied().collect();
            price = Some(all.iter().map(|c| c.price).sum::<f64>());
            duration = all.iter().map(|c| c.duration_min).sum::<Option<u32>>();
            stops = all.iter().map(|c| c.stops).sum::<Option<u32>>();
            nights = Some(all.iter().filter(|c| c.night).count() as u32);
        }

        let join = |f: &dyn Fn(&BestCandidate) -> String| {
            picks
                .iter()
                .map(|p| p.map(f).unwrap_or_default())
                .collect::<Vec<_>>()
                .join("|")
        };

        SummaryRow {
            itinerary_id: meta.itinerary_id.clone(),
            itinerary_route: meta.route.clone(),
            trip_start_date: meta.trip_start,
            trip_end_date: meta.trip_end,
            trip_nights: meta.trip_nights,
            segments: meta.segments,
            query_count: meta.query_count(),
            trip_types: meta
                .trip_types
                .iter()
                .map(TripType::as_str)
                .collect::<Vec<_>>()
                .join("|"),
            priced_segments: priced,
            min_total_price: price.map(round2),
            total_duration_min: duration,
            total_stops: stops,
            night_segments: nights,
            score: None,
            price_currency: self.currency.clone(),
            segment_min_prices: join(&|c: &BestCandidate| format_amount(c.price)),
            segment_best_airports: join(&|c: &BestCandidate| format!("{}-{}", c.from_airport, c.to_airport)),
            segment_best_airlines: join(&|c: &BestCandidate| c.airline.clone()),
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `120` for whole amounts, `120.50` otherwise.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
