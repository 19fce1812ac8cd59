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

//! # Cleaning Pass
//!
//! Splits the raw CSV into rows with a usable price and duration and the
//! rest, recomputes the summary from the usable rows and writes the
//! "top N" views next to it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::itinerary_scoring::{
    ScoringWeights, asc_nulls_last, compare_ranked, desc_nulls_last, rank_rows, score_rows,
};
use crate::summary_aggregator::{SUMMARY_HEADERS, SummaryAggregator, SummaryRow, round2};
use crate::sweep_output::{RawRow, append_suffix, write_csv};
use crate::value_parsers::{parse_duration_minutes, parse_price};

pub const TOP_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidPrice,
    InvalidDuration,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidPrice => "invalid_price",
            RejectReason::InvalidDuration => "invalid_duration",
        }
    }
}

/// Every reason a raw row cannot be used; empty when it is clean.
pub fn reject_reasons(row: &RawRow) -> Vec<RejectReason> {
    let mut reasons = Vec::new();
    let price = row
        .price_value
        .or_else(|| row.price_raw.as_deref().and_then(|raw| parse_price(raw).0));
    if !price.is_some_and(|p| p > 0.0) {
        reasons.push(RejectReason::InvalidPrice);
    }
    if row.duration.as_deref().and_then(parse_duration_minutes).is_none() {
        reasons.push(RejectReason::InvalidDuration);
    }
    reasons
}

/// `reject_reason` column value, reasons joined by `|`.
pub fn join_reasons(reasons: &[RejectReason]) -> String {
    reasons.iter().map(RejectReason::as_str).collect::<Vec<_>>().join("|")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopView {
    Score,
    Cheapest,
    Shortest,
    FewestStops,
    PricePerNight,
}

impl TopView {
    pub const ALL: [TopView; 5] = [
        TopView::Score,
        TopView::Cheapest,
        TopView::Shortest,
        TopView::FewestStops,
        TopView::PricePerNight,
    ];

    pub fn file_tag(&self) -> &'static str {
        match self {
            TopView::Score => "Score",
            TopView::Cheapest => "Cheapest",
            TopView::Shortest => "Shortest",
            TopView::FewestStops => "Fewest_Stops",
            TopView::PricePerNight => "Price_per_Night",
        }
    }

    /// The first `limit` summary rows in this view's order. Missing values
    /// sort last; ties fall back to the higher score.
    pub fn select<'a>(&self, rows: &'a [SummaryRow], limit: usize) -> Vec<&'a SummaryRow> {
        fn price(r: &SummaryRow) -> Option<f64> {
            r.min_total_price
        }
        fn minutes(r: &SummaryRow) -> Option<f64> {
            r.total_duration_min.map(f64::from)
        }
        fn stops(r: &SummaryRow) -> Option<f64> {
            r.total_stops.map(f64::from)
        }

        let mut rows: Vec<&SummaryRow> = match self {
            TopView::PricePerNight => rows.iter().filter(|r| price_per_night(r).is_some()).collect(),
            _ => rows.iter().collect(),
        };
        match self {
            TopView::Score => rows.sort_by(|a, b| compare_ranked(a, b)),
            TopView::Cheapest => rows.sort_by(|a, b| {
                asc_nulls_last(price(a), price(b)).then_with(|| desc_nulls_last(a.score, b.score))
            }),
            TopView::Shortest => rows.sort_by(|a, b| {
                asc_nulls_last(minutes(a), minutes(b))
                    .then_with(|| desc_nulls_last(a.score, b.score))
                    .then_with(|| asc_nulls_last(price(a), price(b)))
            }),
            TopView::FewestStops => rows.sort_by(|a, b| {
                asc_nulls_last(stops(a), stops(b))
                    .then_with(|| desc_nulls_last(a.score, b.score))
                    .then_with(|| asc_nulls_last(price(a), price(b)))
            }),
            TopView::PricePerNight => rows.sort_by(|a, b| {
                asc_nulls_last(price_per_night(a), price_per_night(b))
                    .then_with(|| desc_nulls_last(a.score, b.score))
            }),
        }
        rows.truncate(limit);
        rows
    }
}

pub fn price_per_night(row: &SummaryRow) -> Option<f64> {
    let price = row.min_total_price?;
    (row.trip_nights > 0).then(|| round2(price / row.trip_nights as f64))
}

pub fn price_per_hour(row: &SummaryRow) -> Option<f64> {
    let price = row.min_total_price?;
    let minutes = row.total_duration_min.filter(|m| *m > 0)?;
    Some(round2(price / (minutes as f64 / 60.0)))
}

pub fn duration_hours(row: &SummaryRow) -> Option<f64> {
    row.total_duration_min.map(|m| round2(m as f64 / 60.0))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleaningReport {
    pub kept: usize,
    pub rejected: usize,
    pub clean_csv: PathBuf,
    pub rejected_csv: PathBuf,
    pub clean_summary: Option<PathBuf>,
    pub top_csvs: Vec<PathBuf>,
    /// Clean summary rows, ranked.
    pub ranked: Vec<SummaryRow>,
}

/// Run the cleaning pass over `raw_csv`.
///
/// With `summary_csv`, the clean summary and the top views are written
/// next to it.
pub fn clean_flights(
    raw_csv: &Path,
    summary_csv: Option<&Path>,
    currency: &str,
    weights: &ScoringWeights,
) -> Result<CleaningReport> {
    let clean_path = append_suffix(raw_csv, "clean");
    let rejected_path = append_suffix(raw_csv, "rejected");

    let mut reader = csv::Reader::from_path(raw_csv)
        .with_context(|| format!("opening {}", raw_csv.display()))?;
    let headers = reader.headers()?.clone();
    let mut clean = csv::Writer::from_path(&clean_path)
        .with_context(|| format!("creating {}", clean_path.display()))?;
    let mut rejected = csv::Writer::from_path(&rejected_path)
        .with_context(|| format!("creating {}", rejected_path.display()))?;
    clean.write_record(&headers)?;
    let mut rejected_headers = headers.clone();
    rejected_headers.push_field("reject_reason");
    rejected.write_record(&rejected_headers)?;

    let mut aggregator = SummaryAggregator::new(currency);
    let (mut kept, mut dropped) = (0usize, 0usize);
    for record in reader.records() {
        let record = record.with_context(|| format!("reading {}", raw_csv.display()))?;
        let row = record.deserialize::<RawRow>(Some(&headers)).ok();
        if let Some(row) = &row {
            aggregator.register_row(row);
        }
        let reasons = match &row {
            Some(row) => reject_reasons(row),
            None => vec![RejectReason::InvalidPrice, RejectReason::InvalidDuration],
        };
        if reasons.is_empty() {
            if let Some(row) = &row {
                aggregator.observe_row(row);
            }
            clean.write_record(&record)?;
            kept += 1;
        } else {
            let mut out = record.clone();
            out.push_field(&join_reasons(&reasons));
            rejected.write_record(&out)?;
            dropped += 1;
        }
    }
    clean.flush()?;
    rejected.flush()?;
    info!(kept, rejected = dropped, clean = %clean_path.display(), "Cleaned raw results");

    let mut ranked = aggregator.build_rows();
    score_rows(&mut ranked, weights);
    rank_rows(&mut ranked);

    let mut report = CleaningReport {
        kept,
        rejected: dropped,
        clean_csv: clean_path,
        rejected_csv: rejected_path,
        clean_summary: None,
        top_csvs: Vec::new(),
        ranked,
    };

    if let Some(summary) = summary_csv {
        let clean_summary = append_suffix(summary, "clean");
        write_csv(&clean_summary, SUMMARY_HEADERS, &report.ranked)?;
        for view in TopView::ALL {
            let path = append_suffix(summary, &format!("clean_Top_{}", view.file_tag()));
            write_top_csv(&path, &view.select(&report.ranked, TOP_LIMIT))?;
            debug!(path = %path.display(), "Wrote top view");
            report.top_csvs.push(path);
        }
        report.clean_summary = Some(clean_summary);
    }
    Ok(report)
}

fn write_top_csv(path: &Path, rows: &[&SummaryRow]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    let mut headers: Vec<&str> = SUMMARY_HEADERS.to_vec();
    headers.extend(["duration_hours", "price_per_night", "price_per_hour"]);
    writer.write_record(&headers)?;

    let opt = |v: Option<String>| v.unwrap_or_default();
    for row in rows {
        let record = [
            row.itinerary_id.clone(),
            row.itinerary_route.clone(),
            row.trip_start_date.to_string(),
            row.trip_end_date.to_string(),
            row.trip_nights.to_string(),
            row.segments.to_string(),
            row.query_count.to_string(),
            row.trip_types.clone(),
            row.priced_segments.to_string(),
            opt(row.min_total_price.map(|v| v.to_string())),
            opt(row.total_duration_min.map(|v| v.to_string())),
            opt(row.total_stops.map(|v| v.to_string())),
            opt(row.night_segments.map(|v| v.to_string())),
            opt(row.score.map(|v| v.to_string())),
            row.price_currency.clone(),
            row.segment_min_prices.clone(),
            row.segment_best_airports.clone(),
            row.segment_best_airlines.clone(),
            opt(duration_hours(row).map(|v| v.to_string())),
            opt(price_per_night(row).map(|v| v.to_string())),
            opt(price_per_hour(row).map(|v| v.to_string())),
        ];
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing_provider::{FetchStatus, TripType};
    use chrono::NaiveDate;

    fn summary(id: &str, price: f64, minutes: u32, stops: u32, nights: i64) -> SummaryRow {
        SummaryRow {
            itinerary_id: id.to_string(),
            itinerary_route: "PAR>LIS>PAR".to_string(),
            trip_start_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            trip_end_date: NaiveDate::from_ymd_opt(2026, 5, 5).unwrap(),
            trip_nights: nights,
            segments: 2,
            query_count: 2,
            trip_types: "one-way|one-way".to_string(),
            priced_segments: 2,
            min_total_price: Some(price),
            total_duration_min: Some(minutes),
            total_stops: Some(stops),
            night_segments: Some(0),
            score: Some(50.0),
            price_currency: "EUR".to_string(),
            segment_min_prices: String::new(),
            segment_best_airports: String::new(),
            segment_best_airlines: String::new(),
        }
    }

    #[test]
    fn derived_metrics() {
        let row = summary("a", 300.0, 90, 1, 4);
        assert_eq!(price_per_night(&row), Some(75.0));
        assert_eq!(price_per_hour(&row), Some(200.0));
        assert_eq!(duration_hours(&row), Some(1.5));
        assert_eq!(price_per_night(&summary("b", 300.0, 90, 1, 0)), None);
    }

    fn scored(mut row: SummaryRow, score: Option<f64>) -> SummaryRow {
        row.score = score;
        row
    }

    fn ids(rows: Vec<&SummaryRow>) -> Vec<String> {
        rows.iter().map(|r| r.itinerary_id.clone()).collect()
    }

    #[test]
    fn top_views_reorder() {
        let ranked = vec![
            scored(summary("a", 300.0, 200, 0, 3), Some(80.0)),
            scored(summary("b", 100.0, 500, 2, 2), Some(60.0)),
            scored(summary("c", 200.0, 100, 1, 10), Some(40.0)),
        ];
        assert_eq!(ids(TopView::Score.select(&ranked, 10)), vec!["a", "b", "c"]);
        assert_eq!(ids(TopView::Cheapest.select(&ranked, 10)), vec!["b", "c", "a"]);
        assert_eq!(ids(TopView::Shortest.select(&ranked, 2)), vec!["c", "a"]);
        assert_eq!(ids(TopView::FewestStops.select(&ranked, 10)), vec!["a", "c", "b"]);
        assert_eq!(ids(TopView::PricePerNight.select(&ranked, 10)), vec!["c", "b", "a"]);
    }

    #[test]
    fn top_views_break_ties_on_score() {
        let rows = vec![
            scored(summary("low", 100.0, 300, 1, 4), Some(20.0)),
            scored(summary("high", 100.0, 300, 1, 4), Some(90.0)),
            scored(summary("mid", 150.0, 300, 1, 4), Some(50.0)),
        ];
        assert_eq!(ids(TopView::Cheapest.select(&rows, 10)), vec!["high", "low", "mid"]);
        assert_eq!(ids(TopView::Shortest.select(&rows, 10)), vec!["high", "mid", "low"]);
        assert_eq!(ids(TopView::FewestStops.select(&rows, 10)), vec!["high", "mid", "low"]);
        assert_eq!(ids(TopView::PricePerNight.select(&rows, 2)), vec!["high", "low"]);
    }

    #[test]
    fn top_views_keep_partially_priced_rows_last() {
        let mut partial = scored(summary("partial", 50.0, 60, 0, 3), None);
        partial.priced_segments = 1;
        partial.min_total_price = None;
        partial.total_duration_min = None;
        let rows = vec![
            partial,
            scored(summary("b", 200.0, 300, 2, 3), Some(30.0)),
            scored(summary("a", 100.0, 400, 1, 3), Some(70.0)),
        ];
        assert_eq!(ids(TopView::Score.select(&rows, 10)), vec!["a", "b", "partial"]);
        assert_eq!(ids(TopView::Cheapest.select(&rows, 10)), vec!["a", "b", "partial"]);
        assert_eq!(ids(TopView::Shortest.select(&rows, 10)), vec!["b", "a", "partial"]);
        assert_eq!(ids(TopView::FewestStops.select(&rows, 10)), vec!["partial", "a", "b"]);
        assert_eq!(ids(TopView::PricePerNight.select(&rows, 10)), vec!["a", "b"]);
    }

    fn raw(price: Option<f64>, duration: Option<&str>) -> RawRow {
        let day = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        RawRow {
            itinerary_id: "it0001".to_string(),
            itinerary_route: "PAR>LIS".to_string(),
            segment_index: 0,
            segment_span: 1,
            query_index: 0,
            trip_type: TripType::OneWay,
            segment_route_group: "PAR>LIS".to_string(),
            from_group: "PAR".to_string(),
            to_group: "LIS".to_string(),
            from_airport: "CDG".to_string(),
            to_airport: "LIS".to_string(),
            segment_date: day,
            return_date: None,
            stay_nights: None,
            trip_start_date: day,
            trip_end_date: day,
            trip_nights: 0,
            flight_is_best: Some(true),
            flight_name: Some("TAP".to_string()),
            departure: None,
            arrival: None,
            arrival_time_ahead: None,
            duration: duration.map(str::to_string),
            stops: Some(0),
            delay: None,
            price_raw: None,
            price_value: price,
            price_currency: Some("EUR".to_string()),
            current_price_label: None,
            seat: "economy".to_string(),
            adults: 1,
            children: 0,
            infants_in_seat: 0,
            infants_on_lap: 0,
            status: FetchStatus::Ok,
            error: None,
        }
    }

    #[test]
    fn every_reject_reason_is_reported() {
        assert!(reject_reasons(&raw(Some(120.0), Some("2 hr 5 min"))).is_empty());
        assert_eq!(
            join_reasons(&reject_reasons(&raw(Some(120.0), None))),
            "invalid_duration"
        );
        assert_eq!(
            join_reasons(&reject_reasons(&raw(Some(0.0), Some("2 hr")))),
            "invalid_price"
        );
        assert_eq!(
            join_reasons(&reject_reasons(&raw(None, Some("unknown")))),
            "invalid_price|invalid_duration"
        );
    }
}
