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

//! CSV artefacts of a sweep and their paths.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::pricing_provider::{FetchStatus, TripType};

pub const RAW_HEADERS: &[&str] = &[
    "itinerary_id",
    "itinerary_route",
    "segment_index",
    "segment_span",
    "query_index",
    "trip_type",
    "segment_route_group",
    "from_group",
    "to_group",
    "from_airport",
    "to_airport",
    "segment_date",
    "return_date",
    "stay_nights",
    "trip_start_date",
    "trip_end_date",
    "trip_nights",
    "flight_is_best",
    "flight_name",
    "departure",
    "arrival",
    "arrival_time_ahead",
    "duration",
    "stops",
    "delay",
    "price_raw",
    "price_value",
    "price_currency",
    "current_price_label",
    "seat",
    "adults",
    "children",
    "infants_in_seat",
    "infants_on_lap",
    "status",
    "error",
];

/// One raw output row: a candidate flight, or a pair that came back empty
/// or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub itinerary_id: String,
    pub itinerary_route: String,
    pub segment_index: usize,
    pub segment_span: usize,
    pub query_index: usize,
    pub trip_type: TripType,
    pub segment_route_group: String,
    pub from_group: String,
    pub to_group: String,
    pub from_airport: String,
    pub to_airport: String,
    pub segment_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub stay_nights: Option<u32>,
    pub trip_start_date: NaiveDate,
    pub trip_end_date: NaiveDate,
    pub trip_nights: i64,
    pub flight_is_best: Option<bool>,
    pub flight_name: Option<String>,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub arrival_time_ahead: Option<String>,
    pub duration: Option<String>,
    pub stops: Option<u32>,
    pub delay: Option<String>,
    pub price_raw: Option<String>,
    pub price_value: Option<f64>,
    pub price_currency: Option<String>,
    pub current_price_label: Option<String>,
    pub seat: String,
    pub adults: u32,
    pub children: u32,
    pub infants_in_seat: u32,
    pub infants_on_lap: u32,
    pub status: FetchStatus,
    pub error: Option<String>,
}

/// Raw rows written as they come, flushed after every query so an
/// interrupted sweep leaves everything fetched so far on disk.
pub struct RawCsvWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl RawCsvWriter {
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        writer.write_record(RAW_HEADERS)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    pub fn write(&mut self, row: &RawRow) -> Result<()> {
        self.writer
            .serialize(row)
            .with_context(|| format!("writing {}", self.path.display()))?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `headers` then every row to `path`. Field order of `T` must match.
pub fn write_csv<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(headers)?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_csv<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("reading {}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Expand `{timestamp}`, `{date}` and `{time}` in an output path.
pub fn format_output_path(template: &str, now: NaiveDateTime) -> String {
    template
        .replace("{timestamp}", &now.format("%Y%m%d_%H%M%S").to_string())
        .replace("{date}", &now.format("%Y%m%d").to_string())
        .replace("{time}", &now.format("%H%M%S").to_string())
}

/// Derive a sibling artefact path: `flights_raw_x.csv` gives
/// `flights_<suffix>_x.csv`, `flights_raw.csv` gives `flights_<suffix>.csv`,
/// anything else gets `_<suffix>` appended to its stem.
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());

    let new_stem = if stem.contains("_raw_") {
        stem.replacen("_raw_", &format!("_{suffix}_"), 1)
    } else if let Some(base) = stem.strip_suffix("_raw") {
        format!("{base}_{suffix}")
    } else {
        format!("{stem}_{suffix}")
    };
    path.with_file_name(format!("{new_stem}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_expand() {
        let now = NaiveDate::from_ymd_opt(2026, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap();
        assert_eq!(
            format_output_path("out/{date}/raw_{timestamp}_{time}.csv", now),
            "out/20260309/raw_20260309_070501_070501.csv"
        );
        assert_eq!(format_output_path("plain.csv", now), "plain.csv");
    }

    #[test]
    fn suffix_rules() {
        assert_eq!(
            append_suffix(Path::new("out/flights_raw_20260101.csv"), "clean"),
            PathBuf::from("out/flights_clean_20260101.csv")
        );
        assert_eq!(
            append_suffix(Path::new("flights_raw.csv"), "rejected"),
            PathBuf::from("flights_rejected.csv")
        );
        assert_eq!(
            append_suffix(Path::new("summary.csv"), "clean_Top_Score"),
            PathBuf::from("summary_clean_Top_Score.csv")
        );
    }
}
