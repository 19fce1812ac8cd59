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

//! # Itinerary Scoring
//!
//! Complete summary rows are min-max normalized on price, duration, stops
//! and night legs, then scored:
//!
//! ```text
//! score = clamp(1 - Σ wᵢ·nᵢ, 0, 1) × 100
//! ```
//!
//! Incomplete rows keep an empty score and sort last.

use std::cmp::Ordering;

use serde::Deserialize;

use crate::summary_aggregator::{SummaryRow, round2};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub price: f64,
    pub duration: f64,
    pub stops: f64,
    pub night: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            price: 0.6,
            duration: 0.2,
            stops: 0.15,
            night: 0.05,
        }
    }
}

impl ScoringWeights {
    pub const PRICE_ONLY: ScoringWeights = ScoringWeights {
        price: 1.0,
        duration: 0.0,
        stops: 0.0,
        night: 0.0,
    };

    /// Weights rescaled to sum to 1; `None` when they do not sum to a
    /// positive finite number. Individual weights keep their sign.
    pub fn normalized(&self) -> Option<ScoringWeights> {
        let total = self.price + self.duration + self.stops + self.night;
        (total > 0.0 && total.is_finite()).then(|| ScoringWeights {
            price: self.price / total,
            duration: self.duration / total,
            stops: self.stops / total,
            night: self.night / total,
        })
    }

    pub fn effective(&self) -> ScoringWeights {
        self.normalized().unwrap_or(Self::PRICE_ONLY)
    }
}

/// Maps values onto [0, 1]; flat inputs all map to 0.
#[derive(Debug, Clone, Copy)]
struct MinMax {
    min: f64,
    max: f64,
}

impl MinMax {
    fn over(values: impl Iterator<Item = f64>) -> Option<Self> {
        values.fold(None, |acc, v| match acc {
            None => Some(MinMax { min: v, max: v }),
            Some(m) => Some(MinMax {
                min: m.min.min(v),
                max: m.max.max(v),
            }),
        })
    }

    fn normalize(&self, v: f64) -> f64 {
        if self.max <= self.min {
            0.0
        } else {
            (v - self.min) / (self.max - self.min)
        }
    }
}

/// Fill `score` on complete rows, clear it on the others.
pub fn score_rows(rows: &mut [SummaryRow], weights: &ScoringWeights) {
    let w = weights.effective();
    let metric = |r: &SummaryRow| -> Option<[f64; 4]> {
        Some([
            r.min_total_price?,
            r.total_duration_min? as f64,
            r.total_stops? as f64,
            r.night_segments? as f64,
        ])
    };

    let eligible: Vec<[f64; 4]> = rows.iter().filter_map(metric).collect();
    let ranges: Vec<Option<MinMax>> = (0..4)
        .map(|i| MinMax::over(eligible.iter().map(|m| m[i])))
        .collect();
    let weights = [w.price, w.duration, w.stops, w.night];

    for row in rows.iter_mut() {
        row.score = metric(row).map(|m| {
            let penalty: f64 = (0..4)
                .map(|i| {
                    let n = ranges[i].map_or(0.0, |r| r.normalize(m[i]));
                    weights[i] * n
                })
                .sum();
            round2((1.0 - penalty).clamp(0.0, 1.0) * 100.0)
        });
    }
}

/// Score descending with unscored rows last, then cheaper, then shorter.
pub fn rank_rows(rows: &mut [SummaryRow]) {
    rows.sort_by(compare_ranked);
}

pub(crate) fn compare_ranked(a: &SummaryRow, b: &SummaryRow) -> Ordering {
    desc_nulls_last(a.score, b.score)
        .then_with(|| asc_nulls_last(a.min_total_price, b.min_total_price))
        .then_with(|| {
            asc_nulls_last(
                a.total_duration_min.map(f64::from),
                b.total_duration_min.map(f64::from),
            )
        })
}

pub(crate) fn desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub(crate) fn asc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
