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

//! # Schedule Generation
//!
//! Lazily expands an itinerary template, a list of departure dates and
//! per-stop stay lengths into dated schedules.
//!
//! Schedules come out ordered by departure date, then by the stay-night
//! tuple in lexicographic order. Filters (return date, total trip nights)
//! are applied on the fly and the per-itinerary cap stops the iterator.

use std::collections::{BTreeSet, HashMap};

use chrono::{Days, NaiveDate};
use serde::Deserialize;

use crate::itinerary_spec::{ItinerarySpec, NodeSpec};
use crate::plan_config::ConfigError;

/// Stay length at an intermediate stop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StayNightsSpec {
    Fixed {
        nights: u32,
    },
    Range {
        #[serde(default)]
        min: i64,
        max: Option<i64>,
        #[serde(default = "default_step")]
        step: i64,
    },
}

fn default_step() -> i64 {
    1
}

impl StayNightsSpec {
    /// Every stay length this spec allows, ascending.
    pub fn expand(&self, group: &str) -> Result<Vec<u32>, ConfigError> {
        match *self {
            StayNightsSpec::Fixed { nights } => Ok(vec![nights]),
            StayNightsSpec::Range { min, max, step } => {
                if step <= 0 {
                    return Err(ConfigError::InvalidStep {
                        field: "stay_nights.step",
                        step,
                    });
                }
                let max = max.unwrap_or(min);
                let (lo, hi) = if min > max { (max, min) } else { (min, max) };
                if lo < 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "stay_nights",
                        value: format!("{group}: {lo}"),
                    });
                }
                Ok((lo..=hi).step_by(step as usize).map(|n| n as u32).collect())
            }
        }
    }
}

/// Accepted final return dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFilter {
    Set(BTreeSet<NaiveDate>),
    Range { start: NaiveDate, end: NaiveDate },
}

impl DateFilter {
    pub fn range(start: NaiveDate, end: NaiveDate) -> Self {
        if start > end {
            DateFilter::Range {
                start: end,
                end: start,
            }
        } else {
            DateFilter::Range { start, end }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            DateFilter::Set(dates) => dates.contains(&date),
            DateFilter::Range { start, end } => *start <= date && date <= *end,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DateFilter::Set(dates) if dates.is_empty())
    }
}

/// Inclusive bounds on the total nights of a trip. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TripNightsRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl TripNightsRange {
    pub fn contains(&self, nights: i64) -> bool {
        self.min.is_none_or(|min| nights >= min) && self.max.is_none_or(|max| nights <= max)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleLimits {
    /// 0 = unlimited
    pub max_combinations: usize,
    pub trip_nights: Option<TripNightsRange>,
}

/// One dated instantiation of an itinerary template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule<'a> {
    pub itinerary: &'a ItinerarySpec,
    /// One departure date per segment.
    pub segment_dates: Vec<NaiveDate>,
    /// One stay length per intermediate stop.
    pub stay_nights: Vec<u32>,
}

/// A raw directed leg between two consecutive nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub from: NodeSpec,
    pub to: NodeSpec,
    pub depart_date: NaiveDate,
    /// Stay at `to` when it is an intermediate stop.
    pub stay_nights: Option<u32>,
}

impl Schedule<'_> {
    pub fn trip_start(&self) -> NaiveDate {
        self.segment_dates[0]
    }

    pub fn trip_end(&self) -> NaiveDate {
        self.segment_dates[self.segment_dates.len() - 1]
    }

    pub fn trip_nights(&self) -> i64 {
        (self.trip_end() - self.trip_start()).num_days()
    }

    pub fn segments(&self) -> Vec<Segment> {
        let nodes = self.itinerary.nodes();
        nodes
            .windows(2)
            .enumerate()
            .map(|(index, pair)| Segment {
                index,
                from: pair[0].clone(),
                to: pair[1].clone(),
                depart_date: self.segment_dates[index],
                stay_nights: self.stay_nights.get(index).copied(),
            })
            .collect()
    }
}

/// Lazy iterator over the accepted schedules of one itinerary.
#[derive(Debug)]
pub struct ScheduleGenerator<'a> {
    itinerary: &'a ItinerarySpec,
    departure_dates: &'a [NaiveDate],
    stay_options: Vec<Vec<u32>>,
    return_filter: Option<&'a DateFilter>,
    limits: ScheduleLimits,
    date_idx: usize,
    odometer: Vec<usize>,
    emitted: usize,
    exhausted: bool,
}

impl<'a> ScheduleGenerator<'a> {
    /// Stay specs are looked up by the stop's group name. A stop without a
    /// spec, or a spec with a non-positive step, fails before anything is
    /// generated.
    pub fn new(
        itinerary: &'a ItinerarySpec,
        departure_dates: &'a [NaiveDate],
        stay_nights: &HashMap<String, StayNightsSpec>,
        return_filter: Option<&'a DateFilter>,
        limits: ScheduleLimits,
    ) -> Result<Self, ConfigError> {
        let stay_options = itinerary
            .stops()
            .iter()
            .map(|stop| {
                stay_nights
                    .get(&stop.group)
                    .ok_or_else(|| ConfigError::MissingStayNights(stop.group.clone()))?
                    .expand(&stop.group)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let exhausted = stay_options.iter().any(Vec::is_empty);
        Ok(Self {
            itinerary,
            departure_dates,
            odometer: vec![0; stay_options.len()],
            stay_options,
            return_filter,
            limits,
            date_idx: 0,
            emitted: 0,
            exhausted,
        })
    }

    fn current_candidate(&self) -> Option<Schedule<'a>> {
        let start = *self.departure_dates.get(self.date_idx)?;
        let stay_nights: Vec<u32> = self
            .odometer
            .iter()
            .zip(&self.stay_options)
            .map(|(&i, options)| options[i])
            .collect();

        let mut segment_dates = Vec::with_capacity(stay_nights.len() + 1);
        segment_dates.push(start);
        let mut current = start;
        for &nights in &stay_nights {
            current = current.checked_add_days(Days::new(nights as u64))?;
            segment_dates.push(current);
        }

        Some(Schedule {
            itinerary: self.itinerary,
            segment_dates,
            stay_nights,
        })
    }

    /// Move to the next (date, stay tuple) position, last stop varying fastest.
    fn advance(&mut self) {
        for pos in (0..self.odometer.len()).rev() {
            self.odometer[pos] += 1;
            if self.odometer[pos] < self.stay_options[pos].len() {
                return;
            }
            self.odometer[pos] = 0;
        }
        self.date_idx += 1;
    }

    fn accepts(&self, schedule: &Schedule<'_>) -> bool {
        if let Some(filter) = self.return_filter
            && !filter.contains(schedule.trip_end())
        {
            return false;
        }
        if let Some(range) = self.limits.trip_nights
            && !range.contains(schedule.trip_nights())
        {
            return false;
        }
        true
    }
}

impl<'a> Iterator for ScheduleGenerator<'a> {
    type Item = Schedule<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted && self.date_idx < self.departure_dates.len() {
            let candidate = self.current_candidate();
            self.advance();
            let Some(schedule) = candidate else { continue };
            if !self.accepts(&schedule) {
                continue;
            }
            self.emitted += 1;
            if self.limits.max_combinations > 0 && self.emitted >= self.limits.max_combinations {
                self.exhausted = true;
            }
            return Some(schedule);
        }
        None
    }
}
