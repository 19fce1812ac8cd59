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

//! # Trip Request Planning
//!
//! Turns the raw legs of a schedule into the requests actually priced.
//!
//! - `segment`: every leg is priced one-way.
//! - `round-trip-when-possible`: an out-and-back pair of consecutive legs
//!   becomes one round-trip request.
//! - `chasles-nested`: legs are matched like parentheses, so `A>B>C>B>A`
//!   prices `B<->C` and `A<->B` as two round trips.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::itinerary_spec::NodeSpec;
use crate::pricing_provider::TripType;
use crate::schedule_generator::{Schedule, Segment};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TripStrategy {
    #[default]
    Segment,
    RoundTripWhenPossible,
    ChaslesNested,
}

impl TripStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStrategy::Segment => "segment",
            TripStrategy::RoundTripWhenPossible => "round-trip-when-possible",
            TripStrategy::ChaslesNested => "chasles-nested",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripRequest {
    pub trip_type: TripType,
    pub from: NodeSpec,
    pub to: NodeSpec,
    pub depart_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub stay_nights: Option<u32>,
    pub segment_index: usize,
    pub segment_span: usize,
}

impl TripRequest {
    fn one_way(segment: &Segment) -> Self {
        Self {
            trip_type: TripType::OneWay,
            from: segment.from.clone(),
            to: segment.to.clone(),
            depart_date: segment.depart_date,
            return_date: None,
            stay_nights: segment.stay_nights,
            segment_index: segment.index,
            segment_span: 1,
        }
    }

    fn round_trip(outbound: &Segment, inbound: &Segment) -> Self {
        let stay = (inbound.depart_date - outbound.depart_date).num_days().max(0);
        Self {
            trip_type: TripType::RoundTrip,
            from: outbound.from.clone(),
            to: outbound.to.clone(),
            depart_date: outbound.depart_date,
            return_date: Some(inbound.depart_date),
            stay_nights: Some(stay as u32),
            segment_index: outbound.index,
            segment_span: inbound.index - outbound.index + 1,
        }
    }

    /// `FROM>TO` for one-way requests, `FROM<>TO` for round trips.
    pub fn route_group(&self) -> String {
        match self.trip_type {
            TripType::OneWay => format!("{}>{}", self.from.group, self.to.group),
            TripType::RoundTrip => format!("{}<>{}", self.from.group, self.to.group),
        }
    }
}

fn returns_to(outbound: &Segment, inbound: &Segment) -> bool {
    inbound.from == outbound.to && inbound.to == outbound.from
}

pub fn plan_trip_requests(schedule: &Schedule<'_>, strategy: TripStrategy) -> Vec<TripRequest> {
    let segments = schedule.segments();
    match strategy {
        TripStrategy::Segment => segments.iter().map(TripRequest::one_way).collect(),
        TripStrategy::RoundTripWhenPossible => pair_adjacent_round_trips(&segments),
        TripStrategy::ChaslesNested => {
            let mut requests = pair_nested_segments(&segments);
            requests.sort_by_key(|r| (r.depart_date, r.segment_index));
            requests
        }
    }
}

fn pair_adjacent_round_trips(segments: &[Segment]) -> Vec<TripRequest> {
    let mut requests = Vec::with_capacity(segments.len());
    let mut i = 0;
    while i < segments.len() {
        match segments.get(i + 1) {
            Some(next) if returns_to(&segments[i], next) => {
                requests.push(TripRequest::round_trip(&segments[i], next));
                i += 2;
            }
            _ => {
                requests.push(TripRequest::one_way(&segments[i]));
                i += 1;
            }
        }
    }
    requests
}

/// Stack matching of legs, in emission order (not yet sorted by date).
///
/// A leg is only compared to the top of the stack. Unmatched legs stay on
/// the stack and are emitted one-way, in leg order, after every match.
pub fn pair_nested_segments(segments: &[Segment]) -> Vec<TripRequest> {
    let mut stack: Vec<&Segment> = Vec::new();
    let mut requests = Vec::with_capacity(segments.len());
    for segment in segments {
        match stack.last() {
            Some(top) if returns_to(top, segment) => {
                requests.push(TripRequest::round_trip(top, segment));
                stack.pop();
            }
            _ => stack.push(segment),
        }
    }
    requests.extend(stack.into_iter().map(TripRequest::one_way));
    requests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itinerary_spec::{ItinerarySpec, RawNode};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn schedule<'a>(itin: &'a ItinerarySpec, start: &str, stays: &[u32]) -> Schedule<'a> {
        let mut dates = vec![date(start)];
        for s in stays {
            let last = *dates.last().unwrap();
            dates.push(last + chrono::Days::new(*s as u64));
        }
        Schedule {
            itinerary: itin,
            segment_dates: dates,
            stay_nights: stays.to_vec(),
        }
    }

    fn itinerary(nodes: &[&str]) -> ItinerarySpec {
        let raw: Vec<RawNode> = nodes.iter().map(|n| (*n).into()).collect();
        ItinerarySpec::parse(&raw).unwrap()
    }

    #[test]
    fn segment_strategy_is_all_one_way() {
        let itin = itinerary(&["PAR", "LIS", "PAR"]);
        let s = schedule(&itin, "2026-05-01", &[3]);
        let requests = plan_trip_requests(&s, TripStrategy::Segment);
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.trip_type == TripType::OneWay));
        assert_eq!(requests[0].stay_nights, Some(3));
        assert_eq!(requests[1].stay_nights, None);
    }

    #[test]
    fn adjacent_out_and_back_merges() {
        let itin = itinerary(&["PAR", "LIS", "PAR", "ROM"]);
        let s = schedule(&itin, "2026-05-01", &[3, 2]);
        let requests = plan_trip_requests(&s, TripStrategy::RoundTripWhenPossible);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].trip_type, TripType::RoundTrip);
        assert_eq!(requests[0].segment_span, 2);
        assert_eq!(requests[0].return_date, Some(date("2026-05-04")));
        assert_eq!(requests[0].stay_nights, Some(3));
        assert_eq!(requests[0].route_group(), "PAR<>LIS");
        assert_eq!(requests[1].trip_type, TripType::OneWay);
        assert_eq!(requests[1].segment_index, 2);
    }

    #[test]
    fn nested_pairs_emit_inner_trip_first() {
        let itin = itinerary(&["A", "B", "C", "B", "A"]);
        let s = schedule(&itin, "2026-05-01", &[2, 3, 4]);
        let emitted = pair_nested_segments(&s.segments());
        assert_eq!(emitted.len(), 2);
        assert_eq!((emitted[0].from.group.as_str(), emitted[0].to.group.as_str()), ("B", "C"));
        assert_eq!(emitted[0].segment_span, 2);
        assert_eq!((emitted[1].from.group.as_str(), emitted[1].to.group.as_str()), ("A", "B"));
        assert_eq!(emitted[1].segment_span, 4);
        assert_eq!(emitted[1].return_date, Some(date("2026-05-10")));

        let sorted = plan_trip_requests(&s, TripStrategy::ChaslesNested);
        assert_eq!(sorted[0].from.group, "A");
        assert_eq!(sorted[1].from.group, "B");
    }

    #[test]
    fn nested_leftovers_stay_one_way() {
        let itin = itinerary(&["A", "B", "C", "A"]);
        let s = schedule(&itin, "2026-05-01", &[2, 3]);
        let requests = plan_trip_requests(&s, TripStrategy::ChaslesNested);
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.trip_type == TripType::OneWay));
        let indices: Vec<_> = requests.iter().map(|r| r.segment_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn strategy_names_deserialize() {
        let s: TripStrategy = serde_json::from_str("\"chasles-nested\"").unwrap();
        assert_eq!(s, TripStrategy::ChaslesNested);
        let s: TripStrategy = serde_json::from_str("\"round-trip-when-possible\"").unwrap();
        assert_eq!(s.as_str(), "round-trip-when-possible");
    }
}
