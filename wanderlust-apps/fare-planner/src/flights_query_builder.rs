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

//! # Flights Query Builder
//!
//! Side-effect free encoding of a [`PricingRequest`] into the base64 `tfs`
//! parameter and the search URL.

use anyhow::{Result, ensure};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::NaiveDate;
use prost::Message;

use crate::flights_proto::{Airport, FlightData, Info, Seat, Trip, passenger_list};
use crate::pricing_provider::{PricingRequest, TripType};

const SEARCH_URL: &str = "https://www.google.com/travel/flights/search";

fn validate(request: &PricingRequest) -> Result<()> {
    ensure!(!request.origin.is_empty(), "Origin airport is required");
    ensure!(!request.destination.is_empty(), "Destination airport is required");
    let p = &request.passengers;
    ensure!(p.adults > 0, "At least one adult is required");
    ensure!(
        p.infants_on_lap <= p.adults,
        "Cannot have more infants on lap ({}) than adults ({})",
        p.infants_on_lap,
        p.adults
    );
    if request.trip_type == TripType::RoundTrip {
        ensure!(request.return_date.is_some(), "Round trip without a return date");
    }
    Ok(())
}

fn leg(request: &PricingRequest, date: NaiveDate, from: &str, to: &str) -> FlightData {
    FlightData {
        date: date.format("%Y-%m-%d").to_string(),
        max_stops: request.max_stops.map(|s| s.min(i32::MAX as u32) as i32),
        airlines: Vec::new(),
        from_flight: Some(Airport {
            airport: from.to_string(),
        }),
        to_flight: Some(Airport {
            airport: to.to_string(),
        }),
    }
}

/// The protobuf message for a request: one leg, or outbound and return.
pub fn build_info(request: &PricingRequest) -> Result<Info> {
    validate(request)?;
    let mut data = vec![leg(request, request.depart_date, &request.origin, &request.destination)];
    if request.trip_type == TripType::RoundTrip
        && let Some(back) = request.return_date
    {
        data.push(leg(request, back, &request.destination, &request.origin));
    }
    Ok(Info {
        data,
        passengers: passenger_list(&request.passengers),
        seat: Some(Seat::from(request.seat) as i32),
        trip: Some(Trip::from(request.trip_type) as i32),
    })
}

pub fn generate_tfs(request: &PricingRequest) -> Result<String> {
    let info = build_info(request)?;
    Ok(STANDARD.encode(info.encode_to_vec()))
}

/// Search URL for `request`, localized with `language` and priced in the
/// request currency when one is set.
pub fn search_url(request: &PricingRequest, language: &str) -> Result<String> {
    let tfs = generate_tfs(request)?;
    let mut url = format!(
        "{SEARCH_URL}?tfs={}&hl={}",
        urlencoding::encode(&tfs),
        urlencoding::encode(language)
    );
    if !request.currency.is_empty() {
        url.push_str("&curr=");
        url.push_str(&urlencoding::encode(&request.currency));
    }
    url.push_str("&tfu=EgQIABABIgA");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing_provider::{Passengers, Seat as SeatClass};

    fn request(trip_type: TripType) -> PricingRequest {
        PricingRequest {
            origin: "CDG".to_string(),
            destination: "LIS".to_string(),
            depart_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            return_date: Some(NaiveDate::from_ymd_opt(2026, 5, 6).unwrap()),
            trip_type,
            seat: SeatClass::Business,
            passengers: Passengers::default(),
            max_stops: Some(1),
            currency: "EUR".to_string(),
            fetch_mode: "local".to_string(),
        }
    }

    #[test]
    fn round_trip_has_two_legs() {
        let info = build_info(&request(TripType::RoundTrip)).unwrap();
        assert_eq!(info.data.len(), 2);
        assert_eq!(info.data[1].date, "2026-05-06");
        assert_eq!(info.data[1].from_flight.as_ref().unwrap().airport, "LIS");
        assert_eq!(info.seat, Some(Seat::Business as i32));
        assert_eq!(info.trip, Some(Trip::RoundTrip as i32));

        let one_way = build_info(&request(TripType::OneWay)).unwrap();
        assert_eq!(one_way.data.len(), 1);
        assert_eq!(one_way.trip, Some(Trip::OneWay as i32));
    }

    #[test]
    fn tfs_decodes_back() {
        let tfs = generate_tfs(&request(TripType::OneWay)).unwrap();
        let bytes = STANDARD.decode(tfs).unwrap();
        let info = Info::decode(bytes.as_slice()).unwrap();
        assert_eq!(info.data[0].max_stops, Some(1));
        assert_eq!(info.passengers, vec![1]);
    }

    #[test]
    fn url_carries_language_and_currency() {
        let url = search_url(&request(TripType::OneWay), "fr").unwrap();
        assert!(url.starts_with("https://www.google.com/travel/flights/search?tfs="));
        assert!(url.contains("&hl=fr"));
        assert!(url.contains("&curr=EUR"));

        let mut no_currency = request(TripType::OneWay);
        no_currency.currency.clear();
        assert!(!search_url(&no_currency, "en").unwrap().contains("curr="));
    }

    #[test]
    fn rejects_lap_infants_without_adults() {
        let mut bad = request(TripType::OneWay);
        bad.passengers = Passengers {
            adults: 1,
            children: 0,
            infants_in_seat: 0,
            infants_on_lap: 2,
        };
        assert!(build_info(&bad).is_err());
        bad.passengers.adults = 0;
        assert!(build_info(&bad).is_err());
    }
}
