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

//! # Flights Search Protobuf
//!
//! Message layout of the `tfs` search parameter, declared with prost
//! derives. Field tags follow what the search page itself sends.

use crate::pricing_provider::{Passengers, Seat as SeatClass, TripType};

#[derive(Clone, PartialEq, prost::Message)]
pub struct Airport {
    #[prost(string, tag = "2")]
    pub airport: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FlightData {
    #[prost(string, tag = "2")]
    pub date: String,
    #[prost(int32, optional, tag = "5")]
    pub max_stops: Option<i32>,
    #[prost(string, repeated, tag = "6")]
    pub airlines: Vec<String>,
    #[prost(message, optional, tag = "13")]
    pub from_flight: Option<Airport>,
    #[prost(message, optional, tag = "14")]
    pub to_flight: Option<Airport>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Info {
    #[prost(message, repeated, tag = "3")]
    pub data: Vec<FlightData>,
    #[prost(enumeration = "Passenger", repeated, tag = "8")]
    pub passengers: Vec<i32>,
    #[prost(enumeration = "Seat", optional, tag = "9")]
    pub seat: Option<i32>,
    #[prost(enumeration = "Trip", optional, tag = "19")]
    pub trip: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Seat {
    UnknownSeat = 0,
    Economy = 1,
    PremiumEconomy = 2,
    Business = 3,
    First = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Trip {
    UnknownTrip = 0,
    RoundTrip = 1,
    OneWay = 2,
    MultiCity = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Passenger {
    UnknownPassenger = 0,
    Adult = 1,
    Child = 2,
    InfantInSeat = 3,
    InfantOnLap = 4,
}

impl From<SeatClass> for Seat {
    fn from(seat: SeatClass) -> Self {
        match seat {
            SeatClass::Economy => Seat::Economy,
            SeatClass::PremiumEconomy => Seat::PremiumEconomy,
            SeatClass::Business => Seat::Business,
            SeatClass::First => Seat::First,
        }
    }
}

impl From<TripType> for Trip {
    fn from(trip: TripType) -> Self {
        match trip {
            TripType::OneWay => Trip::OneWay,
            TripType::RoundTrip => Trip::RoundTrip,
        }
    }
}

/// One enum value per traveller, adults first.
pub fn passenger_list(passengers: &Passengers) -> Vec<i32> {
    [
        (Passenger::Adult, passengers.adults),
        (Passenger::Child, passengers.children),
        (Passenger::InfantInSeat, passengers.infants_in_seat),
        (Passenger::InfantOnLap, passengers.infants_on_lap),
    ]
    .into_iter()
    .flat_map(|(kind, count)| std::iter::repeat_n(kind as i32, count as usize))
    .collect()
}
