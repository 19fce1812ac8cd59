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

//! Parsing of provider strings: prices, durations, clock times.

use once_cell::sync::Lazy;
use regex::Regex;

static HOURS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:hr|hrs|hour|hours|h)\b").expect("valid hours regex"));
static MINUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:min|mins|minute|minutes|m)\b").expect("valid minutes regex"));
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,2}):(\d{2})\s*([AP])?\.?\s*(M)?\.?").expect("valid time regex")
});

/// Numeric value and currency symbol of a raw price such as `"€1,234"`.
pub fn parse_price(raw: &str) -> (Option<f64>, String) {
    let raw = raw.trim();
    if raw.is_empty() {
        return (None, String::new());
    }
    let currency: String = raw
        .chars()
        .filter(|c| !c.is_ascii_digit() && !matches!(c, '.' | ',' | ' '))
        .collect::<String>()
        .trim()
        .to_string();
    let numeric: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    (numeric.parse::<f64>().ok(), currency)
}

/// Minutes in a duration such as `"13 hr 5 min"`. Zero means unknown.
pub fn parse_duration_minutes(raw: &str) -> Option<u32> {
    let hours = HOURS_RE
        .captures(raw)
        .and_then(|c| c[1].parse::<u32>().ok())
        .unwrap_or(0);
    let minutes = MINUTES_RE
        .captures(raw)
        .and_then(|c| c[1].parse::<u32>().ok())
        .unwrap_or(0);
    let total = hours.checked_mul(60)?.checked_add(minutes)?;
    (total > 0).then_some(total)
}

/// Minutes since midnight for `"10:35 PM"` or `"22:35"`.
pub fn parse_time_minutes(raw: &str) -> Option<u32> {
    let caps = TIME_RE.captures(raw)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    if minute >= 60 {
        return None;
    }
    match caps.get(3).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(meridiem) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            hour %= 12;
            if meridiem == "P" {
                hour += 12;
            }
        }
        None if hour >= 24 => return None,
        None => {}
    }
    Some(hour * 60 + minute)
}

/// A leg counts as a night flight when it lands on a later day, departs
/// between 22:00 and 06:00, or lands before 06:00.
pub fn is_night_segment(departure: &str, arrival: &str, arrival_time_ahead: Option<&str>) -> bool {
    if arrival_time_ahead.is_some_and(|a| !a.trim().is_empty()) {
        return true;
    }
    let early = 6 * 60;
    let late = 22 * 60;
    let dep_night = parse_time_minutes(departure).is_some_and(|m| m >= late || m < early);
    let arr_night = parse_time_minutes(arrival).is_some_and(|m| m < early);
    dep_night || arr_night
}

/// `"Nonstop"` is 0, `"2 stops"` is 2.
pub fn parse_stops(raw: &str) -> Option<u32> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if lower.contains("nonstop") || lower.contains("non-stop") || lower.contains("direct") {
        return Some(0);
    }
    lower
        .split_whitespace()
        .next()
        .and_then(|first| first.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices() {
        assert_eq!(parse_price("€1,234"), (Some(1234.0), "€".to_string()));
        assert_eq!(parse_price("$99.50"), (Some(99.5), "$".to_string()));
        assert_eq!(parse_price("1 234 EUR"), (Some(1234.0), "EUR".to_string()));
        assert_eq!(parse_price("Price unavailable").0, None);
        assert_eq!(parse_price(""), (None, String::new()));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration_minutes("13 hr 5 min"), Some(785));
        assert_eq!(parse_duration_minutes("2h 30m"), Some(150));
        assert_eq!(parse_duration_minutes("45 min"), Some(45));
        assert_eq!(parse_duration_minutes("0 hr 0 min"), None);
        assert_eq!(parse_duration_minutes("unknown"), None);
        assert_eq!(parse_duration_minutes("99999999 hr"), None);
        assert_eq!(parse_duration_minutes("1 hr 4294967295 min"), None);
    }

    #[test]
    fn clock_times() {
        assert_eq!(parse_time_minutes("10:35 PM"), Some(22 * 60 + 35));
        assert_eq!(parse_time_minutes("12:05 AM"), Some(5));
        assert_eq!(parse_time_minutes("12:05 pm"), Some(12 * 60 + 5));
        assert_eq!(parse_time_minutes("6:10 AM on Mon, May 4"), Some(6 * 60 + 10));
        assert_eq!(parse_time_minutes("23:15"), Some(23 * 60 + 15));
        assert_eq!(parse_time_minutes("25:00"), None);
        assert_eq!(parse_time_minutes("noon"), None);
    }

    #[test]
    fn night_flags() {
        assert!(is_night_segment("10:00 AM", "2:00 PM", Some("+1")));
        assert!(is_night_segment("11:30 PM", "7:00 AM", None));
        assert!(is_night_segment("5:45 AM", "9:00 AM", None));
        assert!(is_night_segment("8:00 PM", "5:30 AM", None));
        assert!(!is_night_segment("6:00 AM", "9:00 PM", None));
        assert!(!is_night_segment("9:00 AM", "1:00 PM", Some("")));
    }

    #[test]
    fn stops() {
        assert_eq!(parse_stops("Nonstop"), Some(0));
        assert_eq!(parse_stops("1 stop"), Some(1));
        assert_eq!(parse_stops("2 stops"), Some(2));
        assert_eq!(parse_stops("Unknown"), None);
    }
}
