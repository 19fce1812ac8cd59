mod provider_helpers;

use provider_helpers::{date, now};
use serde_json::json;
use wanderlust_fare_planner::schedule_generator::ScheduleGenerator;
use wanderlust_fare_planner::{ConfigError, PlanConfig, count_schedules};

fn plan(body: serde_json::Value) -> wanderlust_fare_planner::SweepPlan {
    PlanConfig::from_json_str(&body.to_string())
        .unwrap()
        .validate(now())
        .unwrap()
}

#[test]
fn stay_range_times_departure_dates() {
    let plan = plan(json!({
        "groups": {"PAR": ["CDG"], "LIS": ["LIS"]},
        "itineraries": [["PAR", "LIS", "PAR"]],
        "departure_dates": ["2026-05-01", "2026-05-02"],
        "stay_nights": {"LIS": {"min": 3, "max": 5, "step": 1}}
    }));
    assert_eq!(count_schedules(&plan).unwrap(), 6);

    let itinerary = &plan.itineraries[0];
    let schedules: Vec<_> = ScheduleGenerator::new(
        itinerary,
        &plan.departure_dates,
        &plan.stay_nights,
        plan.return_filter.as_ref(),
        plan.schedule_limits(),
    )
    .unwrap()
    .collect();
    assert_eq!(schedules[0].segment_dates, vec![date(2026, 5, 1), date(2026, 5, 4)]);
    assert_eq!(schedules[2].segment_dates, vec![date(2026, 5, 1), date(2026, 5, 6)]);
    assert_eq!(schedules[3].trip_start(), date(2026, 5, 2));
}

#[test]
fn return_window_and_trip_length_filter() {
    let plan = plan(json!({
        "groups": {"PAR": ["CDG"], "LIS": ["LIS"], "MAD": ["MAD"]},
        "itineraries": [["PAR", "LIS", "MAD", "PAR"]],
        "departure_dates": {"start": "2026-05-01", "end": "2026-05-03"},
        "return_dates": {"start": "2026-05-06", "end": "2026-05-07"},
        "stay_nights": {"LIS": {"min": 2, "max": 3}, "MAD": {"nights": 2}},
        "constraints": {"trip_nights_range": {"max": 4}}
    }));
    // Trip ends in the return window only for 5/2 (+4) and 5/3 (+4); 5/2 (+5) is too long.
    assert_eq!(count_schedules(&plan).unwrap(), 2);
}

#[test]
fn combination_cap_applies_per_itinerary() {
    let plan = plan(json!({
        "groups": {"PAR": ["CDG"], "LIS": ["LIS"], "ROM": ["FCO"]},
        "itineraries": [["PAR", "LIS", "PAR"], ["PAR", "ROM", "PAR"]],
        "departure_dates": ["2026-05-01", "2026-05-02", "2026-05-03"],
        "stay_nights": {"LIS": {"min": 1, "max": 4}, "ROM": {"nights": 3}},
        "constraints": {"max_combinations_per_itinerary": 5}
    }));
    // 12 candidates capped to 5, plus 3 for the second itinerary.
    assert_eq!(count_schedules(&plan).unwrap(), 8);
}

#[test]
fn missing_stay_nights_is_a_config_error() {
    let err = PlanConfig::from_json_str(
        &json!({
            "groups": {"PAR": ["CDG"], "LIS": ["LIS"]},
            "itineraries": [["PAR", "LIS", "PAR"]],
            "departure_dates": ["2026-05-01"]
        })
        .to_string(),
    )
    .unwrap()
    .validate(now())
    .unwrap_err();
    assert!(matches!(err, ConfigError::MissingStayNights(ref g) if g == "LIS"));
}
