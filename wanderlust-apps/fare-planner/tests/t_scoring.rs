mod provider_helpers;

use std::sync::Arc;

use provider_helpers::{ScriptedProvider, no_results, plan_in, priced};
use serde_json::json;
use wanderlust_fare_planner::summary_aggregator::SummaryRow;
use wanderlust_fare_planner::sweep_output::read_csv;
use wanderlust_fare_planner::{ProgressTracker, RunContext, run_sweep};

#[tokio::test]
async fn unpriced_middle_query_leaves_totals_empty() {
    let dir = tempfile::tempdir().unwrap();
    let plan = plan_in(
        dir.path(),
        json!({
            "groups": {"A": ["AAA"], "B": ["BBB"], "C": ["CCC"], "D": ["DDD"]},
            "itineraries": [["A", "B", "C", "D"]],
            "departure_dates": ["2026-05-01"],
            "stay_nights": {"B": {"nights": 2}, "C": {"nights": 2}},
            "fetch": {"currency": "eur"}
        }),
    );
    let provider = Arc::new(ScriptedProvider::new(|req| match req.origin.as_str() {
        "BBB" => no_results(),
        _ => Ok(priced("€150")),
    }));
    let ctx = RunContext::new(ProgressTracker::hidden());

    let report = run_sweep(&plan, provider, "local", &ctx).await.unwrap();
    assert_eq!(report.summary.len(), 1);
    let row = &report.summary[0];
    assert_eq!(row.query_count, 3);
    assert_eq!(row.priced_segments, 2);
    assert_eq!(row.min_total_price, None);
    assert_eq!(row.total_duration_min, None);
    assert_eq!(row.score, None);
    assert_eq!(row.price_currency, "EUR");
    assert_eq!(row.segment_min_prices, "150||150");

    // The clean summary keeps it as well, still unscored.
    let cleaning = report.cleaning.as_ref().unwrap();
    assert_eq!(cleaning.kept, 2);
    assert_eq!(cleaning.rejected, 1);
    assert_eq!(cleaning.ranked.len(), 1);
    assert_eq!(cleaning.ranked[0].score, None);

    let written: Vec<SummaryRow> = read_csv(plan.output.summary_csv.as_ref().unwrap()).unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].min_total_price, None);
}

#[tokio::test]
async fn cheaper_itinerary_ranks_first() {
    let dir = tempfile::tempdir().unwrap();
    let plan = plan_in(
        dir.path(),
        json!({
            "groups": {"PAR": ["CDG"], "LIS": ["LIS"], "OPO": ["OPO"]},
            "itineraries": [["PAR", "LIS"], ["PAR", "OPO"]],
            "departure_dates": ["2026-05-01"]
        }),
    );
    let provider = Arc::new(ScriptedProvider::new(|req| {
        Ok(priced(if req.destination == "OPO" { "€100" } else { "€200" }))
    }));
    let ctx = RunContext::new(ProgressTracker::hidden());

    let report = run_sweep(&plan, provider, "local", &ctx).await.unwrap();
    let ranked = report.ranked();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].itinerary_route, "PAR>OPO");
    assert!(ranked[0].score.unwrap() > ranked[1].score.unwrap());
    assert_eq!(ranked[0].score, Some(100.0));

    let cleaning = report.cleaning.as_ref().unwrap();
    assert_eq!(cleaning.top_csvs.len(), 5);
    assert!(cleaning.top_csvs.iter().all(|p| p.exists()));
}
