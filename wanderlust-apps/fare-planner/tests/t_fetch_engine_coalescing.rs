mod provider_helpers;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use provider_helpers::{ScriptedProvider, date, no_results, priced, request};
use wanderlust_fare_planner::pricing_provider::CacheSource;
use wanderlust_fare_planner::{
    EngineOptions, FetchCache, FetchEngine, FetchStatus, ProgressTracker, RunContext,
};

fn engine(provider: Arc<ScriptedProvider>, workers: usize) -> FetchEngine {
    let options = EngineOptions {
        workers,
        ..Default::default()
    };
    FetchEngine::new(provider, Arc::new(FetchCache::in_memory()), options)
}

#[tokio::test(start_paused = true)]
async fn concurrent_same_key_requests_share_one_call() {
    let provider = Arc::new(ScriptedProvider::always("€210").with_delay(Duration::from_millis(200)));
    let engine = engine(provider.clone(), 8);
    let req = request("CDG", "LIS", date(2026, 5, 1));

    let results = join_all((0..8).map(|_| engine.fetch(&req))).await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(engine.external_calls(), 1);
    assert!(results.iter().all(|r| r.status == FetchStatus::Ok));
    assert!(results.iter().all(|r| r.flights == results[0].flights));
    let joined = results
        .iter()
        .filter(|r| r.cache_source == Some(CacheSource::Inflight))
        .count();
    assert_eq!(joined, 7);
    assert_eq!(engine.inflight_len(), 0);

    let later = engine.fetch(&req).await;
    assert_eq!(later.cache_source, Some(CacheSource::Cache));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn waiters_see_the_owner_outcome_when_it_is_empty() {
    let provider = Arc::new(ScriptedProvider::new(|_| no_results()).with_delay(Duration::from_millis(50)));
    let engine = engine(provider.clone(), 4);
    let req = request("CDG", "NRT", date(2026, 5, 1));

    let results = join_all((0..4).map(|_| engine.fetch(&req))).await;
    assert_eq!(provider.calls(), 1);
    assert!(results.iter().all(|r| r.status == FetchStatus::Empty));
    assert!(engine.cache().is_empty());

    // Nothing cached: a later request asks again.
    engine.fetch(&req).await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn fetch_all_keeps_input_order() {
    let provider = Arc::new(
        ScriptedProvider::new(|req| {
            Ok(priced(match req.destination.as_str() {
                "LIS" => "€100",
                "OPO" => "€200",
                _ => "€300",
            }))
        })
        .with_delay(Duration::from_millis(20)),
    );
    let engine = engine(provider.clone(), 3);
    let ctx = RunContext::new(ProgressTracker::hidden());
    let requests = vec![
        request("CDG", "LIS", date(2026, 5, 1)),
        request("CDG", "OPO", date(2026, 5, 1)),
        request("ORY", "FAO", date(2026, 5, 1)),
        request("CDG", "LIS", date(2026, 5, 1)),
    ];

    let results = engine.fetch_all(&requests, &ctx).await;
    let prices: Vec<String> = results
        .iter()
        .map(|r| r.as_ref().unwrap().flights[0].price.clone())
        .collect();
    assert_eq!(prices, vec!["€100", "€200", "€300", "€100"]);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn cancelled_run_dispatches_nothing() {
    let provider = Arc::new(ScriptedProvider::always("€99"));
    let engine = engine(provider.clone(), 2);
    let ctx = RunContext::new(ProgressTracker::hidden());
    ctx.cancel();

    let results = engine
        .fetch_all(&[request("CDG", "LIS", date(2026, 5, 1))], &ctx)
        .await;
    assert_eq!(results, vec![None]);
    assert_eq!(provider.calls(), 0);
}
