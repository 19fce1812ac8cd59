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

// Library for wanderlust-fare-planner
// Multi-segment flight price sweeps

mod consent_cookie;
mod flights_proto;
mod flights_query_builder;
mod flights_results_parser;

pub mod command_provider;
pub mod fallback_orchestrator;
pub mod fetch_cache;
pub mod fetch_engine;
pub mod flights_cleaning;
pub mod flights_search;
pub mod itinerary_scoring;
pub mod itinerary_spec;
pub mod plan_config;
pub mod pricing_provider;
pub mod run_progress;
pub mod schedule_generator;
pub mod summary_aggregator;
pub mod sweep_output;
pub mod sweep_runner;
pub mod trip_request_planner;
pub mod value_parsers;

pub use command_provider::CommandProvider;
pub use fallback_orchestrator::{FetchModes, PlannerOutcome, run_with_fallback};
pub use fetch_cache::FetchCache;
pub use fetch_engine::{EngineOptions, FetchEngine};
pub use flights_search::GoogleFlightsProvider;
pub use plan_config::{ConfigError, PlanConfig, SweepPlan};
pub use pricing_provider::{
    FetchResult, FetchStatus, FlightCandidate, PricedResponse, PricingProvider, PricingRequest,
    ProviderError,
};
pub use run_progress::{ProgressTracker, RunContext, RunState};
pub use sweep_runner::{SweepReport, count_schedules, run_sweep};
