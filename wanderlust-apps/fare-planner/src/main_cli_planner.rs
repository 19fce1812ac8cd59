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

//! CLI for multi-segment flight price sweeps.

use std::cmp::max;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wanderlust_fare_planner::fallback_orchestrator::env_fetch_mode;
use wanderlust_fare_planner::flights_cleaning::price_per_night;
use wanderlust_fare_planner::summary_aggregator::SummaryRow;
use wanderlust_fare_planner::{
    CommandProvider, ConfigError, GoogleFlightsProvider, PlanConfig, PricingProvider,
    ProgressTracker, RunContext, SweepPlan, count_schedules, run_with_fallback,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    Google,
    Command,
}

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "wanderlust-planner")]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Plan file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Count schedules and exit without fetching
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log progress every N calls (0 = never)
    #[arg(long)]
    log_every_calls: Option<usize>,

    /// Log progress every N schedules (0 = never)
    #[arg(long)]
    log_every_schedules: Option<usize>,

    /// Fetch mode override: auto, common, local, ...
    #[arg(long)]
    fetch_mode: Option<String>,

    /// Pricing backend
    #[arg(long, value_enum, default_value = "google")]
    provider: ProviderKind,

    /// Program (and arguments) for the command provider
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    provider_command: Vec<String>,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.to_string().into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_plan(args: &CliArgs) -> Result<SweepPlan> {
    let mut config = PlanConfig::load(&args.config)?;
    config.logging.verbose |= args.verbose;
    let mut plan = config.validate(SweepPlan::now_local())?;
    if let Some(n) = args.log_every_calls {
        plan.progress.log_every_calls = n;
    }
    if let Some(n) = args.log_every_schedules {
        plan.progress.log_every_schedules = n;
    }
    Ok(plan)
}

fn build_provider(args: &CliArgs, plan: &SweepPlan) -> Result<Arc<dyn PricingProvider>> {
    Ok(match args.provider {
        ProviderKind::Google => Arc::new(GoogleFlightsProvider::new(
            &plan.fetch.language,
            Duration::from_secs(plan.fetch.timeout_seconds.max(1)),
        )?),
        ProviderKind::Command => Arc::new(
            CommandProvider::from_command_line(&args.provider_command)
                .context("--provider command needs --provider-command")?,
        ),
    })
}

fn get_terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(100)
}

fn dash_bar() -> String {
    "-".repeat(get_terminal_width().min(110))
}

fn fmt_duration(minutes: Option<u32>) -> String {
    match minutes {
        None => "-".to_string(),
        Some(m) if m % 60 == 0 => format!("{}h", m / 60),
        Some(m) => format!("{}h {:02}m", m / 60, m % 60),
    }
}

fn fmt_price(value: Option<f64>, currency: &str) -> String {
    value.map_or("-".to_string(), |v| format!("{v:.2} {currency}"))
}

fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        format!("{text:<width$}")
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

fn render_top(rows: &[SummaryRow], limit: usize) {
    let rows: Vec<&SummaryRow> = rows.iter().filter(|r| r.is_complete()).take(limit).collect();
    if rows.is_empty() {
        println!("\nNo fully priced itinerary.");
        return;
    }

    let route_width = rows.iter().map(|r| r.itinerary_route.len()).fold(12, max);
    let fixed = 4 + 23 + 7 + 16 + 10 + 6 + 7 + 14;
    let route_width = route_width.min(get_terminal_width().saturating_sub(fixed).max(12));

    println!("\n🏆 Top {} itineraries:", rows.len());
    println!("{}", dash_bar());
    println!(
        "{:>3}  {}  {:<23}  {:>6}  {:>14}  {:>8}  {:>5}  {:>6}  {:>12}",
        "#",
        fit("ROUTE", route_width),
        "DATES",
        "NIGHTS",
        "PRICE",
        "DURATION",
        "STOPS",
        "SCORE",
        "PER NIGHT"
    );
    println!("{}", dash_bar());
    for (i, row) in rows.iter().enumerate() {
        println!(
            "{:>3}  {}  {:<23}  {:>6}  {:>14}  {:>8}  {:>5}  {:>6}  {:>12}",
            i + 1,
            fit(&row.itinerary_route, route_width),
            format!("{} → {}", row.trip_start_date, row.trip_end_date),
            row.trip_nights,
            fmt_price(row.min_total_price, &row.price_currency),
            fmt_duration(row.total_duration_min),
            row.total_stops.map_or("-".to_string(), |s| s.to_string()),
            row.score.map_or("-".to_string(), |s| format!("{s:.1}")),
            fmt_price(price_per_night(row), &row.price_currency),
        );
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let plan = load_plan(&args)?;

    if args.dry_run {
        let schedules = count_schedules(&plan)?;
        println!(
            "{} itineraries, {} departure dates, {} schedules",
            plan.itineraries.len(),
            plan.departure_dates.len(),
            schedules
        );
        return Ok(());
    }

    let provider = build_provider(&args, &plan)?;
    let override_mode = args.fetch_mode.clone().or_else(env_fetch_mode);
    let modes = plan.fetch_modes(override_mode.as_deref());
    tracing::info!(primary = %modes.primary, fallback = ?modes.fallback, "Fetch modes");

    let ctx = RunContext::new(ProgressTracker::new(plan.progress.display, plan.progress.refresh));
    let token = ctx.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight requests");
            token.cancel();
        }
    });

    let outcome = run_with_fallback(&plan, provider, &modes, &ctx).await?;

    let Some(report) = outcome.final_report() else {
        return Ok(());
    };
    if outcome.is_cancelled() {
        println!(
            "Cancelled after {} schedules; partial results in {}",
            report.stats.schedules,
            report.raw_csv.display()
        );
        return Ok(());
    }

    println!(
        "Fetch mode {}{}: {} schedules, {} calls, {} cache hits, {} ok / {} empty / {} errors",
        report.fetch_mode,
        if outcome.used_fallback() { " (fallback)" } else { "" },
        report.stats.schedules,
        report.stats.external_calls,
        report.stats.cache_hits + report.stats.inflight_hits,
        report.stats.ok,
        report.stats.empty,
        report.stats.errors,
    );
    println!("Raw results: {}", report.raw_csv.display());
    if let Some(summary) = &report.summary_csv {
        println!("Summary: {}", summary.display());
    }
    render_top(report.ranked(), 10);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    setup_logging(args.verbose);
    tracing::debug!("Args: {:?}", args);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.downcast_ref::<ConfigError>().is_some() => {
            tracing::error!("Invalid configuration: {e:#}");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
