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

//! Fetch mode selection and the single fallback rerun.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::plan_config::SweepPlan;
use crate::pricing_provider::PricingProvider;
use crate::run_progress::{RunContext, RunState};
use crate::sweep_runner::{SweepReport, run_sweep};

/// Overrides the configured fetch mode.
pub const FETCH_MODE_ENV: &str = "WANDERLUST_FETCH_MODE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchModes {
    pub primary: String,
    pub fallback: Option<String>,
}

fn normalize_mode(mode: &str) -> String {
    mode.trim().to_lowercase()
}

/// Modes for a keyword: `auto`, `common` and the empty string mean
/// `common` with a `local` fallback; `local` and anything else have none.
fn modes_for_keyword(mode: &str) -> FetchModes {
    match normalize_mode(mode).as_str() {
        "" | "auto" | "common" => FetchModes {
            primary: "common".to_string(),
            fallback: Some("local".to_string()),
        },
        other => FetchModes {
            primary: other.to_string(),
            fallback: None,
        },
    }
}

/// Primary and fallback modes from the configuration, with an optional
/// override taking precedence over both.
pub fn resolve_fetch_modes(
    configured_mode: &str,
    configured_fallback: Option<&str>,
    override_mode: Option<&str>,
) -> FetchModes {
    let mut modes = match override_mode {
        Some(mode) => return modes_for_keyword(mode),
        None => modes_for_keyword(configured_mode),
    };
    if let Some(fallback) = configured_fallback.map(normalize_mode) {
        modes.fallback = (!fallback.is_empty()).then_some(fallback);
    }
    if modes.fallback.as_deref() == Some(modes.primary.as_str()) {
        modes.fallback = None;
    }
    modes
}

/// The fetch mode override from the environment, if set.
pub fn env_fetch_mode() -> Option<String> {
    std::env::var(FETCH_MODE_ENV).ok()
}

/// Every sweep of a run: the primary one, then the fallback if it ran.
#[derive(Debug, Clone)]
pub struct PlannerOutcome {
    pub sweeps: Vec<SweepReport>,
}

impl PlannerOutcome {
    pub fn final_report(&self) -> Option<&SweepReport> {
        self.sweeps.last()
    }

    pub fn used_fallback(&self) -> bool {
        self.sweeps.len() > 1
    }

    pub fn is_cancelled(&self) -> bool {
        self.final_report().is_some_and(SweepReport::is_cancelled)
    }
}

/// Sweep under the primary mode; if nothing priced and a different
/// fallback mode exists, sweep once more under it. Never more than once.
pub async fn run_with_fallback(
    plan: &SweepPlan,
    provider: Arc<dyn PricingProvider>,
    modes: &FetchModes,
    ctx: &RunContext,
) -> Result<PlannerOutcome> {
    let primary = run_sweep(plan, provider.clone(), &modes.primary, ctx).await?;
    let retry = !primary.is_cancelled() && primary.priced_rows() == 0;
    let mut outcome = PlannerOutcome {
        sweeps: vec![primary],
    };

    match modes.fallback.as_deref() {
        Some(fallback) if retry && fallback != modes.primary => {
            warn!(
                primary = %modes.primary,
                fallback,
                "No priced rows, rerunning the sweep with the fallback fetch mode"
            );
            ctx.enter(RunState::RetryWithFallback);
            let second = run_sweep(plan, provider, fallback, ctx).await?;
            outcome.sweeps.push(second);
        }
        _ if retry => info!(mode = %modes.primary, "No priced rows and no fallback mode"),
        _ => {}
    }

    ctx.progress.finish();
    ctx.enter(RunState::Done);
    Ok(outcome)
}
