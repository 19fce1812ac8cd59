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

//! # Run Progress
//!
//! Per-run context: counters with a linear ETA, the run state machine, and
//! cooperative cancellation.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Validating,
    GeneratingSchedules,
    Fetching,
    RetryWithFallback,
    Aggregating,
    Scoring,
    Done,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed | RunState::Cancelled)
    }
}

#[derive(Debug, Error)]
#[error("run cancelled")]
pub struct Cancelled;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    schedules_done: u64,
    schedules_total: Option<u64>,
    calls_done: u64,
    calls_total: u64,
    /// Hard cap on calls for the whole sweep, if any.
    calls_bound: Option<u64>,
    cache_hits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub schedules_done: u64,
    pub schedules_total: Option<u64>,
    pub calls_done: u64,
    pub calls_total: u64,
    pub cache_hits: u64,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn cache_hit_ratio(&self) -> f64 {
        if self.calls_done == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.calls_done as f64
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.schedules_total {
            Some(total) if total > 0 => {
                let ratio = (self.schedules_done as f64 / total as f64).min(1.0);
                let filled = (ratio * 20.0).round() as usize;
                write!(
                    f,
                    "Schedules {}/{} [{}{}] {:>3.0}%",
                    self.schedules_done,
                    total,
                    "#".repeat(filled),
                    "-".repeat(20 - filled),
                    ratio * 100.0
                )?;
            }
            _ => write!(f, "Schedules {}", self.schedules_done)?,
        }
        write!(
            f,
            " | Calls {}/{} | Cache hits {} ({:.0}%) | ETA {}",
            self.calls_done,
            self.calls_total,
            self.cache_hits,
            self.cache_hit_ratio() * 100.0,
            self.eta.map(format_mmss).unwrap_or_else(|| "--:--".to_string()),
        )
    }
}

fn format_mmss(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Remaining time, assuming the rest goes at the pace observed so far.
pub fn linear_eta(elapsed: Duration, done: u64, total: u64) -> Option<Duration> {
    if done == 0 || total == 0 {
        return None;
    }
    let remaining = total.saturating_sub(done);
    Some(elapsed.mul_f64(remaining as f64 / done as f64))
}

/// Counters shared by the sweep, drawn as a one-line spinner when enabled.
pub struct ProgressTracker {
    counters: Mutex<Counters>,
    started: Instant,
    bar: Option<ProgressBar>,
    refresh: Duration,
    last_draw: Mutex<Option<Instant>>,
}

impl ProgressTracker {
    pub fn new(display: bool, refresh: Duration) -> Self {
        let bar = display.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(style);
            }
            bar
        });
        Self {
            counters: Mutex::new(Counters::default()),
            started: Instant::now(),
            bar,
            refresh,
            last_draw: Mutex::new(None),
        }
    }

    pub fn hidden() -> Self {
        Self::new(false, Duration::from_millis(200))
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Start a new sweep: counters go back to zero, elapsed time does not.
    pub fn reset(&self, schedules_total: Option<u64>) {
        *self.counters() = Counters {
            schedules_total,
            ..Counters::default()
        };
        self.draw(true);
    }

    /// Upper bound on calls for the sweep; the ETA falls back to it when
    /// the schedule total is unknown.
    pub fn set_calls_bound(&self, bound: Option<u64>) {
        self.counters().calls_bound = bound.filter(|b| *b > 0);
    }

    pub fn add_planned_calls(&self, n: u64) {
        self.counters().calls_total += n;
        self.draw(false);
    }

    pub fn schedule_done(&self) -> u64 {
        let done = {
            let mut c = self.counters();
            c.schedules_done += 1;
            c.schedules_done
        };
        self.draw(false);
        done
    }

    pub fn call_done(&self, cache_hit: bool) -> u64 {
        let done = {
            let mut c = self.counters();
            c.calls_done += 1;
            if cache_hit {
                c.cache_hits += 1;
            }
            c.calls_done
        };
        self.draw(false);
        done
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let c = *self.counters();
        let elapsed = self.started.elapsed();
        let eta = match (c.schedules_total, c.calls_bound) {
            (Some(total), _) => linear_eta(elapsed, c.schedules_done, total),
            (None, Some(bound)) => linear_eta(elapsed, c.calls_done, bound),
            (None, None) => None,
        };
        ProgressSnapshot {
            schedules_done: c.schedules_done,
            schedules_total: c.schedules_total,
            calls_done: c.calls_done,
            calls_total: c.calls_total,
            cache_hits: c.cache_hits,
            elapsed,
            eta,
        }
    }

    fn draw(&self, force: bool) {
        let Some(bar) = &self.bar else { return };
        {
            let mut last = self.last_draw.lock().unwrap_or_else(|p| p.into_inner());
            let now = Instant::now();
            if !force && last.is_some_and(|t| now.duration_since(t) < self.refresh) {
                return;
            }
            *last = Some(now);
        }
        bar.set_message(self.snapshot().to_string());
        bar.tick();
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        debug!("{}", self.snapshot());
    }
}

/// Everything a sweep shares about the run it belongs to.
pub struct RunContext {
    pub progress: ProgressTracker,
    cancel: CancellationToken,
    state: Mutex<RunState>,
}

impl RunContext {
    pub fn new(progress: ProgressTracker) -> Self {
        Self {
            progress,
            cancel: CancellationToken::new(),
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Handle to cancel the run from elsewhere (signal handler, test).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stage boundary: fails once cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            self.enter(RunState::Cancelled);
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn enter(&self, next: RunState) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.is_terminal() && *state != next {
            return;
        }
        if *state != next {
            debug!(from = ?*state, to = ?next, "Run state");
            *state = next;
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
