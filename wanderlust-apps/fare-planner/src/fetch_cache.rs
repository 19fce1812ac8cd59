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

//! # Fetch Cache
//!
//! Successful provider responses, keyed by request fingerprint and
//! persisted as a single JSON document:
//!
//! ```json
//! { "version": 1, "entries": { "<fingerprint>": { "status": "ok", ... } } }
//! ```
//!
//! Only `ok` results are ever stored. An unreadable file is treated as an
//! empty cache.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::pricing_provider::{CacheSource, FetchResult, PricingRequest};

const CACHE_VERSION: u32 = 1;

#[derive(Serialize)]
struct CacheFileOut<'a> {
    version: u32,
    entries: BTreeMap<&'a str, &'a FetchResult>,
}

#[derive(Deserialize)]
struct CacheFileIn {
    #[serde(default)]
    entries: HashMap<String, serde_json::Value>,
}

/// Key for everything that can change a priced result.
///
/// `depart|return|trip_type|origin|destination|seat|adults|children|infants_in_seat|infants_on_lap|max_stops|currency|fetch_mode`
pub fn fingerprint(request: &PricingRequest) -> String {
    let p = &request.passengers;
    [
        request.depart_date.to_string(),
        request.return_date.map(|d| d.to_string()).unwrap_or_default(),
        request.trip_type.as_str().to_string(),
        request.origin.clone(),
        request.destination.clone(),
        request.seat.as_str().to_string(),
        p.adults.to_string(),
        p.children.to_string(),
        p.infants_in_seat.to_string(),
        p.infants_on_lap.to_string(),
        request.max_stops.map(|s| s.to_string()).unwrap_or_default(),
        request.currency.clone(),
        request.fetch_mode.clone(),
    ]
    .join("|")
}

#[derive(Debug, Default)]
pub struct FetchCache {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, FetchResult>>,
    dirty: AtomicBool,
}

impl FetchCache {
    /// A cache that lives for the duration of the process only.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load `path` once. Missing file means empty cache; a corrupt one is
    /// logged and ignored.
    pub fn load(path: Option<PathBuf>) -> Self {
        let entries = match path.as_deref() {
            Some(p) if p.exists() => match read_entries(p) {
                Ok(entries) => {
                    info!(path = %p.display(), entries = entries.len(), "Loaded fetch cache");
                    entries
                }
                Err(e) => {
                    warn!(path = %p.display(), "Ignoring unreadable fetch cache: {e:#}");
                    HashMap::new()
                }
            },
            _ => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// A copy of the stored result, tagged as coming from the cache.
    pub fn get(&self, key: &str) -> Option<FetchResult> {
        self.lock()
            .get(key)
            .filter(|r| r.is_ok())
            .map(|r| r.reused(CacheSource::Cache))
    }

    /// Store `result` if it is `ok`. Returns whether it was stored.
    pub fn insert(&self, key: String, result: &FetchResult) -> bool {
        if !result.is_ok() {
            return false;
        }
        let stored = FetchResult {
            from_cache: false,
            cache_source: None,
            ..result.clone()
        };
        self.lock().insert(key, stored);
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Write the cache if anything changed since the last flush. Keys are
    /// sorted and the file is replaced atomically.
    pub fn flush(&self) -> Result<bool> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let json = {
            let entries = self.lock();
            let doc = CacheFileOut {
                version: CACHE_VERSION,
                entries: entries
                    .iter()
                    .filter(|(_, r)| r.is_ok())
                    .map(|(k, r)| (k.as_str(), r))
                    .collect(),
            };
            serde_json::to_string_pretty(&doc).context("serializing fetch cache")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let written = std::fs::write(&tmp, json)
            .with_context(|| format!("writing {}", tmp.display()))
            .and_then(|_| {
                std::fs::rename(&tmp, path)
                    .with_context(|| format!("replacing {}", path.display()))
            });
        if let Err(e) = written {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        debug!(path = %path.display(), "Flushed fetch cache");
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, FetchResult>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_entries(path: &Path) -> Result<HashMap<String, FetchResult>> {
    let text = std::fs::read_to_string(path)?;
    let doc: CacheFileIn = serde_json::from_str(&text)?;
    let mut discarded = 0usize;
    let entries = doc
        .entries
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<FetchResult>(value) {
            Ok(result) if result.is_ok() => Some((key, result)),
            _ => {
                discarded += 1;
                None
            }
        })
        .collect();
    if discarded > 0 {
        debug!(discarded, "Dropped non-ok cache entries");
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing_provider::{Passengers, PricedResponse, Seat, TripType};
    use chrono::NaiveDate;

    fn request() -> PricingRequest {
        PricingRequest {
            origin: "CDG".to_string(),
            destination: "HND".to_string(),
            depart_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            return_date: None,
            trip_type: TripType::OneWay,
            seat: Seat::Economy,
            passengers: Passengers::default(),
            max_stops: None,
            currency: "EUR".to_string(),
            fetch_mode: "local".to_string(),
        }
    }

    #[test]
    fn fingerprint_layout() {
        assert_eq!(
            fingerprint(&request()),
            "2026-05-01||one-way|CDG|HND|economy|1|0|0|0||EUR|local"
        );
    }

    #[test]
    fn only_ok_results_are_stored() {
        let cache = FetchCache::in_memory();
        assert!(!cache.insert("a".into(), &FetchResult::empty("nothing")));
        assert!(!cache.insert("b".into(), &FetchResult::error("boom")));
        assert!(cache.is_empty());
        assert!(!cache.is_dirty());

        assert!(cache.insert("c".into(), &FetchResult::ok(PricedResponse::default())));
        let hit = cache.get("c").unwrap();
        assert!(hit.from_cache);
        assert_eq!(hit.cache_source, Some(CacheSource::Cache));
        assert!(cache.is_dirty());
    }

    #[test]
    fn in_memory_flush_is_a_noop() {
        let cache = FetchCache::in_memory();
        cache.insert("c".into(), &FetchResult::ok(PricedResponse::default()));
        assert!(!cache.flush().unwrap());
    }
}
