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

//! # Google Flights Provider
//!
//! Effectful (time, network) side of pricing a request against the
//! flights search page.

use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, trace, warn};
use wreq::redirect::Policy;
use wreq_util::Emulation;

use crate::consent_cookie::cookie_header;
use crate::flights_query_builder::search_url;
use crate::flights_results_parser::parse_results;
use crate::pricing_provider::{PricedResponse, PricingProvider, PricingRequest, ProviderError};

pub struct GoogleFlightsProvider {
    client: wreq::Client,
    language: String,
}

impl GoogleFlightsProvider {
    pub fn new(language: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = wreq::Client::builder()
            .emulation(Emulation::Safari18_5)
            .redirect(Policy::default())
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            language: if language.is_empty() { "en".to_string() } else { language.to_string() },
        })
    }

    async fn fetch_page(&self, url: &str) -> anyhow::Result<String> {
        let start = Instant::now();
        trace!(url, "Requesting results page");
        let response = self
            .client
            .get(url)
            .header("Cookie", cookie_header(Local::now().date_naive()))
            .send()
            .await
            .map_err(|e| anyhow!("Request failed: {e}"))?;

        let status = response.status();
        let body = response.text().await.context("Read body")?;
        debug!(
            status = status.as_u16(),
            kb = body.len() / 1024,
            elapsed = ?start.elapsed(),
            "Results page fetched"
        );

        if !status.is_success() {
            let preview: String = body.chars().take(300).collect();
            return Err(anyhow!("HTTP error {status}: {preview}"));
        }
        Ok(body)
    }
}

#[async_trait]
impl PricingProvider for GoogleFlightsProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn fetch(&self, request: &PricingRequest) -> Result<PricedResponse, ProviderError> {
        let url = search_url(request, &self.language).context("Invalid search parameters")?;
        let html = self.fetch_page(&url).await?;
        let parsed = parse_results(&html);
        if let Err(ProviderError::Failed(e)) = &parsed {
            warn!(
                origin = %request.origin,
                destination = %request.destination,
                date = %request.depart_date,
                "Results page not understood: {e}"
            );
        }
        parsed
    }
}
