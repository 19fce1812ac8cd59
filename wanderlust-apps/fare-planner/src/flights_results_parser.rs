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

//! # Flights Results Parser
//!
//! Side-effect free HTML parsing of a search results page into flight
//! candidates.

use anyhow::anyhow;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::pricing_provider::{FlightCandidate, PricedResponse, ProviderError};
use crate::value_parsers::parse_stops;

struct FlightSelectors {
    best_container: Selector,
    other_container: Selector,
    flight_card: Selector,
    airline: Selector,
    times: Selector,
    arrival_ahead: Selector,
    duration: Selector,
    stops: Selector,
    delay: Selector,
    price: Selector,
    price_level: Selector,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid CSS selector")
}

static SELECTORS: Lazy<FlightSelectors> = Lazy::new(|| FlightSelectors {
    best_container: selector(r#"div[jsname="IWWDBc"]"#),
    other_container: selector(r#"div[jsname="YdtKid"]"#),
    flight_card: selector("ul.Rk10dc li"),
    airline: selector("div.sSHqwe.tPgKwe.ogfYpf span"),
    times: selector("span.mv1WYe div"),
    arrival_ahead: selector("span.bOzv6"),
    duration: selector("div.Ak5kof div"),
    stops: selector(".BbR8Ec .ogfYpf"),
    delay: selector(".GsCCve"),
    price: selector(".YMlIz.FpEdX"),
    price_level: selector("span.gOatQ"),
});

const NO_RESULTS_BANNERS: &[&str] = &["No results returned", "No flights found", "no matching flights"];

pub fn is_consent_wall(html: &str) -> bool {
    html.contains("consent.google.com") || html.contains("ppConfig")
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(card: ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector).next().map(text_of).filter(|t| !t.is_empty())
}

fn parse_card(card: ElementRef<'_>, is_best: bool) -> Option<FlightCandidate> {
    let s = &*SELECTORS;
    let price = first_text(card, &s.price)?;
    let mut times = card.select(&s.times).map(text_of);
    let departure = times.next()?;
    let arrival = times.next()?;
    Some(FlightCandidate {
        is_best,
        name: first_text(card, &s.airline).unwrap_or_default(),
        departure,
        arrival,
        arrival_time_ahead: first_text(card, &s.arrival_ahead),
        duration: first_text(card, &s.duration).unwrap_or_default(),
        stops: first_text(card, &s.stops).as_deref().and_then(parse_stops),
        delay: first_text(card, &s.delay),
        price,
    })
}

/// Candidates from a results page.
///
/// A page that lists result sections without any flight card, or carries a
/// "no results" banner, is [`ProviderError::NoResults`]. Consent walls and
/// pages without any result section are failures.
pub fn parse_results(html: &str) -> Result<PricedResponse, ProviderError> {
    if is_consent_wall(html) {
        return Err(anyhow!("Consent wall detected, cookies not accepted").into());
    }
    let document = Html::parse_document(html);
    let s = &*SELECTORS;

    let mut sections = 0usize;
    let mut flights = Vec::new();
    for (container, is_best) in document
        .select(&s.best_container)
        .map(|c| (c, true))
        .chain(document.select(&s.other_container).map(|c| (c, false)))
    {
        sections += 1;
        flights.extend(
            container
                .select(&s.flight_card)
                .filter_map(|card| parse_card(card, is_best)),
        );
    }

    if flights.is_empty() {
        if let Some(banner) = NO_RESULTS_BANNERS.iter().find(|b| html.contains(**b)) {
            return Err(ProviderError::NoResults((*banner).to_string()));
        }
        if sections > 0 {
            return Err(ProviderError::NoResults("empty results page".to_string()));
        }
        let loading = html.contains("Loading results") || html.contains("jsshadow");
        tracing::debug!(loading, bytes = html.len(), "Results page without result sections");
        return Err(anyhow!("No result sections in page, parser may need updating").into());
    }

    let current_price = document
        .select(&s.price_level)
        .next()
        .map(text_of)
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty());
    Ok(PricedResponse {
        current_price,
        flights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(airline: &str, dep: &str, arr: &str, ahead: &str, stops: &str, price: &str) -> String {
        format!(
            r#"<li>
                <div class="sSHqwe tPgKwe ogfYpf"><span>{airline}</span></div>
                <span class="mv1WYe"><div>{dep}</div><div>{arr}</div></span>
                <span class="bOzv6">{ahead}</span>
                <div class="Ak5kof"><div>2 hr 35 min</div></div>
                <div class="BbR8Ec"><span class="ogfYpf">{stops}</span></div>
                <div class="YMlIz FpEdX"><span>{price}</span></div>
            </li>"#
        )
    }

    fn page(best: &[String], others: &[String]) -> String {
        format!(
            r#"<html><body>
                <span class="gOatQ">Low</span>
                <div jsname="IWWDBc"><ul class="Rk10dc">{}</ul></div>
                <div jsname="YdtKid"><ul class="Rk10dc">{}</ul></div>
            </body></html>"#,
            best.concat(),
            others.concat()
        )
    }

    #[test]
    fn parses_best_and_other_cards() {
        let html = page(
            &[card("TAP", "6:05 AM", "8:40 AM", "", "Nonstop", "€89")],
            &[card("Vueling", "10:15 PM", "1:20 AM", "+1", "1 stop", "€1,104")],
        );
        let response = parse_results(&html).unwrap();
        assert_eq!(response.current_price.as_deref(), Some("low"));
        assert_eq!(response.flights.len(), 2);

        let best = &response.flights[0];
        assert!(best.is_best);
        assert_eq!(best.name, "TAP");
        assert_eq!(best.departure, "6:05 AM");
        assert_eq!(best.duration, "2 hr 35 min");
        assert_eq!(best.stops, Some(0));
        assert_eq!(best.arrival_time_ahead, None);
        assert_eq!(best.price, "€89");

        let other = &response.flights[1];
        assert!(!other.is_best);
        assert_eq!(other.stops, Some(1));
        assert_eq!(other.arrival_time_ahead.as_deref(), Some("+1"));
        assert_eq!(other.price, "€1,104");
    }

    #[test]
    fn empty_sections_are_no_results() {
        let err = parse_results(&page(&[], &[])).unwrap_err();
        assert!(matches!(err, ProviderError::NoResults(_)));
    }

    #[test]
    fn banner_is_no_results() {
        let err = parse_results("<html><body>No results returned.</body></html>").unwrap_err();
        assert!(matches!(err, ProviderError::NoResults(_)));
    }

    #[test]
    fn consent_and_unknown_pages_fail() {
        let consent = r#"<html><head><base href="https://consent.google.com"></head></html>"#;
        assert!(matches!(parse_results(consent), Err(ProviderError::Failed(_))));
        assert!(matches!(
            parse_results("<html><body>Loading results</body></html>"),
            Err(ProviderError::Failed(_))
        ));
    }
}
