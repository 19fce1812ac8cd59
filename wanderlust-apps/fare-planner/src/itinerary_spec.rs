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

//! # Itinerary Templates
//!
//! Side-effect free parsing of itinerary node chains (`GROUP` or
//! `GROUP(AAA,BBB)`) and expansion of nodes into airport pairs.

use std::collections::{HashMap, HashSet};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::plan_config::ConfigError;

static NODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_]+)(?:\(([^)]+)\))?$").expect("valid node regex"));

/// A node as written in the plan file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawNode {
    Text(String),
    Object {
        group: String,
        #[serde(default)]
        airports: Vec<String>,
    },
}

impl From<&str> for RawNode {
    fn from(value: &str) -> Self {
        RawNode::Text(value.to_string())
    }
}

/// A location group, optionally pinned to an explicit list of airports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeSpec {
    pub group: String,
    pub airports_override: Option<Vec<String>>,
}

impl NodeSpec {
    pub fn group(name: &str) -> Self {
        Self {
            group: name.trim().to_uppercase(),
            airports_override: None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let caps = NODE_RE
            .captures(raw.trim())
            .ok_or_else(|| ConfigError::InvalidNode(raw.to_string()))?;
        let group = caps[1].to_uppercase();
        let airports_override = caps
            .get(2)
            .map(|m| normalize_codes(m.as_str().split(',')))
            .filter(|codes| !codes.is_empty());
        Ok(Self {
            group,
            airports_override,
        })
    }

    fn from_raw(raw: &RawNode) -> Result<Self, ConfigError> {
        match raw {
            RawNode::Text(text) => Self::parse(text),
            RawNode::Object { group, airports } => {
                let group = group.trim().to_uppercase();
                if group.is_empty() {
                    return Err(ConfigError::InvalidNode(format!("{raw:?}")));
                }
                let codes = normalize_codes(airports);
                Ok(Self {
                    group,
                    airports_override: (!codes.is_empty()).then_some(codes),
                })
            }
        }
    }
}

impl fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.airports_override {
            Some(codes) => write!(f, "{}({})", self.group, codes.join(",")),
            None => write!(f, "{}", self.group),
        }
    }
}

/// An ordered chain of at least two nodes, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItinerarySpec {
    nodes: Vec<NodeSpec>,
    label: String,
}

impl ItinerarySpec {
    pub fn new(nodes: Vec<NodeSpec>) -> Result<Self, ConfigError> {
        let label = nodes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(">");
        if nodes.len() < 2 {
            return Err(ConfigError::ShortItinerary(label));
        }
        Ok(Self { nodes, label })
    }

    pub fn parse(raw: &[RawNode]) -> Result<Self, ConfigError> {
        let nodes = raw
            .iter()
            .map(NodeSpec::from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(nodes)
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Nodes where the traveller stays overnight (all but the first and last).
    pub fn stops(&self) -> &[NodeSpec] {
        &self.nodes[1..self.nodes.len() - 1]
    }

    pub fn segment_count(&self) -> usize {
        self.nodes.len() - 1
    }
}

/// Concrete (origin, destination) pair expanded from two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AirportPair {
    pub origin: String,
    pub destination: String,
}

/// Trim, upper-case and de-duplicate codes, keeping first occurrences.
pub fn normalize_codes<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_uppercase())
        .filter(|code| !code.is_empty() && seen.insert(code.clone()))
        .collect()
}

pub fn is_airport_code(value: &str) -> bool {
    value.len() == 3 && value.chars().all(|c| c.is_ascii_alphabetic())
}

/// Airports a node stands for, truncated to `max_per_group` (0 = no limit).
pub fn airports_for_node(
    node: &NodeSpec,
    groups: &HashMap<String, Vec<String>>,
    max_per_group: usize,
) -> Result<Vec<String>, ConfigError> {
    let mut airports = match &node.airports_override {
        Some(codes) => normalize_codes(codes),
        None => groups
            .get(&node.group)
            .map(normalize_codes)
            .ok_or_else(|| ConfigError::MissingGroup(node.group.clone()))?,
    };
    if max_per_group > 0 {
        airports.truncate(max_per_group);
    }
    Ok(airports)
}

/// Cross product of origins and destinations, skipping same-airport pairs,
/// capped at `max_pairs` (0 = no limit).
pub fn airport_pairs(from: &[String], to: &[String], max_pairs: usize) -> Vec<AirportPair> {
    let pairs = from.iter().flat_map(|origin| {
        to.iter()
            .filter(move |dest| *dest != origin)
            .map(move |dest| AirportPair {
                origin: origin.clone(),
                destination: dest.clone(),
            })
    });
    if max_pairs > 0 {
        pairs.take(max_pairs).collect()
    } else {
        pairs.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_overridden_nodes() {
        let plain = NodeSpec::parse("par").unwrap();
        assert_eq!(plain.group, "PAR");
        assert!(plain.airports_override.is_none());

        let pinned = NodeSpec::parse("tyo(hnd, nrt,HND)").unwrap();
        assert_eq!(pinned.group, "TYO");
        assert_eq!(
            pinned.airports_override,
            Some(vec!["HND".to_string(), "NRT".to_string()])
        );
        assert_eq!(pinned.to_string(), "TYO(HND,NRT)");
    }

    #[test]
    fn rejects_malformed_nodes() {
        assert!(NodeSpec::parse("PAR(CDG").is_err());
        assert!(NodeSpec::parse("PAR-LON").is_err());
        assert!(NodeSpec::parse("").is_err());
    }

    #[test]
    fn itinerary_label_and_stops() {
        let raw: Vec<RawNode> = vec!["PAR".into(), "TYO(HND)".into(), "OSA".into(), "PAR".into()];
        let itin = ItinerarySpec::parse(&raw).unwrap();
        assert_eq!(itin.label(), "PAR>TYO(HND)>OSA>PAR");
        assert_eq!(itin.stops().len(), 2);
        assert_eq!(itin.segment_count(), 3);

        let short = ItinerarySpec::parse(&["PAR".into()]);
        assert!(matches!(short, Err(ConfigError::ShortItinerary(_))));
    }

    #[test]
    fn object_nodes_are_accepted() {
        let raw: Vec<RawNode> =
            serde_json::from_str(r#"["PAR", {"group": "lis", "airports": ["lis"]}]"#).unwrap();
        let itin = ItinerarySpec::parse(&raw).unwrap();
        assert_eq!(itin.label(), "PAR>LIS(LIS)");
    }

    #[test]
    fn pairs_skip_identical_airports_and_respect_cap() {
        let from = vec!["CDG".to_string(), "ORY".to_string()];
        let to = vec!["ORY".to_string(), "LIS".to_string()];
        let pairs = airport_pairs(&from, &to, 0);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].origin, "CDG");
        assert_eq!(pairs[0].destination, "ORY");

        assert_eq!(airport_pairs(&from, &to, 2).len(), 2);
    }

    #[test]
    fn group_lookup_truncates_and_reports_missing() {
        let mut groups = HashMap::new();
        groups.insert(
            "PAR".to_string(),
            vec!["cdg".to_string(), "ORY".to_string(), "BVA".to_string()],
        );
        let airports = airports_for_node(&NodeSpec::group("PAR"), &groups, 2).unwrap();
        assert_eq!(airports, vec!["CDG", "ORY"]);

        let missing = airports_for_node(&NodeSpec::group("LON"), &groups, 0);
        assert!(matches!(missing, Err(ConfigError::MissingGroup(g)) if g == "LON"));
    }
}
