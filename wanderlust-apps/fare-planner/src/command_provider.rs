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

//! # Command Provider
//!
//! Prices requests through an external program: the request goes to its
//! stdin as one JSON object, the reply comes back on stdout.
//!
//! ```text
//! {"status":"ok","current_price":"low","flights":[{...}]}
//! {"status":"empty","error":"..."}
//! {"status":"error","error":"..."}
//! ```

use std::process::Stdio;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

use crate::pricing_provider::{
    FlightCandidate, PricedResponse, PricingProvider, PricingRequest, ProviderError,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum CommandReply {
    Ok {
        #[serde(default)]
        current_price: Option<String>,
        #[serde(default)]
        flights: Vec<FlightCandidate>,
    },
    Empty {
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
}

impl CommandReply {
    fn into_result(self) -> Result<PricedResponse, ProviderError> {
        match self {
            CommandReply::Ok { flights, .. } if flights.is_empty() => {
                Err(ProviderError::NoResults("no flights in reply".to_string()))
            }
            CommandReply::Ok {
                current_price,
                flights,
            } => Ok(PricedResponse {
                current_price,
                flights,
            }),
            CommandReply::Empty { error } => Err(ProviderError::NoResults(error.unwrap_or_default())),
            CommandReply::Error { error } => Err(anyhow!(
                "{}",
                error.unwrap_or_else(|| "provider command reported an error".to_string())
            )
            .into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
}

impl CommandProvider {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Program and arguments from a command line split on whitespace.
    pub fn from_command_line(line: &[String]) -> anyhow::Result<Self> {
        let mut words = line.iter().flat_map(|part| part.split_whitespace()).map(str::to_string);
        let program = words.next().context("Empty provider command")?;
        Ok(Self::new(program, words.collect()))
    }

    async fn run(&self, request: &PricingRequest) -> anyhow::Result<CommandReply> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program))?;

        let mut payload = serde_json::to_vec(request)?;
        payload.push(b'\n');
        let mut stdin = child.stdin.take().context("Provider stdin unavailable")?;
        stdin.write_all(&payload).await.context("Writing request to provider")?;
        drop(stdin);

        let output = child.wait_with_output().await.context("Waiting for provider")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", self.program, output.status, stderr.trim());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(bytes = stdout.len(), "Provider reply");
        serde_json::from_str(stdout.trim()).context("Malformed provider reply")
    }
}

#[async_trait]
impl PricingProvider for CommandProvider {
    fn name(&self) -> &str {
        "command"
    }

    async fn fetch(&self, request: &PricingRequest) -> Result<PricedResponse, ProviderError> {
        self.run(request).await?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_map_to_outcomes() {
        let ok: CommandReply = serde_json::from_str(
            r#"{"status":"ok","current_price":"typical","flights":[{"name":"TAP","price":"€80"}]}"#,
        )
        .unwrap();
        let response = ok.into_result().unwrap();
        assert_eq!(response.current_price.as_deref(), Some("typical"));
        assert_eq!(response.flights[0].name, "TAP");

        let empty: CommandReply = serde_json::from_str(r#"{"status":"empty"}"#).unwrap();
        assert!(matches!(empty.into_result(), Err(ProviderError::NoResults(_))));

        let no_flights: CommandReply = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(matches!(no_flights.into_result(), Err(ProviderError::NoResults(_))));

        let error: CommandReply =
            serde_json::from_str(r#"{"status":"error","error":"rate limited"}"#).unwrap();
        match error.into_result() {
            Err(ProviderError::Failed(e)) => assert_eq!(e.to_string(), "rate limited"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn command_line_splits() {
        let provider =
            CommandProvider::from_command_line(&["python3 fetch.py".to_string(), "--fast".to_string()])
                .unwrap();
        assert_eq!(provider.program, "python3");
        assert_eq!(provider.args, vec!["fetch.py", "--fast"]);
        assert!(CommandProvider::from_command_line(&[]).is_err());
    }
}
