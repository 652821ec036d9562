//! Contract ABI fetcher against an Etherscan-style API.
//!
//! ABI availability is best-effort: unverified contracts, rate limits and
//! transient failures all read as "no ABI", never as pipeline errors.

use std::time::Duration;

use serde::Deserialize;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: String,
}

pub struct AbiFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AbiFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.into(), api_key: None }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Fetch the verified ABI JSON for a contract. `None` when the explorer
    /// has no ABI or the request fails.
    pub async fn fetch_abi(&self, address: &str) -> Option<String> {
        let mut query: Vec<(&str, &str)> = vec![
            ("module", "contract"),
            ("action", "getabi"),
            ("address", address),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey", key));
        }

        let response = match self.client.get(&self.base_url).query(&query).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(address, error = %e, "abi fetch request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(address, status = %response.status(), "abi fetch rejected");
            return None;
        }
        let body: ExplorerResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(address, error = %e, "abi fetch body unreadable");
                return None;
            }
        };
        if body.status != "1" {
            tracing::debug!(address, message = %body.message, "abi unavailable");
            return None;
        }
        Some(body.result)
    }
}
