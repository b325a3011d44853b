//! Generic upstream JSON fetching
//!
//! Knows nothing about any particular provider: it issues a GET, decodes
//! the body as JSON when possible and gives up as soon as the attempt's
//! cancellation token fires.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::UpstreamConfig;

/// Status and decoded body of an upstream reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Size of the body once serialized, as judged by the cache policy
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(&self.body).map(|bytes| bytes.len()).unwrap_or(usize::MAX)
    }
}

/// Build the shared HTTP client
pub fn build_client(config: &UpstreamConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(config.user_agent.clone())
        .build()
        .context("Failed to build HTTP client")
}

/// GET `url` and decode the reply
///
/// 5xx replies are errors so the scheduler retries them; every other status
/// is returned as-is. Non-JSON bodies are kept as a string.
pub async fn fetch_json(client: &reqwest::Client, url: &str, cancel: CancellationToken) -> Result<UpstreamResponse> {
    debug!(%url, "fetch_json: called");

    let request = async {
        let response = client.get(url).send().await.context("Request failed")?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.context("Failed to read response body")?;

        if status >= 500 {
            eyre::bail!("Upstream returned {}", status);
        }

        Ok::<_, eyre::Report>(UpstreamResponse {
            status,
            body: decode_body(&bytes),
        })
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(%url, "fetch_json: cancelled");
            Err(eyre::eyre!("Request to {} cancelled", url))
        }
        result = request => result,
    }
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
