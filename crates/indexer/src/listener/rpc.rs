//! JSON-RPC ledger client over HTTP.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::client::{ChainHead, LedgerBlock, LedgerClient};
use crate::config::LedgerConfig;

/// HTTP JSON-RPC client that rotates through its endpoints on reconnect.
pub struct RpcLedgerClient {
    client: Client,
    endpoints: Vec<String>,
    current: AtomicUsize,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl RpcLedgerClient {
    /// Build a client for the configured endpoints.
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        if config.rpc_urls.is_empty() {
            anyhow::bail!("At least one ledger RPC URL is required");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("agenthive-indexer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build ledger HTTP client")?;

        Ok(Self {
            client,
            endpoints: config.rpc_urls.clone(),
            current: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    /// The endpoint requests currently go to.
    pub fn active_endpoint(&self) -> &str {
        let index = self.current.load(Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[index]
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let endpoint = self.active_endpoint().to_string();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        debug!(endpoint = %endpoint, method, id, "Ledger RPC call");

        let response = self
            .client
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("{} request to {} failed", method, endpoint))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("{} returned HTTP {} from {}", method, status, endpoint);
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Invalid {} response from {}", method, endpoint))?;

        decode_response(method, body)
    }
}

fn decode_response<T>(method: &str, body: RpcResponse<T>) -> Result<Option<T>> {
    if let Some(error) = body.error {
        anyhow::bail!("{} failed with RPC error {}: {}", method, error.code, error.message);
    }
    Ok(body.result)
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn get_chain_head(&self) -> Result<ChainHead> {
        self.call("condenser_api.get_dynamic_global_properties", json!([]))
            .await?
            .context("Dynamic global properties missing from response")
    }

    async fn get_block(&self, height: u64) -> Result<LedgerBlock> {
        self.call("condenser_api.get_block", json!([height]))
            .await?
            .with_context(|| format!("Block {} not available yet", height))
    }

    async fn reconnect(&self) {
        let next = (self.current.fetch_add(1, Ordering::Relaxed) + 1) % self.endpoints.len();
        info!(
            endpoint = %self.endpoints[next],
            "Switching ledger endpoint"
        );
    }

    fn endpoint(&self) -> String {
        self.active_endpoint().to_string()
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(urls: &[&str]) -> LedgerConfig {
        LedgerConfig {
            rpc_urls: urls.iter().map(|u| u.to_string()).collect(),
            ..LedgerConfig::default()
        }
    }

    #[test]
    fn test_requires_an_endpoint() {
        assert!(RpcLedgerClient::new(&config(&[])).is_err());
    }

    #[tokio::test]
    async fn test_reconnect_rotates_endpoints() {
        let client = RpcLedgerClient::new(&config(&["https://a.example", "https://b.example"])).unwrap();
        assert_eq!(client.endpoint(), "https://a.example");

        client.reconnect().await;
        assert_eq!(client.endpoint(), "https://b.example");

        client.reconnect().await;
        assert_eq!(client.endpoint(), "https://a.example");
    }

    #[tokio::test]
    async fn test_endpoints_lists_every_configured_url() {
        let client = RpcLedgerClient::new(&config(&["https://a.example", "https://b.example"])).unwrap();
        client.reconnect().await;

        assert_eq!(client.endpoints(), vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_decode_response() {
        let ok: RpcResponse<ChainHead> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"head_block_number": 120, "last_irreversible_block_num": 100, "time": "x"}
        }))
        .unwrap();
        let head = decode_response("props", ok).unwrap().unwrap();
        assert_eq!(head.last_irreversible_block_num, 100);
        assert_eq!(head.head_block_number, 120);

        let missing: RpcResponse<LedgerBlock> =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 2, "result": null})).unwrap();
        assert!(decode_response("get_block", missing).unwrap().is_none());

        let failed: RpcResponse<LedgerBlock> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32000, "message": "Unable to acquire database lock"}
        }))
        .unwrap();
        let err = decode_response("get_block", failed).unwrap_err().to_string();
        assert!(err.contains("-32000"), "{}", err);
    }
}
