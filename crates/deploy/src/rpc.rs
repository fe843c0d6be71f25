//! Shared RPC utilities for interacting with Starknet JSON-RPC endpoints.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use starknet::core::types::Felt;

use crate::felt::to_hex;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between two finality polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Starknet error code for a class hash unknown to the node.
pub const CLASS_HASH_NOT_FOUND: i64 = 28;

/// Error object of a JSON-RPC response.
///
/// Starknet nodes carry the interesting part of a failure in `data`, so it is
/// kept and displayed.
#[derive(Debug, Clone, PartialEq, Deserialize, thiserror::Error)]
#[error(
    "RPC error {code}: {message}{}",
    .data.as_ref().map(|data| format!(" ({})", data)).unwrap_or_default()
)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The Starknet RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result. An error response is returned as an [`RpcError`]
/// that callers can recover with `downcast_ref`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let mut body: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = body.get_mut("error").map(Value::take) {
        let error: RpcError = serde_json::from_value(error)
            .with_context(|| format!("Malformed error in {} response", method))?;
        return Err(error.into());
    }

    let result = body
        .get_mut("result")
        .map(Value::take)
        .context("No result in response")?;

    serde_json::from_value(result)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Status of a transaction as reported by `starknet_getTransactionStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionStatus {
    pub finality_status: String,
    #[serde(default)]
    pub execution_status: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Fetch the status of a transaction.
pub async fn get_transaction_status(
    client: &reqwest::Client,
    url: &str,
    transaction_hash: Felt,
) -> Result<TransactionStatus, anyhow::Error> {
    json_rpc_call(
        client,
        url,
        "starknet_getTransactionStatus",
        vec![Value::String(to_hex(&transaction_hash))],
    )
    .await
}

/// Fetch the chain id of the node.
pub async fn get_chain_id(client: &reqwest::Client, url: &str) -> Result<Felt, anyhow::Error> {
    let chain_id: String = json_rpc_call(client, url, "starknet_chainId", vec![]).await?;
    crate::felt::parse_felt(&chain_id).map_err(|e| anyhow::anyhow!(e))
}

/// Check whether a class is declared, with `starknet_getClass` on the latest
/// block.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The Starknet RPC endpoint URL
/// * `class_hash` - The class hash to look up
///
/// # Returns
/// `false` when the node reports the class hash as unknown; any other RPC
/// failure is returned as an error.
pub async fn class_exists(
    client: &reqwest::Client,
    url: &str,
    class_hash: Felt,
) -> Result<bool, anyhow::Error> {
    let lookup = json_rpc_call::<Value>(
        client,
        url,
        "starknet_getClass",
        vec![Value::from("latest"), Value::String(to_hex(&class_hash))],
    )
    .await;

    match lookup {
        Ok(_) => Ok(true),
        Err(err) => match err.downcast_ref::<RpcError>() {
            Some(rpc_error) if rpc_error.code == CLASS_HASH_NOT_FOUND => Ok(false),
            _ => Err(err),
        },
    }
}

/// Poll `check_fn` until it yields a value or `ceiling` elapses.
///
/// Errors and `None` results are both treated as "not yet" and retried after
/// `interval`. Returns `None` on timeout.
pub async fn poll_until<T, F, Fut>(
    name: &str,
    ceiling: Duration,
    interval: Duration,
    check_fn: F,
) -> Option<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = tokio::time::Instant::now();

    loop {
        match check_fn().await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {
                tracing::trace!(
                    subject = %name,
                    elapsed = ?start.elapsed(),
                    "Not final yet, retrying..."
                );
            }
            Err(e) => {
                tracing::trace!(error = %e, subject = %name, "Status check failed, retrying...");
            }
        }

        if start.elapsed() + interval > ceiling {
            return None;
        }

        tokio::time::sleep(interval).await;
    }
}
