//! JSON-RPC ledger client
//!
//! Speaks the Sui full-node JSON-RPC dialect:
//! - `sui_executeTransactionBlock` for submission
//! - `sui_getTransactionBlock` for status
//! - `suix_getBalance` for balances (MIST, 9 decimals)
//!
//! Read queries retry transport failures with exponential backoff; error
//! objects returned by the node are final. Submission is never retried here;
//! the caller decides whether to execute again.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

use super::service::LedgerService;
use super::types::{LedgerStatus, LedgerTxStatus, SignedTransaction, SubmitReceipt};

/// Decimal places of the native coin
const MIST_SCALE: u32 = 9;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Ledger reached over HTTP JSON-RPC
pub struct RpcLedgerClient {
    /// HTTP client
    client: Client,
    /// Full-node endpoint
    rpc_url: Url,
    /// Network label for logs
    network: String,
    /// Per-request timeout
    timeout: Duration,
}

impl RpcLedgerClient {
    /// Create a client for `rpc_url`
    pub fn new(rpc_url: &str, network: &str, timeout: Duration) -> Result<Self> {
        let rpc_url = Url::parse(rpc_url)
            .map_err(|e| Error::Config(format!("Invalid ledger rpc_url {}: {}", rpc_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!("Ledger RPC client for {} at {}", network, rpc_url);

        Ok(Self {
            client,
            rpc_url,
            network: network.to_string(),
            timeout,
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Single JSON-RPC call
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        debug!("RPC {} -> {}", method, self.rpc_url);

        let response = self
            .client
            .post(self.rpc_url.clone())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        operation: method.to_string(),
                        ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    Error::Network(format!("{} request failed: {}", method, e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Network(format!("{} returned {}: {}", method, status, body)));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse {} response: {}", method, e)))?;

        into_result(method, body)
    }

    /// JSON-RPC call retried on transient failures
    async fn call_with_retry(&self, method: &str, params: Value) -> Result<Value> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(400),
            max_elapsed_time: Some(self.timeout),
            ..Default::default()
        };

        retry(backoff, || async {
            match self.call(method, params.clone()).await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!("Retryable ledger error: {}", e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }
}

#[async_trait]
impl LedgerService for RpcLedgerClient {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn submit(&self, transaction: &SignedTransaction) -> Result<SubmitReceipt> {
        let params = json!([
            STANDARD.encode(&transaction.transaction_bytes),
            [serialized_signature(transaction)?],
            { "showEffects": true },
            "WaitForLocalExecution",
        ]);

        let result = self
            .call("sui_executeTransactionBlock", params)
            .await
            .map_err(|e| match e {
                Error::Timeout { .. } => e,
                other => Error::Network(format!("Ledger rejected transaction: {}", other)),
            })?;

        let digest = result
            .get("digest")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Network("No digest in ledger response".to_string()))?;

        info!("Ledger {} accepted transaction {}", self.network, digest);
        Ok(SubmitReceipt {
            digest: digest.to_string(),
        })
    }

    async fn query_status(&self, digest: &str) -> Result<LedgerStatus> {
        let result = self
            .call_with_retry(
                "sui_getTransactionBlock",
                json!([digest, { "showEffects": true }]),
            )
            .await
            .map_err(|e| match e {
                Error::Rpc { message, .. } if is_not_found_message(&message) => {
                    Error::LedgerNotFound(digest.to_string())
                }
                other => other,
            })?;

        Ok(parse_status(result))
    }

    async fn balance(&self, address: &str) -> Result<Decimal> {
        let result = self
            .call_with_retry("suix_getBalance", json!([address]))
            .await?;
        parse_balance(&result)
    }
}

fn into_result(method: &str, body: RpcResponse) -> Result<Value> {
    if let Some(error) = body.error {
        debug!("{} failed ({}): {}", method, error.code, error.message);
        return Err(Error::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    body.result
        .ok_or_else(|| Error::Network(format!("{} returned no result", method)))
}

fn is_not_found_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("could not find") || lower.contains("not found")
}

/// Signature bytes followed by public key bytes, base64 encoded
fn serialized_signature(transaction: &SignedTransaction) -> Result<String> {
    let decode = |field: &str, value: &str| {
        hex::decode(value.strip_prefix("0x").unwrap_or(value))
            .map_err(|e| Error::Serialization(format!("Invalid {} hex: {}", field, e)))
    };

    let mut bytes = decode("signature", &transaction.signature)?;
    bytes.extend(decode("public key", &transaction.public_key)?);
    Ok(STANDARD.encode(bytes))
}

fn parse_status(result: Value) -> LedgerStatus {
    let status = match result
        .pointer("/effects/status/status")
        .and_then(Value::as_str)
    {
        Some("success") => LedgerTxStatus::Success,
        Some(_) => LedgerTxStatus::Failed,
        None => LedgerTxStatus::Pending,
    };

    let details = result.pointer("/effects/status").cloned();
    LedgerStatus { status, details }
}

fn parse_balance(result: &Value) -> Result<Decimal> {
    let raw = result
        .get("totalBalance")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Serialization("No totalBalance in balance response".to_string()))?;

    let mist: i128 = raw
        .parse()
        .map_err(|e| Error::Serialization(format!("Invalid totalBalance {}: {}", raw, e)))?;

    Decimal::try_from_i128_with_scale(mist, MIST_SCALE)
        .map_err(|e| Error::Serialization(format!("Balance out of range: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_invalid_url_is_config_error() {
        let result = RpcLedgerClient::new("not a url", "testnet", Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rpc_error_is_final() {
        let body: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "Could not find the referenced transaction" }
        }))
        .unwrap();

        match into_result("sui_getTransactionBlock", body) {
            Err(e @ Error::Rpc { .. }) => {
                assert!(!e.is_retryable());
                if let Error::Rpc { code, message } = e {
                    assert_eq!(code, -32602);
                    assert!(is_not_found_message(&message));
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    /// Minimal HTTP server answering every request with `status` and `body`
    async fn stub_node(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    if read_request(&mut socket).await.is_err() {
                        return;
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}", addr), requests)
    }

    /// Read headers and a Content-Length body
    async fn read_request(socket: &mut TcpStream) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return Ok(());
                }
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_digest_is_not_retried() {
        let (url, requests) = stub_node(
            "200 OK",
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Could not find the referenced transaction [TransactionDigest(abc)]."}}"#,
        )
        .await;
        let client = RpcLedgerClient::new(&url, "localnet", Duration::from_secs(3)).unwrap();

        let started = Instant::now();
        let result = client.query_status("abc").await;

        assert!(matches!(result, Err(Error::LedgerNotFound(_))));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let (url, requests) = stub_node("503 Service Unavailable", "{}").await;
        let client = RpcLedgerClient::new(&url, "localnet", Duration::from_secs(1)).unwrap();

        let result = client.balance("0xabc").await;

        assert!(matches!(result, Err(Error::Network(_))));
        assert!(requests.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_balance_over_http() {
        let (url, requests) = stub_node(
            "200 OK",
            r#"{"jsonrpc":"2.0","id":1,"result":{"coinType":"0x2::sui::SUI","totalBalance":"2500000000"}}"#,
        )
        .await;
        let client = RpcLedgerClient::new(&url, "localnet", Duration::from_secs(3)).unwrap();

        assert_eq!(client.balance("0xabc").await.unwrap(), Decimal::new(25, 1));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_status() {
        let ok = parse_status(json!({ "effects": { "status": { "status": "success" } } }));
        assert_eq!(ok.status, LedgerTxStatus::Success);

        let failed = parse_status(json!({
            "effects": { "status": { "status": "failure", "error": "InsufficientGas" } }
        }));
        assert_eq!(failed.status, LedgerTxStatus::Failed);
        assert_eq!(failed.details.unwrap()["error"], "InsufficientGas");

        assert_eq!(parse_status(json!({})).status, LedgerTxStatus::Pending);
    }

    #[test]
    fn test_parse_balance_scales_mist() {
        let balance = parse_balance(&json!({ "totalBalance": "1500000000" })).unwrap();
        assert_eq!(balance, Decimal::new(15, 1));
        assert!(parse_balance(&json!({ "totalBalance": "abc" })).is_err());
        assert!(parse_balance(&json!({})).is_err());
    }

    #[test]
    fn test_serialized_signature() {
        let tx = SignedTransaction {
            transaction_bytes: vec![],
            signature: "0x0102".to_string(),
            public_key: "0x03".to_string(),
        };
        assert_eq!(serialized_signature(&tx).unwrap(), STANDARD.encode([1u8, 2, 3]));

        let bad = SignedTransaction {
            signature: "0xzz".to_string(),
            ..tx
        };
        assert!(serialized_signature(&bad).is_err());
    }
}
