//! Minimal JSON-RPC 2.0 transport shared by the bitcoind and rootstock clients.

use super::RpcError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Clone)]
struct BasicAuth {
    user: String,
    password: String,
}

pub struct JsonRpcClient {
    http_client: reqwest::Client,
    url: Url,
    auth: Option<BasicAuth>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: Url) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url,
            auth: None,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(BasicAuth {
            user: user.into(),
            password: password.into(),
        });
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Calls `method` and decodes the `result` member into `T`.
    ///
    /// Bitcoind answers RPC errors with a non-2xx status and a JSON body, so
    /// the body is parsed before the status is looked at.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut request = self.http_client.post(self.url.clone()).json(&body);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.user, Some(&auth.password));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let decoded: RpcResponse = match serde_json::from_str(&text) {
            Ok(decoded) => decoded,
            Err(_) if !status.is_success() => {
                return Err(RpcError::Decode(format!("{method}: HTTP {status}: {text}")));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(error) = decoded.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }

        let result = decoded.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }
}

/// Parses a `0x`-prefixed quantity.
pub fn parse_hex_u64(value: &str) -> Result<u64, RpcError> {
    let digits = value.trim_start_matches("0x");
    u64::from_str_radix(digits, 16).map_err(|e| RpcError::Decode(format!("{value}: {e}")))
}

pub fn parse_hex_u128(value: &str) -> Result<u128, RpcError> {
    let digits = value.trim_start_matches("0x");
    u128::from_str_radix(digits, 16).map_err(|e| RpcError::Decode(format!("{value}: {e}")))
}
