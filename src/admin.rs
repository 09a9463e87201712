//! Client for the node's admin API.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

pub trait AdminClient {
    /// Ask the node to pick up newly installed VM binaries.
    fn load_vms(&self) -> Result<()>;

    /// Ask the node to track `subnet_id`.
    fn whitelist_subnet(&self, subnet_id: &str) -> Result<()>;
}

/// JSON-RPC 2.0 over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAdminClient {
    endpoint: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl HttpAdminClient {
    /// `endpoint` may omit the scheme, e.g. `127.0.0.1:9650/ext/admin`.
    pub fn new(endpoint: &str) -> Self {
        let endpoint = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };
        Self {
            endpoint,
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn call(&self, method: &str, params: Value) -> Result<()> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        tracing::debug!(endpoint = %self.endpoint, method, "admin API call");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|source| {
                if source.is_connect() {
                    Error::AdminUnreachable {
                        endpoint: self.endpoint.clone(),
                        reason: source.to_string(),
                    }
                } else {
                    Error::AdminApi {
                        method: method.to_string(),
                        message: source.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let parsed: RpcResponse = response.json().map_err(|e| Error::AdminApi {
            method: method.to_string(),
            message: format!("HTTP {status}: {e}"),
        })?;
        if let Some(err) = parsed.error {
            return Err(Error::AdminApi {
                method: method.to_string(),
                message: format!("{} (code {})", err.message, err.code),
            });
        }
        if !status.is_success() {
            return Err(Error::AdminApi {
                method: method.to_string(),
                message: format!("HTTP {status}"),
            });
        }
        Ok(())
    }
}

impl AdminClient for HttpAdminClient {
    fn load_vms(&self) -> Result<()> {
        self.call("admin.loadVMs", json!({}))
    }

    fn whitelist_subnet(&self, subnet_id: &str) -> Result<()> {
        self.call("admin.whitelistSubnet", json!({ "subnetID": subnet_id }))
    }
}
