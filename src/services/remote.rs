//! BOM explorer backed by a peer instance reachable over JSON-RPC.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::config::RemotePeerConfig;
use crate::errors::ServiceError;
use crate::services::importer::{BomExplorer, ExplodedBom};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    message: String,
}

impl RpcError {
    fn describe(&self) -> String {
        match &self.data {
            Some(data) if !data.message.is_empty() => {
                format!("{}: {}", self.message, data.message)
            }
            _ => self.message.clone(),
        }
    }
}

/// Explores BOMs on a peer instance of the host platform.
///
/// Authenticates once per explorer and reuses the returned user id.
pub struct RemotePeerExplorer {
    client: Client,
    endpoint: String,
    database: String,
    user: String,
    password: String,
    uid: OnceCell<i64>,
    request_id: AtomicU64,
}

impl RemotePeerExplorer {
    /// Builds an explorer from the peer settings. Returns `None` when the
    /// settings are incomplete, which disables remote import.
    pub fn from_config(config: &RemotePeerConfig) -> Result<Option<Self>, ServiceError> {
        if !config.is_complete() {
            return Ok(None);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &RemotePeerConfig) -> Option<Self> {
        Some(Self {
            client,
            endpoint: format!("{}/jsonrpc", config.url.as_deref()?.trim_end_matches('/')),
            database: config.database.clone()?,
            user: config.user.clone()?,
            password: config.password.clone()?,
            uid: OnceCell::new(),
            request_id: AtomicU64::new(0),
        })
    }

    async fn call(&self, service: &str, method: &str, args: Value) -> Result<Value, ServiceError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": id,
        });

        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "Peer answered {} to {}.{}",
                response.status(),
                service,
                method
            )));
        }

        let body: RpcResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(ServiceError::ExternalServiceError(format!(
                "Peer rejected {}.{}: {}",
                service,
                method,
                error.describe()
            )));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    async fn uid(&self) -> Result<i64, ServiceError> {
        self.uid
            .get_or_try_init(|| async {
                let result = self
                    .call(
                        "common",
                        "login",
                        json!([self.database, self.user, self.password]),
                    )
                    .await?;
                let uid = result.as_i64().ok_or_else(|| {
                    ServiceError::ExternalServiceError(format!(
                        "Authentication as {} on {} failed",
                        self.user, self.database
                    ))
                })?;
                info!(uid, database = %self.database, "authenticated against peer");
                Ok::<_, ServiceError>(uid)
            })
            .await
            .copied()
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Value,
    ) -> Result<Value, ServiceError> {
        let uid = self.uid().await?;
        self.call(
            "object",
            "execute_kw",
            json!([self.database, uid, self.password, model, method, args]),
        )
        .await
    }

    async fn search(&self, model: &str, domain: Value) -> Result<Vec<i64>, ServiceError> {
        let result = self.execute_kw(model, "search", json!([domain])).await?;
        decode(result, model, "search")
    }
}

/// Peer replies are untrusted; a shape we cannot read counts as a failed
/// peer call.
fn decode<T: DeserializeOwned>(value: Value, model: &str, method: &str) -> Result<T, ServiceError> {
    serde_json::from_value(value).map_err(|err| {
        ServiceError::ExternalServiceError(format!(
            "Unexpected reply from {}.{}: {}",
            model, method, err
        ))
    })
}

#[async_trait]
impl BomExplorer for RemotePeerExplorer {
    #[instrument(skip(self))]
    async fn resolve_products(&self, code: &str) -> Result<Vec<i64>, ServiceError> {
        let products = self
            .search("product.product", json!([["default_code", "=", code]]))
            .await?;
        if !products.is_empty() {
            return Ok(products);
        }

        let templates = self
            .search("product.template", json!([["default_code", "=", code]]))
            .await?;
        if templates.is_empty() {
            debug!("no peer product or template carries this reference");
            return Ok(Vec::new());
        }
        let variants = self
            .search("product.product", json!([["product_tmpl_id", "in", templates]]))
            .await?;
        Ok(variants.into_iter().collect::<BTreeSet<_>>().into_iter().collect())
    }

    #[instrument(skip(self))]
    async fn explore(
        &self,
        product_id: i64,
        bulk_qty: Decimal,
    ) -> Result<ExplodedBom, ServiceError> {
        let bulk = bulk_qty.to_f64().ok_or_else(|| {
            ServiceError::InvalidInput(format!("Bulk quantity {} is out of range", bulk_qty))
        })?;
        let result = self
            .execute_kw(
                "product.product",
                "get_explored_bom",
                json!([[product_id], bulk]),
            )
            .await?;
        match result {
            Value::Null | Value::Bool(false) => Ok(ExplodedBom::new()),
            value => decode(value, "product.product", "get_explored_bom"),
        }
    }

    fn is_remote(&self) -> bool {
        true
    }
}
