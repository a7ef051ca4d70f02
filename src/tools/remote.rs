//! Client for the out-of-process tool service
//!
//! `GET {base}/tools` lists tools; `POST {base}/tools/{name}` with
//! `{"args": ...}` executes one and answers `{"content": ..., "is_error": bool}`.

use super::{ToolError, ToolOutput};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const CALL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Tool metadata advertised by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

#[derive(Debug, Deserialize)]
struct RemoteCallResponse {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    is_error: bool,
}

#[derive(Debug, Clone)]
pub struct RemoteToolService {
    client: Client,
    base_url: Arc<str>,
}

impl RemoteToolService {
    pub fn new(base_url: &str) -> Result<Self, ToolError> {
        let client = Client::builder()
            .connect_timeout(LIST_TIMEOUT)
            .build()
            .map_err(|e| ToolError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_tools(&self) -> Result<Vec<RemoteToolSpec>, ToolError> {
        let url = format!("{}/tools", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ToolError::Unavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Unavailable(format!("{url}: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| ToolError::Unavailable(format!("{url}: invalid tool listing: {e}")))
    }

    pub fn tool(&self, spec: RemoteToolSpec) -> RemoteTool {
        RemoteTool {
            service: self.clone(),
            spec,
        }
    }

    async fn call(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        let url = format!("{}/tools/{name}", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(CALL_TIMEOUT)
            .json(&json!({ "args": args }))
            .send()
            .await
            .map_err(|e| ToolError::Unavailable(format!("{name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Failed(format!("{name}: HTTP {status}: {body}")));
        }

        let parsed: RemoteCallResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("{name}: invalid response: {e}")))?;

        Ok(ToolOutput::json(parsed.content, !parsed.is_error))
    }
}

/// A remote tool bound to its service
#[derive(Debug, Clone)]
pub struct RemoteTool {
    service: RemoteToolService,
    pub spec: RemoteToolSpec,
}

impl RemoteTool {
    /// Execute remotely; cancellation drops the in-flight request.
    pub async fn call(&self, args: Value, cancel: &CancellationToken) -> Result<ToolOutput, ToolError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(tool = %self.spec.name, "Remote tool call cancelled");
                Err(ToolError::Interrupted)
            }
            result = self.service.call(&self.spec.name, args) => result,
        }
    }
}
