//! HTTP wrappers for the ComfyUI REST surface.
//!
//! Three endpoints are consumed: `POST /prompt` (job submission),
//! `GET /history/{prompt_id}` (execution record after completion), and
//! `GET /view` (raw artifact bytes). All failures surface immediately;
//! nothing here retries.

use serde::Deserialize;

use crate::outputs::ArtifactRef;

/// HTTP client for one ComfyUI server.
pub struct ComfyApi {
    client: reqwest::Client,
    base_url: String,
}

/// Response body of a successful `POST /prompt`.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned job identifier.
    pub prompt_id: String,
    /// Position in the server's execution queue.
    #[serde(default)]
    pub number: i64,
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyApiError {
    /// The request itself failed (connection refused, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server declined the submitted workflow.
    #[error("submission rejected by server ({status}): {body}")]
    SubmissionRejected { status: u16, body: String },

    /// The history lookup returned a non-success status.
    #[error("history request failed ({status}): {body}")]
    HistoryFailed { status: u16, body: String },

    /// One artifact download returned a non-success status.
    #[error("artifact fetch failed for '{filename}' ({status})")]
    ArtifactFetchFailed { filename: String, status: u16 },
}

impl ComfyApi {
    /// Create a client for the server at `server_address` (`host:port`).
    pub fn new(server_address: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{server_address}"),
        }
    }

    /// Queue a workflow for execution on behalf of `client_id`.
    ///
    /// The client ID ties the submission to the WebSocket session that
    /// will observe its progress events.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ComfyApiError::SubmissionRejected {
                status: status.as_u16(),
                body: read_body(response).await,
            });
        }
        Ok(response.json().await?)
    }

    /// Fetch the execution record for a completed prompt.
    ///
    /// The returned JSON is keyed by prompt ID; each entry holds the
    /// per-node `outputs` section.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyApiError> {
        let response = self
            .client
            .get(format!("{}/history/{prompt_id}", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ComfyApiError::HistoryFailed {
                status: status.as_u16(),
                body: read_body(response).await,
            });
        }
        Ok(response.json().await?)
    }

    /// Download one artifact's raw bytes.
    pub async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ComfyApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.base_url))
            .query(&[
                ("filename", artifact.filename.as_str()),
                ("subfolder", artifact.subfolder.as_str()),
                ("type", artifact.kind.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ComfyApiError::ArtifactFetchFailed {
                filename: artifact.filename.clone(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

async fn read_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string())
}
