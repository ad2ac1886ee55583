//! Artifact retrieval for completed jobs.
//!
//! After a job completes, `GET /history/{prompt_id}` returns an execution
//! record whose `outputs` section maps node IDs to whatever each node
//! produced. Sink nodes list their files under `images`; this module
//! walks that section and downloads every listed artifact.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::api::{ComfyApi, ComfyApiError};

/// Identifies one server-side artifact for `GET /view`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Server storage class ("output", "temp", ...). Wire name: `type`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Errors raised while collecting a job's outputs.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// The history response has no record for the job (unknown ID, or
    /// the job has not finished).
    #[error("no execution record for job {0}")]
    MissingRecord(String),

    /// A node's `images` list did not deserialize into artifact refs.
    #[error("malformed artifact list for node {node_id}: {source}")]
    MalformedArtifacts {
        node_id: String,
        source: serde_json::Error,
    },

    /// An HTTP call failed. A single artifact failure aborts the whole
    /// collection; there is no partial result and no retry.
    #[error(transparent)]
    Api(#[from] ComfyApiError),
}

/// Downloads every artifact a completed job produced.
pub struct OutputCollector<'a> {
    api: &'a ComfyApi,
}

impl<'a> OutputCollector<'a> {
    pub fn new(api: &'a ComfyApi) -> Self {
        Self { api }
    }

    /// Fetch all artifacts for `job_id`, keyed by producing node ID.
    ///
    /// Every node present in the record's outputs section gets an entry;
    /// nodes that produced no artifacts map to an empty list rather than
    /// being omitted. Fail-fast: the first fetch error aborts everything.
    pub async fn collect(
        &self,
        job_id: &str,
    ) -> Result<HashMap<String, Vec<Vec<u8>>>, OutputError> {
        let refs = self.artifact_refs(job_id).await?;

        let mut collected = HashMap::new();
        for (node_id, artifacts) in refs {
            let mut payloads = Vec::with_capacity(artifacts.len());
            for artifact in &artifacts {
                tracing::debug!(
                    job_id,
                    node_id = %node_id,
                    filename = %artifact.filename,
                    "Fetching artifact",
                );
                payloads.push(self.api.fetch_artifact(artifact).await?);
            }
            collected.insert(node_id, payloads);
        }

        tracing::info!(
            job_id,
            nodes = collected.len(),
            artifacts = collected.values().map(Vec::len).sum::<usize>(),
            "Collected job outputs",
        );
        Ok(collected)
    }

    /// The job's artifact descriptors, keyed by producing node, without
    /// downloading anything.
    pub async fn artifact_refs(
        &self,
        job_id: &str,
    ) -> Result<HashMap<String, Vec<ArtifactRef>>, OutputError> {
        let history = self.api.get_history(job_id).await?;
        artifact_refs(job_id, &history)
    }
}

/// Pure half of the collection: extract per-node artifact descriptors
/// from a raw history response.
fn artifact_refs(
    job_id: &str,
    history: &Value,
) -> Result<HashMap<String, Vec<ArtifactRef>>, OutputError> {
    let outputs = history
        .get(job_id)
        .and_then(|record| record.get("outputs"))
        .and_then(Value::as_object)
        .ok_or_else(|| OutputError::MissingRecord(job_id.to_string()))?;

    let mut refs = HashMap::new();
    for (node_id, node_output) in outputs {
        let artifacts = match node_output.get("images") {
            Some(images) => serde_json::from_value(images.clone()).map_err(|source| {
                OutputError::MalformedArtifacts {
                    node_id: node_id.clone(),
                    source,
                }
            })?,
            None => Vec::new(),
        };
        refs.insert(node_id.clone(), artifacts);
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn history_fixture() -> Value {
        json!({
            "job-1": {
                "prompt": [],
                "outputs": {
                    "9": {
                        "images": [
                            { "filename": "run_00001_.png", "subfolder": "", "type": "output" },
                            { "filename": "run_00002_.png", "subfolder": "", "type": "output" },
                            { "filename": "run_00003_.png", "subfolder": "batch", "type": "output" }
                        ]
                    },
                    "12": {
                        "text": ["some non-image output"]
                    }
                },
                "status": { "completed": true }
            }
        })
    }

    #[test]
    fn every_output_node_gets_an_entry() {
        let refs = artifact_refs("job-1", &history_fixture()).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs["9"].len(), 3);
        assert!(refs["12"].is_empty());
    }

    #[test]
    fn artifact_fields_deserialize_including_type() {
        let refs = artifact_refs("job-1", &history_fixture()).unwrap();
        assert_eq!(
            refs["9"][2],
            ArtifactRef {
                filename: "run_00003_.png".into(),
                subfolder: "batch".into(),
                kind: "output".into(),
            }
        );
    }

    #[test]
    fn missing_record_is_an_error_not_empty() {
        let err = artifact_refs("job-unknown", &history_fixture()).unwrap_err();
        assert!(matches!(err, OutputError::MissingRecord(id) if id == "job-unknown"));
    }

    #[test]
    fn record_without_outputs_section_is_missing() {
        let history = json!({ "job-1": { "prompt": [] } });
        let err = artifact_refs("job-1", &history).unwrap_err();
        assert!(matches!(err, OutputError::MissingRecord(_)));
    }

    #[test]
    fn malformed_images_list_is_an_error() {
        let history = json!({
            "job-1": {
                "outputs": {
                    "9": { "images": [{ "no_filename": true }] }
                }
            }
        });
        let err = artifact_refs("job-1", &history).unwrap_err();
        assert!(matches!(err, OutputError::MalformedArtifacts { node_id, .. } if node_id == "9"));
    }

    #[test]
    fn subfolder_defaults_to_empty() {
        let history = json!({
            "job-1": {
                "outputs": {
                    "9": { "images": [{ "filename": "a.png", "type": "output" }] }
                }
            }
        });
        let refs = artifact_refs("job-1", &history).unwrap();
        assert_eq!(refs["9"][0].subfolder, "");
    }
}
