//! ComfyUI workflow document model.
//!
//! The expected format is an object where each key is a node ID and each
//! value is an object with `class_type` and `inputs` fields:
//!
//! ```json
//! {
//!   "3": {
//!     "class_type": "KSampler",
//!     "inputs": { "seed": 42, "steps": 20, "model": ["1", 0] }
//!   }
//! }
//! ```
//!
//! Input values are either literals or `[node_id, output_slot]` references
//! to another node. The document is kept as raw JSON so that every field
//! this crate does not touch round-trips unchanged, in original node order
//! (`serde_json` is built with `preserve_order`).

use std::path::Path;

use serde_json::{Map, Value};

/// Errors raised while loading or mutating a workflow document.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The document could not be read from disk.
    #[error("failed to read workflow document: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not a valid workflow (bad JSON, wrong shape, or a
    /// node missing `class_type`/`inputs`).
    #[error("malformed workflow document: {0}")]
    MalformedDocument(String),

    /// A mutation referenced a node ID that is not in the graph.
    #[error("unknown node '{0}'")]
    UnknownNode(String),
}

/// An in-memory workflow document: an ordered map from node ID to node
/// record.
///
/// Node records keep their raw JSON representation. Cross-node references
/// are plain ID lookups into this map, never owning pointers. The graph is
/// loaded once per session; clone it explicitly before each stamping pass
/// if the original must stay pristine.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    nodes: Map<String, Value>,
}

impl WorkflowGraph {
    /// Load a workflow document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| WorkflowError::MalformedDocument(e.to_string()))?;
        Self::from_value(value)
    }

    /// Build a graph from already-parsed JSON, validating its shape.
    ///
    /// Every node must be an object carrying a string `class_type` and an
    /// object `inputs`. The values themselves are not validated further:
    /// the server owns the node vocabulary and field semantics.
    pub fn from_value(value: Value) -> Result<Self, WorkflowError> {
        let nodes = match value {
            Value::Object(map) => map,
            other => {
                return Err(WorkflowError::MalformedDocument(format!(
                    "workflow must be a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        if nodes.is_empty() {
            return Err(WorkflowError::MalformedDocument(
                "workflow must contain at least one node".into(),
            ));
        }

        for (node_id, record) in &nodes {
            let obj = record.as_object().ok_or_else(|| {
                WorkflowError::MalformedDocument(format!("node '{node_id}' is not an object"))
            })?;
            match obj.get("class_type") {
                Some(Value::String(_)) => {}
                _ => {
                    return Err(WorkflowError::MalformedDocument(format!(
                        "node '{node_id}' is missing a string 'class_type' field"
                    )))
                }
            }
            match obj.get("inputs") {
                Some(Value::Object(_)) => {}
                _ => {
                    return Err(WorkflowError::MalformedDocument(format!(
                        "node '{node_id}' is missing an object 'inputs' field"
                    )))
                }
            }
        }

        Ok(Self { nodes })
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node IDs in document order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// The `class_type` of a node, if the node exists.
    pub fn class_type(&self, node_id: &str) -> Option<&str> {
        self.nodes
            .get(node_id)
            .and_then(|n| n.get("class_type"))
            .and_then(Value::as_str)
    }

    /// All node IDs whose `class_type` is one of `class_types`, in
    /// document order.
    ///
    /// Zero, one, and many matches are all valid outcomes; callers decide
    /// what each cardinality means for them.
    pub fn find_nodes(&self, class_types: &[&str]) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, record)| {
                record
                    .get("class_type")
                    .and_then(Value::as_str)
                    .is_some_and(|ct| class_types.contains(&ct))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Overwrite one input field on a node.
    ///
    /// The write is unconditional and the field name is not checked
    /// against the node's `class_type` -- the server is the source of
    /// truth for which fields a node accepts.
    pub fn set_input(
        &mut self,
        node_id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), WorkflowError> {
        let record = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| WorkflowError::UnknownNode(node_id.to_string()))?;
        let inputs = record
            .get_mut("inputs")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                WorkflowError::MalformedDocument(format!("node '{node_id}' has no inputs object"))
            })?;
        inputs.insert(field.to_string(), value);
        Ok(())
    }

    /// Read one input field on a node.
    pub fn get_input(&self, node_id: &str, field: &str) -> Option<&Value> {
        self.nodes
            .get(node_id)?
            .get("inputs")?
            .as_object()?
            .get(field)
    }

    /// The full document as JSON, suitable as a `/prompt` payload.
    pub fn to_value(&self) -> Value {
        Value::Object(self.nodes.clone())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
