//! Per-request parameter stamping.
//!
//! [`stamp`] takes a loaded [`WorkflowGraph`] and writes one request's
//! parameters (prompts, source image, output prefix, sampler settings)
//! into the nodes that fulfil the matching roles. It is a pure
//! field-mutation pass: nodes are never added or removed, and fields not
//! named here are left untouched.
//!
//! When a role resolves to several nodes the same value is written to all
//! of them. Text encoders are the exception: the first encoder in
//! document order receives the positive prompt and every later encoder
//! receives the negative prompt. (The tool this replaces wrote the
//! positive prompt into both; that was a bug and is deliberately not
//! reproduced.)

use rand::Rng;
use serde_json::json;

use crate::roles::{Role, RoleTable, FILENAME_PREFIX_FIELD, IMAGE_FIELD, SEED_FIELD, STEPS_FIELD};
use crate::workflow::{WorkflowError, WorkflowGraph};

/// Parameters stamped into a workflow for one submission.
///
/// Every field is optional; `None` means "leave the document's value
/// alone". The seed is special: when `seed` is `None` and the graph has a
/// sampler, a fresh random seed is generated and written anyway, so two
/// otherwise-identical submissions do not silently reuse the document's
/// baked-in seed.
#[derive(Debug, Clone, Default)]
pub struct StampParams {
    /// Positive prompt text (first text encoder in document order).
    pub positive_prompt: Option<String>,
    /// Negative prompt text (all remaining text encoders).
    pub negative_prompt: Option<String>,
    /// Source image path/name written into every image-loader node.
    pub source_image: Option<String>,
    /// Filename prefix written into every image/video sink node.
    pub output_prefix: Option<String>,
    /// Sampler step count.
    pub steps: Option<u32>,
    /// Explicit sampler seed. `None` draws a fresh random seed.
    pub seed: Option<u64>,
}

/// Errors raised by a stamping pass.
#[derive(Debug, thiserror::Error)]
pub enum StampError {
    /// A parameter that requires a role was supplied, but no node in the
    /// graph fulfils that role.
    #[error("no node fulfilling role {role:?} in the workflow")]
    RoleNotFound { role: Role },

    /// An underlying graph mutation failed.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Stamp `params` into `graph`, resolving roles through `table`.
///
/// Consumes the graph and returns the stamped version; clone beforehand
/// if the original document must survive for further submissions.
///
/// Roles with zero matches are skipped, except the image loader: asking
/// to stamp a source image into a graph with no loader node is a caller
/// error and fails with [`StampError::RoleNotFound`].
pub fn stamp(
    mut graph: WorkflowGraph,
    params: &StampParams,
    table: &RoleTable,
) -> Result<WorkflowGraph, StampError> {
    let encoders = table.find(&graph, Role::TextEncoder);

    if let Some(prompt) = non_empty(&params.positive_prompt) {
        if let Some(node_id) = encoders.first() {
            let field = prompt_field_for(&graph, table, node_id);
            graph.set_input(node_id, &field, json!(prompt))?;
        } else {
            tracing::debug!("no text encoder in workflow, skipping positive prompt");
        }
    }

    if let Some(prompt) = non_empty(&params.negative_prompt) {
        if encoders.len() > 1 {
            for node_id in &encoders[1..] {
                let field = prompt_field_for(&graph, table, node_id);
                graph.set_input(node_id, &field, json!(prompt))?;
            }
        } else {
            tracing::debug!("no negative text encoder in workflow, skipping negative prompt");
        }
    }

    if let Some(image) = non_empty(&params.source_image) {
        let loaders = table.find(&graph, Role::ImageLoader);
        if loaders.is_empty() {
            return Err(StampError::RoleNotFound {
                role: Role::ImageLoader,
            });
        }
        for node_id in &loaders {
            graph.set_input(node_id, IMAGE_FIELD, json!(image))?;
        }
    }

    if let Some(prefix) = non_empty(&params.output_prefix) {
        for node_id in &table.find(&graph, Role::ImageSink) {
            graph.set_input(node_id, FILENAME_PREFIX_FIELD, json!(prefix))?;
        }
    }

    let samplers = table.find(&graph, Role::Sampler);

    if let Some(steps) = params.steps {
        for node_id in &samplers {
            graph.set_input(node_id, STEPS_FIELD, json!(steps))?;
        }
    }

    if !samplers.is_empty() {
        let seed = params.seed.unwrap_or_else(fresh_seed);
        for node_id in &samplers {
            graph.set_input(node_id, SEED_FIELD, json!(seed))?;
        }
    }

    Ok(graph)
}

/// Draw a fresh 32-bit seed from the thread-local CSPRNG.
fn fresh_seed() -> u64 {
    u64::from(rand::rng().random::<u32>())
}

fn prompt_field_for(graph: &WorkflowGraph, table: &RoleTable, node_id: &str) -> String {
    let class_type = graph.class_type(node_id).unwrap_or_default();
    table.prompt_field(class_type).to_string()
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}
