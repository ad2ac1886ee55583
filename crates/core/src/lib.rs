//! Workflow document model and parameter stamping.
//!
//! A ComfyUI workflow is a JSON object mapping node IDs to typed node
//! records. This crate loads such documents, resolves semantic roles
//! (sampler, text encoder, image loader, sink) to concrete node IDs,
//! and stamps per-request parameters into the graph before submission.

pub mod roles;
pub mod stamp;
pub mod workflow;

pub use roles::{Role, RoleTable};
pub use stamp::{stamp, StampError, StampParams};
pub use workflow::{WorkflowError, WorkflowGraph};
