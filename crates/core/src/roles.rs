//! Semantic node roles and the role -> class-type table.
//!
//! ComfyUI's node vocabulary is open: the server defines which
//! `class_type` values exist and new custom nodes appear without notice.
//! Stamping therefore never matches class types directly -- it resolves a
//! [`Role`] through a [`RoleTable`], which is plain data and can be
//! extended for new node types without touching the stamping pass.

use std::collections::HashMap;

use crate::workflow::WorkflowGraph;

/// A semantic purpose a workflow node can fulfil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Prompt text encoder (positive or negative; disambiguated by
    /// document order, see [`crate::stamp`]).
    TextEncoder,
    /// Source-image loader.
    ImageLoader,
    /// Image or multi-frame video sink.
    ImageSink,
    /// Sampling node (steps, seed).
    Sampler,
}

/// Input field that carries the prompt text on a default text encoder.
pub const DEFAULT_PROMPT_FIELD: &str = "text";

/// Input field for the source image on a loader node.
pub const IMAGE_FIELD: &str = "image";

/// Input field for the output filename prefix on a sink node.
pub const FILENAME_PREFIX_FIELD: &str = "filename_prefix";

/// Input field for the step count on a sampler node.
pub const STEPS_FIELD: &str = "steps";

/// Input field for the seed on a sampler node.
pub const SEED_FIELD: &str = "seed";

/// Maps roles to the class types that fulfil them, plus per-class
/// overrides for the prompt-carrying field name.
///
/// [`RoleTable::default`] covers the stock node types this tool is used
/// with; callers targeting servers with custom nodes extend it via
/// [`add_class_type`](Self::add_class_type) and
/// [`set_prompt_field`](Self::set_prompt_field).
#[derive(Debug, Clone)]
pub struct RoleTable {
    classes: HashMap<Role, Vec<String>>,
    prompt_fields: HashMap<String, String>,
}

impl Default for RoleTable {
    fn default() -> Self {
        let mut classes = HashMap::new();
        classes.insert(
            Role::TextEncoder,
            vec!["CLIPTextEncode".into(), "TextEncodeQwenImageEdit".into()],
        );
        classes.insert(Role::ImageLoader, vec!["LoadImage".into()]);
        classes.insert(
            Role::ImageSink,
            vec!["SaveImage".into(), "VHS_VideoCombine".into()],
        );
        classes.insert(
            Role::Sampler,
            vec!["KSampler".into(), "KSamplerAdvanced".into()],
        );

        // Most encoders take their text under "text"; the Qwen edit node
        // uses "prompt" instead.
        let mut prompt_fields = HashMap::new();
        prompt_fields.insert("TextEncodeQwenImageEdit".into(), "prompt".into());

        Self {
            classes,
            prompt_fields,
        }
    }
}

impl RoleTable {
    /// Class types currently registered for `role`.
    pub fn class_types(&self, role: Role) -> &[String] {
        self.classes.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Register an additional class type under `role`.
    pub fn add_class_type(&mut self, role: Role, class_type: impl Into<String>) {
        self.classes.entry(role).or_default().push(class_type.into());
    }

    /// Override the prompt-carrying input field for one encoder class.
    pub fn set_prompt_field(&mut self, class_type: impl Into<String>, field: impl Into<String>) {
        self.prompt_fields.insert(class_type.into(), field.into());
    }

    /// The input field carrying prompt text for `class_type`.
    pub fn prompt_field(&self, class_type: &str) -> &str {
        self.prompt_fields
            .get(class_type)
            .map(String::as_str)
            .unwrap_or(DEFAULT_PROMPT_FIELD)
    }

    /// All node IDs in `graph` fulfilling `role`, in document order.
    pub fn find(&self, graph: &WorkflowGraph, role: Role) -> Vec<String> {
        let class_types: Vec<&str> = self.class_types(role).iter().map(String::as_str).collect();
        graph.find_nodes(&class_types)
    }
}
