//! ComfyUI job submission and completion tracking.
//!
//! One [`channel::JobChannel`] owns the persistent WebSocket to a single
//! ComfyUI server: workflows are submitted over HTTP (`POST /prompt`),
//! completion is observed by filtering the shared event stream, and
//! produced artifacts are pulled afterwards via [`outputs::OutputCollector`].

pub mod api;
pub mod channel;
pub mod messages;
pub mod outputs;

pub use api::{ComfyApi, ComfyApiError, SubmitResponse};
pub use channel::{JobChannel, JobChannelError};
pub use messages::{parse_event, ServerEvent};
pub use outputs::{ArtifactRef, OutputCollector, OutputError};
