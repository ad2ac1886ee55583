//! Typed ComfyUI WebSocket events.
//!
//! Text frames on the `/ws` socket carry JSON of the shape
//! `{"type": "<kind>", "data": {...}}`. [`parse_event`] turns them into a
//! [`ServerEvent`]. The socket is shared: it interleaves events for every
//! client and every queued prompt, so most events a consumer sees are not
//! for its job and must be skipped, not treated as errors. Unknown `type`
//! values parse as `Err` for the same reason -- skip and move on.

use serde::Deserialize;

/// A ComfyUI server event, tagged by its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Periodic queue status broadcast.
    #[serde(rename = "status")]
    Status(StatusData),

    /// A prompt left the queue and began executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(ExecutionStartData),

    /// Nodes skipped because their outputs were cached.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A node started executing; `node: null` signals the whole prompt
    /// finished.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step-level progress inside a long-running node.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Execution aborted with an error.
    #[serde(rename = "execution_error")]
    ExecutionError(ExecutionErrorData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStartData {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Payload of `executing` events. `node == None` means the prompt
/// identified by `prompt_id` has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: i64,
    pub max: i64,
    /// Present on newer servers; older ones omit it.
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    pub prompt_id: String,
    /// Raw per-node output (artifact descriptors and friends).
    pub output: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionErrorData {
    pub prompt_id: String,
    pub node_id: String,
    pub exception_type: String,
    pub exception_message: String,
}

impl ServerEvent {
    /// Whether this event marks the completion of `job_id`.
    ///
    /// Only an `executing` event with a null node and a matching prompt
    /// ID qualifies; intermediate node notifications and other jobs'
    /// events do not.
    pub fn completes(&self, job_id: &str) -> bool {
        matches!(
            self,
            ServerEvent::Executing(ExecutingData {
                node: None,
                prompt_id,
            }) if prompt_id == job_id
        )
    }
}

/// Parse one WebSocket text frame into a [`ServerEvent`].
///
/// Malformed JSON and unrecognized `type` values are an `Err`; consumers
/// of the shared socket skip those frames.
pub fn parse_event(text: &str) -> Result<ServerEvent, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executing_with_node_is_intermediate() {
        let event =
            parse_event(r#"{"type":"executing","data":{"node":"3","prompt_id":"p-1"}}"#).unwrap();
        match &event {
            ServerEvent::Executing(data) => {
                assert_eq!(data.node.as_deref(), Some("3"));
                assert_eq!(data.prompt_id, "p-1");
            }
            other => panic!("expected Executing, got {other:?}"),
        }
        assert!(!event.completes("p-1"));
    }

    #[test]
    fn executing_with_null_node_completes_matching_job() {
        let event =
            parse_event(r#"{"type":"executing","data":{"node":null,"prompt_id":"p-1"}}"#).unwrap();
        assert!(event.completes("p-1"));
    }

    #[test]
    fn completion_of_another_job_does_not_match() {
        let event =
            parse_event(r#"{"type":"executing","data":{"node":null,"prompt_id":"p-2"}}"#).unwrap();
        assert!(!event.completes("p-1"));
    }

    #[test]
    fn non_executing_events_never_complete() {
        let event =
            parse_event(r#"{"type":"execution_start","data":{"prompt_id":"p-1"}}"#).unwrap();
        assert!(!event.completes("p-1"));
    }

    #[test]
    fn status_event_carries_queue_depth() {
        let event = parse_event(
            r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":2}}}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::Status(data) => assert_eq!(data.status.exec_info.queue_remaining, 2),
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn progress_without_prompt_id_still_parses() {
        let event = parse_event(r#"{"type":"progress","data":{"value":4,"max":20}}"#).unwrap();
        match event {
            ServerEvent::Progress(data) => {
                assert_eq!(data.value, 4);
                assert_eq!(data.max, 20);
                assert!(data.prompt_id.is_none());
            }
            other => panic!("expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn executed_event_keeps_raw_output() {
        let event = parse_event(
            r#"{"type":"executed","data":{"node":"9","prompt_id":"p","output":{"images":[{"filename":"a.png","subfolder":"","type":"output"}]}}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::Executed(data) => {
                assert_eq!(data.node, "9");
                assert!(data.output.get("images").is_some());
            }
            other => panic!("expected Executed, got {other:?}"),
        }
    }

    #[test]
    fn execution_error_event_parses() {
        let event = parse_event(
            r#"{"type":"execution_error","data":{"prompt_id":"p","node_id":"3","exception_type":"OOM","exception_message":"out of memory"}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::ExecutionError(data) => {
                assert_eq!(data.node_id, "3");
                assert_eq!(data.exception_message, "out of memory");
            }
            other => panic!("expected ExecutionError, got {other:?}"),
        }
    }

    #[test]
    fn cached_event_defaults_to_no_nodes() {
        let event =
            parse_event(r#"{"type":"execution_cached","data":{"prompt_id":"p"}}"#).unwrap();
        match event {
            ServerEvent::ExecutionCached(data) => assert!(data.nodes.is_empty()),
            other => panic!("expected ExecutionCached, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_err() {
        assert!(parse_event(r#"{"type":"crystools.monitor","data":{}}"#).is_err());
    }

    #[test]
    fn garbage_is_err() {
        assert!(parse_event("definitely not json").is_err());
    }
}
