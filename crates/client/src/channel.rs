//! Persistent session to one ComfyUI server.
//!
//! [`JobChannel`] owns the single WebSocket this client reads progress
//! events from, plus the HTTP side used for submission. Usage is strictly
//! sequential: connect once, then submit -> await -> (collect) one job at
//! a time. Exclusive ownership of the socket (`await_completion` takes
//! `&mut self`) is what upholds the single-awaiter discipline -- no locks
//! are needed.

use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use stencil_core::WorkflowGraph;

use crate::api::{ComfyApi, ComfyApiError};
use crate::messages::{parse_event, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Errors from the session layer.
#[derive(Debug, thiserror::Error)]
pub enum JobChannelError {
    /// The WebSocket handshake failed.
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// An operation that needs the socket was called before `connect`.
    #[error("not connected; call connect() first")]
    NotConnected,

    /// The socket closed or errored while awaiting job completion. The
    /// await cannot resume; reconnect and resubmit.
    #[error("connection lost while awaiting job {job_id}")]
    ConnectionLost { job_id: String },

    /// An HTTP call failed (submission rejection included).
    #[error(transparent)]
    Api(#[from] ComfyApiError),
}

/// One logical session: a persistent WebSocket and the HTTP client,
/// scoped to a generated (or caller-supplied) client ID.
pub struct JobChannel {
    server_address: String,
    client_id: String,
    api: ComfyApi,
    ws: Option<WsStream>,
}

impl JobChannel {
    /// Create a channel for `server_address` (`host:port`) with a fresh
    /// random client ID.
    pub fn new(server_address: impl Into<String>) -> Self {
        Self::with_client_id(server_address, uuid::Uuid::new_v4().to_string())
    }

    /// Create a channel with an explicit client ID.
    pub fn with_client_id(server_address: impl Into<String>, client_id: impl Into<String>) -> Self {
        let server_address = server_address.into();
        Self {
            api: ComfyApi::new(&server_address),
            server_address,
            client_id: client_id.into(),
            ws: None,
        }
    }

    /// The client ID progress events are scoped to.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether the persistent connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.ws.is_some()
    }

    /// HTTP side of the session (used by the output collector).
    pub fn api(&self) -> &ComfyApi {
        &self.api
    }

    /// Establish the persistent WebSocket connection.
    ///
    /// Idempotent: a no-op when already connected.
    pub async fn connect(&mut self) -> Result<(), JobChannelError> {
        if self.ws.is_some() {
            return Ok(());
        }

        let url = format!(
            "ws://{}/ws?clientId={}",
            self.server_address, self.client_id
        );
        let (ws, _response) =
            connect_async(&url)
                .await
                .map_err(|e| JobChannelError::Connect {
                    address: self.server_address.clone(),
                    reason: e.to_string(),
                })?;

        tracing::info!(
            server = %self.server_address,
            client_id = %self.client_id,
            "Connected to ComfyUI",
        );
        self.ws = Some(ws);
        Ok(())
    }

    /// Submit a stamped workflow and return the server-assigned job ID.
    ///
    /// Submission travels over HTTP, not the socket; the socket only
    /// carries the resulting progress events.
    pub async fn submit(&self, graph: &WorkflowGraph) -> Result<String, JobChannelError> {
        let response = self
            .api
            .submit_workflow(&graph.to_value(), &self.client_id)
            .await?;
        tracing::info!(
            prompt_id = %response.prompt_id,
            queue_position = response.number,
            "Workflow queued",
        );
        Ok(response.prompt_id)
    }

    /// Consume progress events until `job_id` completes.
    ///
    /// The socket is shared, so everything that is not this job's
    /// completion is skipped: binary frames (preview payloads), events
    /// for other prompts, intermediate `executing` notifications, and
    /// frames that fail to parse (custom-node event types). No timeout is
    /// imposed; a job the server never finishes blocks forever.
    pub async fn await_completion(&mut self, job_id: &str) -> Result<(), JobChannelError> {
        let ws = self.ws.as_mut().ok_or(JobChannelError::NotConnected)?;

        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if handle_text_frame(&text, job_id) {
                        return Ok(());
                    }
                }
                Ok(Message::Binary(payload)) => {
                    // Preview image data; not inspected.
                    tracing::trace!(bytes = payload.len(), "Skipping binary frame");
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {}
                Ok(Message::Close(frame)) => {
                    tracing::warn!(?frame, job_id, "Server closed the connection mid-await");
                    break;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    tracing::error!(error = %e, job_id, "WebSocket receive error");
                    break;
                }
            }
        }

        // The socket is unusable from here; force a fresh connect().
        self.ws = None;
        Err(JobChannelError::ConnectionLost {
            job_id: job_id.to_string(),
        })
    }

    /// Release the persistent connection.
    ///
    /// Safe to call when already closed. Further submits/awaits need a
    /// new `connect()`.
    pub async fn close(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            if let Err(e) = ws.close(None).await {
                tracing::debug!(error = %e, "WebSocket close handshake failed");
            }
            tracing::info!(client_id = %self.client_id, "Channel closed");
        }
    }
}

/// Interpret one text frame; returns true when it completes `job_id`.
fn handle_text_frame(text: &str, job_id: &str) -> bool {
    let event = match parse_event(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::trace!(error = %e, "Skipping unrecognized event");
            return false;
        }
    };

    if event.completes(job_id) {
        tracing::info!(prompt_id = job_id, "Job completed");
        return true;
    }

    match event {
        ServerEvent::Progress(data) => {
            tracing::debug!(value = data.value, max = data.max, "Sampling progress");
        }
        ServerEvent::Executing(data) => {
            tracing::debug!(
                prompt_id = %data.prompt_id,
                node = data.node.as_deref().unwrap_or("-"),
                "Executing node",
            );
        }
        ServerEvent::ExecutionError(data) => {
            // Surfaced here for visibility only; completion (or the lack
            // of it) is still decided by `executing` events.
            tracing::error!(
                prompt_id = %data.prompt_id,
                node_id = %data.node_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Server reported execution error",
            );
        }
        ServerEvent::Status(data) => {
            tracing::trace!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "Queue status",
            );
        }
        _ => {}
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_frame_for_our_job_terminates() {
        assert!(handle_text_frame(
            r#"{"type":"executing","data":{"node":null,"prompt_id":"job-1"}}"#,
            "job-1",
        ));
    }

    #[test]
    fn completion_frame_for_other_job_is_skipped() {
        assert!(!handle_text_frame(
            r#"{"type":"executing","data":{"node":null,"prompt_id":"job-2"}}"#,
            "job-1",
        ));
    }

    #[test]
    fn intermediate_executing_frame_is_skipped() {
        assert!(!handle_text_frame(
            r#"{"type":"executing","data":{"node":"7","prompt_id":"job-1"}}"#,
            "job-1",
        ));
    }

    #[test]
    fn unrelated_event_types_are_skipped() {
        for frame in [
            r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":0}}}}"#,
            r#"{"type":"progress","data":{"value":1,"max":20}}"#,
            r#"{"type":"execution_start","data":{"prompt_id":"job-1"}}"#,
            r#"{"type":"executed","data":{"node":"9","prompt_id":"job-1","output":{}}}"#,
        ] {
            assert!(!handle_text_frame(frame, "job-1"), "frame: {frame}");
        }
    }

    #[test]
    fn unparseable_frames_are_skipped() {
        assert!(!handle_text_frame(r#"{"type":"some.custom.event","data":{}}"#, "job-1"));
        assert!(!handle_text_frame("garbage", "job-1"));
    }

    /// Completion filtering through the real socket loop: binary frames,
    /// other jobs' completions, and intermediate `executing` events must
    /// all be consumed without ending the await.
    #[tokio::test]
    async fn binary_and_foreign_frames_are_skipped_until_completion() {
        use futures::SinkExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // Preview payload, a completion for somebody else's job, and
            // a node-level notification for ours; none of these finish
            // the await.
            ws.send(Message::Binary(vec![0x89, 0x50, 0x4e, 0x47])).await.unwrap();
            ws.send(Message::Text(
                r#"{"type":"executing","data":{"node":null,"prompt_id":"job-other"}}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text(
                r#"{"type":"executing","data":{"node":"7","prompt_id":"job-1"}}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text(
                r#"{"type":"executing","data":{"node":null,"prompt_id":"job-1"}}"#.into(),
            ))
            .await
            .unwrap();

            // Hold the socket open until the client closes it.
            while ws.next().await.is_some() {}
        });

        let mut channel = JobChannel::with_client_id(addr.to_string(), "test-client");
        channel.connect().await.unwrap();

        // A hang here would mean the completion frame was dropped along
        // with the noise.
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            channel.await_completion("job-1"),
        )
        .await
        .expect("await_completion stalled")
        .unwrap();

        assert!(channel.is_connected());
        channel.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn await_without_connect_is_not_connected() {
        let mut channel = JobChannel::with_client_id("127.0.0.1:8188", "test-client");
        let err = channel.await_completion("job-1").await.unwrap_err();
        assert!(matches!(err, JobChannelError::NotConnected));
    }

    #[tokio::test]
    async fn close_when_never_connected_is_a_no_op() {
        let mut channel = JobChannel::new("127.0.0.1:8188");
        channel.close().await;
        assert!(!channel.is_connected());
    }

    #[test]
    fn generated_client_ids_are_unique() {
        let a = JobChannel::new("127.0.0.1:8188");
        let b = JobChannel::new("127.0.0.1:8188");
        assert_ne!(a.client_id(), b.client_id());
    }
}
