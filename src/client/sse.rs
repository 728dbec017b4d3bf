//! Event-stream transport — the current real-time protocol.
//!
//! One call = one long-lived server-sent-event stream plus one payload
//! POST. The stream is opened first, keyed by the call hash (endpoint
//! index + session hash); the payload is then posted to the
//! data-submission route; events are consumed in order until the
//! terminal event, the stream closing, or cancellation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{from_reqwest, ClientError, ClientResult};
use crate::types::{EventKind, EventMessage, PredictRequest, Status, StatusUpdate};

use super::endpoint::OutputPipeline;
use super::job::Communicator;
use super::transport::{apply_event, cancellation, classify_remote_error, CallTransport, Protocol};

/// Streaming transport over server-sent events.
pub struct SseTransport {
    http: reqwest::Client,
    sse_url: String,
    sse_data_url: String,
    pipeline: Arc<OutputPipeline>,
    authenticated: bool,
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("sse_url", &self.sse_url)
            .finish_non_exhaustive()
    }
}

impl SseTransport {
    /// Create a transport for the given stream/data routes.
    pub fn new(
        http: reqwest::Client,
        sse_url: String,
        sse_data_url: String,
        pipeline: Arc<OutputPipeline>,
        authenticated: bool,
    ) -> Self {
        Self {
            http,
            sse_url,
            sse_data_url,
            pipeline,
            authenticated,
        }
    }

    /// Open the event stream for one call hash.
    async fn open_stream(&self, request: &PredictRequest) -> ClientResult<reqwest::Response> {
        let response = self
            .http
            .get(&self.sse_url)
            .query(&[
                ("fn_index", request.fn_index.to_string()),
                ("session_hash", request.session_hash.clone()),
            ])
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| from_reqwest(e, "could not open event stream"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Post the call payload to the data-submission route.
    async fn send_data(&self, request: &PredictRequest) -> ClientResult<()> {
        let response = self
            .http
            .post(&self.sse_data_url)
            .json(request)
            .send()
            .await
            .map_err(|e| from_reqwest(e, "could not submit call payload"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(classify_remote_error(&body, Some(429), self.authenticated));
            }
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CallTransport for SseTransport {
    async fn call(
        &self,
        request: &PredictRequest,
        communicator: Option<&Communicator>,
    ) -> ClientResult<Vec<Value>> {
        if let Some(comm) = communicator {
            comm.update_status(StatusUpdate::with_code(Status::JoiningQueue));
        }

        let response = self.open_stream(request).await?;
        debug!(fn_index = request.fn_index, "event stream open");

        if let Some(comm) = communicator {
            comm.update_status(StatusUpdate::with_code(Status::SendingData));
        }
        self.send_data(request).await?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = cancellation(communicator) => {
                    debug!(fn_index = request.fn_index, "cancelled, releasing event stream");
                    return Err(ClientError::Cancelled);
                }
            };

            let Some(chunk_result) = chunk else {
                // Stream closed without a terminal event.
                warn!(fn_index = request.fn_index, "event stream disconnected");
                return Err(ClientError::Transport(
                    "event stream disconnected before the call completed".to_string(),
                ));
            };

            let chunk = chunk_result
                .map_err(|e| ClientError::Transport(format!("error reading event stream: {e}")))?;
            let text = std::str::from_utf8(&chunk)
                .map_err(|e| ClientError::Transport(format!("invalid UTF-8 in event stream: {e}")))?;
            buffer.push_str(text);

            // Process complete lines from the buffer.
            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
                buffer = buffer[newline_pos + 1..].to_string();

                let Some(event) = parse_sse_line(&line)? else {
                    continue;
                };

                if event.msg == EventKind::CloseStream {
                    return Err(ClientError::Transport(
                        "server closed the event stream before the call completed".to_string(),
                    ));
                }

                if let Some(data) =
                    apply_event(event, communicator, &self.pipeline, self.authenticated).await?
                {
                    return Ok(data);
                }
            }
        }
    }

    fn protocol(&self) -> Protocol {
        Protocol::EventStream
    }
}

/// Parse a single SSE line. Returns `Some(event)` for `data:` lines with
/// valid JSON, `None` for comments, empty lines, and other SSE fields.
fn parse_sse_line(line: &str) -> ClientResult<Option<EventMessage>> {
    // Empty line = event boundary (data lines are processed individually).
    if line.is_empty() {
        return Ok(None);
    }

    // SSE comments (lines starting with ':') are keep-alive signals.
    if line.starts_with(':') {
        return Ok(None);
    }

    if let Some(data) = line.strip_prefix("data:") {
        let data = data.trim();
        if data.is_empty() {
            return Ok(None);
        }

        let event: EventMessage = serde_json::from_str(data).map_err(|e| {
            ClientError::InvalidJson(format!("failed to parse event data: {e} (data: {data})"))
        })?;
        return Ok(Some(event));
    }

    // Other SSE fields (event:, id:, retry:) carry no call data.
    Ok(None)
}
