//! Transport layer for submitting calls and receiving status/result
//! events.
//!
//! Provides the [`CallTransport`] trait abstracting over the three wire
//! protocols (event stream, legacy socket, plain request/response), the
//! plain-HTTP implementation, and the event-to-status bookkeeping shared
//! by the streaming transports. Each endpoint selects its transport once
//! at construction; nothing is re-negotiated per call.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{from_reqwest, ClientError, ClientResult};
use crate::types::{EventKind, EventMessage, PredictRequest, Status, StatusUpdate};

use super::endpoint::OutputPipeline;
use super::job::Communicator;

/// The wire protocol an endpoint was bound to at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Current protocol: server-sent events plus a data-submission POST.
    EventStream,
    /// Legacy protocol: persistent websocket carrying the same envelope.
    LegacySocket,
    /// Non-queued legacy endpoints: one synchronous request/response.
    Request,
}

impl Protocol {
    /// Whether calls on this protocol carry live status, and therefore
    /// get a [`Communicator`].
    pub fn has_communicator(&self) -> bool {
        !matches!(self, Protocol::Request)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::EventStream => "sse",
            Protocol::LegacySocket => "ws",
            Protocol::Request => "http",
        };
        write!(f, "{}", s)
    }
}

/// Uniform interface for submitting one call and collecting its ordered
/// raw output tuple.
///
/// Streaming implementations drive the `communicator` (status updates,
/// partial outputs, cancellation checks between events); the plain
/// request transport ignores it.
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Submit the call and wait for its raw outputs.
    async fn call(
        &self,
        request: &PredictRequest,
        communicator: Option<&Communicator>,
    ) -> ClientResult<Vec<Value>>;

    /// The protocol this transport speaks.
    fn protocol(&self) -> Protocol;
}

/// Classify a server-reported call failure.
///
/// A structured HTTP status is authoritative when the transport has one;
/// the `"429"` substring check on the error message is only a fallback
/// for payloads that bury the status in text. Rate limiting is surfaced
/// as [`ClientError::RateLimit`] only for unauthenticated targets, with
/// guidance on getting quota; authenticated sessions get the plain
/// [`ClientError::RemoteCall`].
pub(crate) fn classify_remote_error(
    message: &str,
    http_status: Option<u16>,
    authenticated: bool,
) -> ClientError {
    let rate_limited = match http_status {
        Some(status) => status == 429,
        None => message.contains("429"),
    };
    if rate_limited && !authenticated {
        ClientError::RateLimit(format!(
            "too many requests to this app ({message}); authenticate with credentials \
             for it, or duplicate the deployment to get your own quota"
        ))
    } else {
        ClientError::RemoteCall(message.to_string())
    }
}

/// Apply one queue event to the communicator.
///
/// Returns `Ok(Some(data))` on the terminal event, `Ok(None)` otherwise.
/// Partial outputs are deserialized and post-processed immediately and
/// appended to the shared output list, waking any iterator waiters.
pub(crate) async fn apply_event(
    event: EventMessage,
    communicator: Option<&Communicator>,
    pipeline: &OutputPipeline,
    authenticated: bool,
) -> ClientResult<Option<Vec<Value>>> {
    let update_status = |update: StatusUpdate| {
        if let Some(comm) = communicator {
            comm.update_status(update);
        }
    };

    match event.msg {
        EventKind::Estimation => {
            let mut update = StatusUpdate::with_code(Status::InQueue);
            update.rank = event.rank;
            update.queue_size = event.queue_size;
            update.eta = event.rank_eta;
            update_status(update);
            Ok(None)
        }
        EventKind::ProcessStarts => {
            update_status(StatusUpdate::with_code(Status::Processing));
            Ok(None)
        }
        EventKind::SendData => {
            update_status(StatusUpdate::with_code(Status::SendingData));
            Ok(None)
        }
        EventKind::Progress => {
            let mut update = StatusUpdate::with_code(Status::Progress);
            update.progress_data = event.progress_data;
            update_status(update);
            Ok(None)
        }
        EventKind::ProcessGenerating => {
            let mut update = StatusUpdate::with_code(Status::Iterating);
            update.success = Some(true);
            update_status(update);

            let output = event.output.unwrap_or_default();
            if let Some(error) = output.error {
                return Err(classify_remote_error(&error, None, authenticated));
            }
            if let (Some(comm), Some(data)) = (communicator, output.data) {
                let processed = pipeline.process(data).await?;
                comm.push_partial_output(processed);
            }
            Ok(None)
        }
        EventKind::ProcessCompleted => {
            let output = event.output.unwrap_or_default();
            let mut update = StatusUpdate::with_code(Status::Finished);
            update.success = Some(output.error.is_none() && event.success.unwrap_or(true));
            update_status(update);

            if let Some(error) = output.error {
                return Err(classify_remote_error(&error, None, authenticated));
            }
            match output.data {
                Some(data) => Ok(Some(data)),
                None => Err(ClientError::InvalidJson(
                    "terminal event carried neither data nor error".to_string(),
                )),
            }
        }
        EventKind::QueueFull => {
            update_status(StatusUpdate::with_code(Status::QueueFull));
            Err(ClientError::RemoteCall(
                "the app's queue is full, try again later".to_string(),
            ))
        }
        // Handshake/lifecycle kinds are handled by the transport loops.
        EventKind::SendHash | EventKind::CloseStream | EventKind::Unknown => Ok(None),
    }
}

/// Wait for cancellation, or forever when the call has no communicator.
pub(crate) async fn cancellation(communicator: Option<&Communicator>) {
    match communicator {
        Some(comm) => comm.cancelled().await,
        None => futures::future::pending().await,
    }
}

/// Plain request/response transport for non-queued legacy endpoints.
///
/// One POST to the predict route; no communicator, no partial outputs.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    api_url: String,
    authenticated: bool,
}

impl HttpTransport {
    /// Create a transport posting to the given predict URL.
    pub fn new(http: reqwest::Client, api_url: String, authenticated: bool) -> Self {
        Self {
            http,
            api_url,
            authenticated,
        }
    }
}

#[async_trait]
impl CallTransport for HttpTransport {
    async fn call(
        &self,
        request: &PredictRequest,
        _communicator: Option<&Communicator>,
    ) -> ClientResult<Vec<Value>> {
        debug!(fn_index = request.fn_index, url = %self.api_url, "plain request call");

        let response = self
            .http
            .post(&self.api_url)
            .json(request)
            .send()
            .await
            .map_err(|e| from_reqwest(e, "call submission failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(classify_remote_error(
                    &body,
                    Some(429),
                    self.authenticated,
                ));
            }
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidJson(format!("call response: {e}")))?;

        if let Some(error) = result.get("error").and_then(Value::as_str) {
            return Err(classify_remote_error(error, None, self.authenticated));
        }

        match result.get("data").and_then(Value::as_array) {
            Some(data) => Ok(data.clone()),
            None => Err(ClientError::InvalidJson(format!(
                "call response has no data field: {result}"
            ))),
        }
    }

    fn protocol(&self) -> Protocol {
        Protocol::Request
    }
}
