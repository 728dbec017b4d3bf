//! Legacy socket transport — queued endpoints on pre-event-stream
//! servers.
//!
//! The server drives the handshake over a persistent websocket: it asks
//! for the call hash (`send_hash`), then for the payload (`send_data`),
//! then emits the same status events as the event stream until the
//! terminal event.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::types::{CallHash, EventKind, EventMessage, PredictRequest, Status, StatusUpdate};

use super::endpoint::OutputPipeline;
use super::job::Communicator;
use super::transport::{apply_event, cancellation, CallTransport, Protocol};

/// Streaming transport over the legacy websocket queue.
pub struct WsTransport {
    ws_url: String,
    pipeline: Arc<OutputPipeline>,
    authenticated: bool,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("ws_url", &self.ws_url)
            .finish_non_exhaustive()
    }
}

impl WsTransport {
    /// Create a transport for the given websocket URL.
    pub fn new(ws_url: String, pipeline: Arc<OutputPipeline>, authenticated: bool) -> Self {
        Self {
            ws_url,
            pipeline,
            authenticated,
        }
    }
}

#[async_trait]
impl CallTransport for WsTransport {
    async fn call(
        &self,
        request: &PredictRequest,
        communicator: Option<&Communicator>,
    ) -> ClientResult<Vec<Value>> {
        if let Some(comm) = communicator {
            comm.update_status(StatusUpdate::with_code(Status::JoiningQueue));
        }

        let (mut socket, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| ClientError::Connection(format!("could not open socket: {e}")))?;
        debug!(fn_index = request.fn_index, url = %self.ws_url, "socket open");

        loop {
            let message = tokio::select! {
                message = socket.next() => message,
                _ = cancellation(communicator) => {
                    debug!(fn_index = request.fn_index, "cancelled, closing socket");
                    let _ = socket.close(None).await;
                    return Err(ClientError::Cancelled);
                }
            };

            let message = match message {
                None => {
                    return Err(ClientError::Transport(
                        "socket closed before the call completed".to_string(),
                    ))
                }
                Some(Err(e)) => {
                    return Err(ClientError::Transport(format!("socket read failed: {e}")))
                }
                Some(Ok(message)) => message,
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => {
                    return Err(ClientError::Transport(
                        "socket closed before the call completed".to_string(),
                    ))
                }
                // Ping/pong and binary frames carry no call data.
                _ => continue,
            };

            let event: EventMessage = serde_json::from_str(&text)
                .map_err(|e| ClientError::InvalidJson(format!("socket event: {e} ({text})")))?;

            match event.msg {
                EventKind::SendHash => {
                    let hash = CallHash {
                        fn_index: request.fn_index,
                        session_hash: request.session_hash.clone(),
                    };
                    socket
                        .send(Message::Text(serde_json::to_string(&hash)?))
                        .await
                        .map_err(|e| {
                            ClientError::Transport(format!("could not send call hash: {e}"))
                        })?;
                }
                EventKind::SendData => {
                    // Status bookkeeping, then answer with the payload.
                    apply_event(event, communicator, &self.pipeline, self.authenticated).await?;
                    socket
                        .send(Message::Text(serde_json::to_string(request)?))
                        .await
                        .map_err(|e| {
                            ClientError::Transport(format!("could not send call payload: {e}"))
                        })?;
                }
                _ => {
                    if let Some(data) =
                        apply_event(event, communicator, &self.pipeline, self.authenticated)
                            .await?
                    {
                        let _ = socket.close(None).await;
                        return Ok(data);
                    }
                }
            }
        }
    }

    fn protocol(&self) -> Protocol {
        Protocol::LegacySocket
    }
}
