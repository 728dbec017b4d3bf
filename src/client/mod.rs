//! Client core — connect to a remote interactive app and call its
//! endpoints.
//!
//! - [`AppClient`] — session orchestrator: config fetch, endpoint table,
//!   worker pool, session identity
//! - [`Endpoint`] — per-endpoint metadata and the end-to-end call
//!   pipeline (hidden state → serialize → invoke → deserialize →
//!   post-process)
//! - [`Job`] / [`Communicator`] — handle over one in-flight call with
//!   status, streamed outputs, and cancellation
//! - [`CallTransport`] and its three implementations — event stream,
//!   legacy socket, plain request/response
//!
//! # Quick Start
//!
//! ```no_run
//! use appcall_rs::client::AppClient;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AppClient::connect("http://localhost:7860").await?;
//! println!("{}", client.view_api());
//!
//! let result = client
//!     .predict("/predict", vec![json!(5), json!("add"), json!(4)])
//!     .await?;
//! println!("5 + 4 = {result}");
//! # Ok(())
//! # }
//! ```

mod api_info;
mod app_client;
mod endpoint;
mod job;
mod payload;
mod serializers;
mod sse;
mod transport;
mod ws;

pub use api_info::{ApiInfo, EndpointInfo, ParameterInfo, TypeInfo};
pub use app_client::{AppClient, EndpointRef};
pub use endpoint::{ComponentApiType, Endpoint, OutputPipeline};
pub use job::{Communicator, Job};
pub use payload::{ArgNode, FileInput, FileWireShape};
pub use serializers::SerializerKind;
pub use sse::SseTransport;
pub use transport::{CallTransport, HttpTransport, Protocol};
pub use ws::WsTransport;
