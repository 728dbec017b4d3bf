//! # appcall-rs — Rust client SDK for interactive-app servers
//!
//! This crate connects to a remote interactive-app server, discovers its
//! callable endpoints, invokes them, and streams back results — including
//! long-running, multi-step (generator) predictions.
//!
//! ## Overview
//!
//! A connected [`client::AppClient`] fetches the app's configuration
//! once, builds one [`client::Endpoint`] descriptor per declared
//! dependency, and exposes two ways to call them:
//!
//! - [`client::AppClient::predict`] — submit and wait for the result
//! - [`client::AppClient::submit`] — get a [`client::Job`] handle with
//!   live status, iteration over streamed partial outputs, and
//!   best-effort cancellation
//!
//! Three wire protocols are supported and selected per endpoint at
//! connect time: the current server-sent-event stream, the legacy
//! websocket queue, and plain request/response for non-queued legacy
//! endpoints. File-valued arguments are uploaded in one batched request
//! and substituted as server references; file-valued outputs are
//! downloaded (or decoded from inline data URIs) into a local output
//! directory.
//!
//! ## Quick Start
//!
//! ```no_run
//! use appcall_rs::client::AppClient;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AppClient::connect("http://localhost:7860").await?;
//!
//!     // Discover the callable surface:
//!     println!("{}", client.view_api());
//!
//!     // One-shot call (blocks until the result is in):
//!     let result = client
//!         .predict("/predict", vec![json!(5), json!("add"), json!(4)])
//!         .await?;
//!     println!("result: {result}");
//!
//!     // Generator endpoint: iterate partial results as they stream in.
//!     let mut job = client.submit("/count", vec![json!(5)])?;
//!     while let Some(partial) = job.next_output().await {
//!         println!("partial: {partial}");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Authentication and configuration
//!
//! Password-protected apps and custom headers go through the builder:
//!
//! ```no_run
//! use appcall_rs::ClientBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::new("https://example.com/app")
//!     .auth("user", "secret")
//!     .max_workers(8)
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`client::AppClient`] — session orchestrator and entry point
//! - [`client::Endpoint`] — per-endpoint call pipeline
//! - [`client::Job`] / [`client::Communicator`] — in-flight call handle
//!   and its shared mailbox
//! - [`client::CallTransport`] — protocol abstraction
//!   ([`client::SseTransport`], [`client::WsTransport`],
//!   [`client::HttpTransport`])
//! - [`types`] — configuration snapshot, wire envelopes, status
//!   vocabulary
//! - [`error::ClientError`] — the error taxonomy

pub mod builders;
pub mod client;
pub mod error;
pub mod types;
pub mod utils;

/// Prelude module that re-exports the types most callers need.
///
/// # Example
///
/// ```
/// use appcall_rs::prelude::*;
///
/// // Brings in AppClient, ClientBuilder, Job, EndpointRef,
/// // ClientError/ClientResult, Status, StatusUpdate, ...
/// ```
pub mod prelude {
    pub use crate::builders::ClientBuilder;
    pub use crate::client::{AppClient, Communicator, Endpoint, EndpointRef, Job, Protocol};
    pub use crate::error::{ClientError, ClientResult};
    pub use crate::types::{ProgressUnit, Status, StatusUpdate};
}

// Re-export the core surface at the crate root for convenience.
pub use builders::ClientBuilder;
pub use client::{AppClient, EndpointRef, Job};
pub use error::{ClientError, ClientResult};
pub use types::{Status, StatusUpdate};
