//! Endpoint descriptors — one per server-declared dependency.
//!
//! An [`Endpoint`] encapsulates one callable surface and its data-shape
//! contract, and owns the end-to-end call pipeline: insert hidden state
//! args → serialize (upload indirection) → invoke over the negotiated
//! transport → deserialize (download indirection) → post-process.
//!
//! Two variants exist. The current event-stream protocol derives
//! component flags from the config's component metadata. The legacy
//! compatibility variant additionally resolves per-component serializers
//! by name from the registry; an unrecognized name degrades that single
//! endpoint to invalid instead of failing session construction.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::{ClientError, ClientResult};
use crate::types::{ApiNameField, AppConfig, ComponentConfig, Dependency, PredictRequest};
use crate::utils::{SKIP_COMPONENTS, STATE_COMPONENT};

use super::job::Communicator;
use super::payload::{materialize_outputs, serialize_args, FileWireShape};
use super::serializers::{resolve_serializer, SerializerKind};
use super::sse::SseTransport;
use super::transport::{CallTransport, HttpTransport, Protocol};
use super::ws::WsTransport;

/// Per-component flags derived from config metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentApiType {
    /// Internal-only component: dropped from post-processed outputs.
    pub skip: bool,
    /// Values of this component are files, subject to upload/download
    /// indirection.
    pub value_is_file: bool,
    /// Hidden session state: callers never supply this input, a
    /// placeholder is inserted at its position.
    pub is_state: bool,
}

/// Everything an endpoint needs from the owning session, fixed at
/// connect time.
#[derive(Debug, Clone)]
pub(crate) struct EndpointContext {
    pub http: reqwest::Client,
    pub root_url: String,
    pub api_url: String,
    pub sse_url: String,
    pub sse_data_url: String,
    pub ws_url: String,
    pub upload_url: String,
    pub output_dir: PathBuf,
    pub authenticated: bool,
}

/// The output half of the call pipeline, shared with the streaming
/// transports so partial outputs can be deserialized the moment they
/// arrive.
pub struct OutputPipeline {
    http: reqwest::Client,
    root_url: String,
    output_dir: PathBuf,
    outputs: Vec<ComponentApiType>,
    /// Per-component deserializers (legacy variant only).
    deserializers: Option<Vec<SerializerKind>>,
}

impl OutputPipeline {
    /// Deserialize and post-process one raw output tuple into the final
    /// caller-facing value.
    pub async fn process(&self, raw: Vec<Value>) -> ClientResult<Value> {
        let data = self.deserialize(raw).await?;
        Ok(reduce_outputs(data, &self.outputs))
    }

    async fn deserialize(&self, raw: Vec<Value>) -> ClientResult<Vec<Value>> {
        match &self.deserializers {
            None => {
                materialize_outputs(&self.http, &self.root_url, &self.output_dir, raw).await
            }
            Some(kinds) => {
                if raw.len() != kinds.len() {
                    return Err(ClientError::InvalidJson(format!(
                        "expected {} outputs, got {}",
                        kinds.len(),
                        raw.len()
                    )));
                }
                let mut out = Vec::with_capacity(raw.len());
                for (value, kind) in raw.into_iter().zip(kinds) {
                    if kind.handles_files() {
                        let mut materialized = materialize_outputs(
                            &self.http,
                            &self.root_url,
                            &self.output_dir,
                            vec![value],
                        )
                        .await?;
                        out.push(materialized.pop().unwrap_or(Value::Null));
                    } else {
                        out.push(value);
                    }
                }
                Ok(out)
            }
        }
    }
}

/// Drop skip-flagged outputs, then collapse a single remaining output
/// from a 1-tuple to a bare value (tuple shape is kept for 2+).
pub(crate) fn reduce_outputs(data: Vec<Value>, outputs: &[ComponentApiType]) -> Value {
    let mut kept: Vec<Value> = data
        .into_iter()
        .zip(outputs)
        .filter(|(_, c)| !c.skip)
        .map(|(v, _)| v)
        .collect();
    if kept.len() == 1 {
        kept.pop().unwrap_or(Value::Null)
    } else {
        Value::Array(kept)
    }
}

/// One callable endpoint and its bound transport.
///
/// Immutable after construction; constructed once per session.
pub struct Endpoint {
    fn_index: usize,
    /// Public name with leading slash; `None` when unnamed or disabled.
    api_name: Option<String>,
    inputs: Vec<ComponentApiType>,
    outputs: Vec<ComponentApiType>,
    is_continuous: bool,
    is_valid: bool,
    protocol: Protocol,
    transport: Arc<dyn CallTransport>,
    pipeline: Arc<OutputPipeline>,
    /// Input serializers (legacy variant only).
    serializers: Option<Vec<SerializerKind>>,
    http: reqwest::Client,
    root_url: String,
    upload_url: String,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("fn_index", &self.fn_index)
            .field("api_name", &self.api_name)
            .field("protocol", &self.protocol)
            .field("is_valid", &self.is_valid)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Endpoint src: {}, api_name: {}, fn_index: {}",
            self.root_url,
            self.api_name.as_deref().unwrap_or("none"),
            self.fn_index
        )
    }
}

impl Endpoint {
    /// Build the descriptor for one dependency.
    ///
    /// Registry failures on the legacy variant degrade the endpoint to
    /// invalid rather than propagating.
    pub(crate) fn build(
        ctx: &EndpointContext,
        config: &AppConfig,
        fn_index: usize,
        dependency: &Dependency,
    ) -> Self {
        let (api_name, name_disabled) = match &dependency.api_name {
            Some(ApiNameField::Name(name)) => (Some(format!("/{name}")), false),
            Some(ApiNameField::Disabled(_)) => (None, true),
            None => (None, false),
        };
        // Only a real API endpoint if a backend function backs it and the
        // developer has not explicitly disabled it.
        let backed = dependency.backend_fn && !name_disabled;

        let mut endpoint = Self {
            fn_index,
            api_name,
            inputs: Vec::new(),
            outputs: Vec::new(),
            is_continuous: dependency.types.continuous,
            is_valid: false,
            protocol: Protocol::Request,
            transport: Arc::new(HttpTransport::new(
                ctx.http.clone(),
                ctx.api_url.clone(),
                ctx.authenticated,
            )),
            pipeline: Arc::new(OutputPipeline {
                http: ctx.http.clone(),
                root_url: ctx.root_url.clone(),
                output_dir: ctx.output_dir.clone(),
                outputs: Vec::new(),
                deserializers: None,
            }),
            serializers: None,
            http: ctx.http.clone(),
            root_url: ctx.root_url.clone(),
            upload_url: ctx.upload_url.clone(),
        };

        let wired = if config.uses_event_stream() {
            endpoint.wire_stream(ctx, config, dependency)
        } else {
            endpoint.wire_compat(ctx, config, dependency)
        };
        match wired {
            Ok(()) => endpoint.is_valid = backed,
            Err(e) => {
                warn!(fn_index, error = %e, "endpoint degraded to invalid");
                endpoint.is_valid = false;
            }
        }
        endpoint
    }

    /// Wire the current event-stream variant.
    fn wire_stream(
        &mut self,
        ctx: &EndpointContext,
        config: &AppConfig,
        dependency: &Dependency,
    ) -> ClientResult<()> {
        self.inputs = component_types(config, &dependency.inputs)?;
        self.outputs = component_types(config, &dependency.outputs)?;

        self.pipeline = Arc::new(OutputPipeline {
            http: ctx.http.clone(),
            root_url: ctx.root_url.clone(),
            output_dir: ctx.output_dir.clone(),
            outputs: self.outputs.clone(),
            deserializers: None,
        });
        self.protocol = Protocol::EventStream;
        self.transport = Arc::new(SseTransport::new(
            ctx.http.clone(),
            ctx.sse_url.clone(),
            ctx.sse_data_url.clone(),
            Arc::clone(&self.pipeline),
            ctx.authenticated,
        ));
        Ok(())
    }

    /// Wire the legacy compatibility variant, resolving serializers from
    /// the registry.
    fn wire_compat(
        &mut self,
        ctx: &EndpointContext,
        config: &AppConfig,
        dependency: &Dependency,
    ) -> ClientResult<()> {
        let mut serializers = Vec::new();
        let mut inputs = Vec::new();
        for id in &dependency.inputs {
            let component = find_component(config, *id)?;
            serializers.push(resolve_serializer(component, false)?);
            inputs.push(ComponentApiType {
                skip: false,
                // The legacy wire uploads only these component types.
                value_is_file: matches!(component.kind.as_str(), "file" | "uploadbutton"),
                is_state: component.kind == STATE_COMPONENT,
            });
        }

        let mut deserializers = Vec::new();
        let mut outputs = Vec::new();
        for id in &dependency.outputs {
            let component = find_component(config, *id)?;
            deserializers.push(resolve_serializer(component, true)?);
            outputs.push(ComponentApiType {
                skip: SKIP_COMPONENTS.contains(&component.kind.as_str()),
                value_is_file: false,
                is_state: component.kind == STATE_COMPONENT,
            });
        }

        self.inputs = inputs;
        self.outputs = outputs;
        self.serializers = Some(serializers);
        self.pipeline = Arc::new(OutputPipeline {
            http: ctx.http.clone(),
            root_url: ctx.root_url.clone(),
            output_dir: ctx.output_dir.clone(),
            outputs: self.outputs.clone(),
            deserializers: Some(deserializers),
        });

        let use_socket = config.enable_queue.unwrap_or(false)
            && config.version_at_least(3, 2, 0)
            && dependency.queue != Some(false);
        if use_socket {
            self.protocol = Protocol::LegacySocket;
            self.transport = Arc::new(WsTransport::new(
                ctx.ws_url.clone(),
                Arc::clone(&self.pipeline),
                ctx.authenticated,
            ));
        } else {
            self.protocol = Protocol::Request;
            self.transport = Arc::new(HttpTransport::new(
                ctx.http.clone(),
                ctx.api_url.clone(),
                ctx.authenticated,
            ));
        }
        Ok(())
    }

    /// Endpoint index in declaration order.
    pub fn fn_index(&self) -> usize {
        self.fn_index
    }

    /// Public name with leading slash, when the endpoint has one.
    pub fn api_name(&self) -> Option<&str> {
        self.api_name.as_deref()
    }

    /// Whether the endpoint is callable.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Whether the endpoint may run forever.
    pub fn is_continuous(&self) -> bool {
        self.is_continuous
    }

    /// The protocol this endpoint was bound to at construction.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Insert a placeholder at each hidden-state position, since callers
    /// never supply those inputs.
    pub(crate) fn insert_state(&self, args: Vec<Value>) -> Vec<Value> {
        let mut data = args;
        for (i, component) in self.inputs.iter().enumerate() {
            if component.is_state {
                data.insert(i.min(data.len()), Value::Null);
            }
        }
        data
    }

    /// Serialize caller arguments into wire values.
    async fn serialize(&self, args: Vec<Value>) -> ClientResult<Vec<Value>> {
        let flags: Vec<bool> = self.inputs.iter().map(|c| c.value_is_file).collect();
        match &self.serializers {
            None => Ok(serialize_args(
                &self.http,
                &self.upload_url,
                args,
                &flags,
                FileWireShape::Reference,
            )
            .await),
            Some(kinds) => {
                if args.len() != kinds.len() {
                    return Err(ClientError::Other(format!(
                        "expected {} arguments, got {}",
                        kinds.len(),
                        args.len()
                    )));
                }
                Ok(serialize_args(
                    &self.http,
                    &self.upload_url,
                    args,
                    &flags,
                    FileWireShape::Legacy,
                )
                .await)
            }
        }
    }

    /// Run the end-to-end pipeline for one call.
    pub(crate) async fn run(
        &self,
        args: Vec<Value>,
        session_hash: &str,
        communicator: Option<&Communicator>,
    ) -> ClientResult<Value> {
        if !self.is_valid {
            return Err(ClientError::InvalidEndpoint(format!(
                "{self} is disabled or frontend-only"
            )));
        }

        let args = self.insert_state(args);
        let data = self.serialize(args).await?;
        let request = PredictRequest {
            data,
            fn_index: self.fn_index,
            session_hash: session_hash.to_string(),
        };
        let raw = self.transport.call(&request, communicator).await?;
        let result = self.pipeline.process(raw).await?;

        // Keep the outputs list consistent between generator and
        // single-shot endpoints: the final value lands there exactly once.
        if let Some(comm) = communicator {
            comm.push_final_output(result.clone());
        }
        Ok(result)
    }
}

/// Derive the api-type flags for a list of component ids.
fn component_types(config: &AppConfig, ids: &[u64]) -> ClientResult<Vec<ComponentApiType>> {
    ids.iter()
        .map(|id| {
            let component = find_component(config, *id)?;
            Ok(ComponentApiType {
                skip: component
                    .skip_api
                    .unwrap_or_else(|| SKIP_COMPONENTS.contains(&component.kind.as_str())),
                value_is_file: component_value_is_file(component),
                is_state: component.kind == STATE_COMPONENT,
            })
        })
        .collect()
}

fn find_component(config: &AppConfig, id: u64) -> ClientResult<&ComponentConfig> {
    config
        .components
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| ClientError::UnknownComponent(format!("no component with id {id}")))
}

/// Whether a component's values are files. File-backed components mark
/// their schema with `serialized_info`; older configs only describe the
/// value as a filepath.
fn component_value_is_file(component: &ComponentConfig) -> bool {
    let Some(info) = &component.api_info else {
        return false;
    };
    if info
        .get("serialized_info")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return true;
    }
    info.get("info")
        .and_then(|i| i.get("description"))
        .and_then(Value::as_str)
        .map(|d| d.contains("filepath"))
        .unwrap_or(false)
}
