//! Wire types for the interactive-app protocol — the configuration
//! snapshot fetched at connect time, call request/response envelopes, the
//! queue event stream, and the status vocabulary shared between a running
//! call and its [`Job`](crate::client::Job) handle.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use chrono::{DateTime, Utc};

// ============================================================================
// Configuration snapshot
// ============================================================================

/// The app configuration fetched once at connect time.
///
/// Immutable after the fetch: reconnecting or re-fetching produces a new
/// snapshot, never a mutation of this one.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server version string, e.g. `"3.44.1"`.
    #[serde(default = "default_version")]
    pub version: String,

    /// Real-time protocol the server speaks: `"sse"` for the current
    /// event-stream protocol, anything else selects the legacy variant.
    #[serde(default)]
    pub protocol: Option<String>,

    /// Component table. Dependencies reference components by id.
    #[serde(default)]
    pub components: Vec<ComponentConfig>,

    /// One entry per callable endpoint, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    /// Whether the server-side queue is enabled (legacy servers only;
    /// the event-stream protocol always queues).
    #[serde(default)]
    pub enable_queue: Option<bool>,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl AppConfig {
    /// Major version number parsed from `version` (`0` if unparseable).
    pub fn major_version(&self) -> u32 {
        self.version
            .split('.')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// Whether the server uses the current event-stream protocol.
    pub fn uses_event_stream(&self) -> bool {
        self.protocol.as_deref() == Some("sse")
    }

    /// Version comparison against a `major.minor.patch` triple.
    pub fn version_at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        let mut parts = self.version.split('.').map(|p| {
            // Tolerate suffixes like "3.44.1b1".
            let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().unwrap_or(0)
        });
        let v = (
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        );
        v >= (major, minor, patch)
    }
}

/// One entry in the config's component table.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentConfig {
    /// Component id, referenced by dependency input/output lists.
    pub id: u64,

    /// Component type name, e.g. `"number"`, `"image"`, `"state"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Explicit serializer name (legacy protocol only).
    #[serde(default)]
    pub serializer: Option<String>,

    /// Explicit skip flag; when absent the skip-component table decides.
    #[serde(default)]
    pub skip_api: Option<bool>,

    /// Data-shape schema for this component's value. Only inspected for
    /// the file-value flag.
    #[serde(default)]
    pub api_info: Option<Value>,
}

/// Server-side declaration of one endpoint's wiring.
#[derive(Debug, Clone, Deserialize)]
pub struct Dependency {
    /// Input component ids, in call-argument order.
    #[serde(default)]
    pub inputs: Vec<u64>,

    /// Output component ids, in return order.
    #[serde(default)]
    pub outputs: Vec<u64>,

    /// Public endpoint name. `None` = unnamed, `Disabled` = the developer
    /// explicitly turned the endpoint off.
    #[serde(default)]
    pub api_name: Option<ApiNameField>,

    /// Whether a backend function backs this dependency (frontend-only
    /// wiring is not callable).
    #[serde(default)]
    pub backend_fn: bool,

    /// Whether this dependency goes through the server queue (legacy
    /// protocol; `None` falls back to the app-level setting).
    #[serde(default)]
    pub queue: Option<bool>,

    /// Behavioral flags for the backing function.
    #[serde(default)]
    pub types: DependencyTypes,
}

/// The `api_name` config field: a string name, or `false` for disabled.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ApiNameField {
    /// Named endpoint (name does not carry the leading slash).
    Name(String),
    /// `false` in the config: endpoint explicitly disabled.
    Disabled(bool),
}

/// Behavioral flags on a dependency's backing function.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependencyTypes {
    /// Endpoint may run forever (event loops, live tickers). Rejected by
    /// `predict`; callable through `submit` only.
    #[serde(default)]
    pub continuous: bool,

    /// Endpoint emits partial outputs before completing.
    #[serde(default)]
    pub generator: bool,
}

// ============================================================================
// Call envelopes
// ============================================================================

/// Payload posted to submit one call. Ephemeral: built per invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PredictRequest {
    /// Positional argument values, already wire-serialized.
    pub data: Vec<Value>,

    /// Endpoint index the call targets.
    pub fn_index: usize,

    /// Session identifier shared by all calls of one client.
    pub session_hash: String,
}

/// Identifies a call on the event stream: endpoint index + session.
#[derive(Debug, Clone, Serialize)]
pub struct CallHash {
    /// Endpoint index.
    pub fn_index: usize,
    /// Session identifier.
    pub session_hash: String,
}

/// A server-assigned reference for one uploaded file, substituted into
/// the argument tree in place of the local path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Server-side path for the uploaded content.
    pub path: String,

    /// Original client-side file name.
    pub orig_name: String,
}

// ============================================================================
// Queue events
// ============================================================================

/// Event kinds carried on the event stream and the legacy socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Queue position estimate: rank, queue size, eta.
    Estimation,
    /// The worker picked the call up.
    ProcessStarts,
    /// Partial output from a generator endpoint.
    ProcessGenerating,
    /// Terminal event: final output or error.
    ProcessCompleted,
    /// Server is closing the event stream.
    CloseStream,
    /// Legacy socket: server asks for the call hash.
    SendHash,
    /// Legacy socket: server asks for the call payload.
    SendData,
    /// Legacy socket: queue is full, call rejected.
    QueueFull,
    /// Progress-tracker update.
    Progress,
    /// Forward compatibility: unrecognized event kinds are ignored.
    #[serde(other)]
    Unknown,
}

/// One message from the event stream or the legacy socket.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    /// What happened.
    pub msg: EventKind,

    /// Output payload (`process_generating` / `process_completed`).
    #[serde(default)]
    pub output: Option<CallOutput>,

    /// Queue rank (`estimation`).
    #[serde(default)]
    pub rank: Option<usize>,

    /// Queue size (`estimation`).
    #[serde(default)]
    pub queue_size: Option<usize>,

    /// Estimated seconds until this call runs (`estimation`).
    #[serde(default)]
    pub rank_eta: Option<f64>,

    /// Whether the call succeeded (`process_completed`).
    #[serde(default)]
    pub success: Option<bool>,

    /// Progress-tracker entries (`progress`).
    #[serde(default)]
    pub progress_data: Option<Vec<ProgressUnit>>,
}

/// The output payload of a `process_generating`/`process_completed`
/// event: either the raw output tuple in `data`, or an error message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallOutput {
    /// Ordered raw output tuple.
    #[serde(default)]
    pub data: Option<Vec<Value>>,

    /// Server-reported error message.
    #[serde(default)]
    pub error: Option<String>,

    /// Whether more partial outputs will follow.
    #[serde(default)]
    pub is_generating: Option<bool>,
}

// ============================================================================
// Status vocabulary
// ============================================================================

/// The observable lifecycle of a submitted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Submitted locally, nothing heard from the server yet.
    Starting,
    /// Joining the server-side queue.
    JoiningQueue,
    /// The server queue rejected the call (legacy protocol).
    QueueFull,
    /// Waiting in the server queue.
    InQueue,
    /// Uploading the call payload.
    SendingData,
    /// The worker is executing the call.
    Processing,
    /// A partial output was produced; more may follow.
    Iterating,
    /// A progress-tracker update arrived.
    Progress,
    /// Terminal: finished (successfully or not — see `success`).
    Finished,
    /// Terminal: cancellation was requested.
    Cancelled,
}

impl Status {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Finished | Status::Cancelled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Starting => "starting",
            Status::JoiningQueue => "joining queue",
            Status::QueueFull => "queue full",
            Status::InQueue => "in queue",
            Status::SendingData => "sending data",
            Status::Processing => "processing",
            Status::Iterating => "iterating",
            Status::Progress => "progress",
            Status::Finished => "finished",
            Status::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A point-in-time status snapshot for one call.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// Lifecycle code.
    pub code: Status,

    /// Queue rank, when known.
    pub rank: Option<usize>,

    /// Queue size, when known.
    pub queue_size: Option<usize>,

    /// Estimated seconds until the call runs, when known.
    pub eta: Option<f64>,

    /// Set on terminal statuses: whether the call succeeded.
    pub success: Option<bool>,

    /// When this snapshot was taken.
    pub time: DateTime<Utc>,

    /// Latest progress-tracker entries, when the endpoint reports any.
    pub progress_data: Option<Vec<ProgressUnit>>,
}

impl StatusUpdate {
    /// A snapshot with the given code and nothing else known.
    pub fn with_code(code: Status) -> Self {
        Self {
            code,
            rank: None,
            queue_size: None,
            eta: None,
            success: None,
            time: Utc::now(),
            progress_data: None,
        }
    }

    /// The snapshot every job starts from.
    pub fn starting() -> Self {
        Self::with_code(Status::Starting)
    }
}

/// One progress-tracker entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressUnit {
    /// Current step index.
    #[serde(default)]
    pub index: Option<usize>,

    /// Total number of steps, when bounded.
    #[serde(default)]
    pub length: Option<usize>,

    /// Unit label, e.g. `"steps"`.
    #[serde(default)]
    pub unit: Option<String>,

    /// Fractional progress in `[0, 1]`, when reported directly.
    #[serde(default)]
    pub progress: Option<f64>,

    /// Human-readable description of the current step.
    #[serde(default)]
    pub desc: Option<String>,
}
