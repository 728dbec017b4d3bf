//! Client error types — connection/configuration failures, per-call
//! failures, and transport-level errors.
//!
//! Construction errors (connect, login, config fetch, endpoint table)
//! surface synchronously from [`AppClient::connect`]. Per-call errors are
//! captured on the [`Job`] and raised when the result is retrieved.
//!
//! [`AppClient::connect`]: crate::client::AppClient::connect
//! [`Job`]: crate::client::Job

/// Unified error type for all client operations.
///
/// The domain taxonomy (connection, auth, endpoint resolution, remote
/// call failures) lives alongside transport-side variants (`Transport`,
/// `Http`, `InvalidJson`) so that one `Result` alias covers the whole
/// crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    // -- Connection / construction errors --
    /// The app could not be reached, or its configuration could not be
    /// fetched or parsed.
    #[error("could not connect to app: {0}")]
    Connection(String),

    /// Login was rejected, or the config endpoint answered 401.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The target is still provisioning and did not become ready within
    /// the retry window.
    #[error("app is not ready: {0}")]
    InvalidState(String),

    /// The server predates the 3.x config shape this client requires.
    #[error("unsupported server version: {0}")]
    UnsupportedVersion(String),

    // -- Endpoint resolution errors --
    /// The referenced endpoint is disabled, frontend-only, unknown by
    /// name, or out of range.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// No name or index was given and more than one candidate exists.
    #[error("ambiguous endpoint: {0}")]
    AmbiguousEndpoint(String),

    /// A legacy dependency names a serializer the registry does not know.
    /// Degrades the endpoint to invalid; never aborts session construction.
    #[error("unknown serializer: {0}")]
    UnknownSerializer(String),

    /// A legacy dependency references a component type the registry does
    /// not know. Degrades the endpoint to invalid.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    // -- Per-call errors --
    /// The server reported an error payload for the call.
    #[error("remote call failed: {0}")]
    RemoteCall(String),

    /// The call was rejected with HTTP 429 on a public, unauthenticated
    /// target. Carries guidance on how to get more quota.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// A local wait bound elapsed. The underlying call keeps running.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The operation is not available for this endpoint (e.g. `predict`
    /// on a continuous endpoint).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The job was cancelled before producing a result.
    #[error("job was cancelled")]
    Cancelled,

    // -- Transport-side errors --
    /// Low-level transport failure (connection reset, socket error, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP error with status code and response body.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Invalid JSON received from the server.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Local filesystem failure while materializing or reading a file.
    #[error("file error: {0}")]
    File(String),

    /// Catch-all for errors that fit no other category.
    #[error("{0}")]
    Other(String),
}

/// Convenience result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Create a `Connection` error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create an `Auth` error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create an `InvalidEndpoint` error.
    pub fn invalid_endpoint(message: impl Into<String>) -> Self {
        Self::InvalidEndpoint(message.into())
    }

    /// Create a `RemoteCall` error.
    pub fn remote_call(message: impl Into<String>) -> Self {
        Self::RemoteCall(message.into())
    }

    /// Create a `Transport` error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether this error is terminal for a session (as opposed to a
    /// single call). Used by callers deciding whether to reconnect.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            ClientError::Connection(_)
                | ClientError::Auth(_)
                | ClientError::InvalidState(_)
                | ClientError::UnsupportedVersion(_)
        )
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::InvalidJson(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::File(err.to_string())
    }
}

/// Map a `reqwest` error to the matching [`ClientError`] variant,
/// prefixing the message with `context`.
pub(crate) fn from_reqwest(err: reqwest::Error, context: &str) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(format!("{context}: {err}"))
    } else if err.is_connect() {
        ClientError::Connection(format!("{context}: {err}"))
    } else {
        ClientError::Transport(format!("{context}: {err}"))
    }
}
