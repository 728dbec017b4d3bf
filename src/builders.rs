//! Builder for configured client connections.

use std::path::PathBuf;

use crate::client::AppClient;
use crate::error::ClientResult;

/// Default bound on concurrently executing calls.
pub const DEFAULT_MAX_WORKERS: usize = 40;

/// Builder for an [`AppClient`] connection.
///
/// # Example
///
/// ```no_run
/// use appcall_rs::ClientBuilder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ClientBuilder::new("https://example.com/app")
///     .auth("user", "secret")
///     .max_workers(8)
///     .output_dir("/tmp/app-outputs")
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    pub(crate) src: String,
    pub(crate) auth: Option<(String, String)>,
    pub(crate) max_workers: usize,
    pub(crate) output_dir: PathBuf,
    pub(crate) headers: Vec<(String, String)>,
}

impl ClientBuilder {
    /// Start a builder targeting the app at `src` (a full http(s) URL).
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            auth: None,
            max_workers: DEFAULT_MAX_WORKERS,
            output_dir: default_output_dir(),
            headers: Vec::new(),
        }
    }

    /// Login credentials, required before any other request when the
    /// target app is password-protected.
    pub fn auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((username.into(), password.into()));
        self
    }

    /// Maximum number of concurrently executing calls. Submissions
    /// beyond the bound queue locally.
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Directory where file-valued outputs are materialized.
    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Add a header sent with every request (e.g. a bearer token).
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Connect: login if configured, fetch the configuration, and build
    /// the endpoint table.
    pub async fn connect(self) -> ClientResult<AppClient> {
        AppClient::connect_with(self).await
    }
}

/// `APPCALL_TEMP_DIR` when set, otherwise a crate-named directory under
/// the system temp dir.
fn default_output_dir() -> PathBuf {
    std::env::var("APPCALL_TEMP_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("appcall"))
}
