//! The main client: connects to a remote interactive app, builds the
//! endpoint table, and submits calls.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, SET_COOKIE};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::builders::ClientBuilder;
use crate::error::{from_reqwest, ClientError, ClientResult};
use crate::types::AppConfig;
use crate::utils::{
    API_INFO_URL, API_URL, CONFIG_URL, LOGIN_URL, SSE_DATA_URL, SSE_URL, UPLOAD_URL, WS_URL,
};

use super::api_info::{derive_api_info, fetch_api_info, render_api_info, ApiInfo};
use super::endpoint::{Endpoint, EndpointContext};
use super::job::{Communicator, Job, ResultSlot};

/// Attempts made against a provisioning (503) target before giving up.
const PROVISIONING_ATTEMPTS: u32 = 10;

/// Delay between provisioning retries.
const PROVISIONING_DELAY: Duration = Duration::from_secs(2);

/// How a caller refers to an endpoint.
///
/// `Auto` resolves only when the app exposes exactly one valid named
/// endpoint. Converts from `&str` (a name with leading slash) and
/// `usize` (an index).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EndpointRef {
    /// Use the app's only valid named endpoint.
    #[default]
    Auto,
    /// Leading-slash endpoint name, e.g. `"/predict"`.
    Name(String),
    /// Endpoint index in declaration order.
    Index(usize),
}

impl From<&str> for EndpointRef {
    fn from(name: &str) -> Self {
        EndpointRef::Name(name.to_string())
    }
}

impl From<String> for EndpointRef {
    fn from(name: String) -> Self {
        EndpointRef::Name(name)
    }
}

impl From<usize> for EndpointRef {
    fn from(index: usize) -> Self {
        EndpointRef::Index(index)
    }
}

type ResultCallback = Box<dyn FnOnce(&ClientResult<Value>) + Send>;

/// Client for one remote interactive app.
///
/// Connecting fetches the app configuration once, builds one
/// [`Endpoint`] per declared dependency, and draws a fresh random
/// session identifier shared by every call made through this client.
///
/// # Example
///
/// ```no_run
/// use appcall_rs::client::AppClient;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = AppClient::connect("http://localhost:7860").await?;
///
/// // Blocking call:
/// let sum = client
///     .predict("/predict", vec![json!(5), json!("add"), json!(4)])
///     .await?;
/// assert_eq!(sum, json!(9.0));
///
/// // Background call with streamed partial results:
/// let mut job = client.submit("/count", vec![json!(3)])?;
/// while let Some(output) = job.next_output().await {
///     println!("{output}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct AppClient {
    src: String,
    config: AppConfig,
    endpoints: Vec<Arc<Endpoint>>,
    api_info: ApiInfo,
    session_hash: Mutex<String>,
    limiter: Arc<Semaphore>,
    authenticated: bool,
}

impl fmt::Debug for AppClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppClient")
            .field("src", &self.src)
            .field("endpoints", &self.endpoints.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for AppClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.view_api())
    }
}

impl AppClient {
    /// Connect to the app hosted at `src` with default settings.
    ///
    /// Use [`ClientBuilder`] for authentication, custom headers, worker
    /// bounds, or a different output directory.
    pub async fn connect(src: &str) -> ClientResult<Self> {
        ClientBuilder::new(src).connect().await
    }

    pub(crate) async fn connect_with(options: ClientBuilder) -> ClientResult<Self> {
        let src = normalize_src(&options.src)?;
        let authenticated = options.auth.is_some() || !options.headers.is_empty();

        let cookie_header = match &options.auth {
            Some((username, password)) => Some(login(&src, username, password).await?),
            None => None,
        };

        let http = build_http_client(&options.headers, cookie_header.as_deref());

        let config = fetch_config(&http, &src).await?;
        if config.major_version() < 3 {
            return Err(ClientError::UnsupportedVersion(format!(
                "the app reports version {}; 3.x or newer is required",
                config.version
            )));
        }

        let ctx = EndpointContext {
            http: http.clone(),
            root_url: src.clone(),
            api_url: format!("{src}{API_URL}"),
            sse_url: format!("{src}{SSE_URL}"),
            sse_data_url: format!("{src}{SSE_DATA_URL}"),
            ws_url: format!("{}{}", src.replacen("http", "ws", 1), WS_URL),
            upload_url: format!("{src}{UPLOAD_URL}"),
            output_dir: options.output_dir.clone(),
            authenticated,
        };

        let endpoints: Vec<Arc<Endpoint>> = config
            .dependencies
            .iter()
            .enumerate()
            .map(|(fn_index, dependency)| {
                Arc::new(Endpoint::build(&ctx, &config, fn_index, dependency))
            })
            .collect();

        // Schemas are help text only: fall back to a local derivation
        // for old servers or when the info route misbehaves.
        let api_info = if config.version_at_least(3, 37, 0) {
            match fetch_api_info(&http, &format!("{src}{API_INFO_URL}")).await {
                Ok(api_info) => api_info,
                Err(e) => {
                    warn!(error = %e, "could not fetch api info, deriving from config");
                    derive_api_info(&config)
                }
            }
        } else {
            derive_api_info(&config)
        };

        info!(
            src = %src,
            version = %config.version,
            endpoints = endpoints.len(),
            "connected to app"
        );

        Ok(Self {
            src,
            config,
            endpoints,
            api_info,
            session_hash: Mutex::new(uuid::Uuid::new_v4().to_string()),
            limiter: Arc::new(Semaphore::new(options.max_workers)),
            authenticated,
        })
    }

    /// The normalized app URL this client talks to (trailing slash).
    pub fn src(&self) -> &str {
        &self.src
    }

    /// Whether this session carries credentials (login or auth headers).
    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    /// The configuration snapshot fetched at connect time.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Structured call signatures for every endpoint.
    pub fn api_info(&self) -> &ApiInfo {
        &self.api_info
    }

    /// Human-readable usage info for every endpoint.
    pub fn view_api(&self) -> String {
        render_api_info(&self.api_info)
    }

    /// Look up an endpoint descriptor.
    pub fn endpoint(&self, endpoint: impl Into<EndpointRef>) -> ClientResult<&Endpoint> {
        let fn_index = self.infer_fn_index(&endpoint.into())?;
        Ok(&self.endpoints[fn_index])
    }

    /// The current session identifier.
    pub fn session_hash(&self) -> String {
        self.session_hash.lock().expect("session hash lock").clone()
    }

    /// Replace the session identifier with a fresh one. In-flight jobs
    /// keep the identifier they were submitted with.
    pub fn reset_session(&self) {
        let mut hash = self.session_hash.lock().expect("session hash lock");
        *hash = uuid::Uuid::new_v4().to_string();
        debug!(session_hash = %hash, "session reset");
    }

    /// Call an endpoint and wait for its result.
    ///
    /// Continuous endpoints are rejected — they may never complete, so
    /// they are only callable through [`submit`](Self::submit).
    pub async fn predict(
        &self,
        endpoint: impl Into<EndpointRef>,
        args: Vec<Value>,
    ) -> ClientResult<Value> {
        let fn_index = self.infer_fn_index(&endpoint.into())?;
        if self.endpoints[fn_index].is_continuous() {
            return Err(ClientError::UnsupportedOperation(
                "this endpoint may run forever; call submit instead of predict".to_string(),
            ));
        }
        let job = self.spawn_call(fn_index, args, None);
        job.result().await
    }

    /// Submit a call and return a [`Job`] handle immediately.
    ///
    /// The call runs on the client's bounded worker pool; submissions
    /// beyond the bound queue locally until a worker frees up.
    pub fn submit(
        &self,
        endpoint: impl Into<EndpointRef>,
        args: Vec<Value>,
    ) -> ClientResult<Job> {
        let fn_index = self.infer_fn_index(&endpoint.into())?;
        Ok(self.spawn_call(fn_index, args, None))
    }

    /// Like [`submit`](Self::submit), with a callback invoked once the
    /// call reaches a terminal state.
    pub fn submit_with_callback<F>(
        &self,
        endpoint: impl Into<EndpointRef>,
        args: Vec<Value>,
        callback: F,
    ) -> ClientResult<Job>
    where
        F: FnOnce(&ClientResult<Value>) + Send + 'static,
    {
        let fn_index = self.infer_fn_index(&endpoint.into())?;
        Ok(self.spawn_call(fn_index, args, Some(Box::new(callback))))
    }

    /// Resolve an endpoint reference to an index.
    fn infer_fn_index(&self, endpoint: &EndpointRef) -> ClientResult<usize> {
        match endpoint {
            EndpointRef::Name(name) => self
                .endpoints
                .iter()
                .find(|e| e.api_name() == Some(name.as_str()))
                .map(|e| e.fn_index())
                .ok_or_else(|| {
                    ClientError::InvalidEndpoint(format!(
                        "no endpoint named {name} (note: endpoint names carry a leading \
                         slash, e.g. \"/predict\")"
                    ))
                }),
            EndpointRef::Index(index) => match self.endpoints.get(*index) {
                Some(e) if e.is_valid() => Ok(*index),
                _ => Err(ClientError::InvalidEndpoint(format!(
                    "invalid function index {index}"
                ))),
            },
            EndpointRef::Auto => {
                let mut valid = self
                    .endpoints
                    .iter()
                    .filter(|e| e.is_valid() && e.api_name().is_some());
                match (valid.next(), valid.next()) {
                    (Some(only), None) => Ok(only.fn_index()),
                    (None, _) => Err(ClientError::AmbiguousEndpoint(
                        "this app exposes no valid named endpoints; specify an index"
                            .to_string(),
                    )),
                    _ => Err(ClientError::AmbiguousEndpoint(
                        "this app has multiple endpoints; specify a name or index".to_string(),
                    )),
                }
            }
        }
    }

    /// Spawn the background worker for one call.
    fn spawn_call(&self, fn_index: usize, args: Vec<Value>, callback: Option<ResultCallback>) -> Job {
        let endpoint = Arc::clone(&self.endpoints[fn_index]);
        let communicator = endpoint
            .protocol()
            .has_communicator()
            .then(|| Arc::new(Communicator::new()));
        let session_hash = self.session_hash();
        let slot = ResultSlot::new();
        let started = Arc::new(AtomicBool::new(false));

        let limiter = Arc::clone(&self.limiter);
        let worker_slot = Arc::clone(&slot);
        let worker_comm = communicator.clone();
        let worker_started = Arc::clone(&started);

        let handle = tokio::spawn(async move {
            let _permit = match limiter.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            worker_started.store(true, Ordering::SeqCst);

            let result = endpoint
                .run(args, &session_hash, worker_comm.as_deref())
                .await;
            if let Some(callback) = callback {
                callback(&result);
            }
            worker_slot.set(result);
        });

        Job::new(handle, slot, communicator, started)
    }
}

/// Require an absolute http(s) URL and normalize to a trailing slash.
fn normalize_src(src: &str) -> ClientResult<String> {
    if !src.starts_with("http://") && !src.starts_with("https://") {
        return Err(ClientError::Connection(format!(
            "src must be a full URL including the scheme, got {src}"
        )));
    }
    Ok(if src.ends_with('/') {
        src.to_string()
    } else {
        format!("{src}/")
    })
}

fn build_http_client(
    headers: &[(String, String)],
    cookie_header: Option<&str>,
) -> reqwest::Client {
    let mut default_headers = HeaderMap::new();
    for (key, value) in headers {
        if let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            default_headers.insert(name, val);
        }
    }
    if let Some(cookie) = cookie_header {
        if let Ok(val) = HeaderValue::from_str(cookie) {
            default_headers.insert(COOKIE, val);
        }
    }

    reqwest::Client::builder()
        .default_headers(default_headers)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Form-post credentials and collect the session cookies required for
/// every later request.
async fn login(src: &str, username: &str, password: &str) -> ClientResult<String> {
    let response = reqwest::Client::new()
        .post(format!("{src}{LOGIN_URL}"))
        .form(&[("username", username), ("password", password)])
        .send()
        .await
        .map_err(|e| from_reqwest(e, "login request failed"))?;

    if !response.status().is_success() {
        return Err(ClientError::Auth(format!(
            "login rejected by {src} (HTTP {})",
            response.status().as_u16()
        )));
    }

    let cookies: Vec<String> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::to_string)
        .collect();

    if cookies.is_empty() {
        return Err(ClientError::Auth(format!(
            "login to {src} returned no session cookie"
        )));
    }
    Ok(cookies.join("; "))
}

/// Fetch the config snapshot, waiting out a bounded provisioning window.
async fn fetch_config(http: &reqwest::Client, src: &str) -> ClientResult<AppConfig> {
    let url = format!("{src}{CONFIG_URL}");

    for attempt in 0..PROVISIONING_ATTEMPTS {
        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| from_reqwest(e, "could not fetch app config"))?;

        let status = response.status();
        match status.as_u16() {
            401 => {
                return Err(ClientError::Auth(format!(
                    "{src} requires login credentials"
                )))
            }
            503 => {
                debug!(attempt, "app is still provisioning, waiting");
                tokio::time::sleep(PROVISIONING_DELAY).await;
            }
            _ if !status.is_success() => {
                return Err(ClientError::Connection(format!(
                    "config fetch from {url} failed with HTTP {}",
                    status.as_u16()
                )))
            }
            _ => {
                return response.json().await.map_err(|e| {
                    ClientError::Connection(format!("could not parse app config: {e}"))
                })
            }
        }
    }

    Err(ClientError::InvalidState(format!(
        "{src} was still provisioning after {PROVISIONING_ATTEMPTS} attempts; try again later \
         or contact the app owner"
    )))
}
