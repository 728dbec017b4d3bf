//! Protocol constants: server route suffixes and component tables.

/// Route for the configuration snapshot.
pub const CONFIG_URL: &str = "config";

/// Route for plain request/response calls (legacy, non-queued).
pub const API_URL: &str = "api/predict/";

/// Route the event stream is opened against.
pub const SSE_URL: &str = "queue/join";

/// Route call payloads are posted to while the event stream is open.
pub const SSE_DATA_URL: &str = "queue/data";

/// Route for the legacy websocket queue.
pub const WS_URL: &str = "queue/join";

/// Route for batched multipart file uploads.
pub const UPLOAD_URL: &str = "upload";

/// Route for form-based login.
pub const LOGIN_URL: &str = "login";

/// Route for per-endpoint parameter/return schemas.
pub const API_INFO_URL: &str = "info";

/// Prefix for downloading reference-valued outputs:
/// `GET {root}/file={path}`.
pub const FILE_URL_PREFIX: &str = "file=";

/// Component type whose value is session state, filled server-side.
pub const STATE_COMPONENT: &str = "state";

/// Layout-only component types that never carry call data. Used when a
/// component has no explicit `skip_api` flag.
pub const SKIP_COMPONENTS: &[&str] = &[
    "state",
    "row",
    "column",
    "tabs",
    "tab",
    "tabitem",
    "box",
    "form",
    "accordion",
    "group",
    "interpretation",
    "dataset",
];
