//! Shared test utilities: an in-process mock app server speaking the
//! three wire protocols.
#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Which wire protocol the mock app advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockProtocol {
    /// Current protocol: SSE stream + data POST.
    Sse,
    /// Legacy websocket queue.
    LegacyWs,
    /// Legacy non-queued request/response.
    LegacyHttp,
}

/// Knobs for one mock app instance.
#[derive(Debug, Clone)]
pub struct MockAppOptions {
    pub protocol: MockProtocol,
    /// Config route answers 401 without the login cookie.
    pub auth_required: bool,
    /// Every call submission answers HTTP 429.
    pub rate_limited: bool,
    /// Version string reported by the config.
    pub version: String,
}

impl Default for MockAppOptions {
    fn default() -> Self {
        Self {
            protocol: MockProtocol::Sse,
            auth_required: false,
            rate_limited: false,
            version: "3.44.1".to_string(),
        }
    }
}

impl MockAppOptions {
    pub fn sse() -> Self {
        Self::default()
    }

    pub fn legacy_ws() -> Self {
        Self {
            protocol: MockProtocol::LegacyWs,
            version: "3.16.2".to_string(),
            ..Self::default()
        }
    }

    pub fn legacy_http() -> Self {
        Self {
            protocol: MockProtocol::LegacyHttp,
            version: "3.16.2".to_string(),
            ..Self::default()
        }
    }
}

struct AppState {
    options: MockAppOptions,
    /// Open event streams keyed by `{session_hash}:{fn_index}`.
    pending: Mutex<HashMap<String, mpsc::Sender<String>>>,
}

/// Start a mock app server on an ephemeral port. Returns its base URL
/// (no trailing slash) and the serve task handle.
pub async fn start_mock_app(options: MockAppOptions) -> (String, JoinHandle<()>) {
    let protocol = options.protocol;
    let state = Arc::new(AppState {
        options,
        pending: Mutex::new(HashMap::new()),
    });

    let mut router = Router::new()
        .route("/config", get(config_handler))
        .route("/info", get(info_handler))
        .route("/login", post(login_handler))
        .route("/upload", post(upload_handler))
        .route("/api/predict/", post(predict_handler))
        .route("/queue/data", post(queue_data_handler));

    router = match protocol {
        MockProtocol::Sse => router.route("/queue/join", get(queue_join_sse)),
        MockProtocol::LegacyWs => router.route("/queue/join", get(queue_join_ws)),
        MockProtocol::LegacyHttp => router,
    };

    let app = router.fallback(file_handler).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), handle)
}

// ---------------------------------------------------------------------------
// Config / info / login
// ---------------------------------------------------------------------------

fn mock_config(options: &MockAppOptions) -> Value {
    let queue_enabled = options.protocol != MockProtocol::LegacyHttp;
    let mut config = json!({
        "version": options.version,
        "components": [
            {"id": 1, "type": "number"},
            {"id": 2, "type": "radio"},
            {"id": 3, "type": "number"},
            {"id": 4, "type": "state"},
            {"id": 5, "type": "textbox"},
            {
                "id": 6,
                "type": "file",
                "api_info": {"info": {"type": "string", "description": "filepath or URL to file"}, "serialized_info": true}
            },
        ],
        "dependencies": [
            {"inputs": [1, 2, 3], "outputs": [1], "api_name": "predict", "backend_fn": true, "queue": queue_enabled},
            {"inputs": [1], "outputs": [5], "api_name": "count", "backend_fn": true, "queue": queue_enabled, "types": {"generator": true}},
            {"inputs": [], "outputs": [5], "api_name": "ticker", "backend_fn": true, "queue": queue_enabled, "types": {"continuous": true}},
            {"inputs": [1], "outputs": [5, 4], "api_name": "echo_state", "backend_fn": true, "queue": queue_enabled},
            {"inputs": [6], "outputs": [5], "api_name": "wordcount", "backend_fn": true, "queue": queue_enabled},
            {"inputs": [1], "outputs": [1], "api_name": "fail", "backend_fn": true, "queue": queue_enabled},
            {"inputs": [1], "outputs": [1], "api_name": false, "backend_fn": true, "queue": queue_enabled},
            {"inputs": [], "outputs": [6], "api_name": "download", "backend_fn": true, "queue": queue_enabled},
        ],
    });
    if options.protocol == MockProtocol::Sse {
        config["protocol"] = json!("sse");
    } else {
        config["enable_queue"] = json!(options.protocol == MockProtocol::LegacyWs);
    }
    config
}

async fn config_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if state.options.auth_required && !has_session_cookie(&headers) {
        return (StatusCode::UNAUTHORIZED, "login required").into_response();
    }
    Json(mock_config(&state.options)).into_response()
}

fn has_session_cookie(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("session=abc123"))
        .unwrap_or(false)
}

async fn info_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if state.options.auth_required && !has_session_cookie(&headers) {
        return (StatusCode::UNAUTHORIZED, "login required").into_response();
    }
    Json(json!({
        "named_endpoints": {
            "/predict": {
                "parameters": [
                    {"label": "num1", "python_type": {"type": "int | float", "description": "numeric value"}, "component": "Number", "example_input": 5},
                    {"label": "operation", "python_type": {"type": "str"}, "component": "Radio", "example_input": "add"},
                    {"label": "num2", "python_type": {"type": "int | float", "description": "numeric value"}, "component": "Number", "example_input": 4},
                ],
                "returns": [
                    {"label": "output", "python_type": {"type": "int | float", "description": "numeric value"}, "component": "Number"},
                ]
            }
        },
        "unnamed_endpoints": {}
    }))
    .into_response()
}

async fn login_handler(
    axum::extract::Form(form): axum::extract::Form<HashMap<String, String>>,
) -> Response {
    let username = form.get("username").map(String::as_str);
    let password = form.get("password").map(String::as_str);
    if username == Some("admin") && password == Some("sekret") {
        (
            [(header::SET_COOKIE, "session=abc123; Path=/; HttpOnly")],
            "ok",
        )
            .into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "bad credentials").into_response()
    }
}

// ---------------------------------------------------------------------------
// Upload / file download
// ---------------------------------------------------------------------------

async fn upload_handler(mut multipart: Multipart) -> Response {
    let mut paths = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("files") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("file").to_string();
        let bytes = field.bytes().await.unwrap_or_default();
        if bytes.is_empty() {
            return (StatusCode::BAD_REQUEST, "empty upload").into_response();
        }
        paths.push(format!("uploads/{}_{}", paths.len(), file_name));
    }
    Json(paths).into_response()
}

async fn file_handler(uri: Uri) -> Response {
    match uri.path().strip_prefix("/file=") {
        Some("files/hello.txt") => "hello from the app".into_response(),
        Some(_) => (StatusCode::NOT_FOUND, "no such file").into_response(),
        None => (StatusCode::NOT_FOUND, "no such route").into_response(),
    }
}

// ---------------------------------------------------------------------------
// Call execution scripts
// ---------------------------------------------------------------------------

fn calculate(data: &[Value]) -> Value {
    let a = data.first().and_then(Value::as_f64).unwrap_or(0.0);
    let op = data.get(1).and_then(Value::as_str).unwrap_or("add");
    let b = data.get(2).and_then(Value::as_f64).unwrap_or(0.0);
    let result = match op {
        "add" => a + b,
        "subtract" => a - b,
        "multiply" => a * b,
        "divide" => a / b,
        _ => f64::NAN,
    };
    json!(result)
}

fn completed(data: Vec<Value>) -> Value {
    json!({"msg": "process_completed", "success": true, "output": {"data": data, "is_generating": false}})
}

fn generating(data: Vec<Value>) -> Value {
    json!({"msg": "process_generating", "success": true, "output": {"data": data, "is_generating": true}})
}

/// The finite event scripts, shared by the SSE and websocket mocks.
/// The ticker endpoint (fn_index 2) is unbounded and handled separately.
fn script_for(fn_index: u64, data: &[Value]) -> Vec<Value> {
    let mut events = vec![
        json!({"msg": "estimation", "rank": 0, "queue_size": 1, "rank_eta": 0.5}),
        json!({"msg": "process_starts"}),
    ];
    match fn_index {
        0 => events.push(completed(vec![calculate(data)])),
        1 => {
            let n = data.first().and_then(Value::as_u64).unwrap_or(0);
            for i in 0..n {
                events.push(generating(vec![json!(i.to_string())]));
            }
            let last = n.saturating_sub(1).to_string();
            events.push(completed(vec![json!(last)]));
        }
        3 => {
            let a = data.first().cloned().unwrap_or(Value::Null);
            events.push(completed(vec![json!(format!("echo {a}")), Value::Null]));
        }
        4 => {
            let path = data
                .first()
                .and_then(|v| v.get("path"))
                .cloned()
                .unwrap_or(Value::Null);
            events.push(completed(vec![path]));
        }
        5 => events.push(json!({
            "msg": "process_completed", "success": false, "output": {"error": "boom"}
        })),
        7 => events.push(completed(vec![json!({"path": "files/hello.txt"})])),
        _ => events.push(completed(vec![Value::Null])),
    }
    events
}

// ---------------------------------------------------------------------------
// SSE protocol
// ---------------------------------------------------------------------------

async fn queue_join_sse(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let key = format!(
        "{}:{}",
        params.get("session_hash").cloned().unwrap_or_default(),
        params.get("fn_index").cloned().unwrap_or_default()
    );
    let (tx, mut rx) = mpsc::channel::<String>(64);
    state.pending.lock().unwrap().insert(key, tx);

    Sse::new(async_stream::stream! {
        while let Some(message) = rx.recv().await {
            yield Ok(Event::default().data(message));
        }
    })
}

async fn queue_data_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Value>,
) -> Response {
    if state.options.rate_limited {
        return (StatusCode::TOO_MANY_REQUESTS, "too many requests (429)").into_response();
    }

    let fn_index = request["fn_index"].as_u64().unwrap_or(0);
    let session_hash = request["session_hash"].as_str().unwrap_or_default();
    let data: Vec<Value> = request["data"].as_array().cloned().unwrap_or_default();
    let key = format!("{session_hash}:{fn_index}");

    let Some(tx) = state.pending.lock().unwrap().get(&key).cloned() else {
        return (StatusCode::BAD_REQUEST, "no open event stream for call").into_response();
    };

    tokio::spawn(async move {
        if fn_index == 2 {
            // Unbounded ticker: emit until the client goes away.
            for i in 0..600u32 {
                let event = generating(vec![json!(format!("tick {i}"))]);
                if tx.send(event.to_string()).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            return;
        }
        for event in script_for(fn_index, &data) {
            if tx.send(event.to_string()).await.is_err() {
                return;
            }
        }
    });

    StatusCode::OK.into_response()
}

// ---------------------------------------------------------------------------
// Legacy websocket protocol
// ---------------------------------------------------------------------------

async fn queue_join_ws(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let _ = socket
        .send(WsMessage::Text(r#"{"msg": "send_hash"}"#.into()))
        .await;
    // Hash envelope: {fn_index, session_hash}. Only receipt matters here.
    let Some(Ok(WsMessage::Text(_hash))) = socket.recv().await else {
        return;
    };

    let estimation = json!({"msg": "estimation", "rank": 0, "queue_size": 1, "rank_eta": 0.5});
    let _ = socket
        .send(WsMessage::Text(estimation.to_string().into()))
        .await;
    let _ = socket
        .send(WsMessage::Text(r#"{"msg": "send_data"}"#.into()))
        .await;

    let Some(Ok(WsMessage::Text(payload))) = socket.recv().await else {
        return;
    };
    let request: Value = match serde_json::from_str(payload.as_str()) {
        Ok(request) => request,
        Err(_) => return,
    };

    if state.options.rate_limited {
        let event = json!({
            "msg": "process_completed", "success": false,
            "output": {"error": "429: too many requests"}
        });
        let _ = socket.send(WsMessage::Text(event.to_string().into())).await;
        return;
    }

    let fn_index = request["fn_index"].as_u64().unwrap_or(0);
    let data: Vec<Value> = request["data"].as_array().cloned().unwrap_or_default();

    if fn_index == 2 {
        for i in 0..600u32 {
            let event = generating(vec![json!(format!("tick {i}"))]);
            if socket
                .send(WsMessage::Text(event.to_string().into()))
                .await
                .is_err()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        return;
    }

    // Skip the estimation/process_starts prefix the SSE script carries;
    // estimation already went out during the handshake.
    for event in script_for(fn_index, &data).into_iter().skip(1) {
        if socket
            .send(WsMessage::Text(event.to_string().into()))
            .await
            .is_err()
        {
            return;
        }
    }
    let _ = socket.send(WsMessage::Close(None)).await;
}

// ---------------------------------------------------------------------------
// Legacy plain request/response
// ---------------------------------------------------------------------------

async fn predict_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Value>,
) -> Response {
    if state.options.rate_limited {
        return (StatusCode::TOO_MANY_REQUESTS, "too many requests (429)").into_response();
    }

    let fn_index = request["fn_index"].as_u64().unwrap_or(0);
    let data: Vec<Value> = request["data"].as_array().cloned().unwrap_or_default();

    let output = match fn_index {
        0 => json!({"data": [calculate(&data)]}),
        3 => {
            let a = data.first().cloned().unwrap_or(Value::Null);
            json!({"data": [format!("echo {a}"), null]})
        }
        5 => json!({"error": "boom"}),
        _ => json!({"data": [null]}),
    };
    Json(output).into_response()
}
