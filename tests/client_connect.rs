//! Connection and endpoint-resolution tests against the mock app.

mod common;

use appcall_rs::client::Protocol;
use appcall_rs::{AppClient, ClientBuilder, ClientError, EndpointRef};
use common::{start_mock_app, MockAppOptions};

#[tokio::test]
async fn connect_builds_the_endpoint_table() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    assert_eq!(client.src(), format!("{base_url}/"));
    assert_eq!(client.config().dependencies.len(), 8);

    let predict = client.endpoint("/predict").unwrap();
    assert_eq!(predict.fn_index(), 0);
    assert!(predict.is_valid());
    assert_eq!(predict.protocol(), Protocol::EventStream);

    let ticker = client.endpoint("/ticker").unwrap();
    assert!(ticker.is_continuous());

    // Session identifier is UUID-shaped and stable until reset.
    let hash = client.session_hash();
    assert_eq!(hash.len(), 36);
    assert_eq!(hash, client.session_hash());
}

#[tokio::test]
async fn connect_requires_a_full_url() {
    match AppClient::connect("not-a-url").await {
        Err(ClientError::Connection(msg)) => assert!(msg.contains("scheme")),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_server_is_a_connection_error() {
    // Nothing listens on port 9: the TCP connect fails.
    match AppClient::connect("http://127.0.0.1:9").await {
        Err(ClientError::Connection(_)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn protected_app_rejects_anonymous_config_fetch() {
    let options = MockAppOptions {
        auth_required: true,
        ..MockAppOptions::sse()
    };
    let (base_url, _server) = start_mock_app(options).await;

    match AppClient::connect(&base_url).await {
        Err(ClientError::Auth(_)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn login_with_bad_credentials_is_rejected() {
    let options = MockAppOptions {
        auth_required: true,
        ..MockAppOptions::sse()
    };
    let (base_url, _server) = start_mock_app(options).await;

    match ClientBuilder::new(base_url.as_str())
        .auth("admin", "wrong")
        .connect()
        .await
    {
        Err(ClientError::Auth(msg)) => assert!(msg.contains("rejected")),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn login_with_good_credentials_succeeds() {
    let options = MockAppOptions {
        auth_required: true,
        ..MockAppOptions::sse()
    };
    let (base_url, _server) = start_mock_app(options).await;

    let client = ClientBuilder::new(base_url.as_str())
        .auth("admin", "sekret")
        .connect()
        .await
        .unwrap();
    assert!(client.authenticated());
    assert!(client.endpoint("/predict").is_ok());
}

#[tokio::test]
async fn pre_3x_servers_are_unsupported() {
    let options = MockAppOptions {
        version: "2.9.1".to_string(),
        ..MockAppOptions::sse()
    };
    let (base_url, _server) = start_mock_app(options).await;

    match AppClient::connect(&base_url).await {
        Err(ClientError::UnsupportedVersion(msg)) => assert!(msg.contains("2.9.1")),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn name_resolution_follows_the_leading_slash_form() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    assert_eq!(client.endpoint("/predict").unwrap().fn_index(), 0);

    match client.endpoint("/nonexistent") {
        Err(ClientError::InvalidEndpoint(msg)) => {
            assert!(msg.contains("leading slash"), "{msg}")
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn disabled_endpoints_are_invalid() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    // Dependency 6 has api_name = false.
    match client.endpoint(6usize) {
        Err(ClientError::InvalidEndpoint(_)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn auto_resolution_is_ambiguous_with_many_names() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    match client.endpoint(EndpointRef::Auto) {
        Err(ClientError::AmbiguousEndpoint(_)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn reset_session_does_not_disturb_the_endpoint_table() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    let before = client.session_hash();
    client.reset_session();
    assert_ne!(before, client.session_hash());
    assert!(client.endpoint("/predict").is_ok());
}

#[tokio::test]
async fn view_api_renders_fetched_schemas() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    let text = client.view_api();
    assert!(text.contains("Named API endpoints: 1"));
    assert!(text.contains("api_name=\"/predict\""));
    assert!(text.contains("[Number] num1: int | float (numeric value)"));

    let info = client.api_info();
    assert_eq!(info.named_endpoints["/predict"].parameters.len(), 3);
}

#[tokio::test]
async fn legacy_servers_derive_schemas_locally() {
    let (base_url, _server) = start_mock_app(MockAppOptions::legacy_http()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    // Version 3.16 predates the info route; the schema comes from the
    // config component table instead.
    let info = client.api_info();
    assert!(info.named_endpoints.contains_key("/predict"));
    assert_eq!(info.named_endpoints["/predict"].parameters.len(), 3);
}
