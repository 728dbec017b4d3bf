//! End-to-end predict tests: serialization, post-processing, uploads,
//! downloads, and error classification.

mod common;

use appcall_rs::{AppClient, ClientBuilder, ClientError};
use common::{start_mock_app, MockAppOptions};
use serde_json::json;

#[tokio::test]
async fn calculator_predict_returns_the_sum() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    let result = client
        .predict("/predict", vec![json!(5), json!("add"), json!(4)])
        .await
        .unwrap();
    assert_eq!(result, json!(9.0));
}

#[tokio::test]
async fn predict_resolves_numeric_indices() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    let result = client
        .predict(0usize, vec![json!(10), json!("subtract"), json!(3)])
        .await
        .unwrap();
    assert_eq!(result, json!(7.0));
}

#[tokio::test]
async fn skipped_outputs_collapse_to_a_bare_value() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    // The endpoint declares two outputs, the second being hidden state:
    // the caller sees the first value alone, not a 1-tuple.
    let result = client.predict("/echo_state", vec![json!(3)]).await.unwrap();
    assert_eq!(result, json!("echo 3"));
}

#[tokio::test]
async fn continuous_endpoints_reject_predict() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    match client.predict("/ticker", vec![]).await {
        Err(ClientError::UnsupportedOperation(msg)) => {
            assert!(msg.contains("submit"), "{msg}")
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn server_reported_errors_surface_as_remote_call() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    match client.predict("/fail", vec![json!(1)]).await {
        Err(ClientError::RemoteCall(msg)) => assert_eq!(msg, "boom"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn file_arguments_are_uploaded_and_substituted() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "some words here").unwrap();

    let client = AppClient::connect(&base_url).await.unwrap();

    // The endpoint echoes back the server path it received: proof the
    // local path was uploaded and rewritten before submission.
    let result = client
        .predict("/wordcount", vec![json!(notes.to_str().unwrap())])
        .await
        .unwrap();
    let path = result.as_str().unwrap();
    assert!(path.starts_with("uploads/"), "{path}");
    assert!(path.ends_with("notes.txt"), "{path}");
}

#[tokio::test]
async fn file_outputs_are_materialized_locally() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let out_dir = tempfile::tempdir().unwrap();

    let client = ClientBuilder::new(base_url.as_str())
        .output_dir(out_dir.path())
        .connect()
        .await
        .unwrap();

    let result = client.predict("/download", vec![]).await.unwrap();
    let local_path = result.as_str().unwrap();
    assert!(local_path.starts_with(out_dir.path().to_str().unwrap()));
    assert!(local_path.ends_with("hello.txt"));
    assert_eq!(
        std::fs::read_to_string(local_path).unwrap(),
        "hello from the app"
    );
}

#[tokio::test]
async fn repeated_downloads_get_disambiguated_names() {
    let (base_url, _server) = start_mock_app(MockAppOptions::sse()).await;
    let out_dir = tempfile::tempdir().unwrap();

    let client = ClientBuilder::new(base_url.as_str())
        .output_dir(out_dir.path())
        .connect()
        .await
        .unwrap();

    let first = client.predict("/download", vec![]).await.unwrap();
    let second = client.predict("/download", vec![]).await.unwrap();
    assert!(first.as_str().unwrap().ends_with("hello.txt"));
    assert!(second.as_str().unwrap().ends_with("hello_1.txt"));
}

#[tokio::test]
async fn legacy_http_predict_round_trips() {
    let (base_url, _server) = start_mock_app(MockAppOptions::legacy_http()).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    let result = client
        .predict("/predict", vec![json!(5), json!("add"), json!(4)])
        .await
        .unwrap();
    assert_eq!(result, json!(9.0));
}

#[tokio::test]
async fn rate_limited_public_target_raises_rate_limit() {
    let options = MockAppOptions {
        rate_limited: true,
        ..MockAppOptions::legacy_http()
    };
    let (base_url, _server) = start_mock_app(options).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    match client
        .predict("/predict", vec![json!(1), json!("add"), json!(1)])
        .await
    {
        Err(ClientError::RateLimit(msg)) => {
            assert!(msg.contains("authenticate"), "{msg}");
            assert!(msg.contains("duplicate"), "{msg}");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn rate_limited_authenticated_target_raises_remote_call() {
    let options = MockAppOptions {
        rate_limited: true,
        ..MockAppOptions::legacy_http()
    };
    let (base_url, _server) = start_mock_app(options).await;

    // Auth headers mark the session authenticated: the 429 is reported
    // as a plain remote failure, not the public-quota guidance.
    let client = ClientBuilder::new(base_url.as_str())
        .header("authorization", "Bearer abc")
        .connect()
        .await
        .unwrap();

    match client
        .predict("/predict", vec![json!(1), json!("add"), json!(1)])
        .await
    {
        Err(ClientError::RemoteCall(_)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn rate_limited_sse_submission_raises_rate_limit() {
    let options = MockAppOptions {
        rate_limited: true,
        ..MockAppOptions::sse()
    };
    let (base_url, _server) = start_mock_app(options).await;
    let client = AppClient::connect(&base_url).await.unwrap();

    match client
        .predict("/predict", vec![json!(1), json!("add"), json!(1)])
        .await
    {
        Err(ClientError::RateLimit(_)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}
