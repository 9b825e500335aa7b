//! Client adapter behavior: typed calls, error conversion, retry policy.

mod test_support;

use mdcheck::Client;
use mdcheck_rpc::{Dispatcher, MethodRegistry, RpcError};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use test_support::TestEnv;

#[test]
fn typed_sync_calls_work_end_to_end() {
    let env = TestEnv::new("unused");
    let doc = env.write_doc("doc.md", "---\ntitle: T\n---\n# T\n");
    let client = Client::new(&env.server);

    let result = client
        .validate_file(&doc.display().to_string(), None, None)
        .unwrap();
    let id = result["validation_id"].as_str().unwrap().to_string();

    let result = client.approve(std::slice::from_ref(&id)).unwrap();
    assert_eq!(result["approved_count"], 1);

    let listed = client.list_validations(10, 0, Some("approved"), None).unwrap();
    assert_eq!(listed["total"], 1);

    let status = client.get_system_status().unwrap();
    assert!(status["components"].is_object());
}

#[test]
fn domain_errors_are_typed_and_not_retried() {
    let env = TestEnv::new("unused");
    let client = Client::new(&env.server);

    let err = client.get_validation("does-not-exist").unwrap_err();
    assert!(matches!(err, RpcError::NotFound(_)));
    assert_eq!(err.to_string(), "Validation does-not-exist not found");
    assert_eq!(err.http_status(), 404);
    assert_eq!(err.cli_exit_code(), 3);
}

#[test]
fn transient_errors_retry_with_backoff_until_success() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);

    let mut registry = MethodRegistry::new();
    registry.register(
        "flaky",
        Box::new(move |_params| {
            let attempt = seen.fetch_add(1, Ordering::SeqCst);
            if attempt < 2 {
                Err(RpcError::Internal("transient glitch".to_string()))
            } else {
                Ok(json!({"attempt": attempt}))
            }
        }),
    );

    let dispatcher = Arc::new(Dispatcher::new(registry, None));
    let client = Client::with_retries(dispatcher, 3);

    let result = client.call("flaky", json!({})).unwrap();
    assert_eq!(result["attempt"], 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn transient_errors_stop_after_max_retries() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);

    let mut registry = MethodRegistry::new();
    registry.register(
        "always_down",
        Box::new(move |_params| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::Internal("still down".to_string()))
        }),
    );

    let dispatcher = Arc::new(Dispatcher::new(registry, None));
    let client = Client::with_retries(dispatcher, 2);

    let err = client.call("always_down", json!({})).unwrap_err();
    assert!(matches!(err, RpcError::Internal(_)));
    // One initial attempt plus two retries.
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn domain_errors_are_never_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);

    let mut registry = MethodRegistry::new();
    registry.register(
        "gone",
        Box::new(move |_params| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::NotFound("resource gone".to_string()))
        }),
    );

    let dispatcher = Arc::new(Dispatcher::new(registry, None));
    let client = Client::with_retries(dispatcher, 5);

    let err = client.call("gone", json!({})).unwrap_err();
    assert!(matches!(err, RpcError::NotFound(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn async_client_round_trip() {
    let env = TestEnv::new("unused");
    let doc = env.write_doc("doc.md", "---\ntitle: T\n---\n# T\n");
    let client = mdcheck::AsyncClient::new(&env.server);

    let result = client
        .validate_file(&doc.display().to_string())
        .await
        .unwrap();
    let id = result["validation_id"].as_str().unwrap().to_string();

    let result = client.approve(&[id.clone()]).await.unwrap();
    assert_eq!(result["approved_count"], 1);

    let err = client.get_validation("missing").await.unwrap_err();
    assert!(matches!(err, RpcError::NotFound(_)));
}
