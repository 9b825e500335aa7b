//! JSON-RPC 2.0 envelope validation and routing.

use crate::error::{RpcError, codes};
use crate::registry::MethodRegistry;
use mdcheck_store::Store;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const JSONRPC_VERSION: &str = "2.0";

/// Synchronous dispatcher over a read-only method registry.
///
/// When a store is attached, every handled request leaves one performance
/// sample (operation = method name, status = ok/error).
pub struct Dispatcher {
    registry: MethodRegistry,
    store: Option<Arc<Store>>,
}

impl Dispatcher {
    pub fn new(registry: MethodRegistry, store: Option<Arc<Store>>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Handle one JSON-RPC request object, producing a response object.
    pub fn handle(&self, request: &Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);

        let (method, params) = match validate_envelope(request) {
            Ok(parts) => parts,
            Err(e) => return error_response(&e, id),
        };

        let Some(handler) = self.registry.get(method) else {
            let e = RpcError::MethodNotFound(method.to_string());
            return error_response(&e, id);
        };

        let started = Instant::now();
        // A handler that panics must still produce an internal-error
        // response instead of tearing down the transport.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&params)))
            .unwrap_or_else(|panic| {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                Err(RpcError::Internal(detail))
            });
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Some(store) = &self.store {
            let status = if result.is_ok() { "ok" } else { "error" };
            if let Err(e) = store.record_performance(method, duration_ms, status) {
                warn!(method, error = %e, "failed to record performance sample");
            }
        }

        match result {
            Ok(value) => {
                debug!(method, duration_ms, "method handled");
                json!({ "jsonrpc": JSONRPC_VERSION, "result": value, "id": id })
            }
            Err(e) => {
                debug!(method, duration_ms, error = %e, "method failed");
                error_response(&e, id)
            }
        }
    }

    /// Async adapter: run the synchronous dispatcher on the blocking pool so
    /// async callers never stall their executor.
    pub async fn handle_async(self: Arc<Self>, request: Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        tokio::task::spawn_blocking(move || self.handle(&request))
            .await
            .unwrap_or_else(|e| {
                error_response(&RpcError::Internal(format!("worker panicked: {e}")), id)
            })
    }
}

fn validate_envelope(request: &Value) -> Result<(&str, Map<String, Value>), RpcError> {
    let obj = request
        .as_object()
        .ok_or_else(|| RpcError::InvalidRequest("request must be an object".to_string()))?;

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        other => {
            return Err(RpcError::InvalidRequest(format!(
                "invalid JSON-RPC version: {}",
                other.unwrap_or("missing")
            )));
        }
    }

    let method = obj
        .get("method")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| {
            RpcError::InvalidRequest("method must be a non-empty string".to_string())
        })?;

    let params = match obj.get("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(params)) => params.clone(),
        Some(_) => {
            return Err(RpcError::InvalidRequest(
                "params must be an object".to_string(),
            ));
        }
    };

    if !obj.contains_key("id") {
        return Err(RpcError::InvalidRequest("id is required".to_string()));
    }

    Ok((method, params))
}

/// Render an error response envelope.
pub fn error_response(error: &RpcError, id: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "error": { "code": error.code(), "message": error.to_string() },
        "id": id,
    })
}

/// Render a parse-error response for input that was not valid JSON at all.
pub fn parse_error_response(detail: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "error": { "code": codes::PARSE_ERROR, "message": format!("Parse error: {detail}") },
        "id": Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Handler;

    fn dispatcher() -> Dispatcher {
        let mut registry = MethodRegistry::new();
        registry.register(
            "echo",
            Box::new(|params: &Map<String, Value>| Ok(json!({"params": params}))) as Handler,
        );
        registry.register(
            "explode",
            Box::new(|_: &Map<String, Value>| {
                Err(RpcError::NotFound("thing x not found".to_string()))
            }) as Handler,
        );
        Dispatcher::new(registry, None)
    }

    #[test]
    fn routes_to_handler_and_wraps_result() {
        let d = dispatcher();
        let response = d.handle(&json!({
            "jsonrpc": "2.0", "method": "echo", "params": {"a": 1}, "id": 7
        }));

        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"]["params"]["a"], 1);
        assert!(response.get("error").is_none());
    }

    #[test]
    fn missing_params_defaults_to_empty_object() {
        let d = dispatcher();
        let response = d.handle(&json!({"jsonrpc": "2.0", "method": "echo", "id": 1}));
        assert_eq!(response["result"]["params"], json!({}));
    }

    #[test]
    fn unknown_method_returns_32601_with_name_quoted() {
        let d = dispatcher();
        let response = d.handle(&json!({
            "jsonrpc": "2.0", "method": "nope", "params": {}, "id": 1
        }));

        assert_eq!(response["error"]["code"], codes::METHOD_NOT_FOUND);
        assert_eq!(response["error"]["message"], "Method not found: nope");
        assert_eq!(response["id"], 1);
    }

    #[test]
    fn malformed_envelopes_return_32600() {
        let d = dispatcher();

        for request in [
            json!([1, 2, 3]),
            json!({"method": "echo", "id": 1}),
            json!({"jsonrpc": "1.0", "method": "echo", "id": 1}),
            json!({"jsonrpc": "2.0", "method": "", "id": 1}),
            json!({"jsonrpc": "2.0", "method": 5, "id": 1}),
            json!({"jsonrpc": "2.0", "method": "echo", "params": [1], "id": 1}),
            json!({"jsonrpc": "2.0", "method": "echo"}),
        ] {
            let response = d.handle(&request);
            assert_eq!(
                response["error"]["code"],
                codes::INVALID_REQUEST,
                "request: {request}"
            );
        }
    }

    #[test]
    fn typed_errors_map_to_their_codes() {
        let d = dispatcher();
        let response = d.handle(&json!({
            "jsonrpc": "2.0", "method": "explode", "params": {}, "id": "abc"
        }));

        assert_eq!(response["error"]["code"], codes::RESOURCE_NOT_FOUND);
        assert_eq!(response["error"]["message"], "thing x not found");
        assert_eq!(response["id"], "abc");
    }

    #[test]
    fn async_adapter_matches_sync_result() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let d = Arc::new(dispatcher());
        let request = json!({"jsonrpc": "2.0", "method": "echo", "params": {}, "id": 2});

        let sync = d.handle(&request);
        let from_async = runtime.block_on(Arc::clone(&d).handle_async(request));
        assert_eq!(sync, from_async);
    }

    #[test]
    fn panicking_handler_becomes_internal_error() {
        let mut registry = MethodRegistry::new();
        registry.register(
            "kaboom",
            Box::new(|_: &Map<String, Value>| -> Result<Value, RpcError> { panic!("handler bug") })
                as Handler,
        );
        let d = Dispatcher::new(registry, None);

        let response = d.handle(&json!({
            "jsonrpc": "2.0", "method": "kaboom", "params": {}, "id": 9
        }));
        assert_eq!(response["error"]["code"], codes::INTERNAL_ERROR);
        assert!(
            response["error"]["message"]
                .as_str()
                .unwrap()
                .contains("handler bug")
        );
        assert_eq!(response["id"], 9);
    }

    #[test]
    fn parse_error_shape() {
        let response = parse_error_response("unexpected eof");
        assert_eq!(response["error"]["code"], codes::PARSE_ERROR);
        assert_eq!(response["id"], Value::Null);
    }
}
