//! In-process client adapters.
//!
//! [`Client`] exposes one typed method per registered handler and converts
//! JSON-RPC error objects back into [`RpcError`]. Transient errors
//! (timeouts, internal failures) are retried with exponential backoff
//! (0.1s · 2ⁿ) up to `max_retries`; domain errors are never retried.
//! [`AsyncClient`] runs the same calls on the blocking pool so async
//! callers never stall their executor.

use crate::server::Server;
use mdcheck_rpc::{Dispatcher, RpcError, codes};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

const DEFAULT_MAX_RETRIES: u32 = 3;

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs_f64(0.1 * f64::from(2u32.pow(attempt)))
}

fn unwrap_response(response: Value) -> Result<Value, RpcError> {
    if let Some(error) = response.get("error") {
        let code = error["code"].as_i64().unwrap_or(codes::INTERNAL_ERROR);
        let message = error["message"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string();
        return Err(RpcError::from_code(code, message));
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

/// Synchronous convenience wrapper around the dispatcher.
pub struct Client {
    dispatcher: Arc<Dispatcher>,
    max_retries: u32,
    next_id: AtomicU64,
}

impl Client {
    pub fn new(server: &Server) -> Self {
        Self::with_retries(server.dispatcher(), DEFAULT_MAX_RETRIES)
    }

    pub fn with_retries(dispatcher: Arc<Dispatcher>, max_retries: u32) -> Self {
        Self {
            dispatcher,
            max_retries,
            next_id: AtomicU64::new(1),
        }
    }

    /// Invoke a method by name, retrying transient failures.
    pub fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let mut attempt = 0u32;
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let request = json!({
                "jsonrpc": "2.0", "method": method, "params": params.clone(), "id": id
            });

            match unwrap_response(self.dispatcher.handle(&request)) {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!(method, attempt, error = %e, "request failed, retrying");
                    std::thread::sleep(backoff_delay(attempt));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // --- Validation -----------------------------------------------------

    pub fn validate_folder(&self, folder_path: &str, recursive: bool) -> Result<Value, RpcError> {
        self.call(
            "validate_folder",
            json!({ "folder_path": folder_path, "recursive": recursive }),
        )
    }

    pub fn validate_file(
        &self,
        file_path: &str,
        family: Option<&str>,
        validation_types: Option<&[String]>,
    ) -> Result<Value, RpcError> {
        self.call(
            "validate_file",
            json!({
                "file_path": file_path,
                "family": family,
                "validation_types": validation_types,
            }),
        )
    }

    pub fn validate_content(
        &self,
        content: &str,
        file_path: Option<&str>,
        validation_types: Option<&[String]>,
    ) -> Result<Value, RpcError> {
        self.call(
            "validate_content",
            json!({
                "content": content,
                "file_path": file_path,
                "validation_types": validation_types,
            }),
        )
    }

    pub fn get_validation(&self, validation_id: &str) -> Result<Value, RpcError> {
        self.call("get_validation", json!({ "validation_id": validation_id }))
    }

    pub fn list_validations(
        &self,
        limit: u64,
        offset: u64,
        status: Option<&str>,
        file_path: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "list_validations",
            json!({
                "limit": limit, "offset": offset,
                "status": status, "file_path": file_path,
            }),
        )
    }

    pub fn update_validation(
        &self,
        validation_id: &str,
        notes: Option<&str>,
        status: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "update_validation",
            json!({ "validation_id": validation_id, "notes": notes, "status": status }),
        )
    }

    pub fn delete_validation(&self, validation_id: &str) -> Result<Value, RpcError> {
        self.call("delete_validation", json!({ "validation_id": validation_id }))
    }

    pub fn revalidate(&self, validation_id: &str) -> Result<Value, RpcError> {
        self.call("revalidate", json!({ "validation_id": validation_id }))
    }

    // --- Approval -------------------------------------------------------

    pub fn approve(&self, ids: &[String]) -> Result<Value, RpcError> {
        self.call("approve", json!({ "ids": ids }))
    }

    pub fn reject(&self, ids: &[String], reason: Option<&str>) -> Result<Value, RpcError> {
        self.call("reject", json!({ "ids": ids, "reason": reason }))
    }

    pub fn bulk_approve(&self, ids: &[String], batch_size: u64) -> Result<Value, RpcError> {
        self.call("bulk_approve", json!({ "ids": ids, "batch_size": batch_size }))
    }

    pub fn bulk_reject(
        &self,
        ids: &[String],
        reason: Option<&str>,
        batch_size: u64,
    ) -> Result<Value, RpcError> {
        self.call(
            "bulk_reject",
            json!({ "ids": ids, "reason": reason, "batch_size": batch_size }),
        )
    }

    // --- Enhancement ----------------------------------------------------

    pub fn enhance(&self, ids: &[String]) -> Result<Value, RpcError> {
        self.call("enhance", json!({ "ids": ids }))
    }

    pub fn enhance_batch(
        &self,
        ids: &[String],
        batch_size: u64,
        threshold: f64,
    ) -> Result<Value, RpcError> {
        self.call(
            "enhance_batch",
            json!({ "ids": ids, "batch_size": batch_size, "threshold": threshold }),
        )
    }

    pub fn enhance_preview(&self, validation_id: &str, threshold: f64) -> Result<Value, RpcError> {
        self.call(
            "enhance_preview",
            json!({ "validation_id": validation_id, "threshold": threshold }),
        )
    }

    pub fn enhance_auto_apply(
        &self,
        validation_id: &str,
        threshold: f64,
        preview_first: bool,
    ) -> Result<Value, RpcError> {
        self.call(
            "enhance_auto_apply",
            json!({
                "validation_id": validation_id,
                "threshold": threshold,
                "preview_first": preview_first,
            }),
        )
    }

    pub fn get_enhancement_comparison(&self, validation_id: &str) -> Result<Value, RpcError> {
        self.call(
            "get_enhancement_comparison",
            json!({ "validation_id": validation_id }),
        )
    }

    // --- Recommendations ------------------------------------------------

    pub fn generate_recommendations(
        &self,
        validation_id: &str,
        threshold: f64,
        types: Option<&[String]>,
    ) -> Result<Value, RpcError> {
        self.call(
            "generate_recommendations",
            json!({ "validation_id": validation_id, "threshold": threshold, "types": types }),
        )
    }

    pub fn rebuild_recommendations(
        &self,
        validation_id: &str,
        threshold: f64,
    ) -> Result<Value, RpcError> {
        self.call(
            "rebuild_recommendations",
            json!({ "validation_id": validation_id, "threshold": threshold }),
        )
    }

    pub fn get_recommendations(
        &self,
        validation_id: &str,
        status: Option<&str>,
        kind: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "get_recommendations",
            json!({ "validation_id": validation_id, "status": status, "type": kind }),
        )
    }

    pub fn review_recommendation(
        &self,
        recommendation_id: &str,
        action: &str,
        notes: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "review_recommendation",
            json!({
                "recommendation_id": recommendation_id,
                "action": action,
                "notes": notes,
            }),
        )
    }

    pub fn bulk_review_recommendations(
        &self,
        recommendation_ids: &[String],
        action: &str,
        notes: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "bulk_review_recommendations",
            json!({
                "recommendation_ids": recommendation_ids,
                "action": action,
                "notes": notes,
            }),
        )
    }

    pub fn apply_recommendations(
        &self,
        validation_id: &str,
        recommendation_ids: Option<&[String]>,
        dry_run: bool,
        create_backup: bool,
    ) -> Result<Value, RpcError> {
        self.call(
            "apply_recommendations",
            json!({
                "validation_id": validation_id,
                "recommendation_ids": recommendation_ids,
                "dry_run": dry_run,
                "create_backup": create_backup,
            }),
        )
    }

    pub fn delete_recommendation(&self, recommendation_id: &str) -> Result<Value, RpcError> {
        self.call(
            "delete_recommendation",
            json!({ "recommendation_id": recommendation_id }),
        )
    }

    pub fn mark_recommendations_applied(
        &self,
        recommendation_ids: &[String],
    ) -> Result<Value, RpcError> {
        self.call(
            "mark_recommendations_applied",
            json!({ "recommendation_ids": recommendation_ids }),
        )
    }

    // --- Workflows ------------------------------------------------------

    pub fn create_workflow(
        &self,
        workflow_type: &str,
        params: Value,
        name: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "create_workflow",
            json!({ "workflow_type": workflow_type, "params": params, "name": name }),
        )
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Result<Value, RpcError> {
        self.call("get_workflow", json!({ "workflow_id": workflow_id }))
    }

    pub fn list_workflows(
        &self,
        limit: u64,
        offset: u64,
        status: Option<&str>,
        workflow_type: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "list_workflows",
            json!({
                "limit": limit, "offset": offset,
                "status": status, "workflow_type": workflow_type,
            }),
        )
    }

    pub fn control_workflow(&self, workflow_id: &str, action: &str) -> Result<Value, RpcError> {
        self.call(
            "control_workflow",
            json!({ "workflow_id": workflow_id, "action": action }),
        )
    }

    pub fn get_workflow_report(
        &self,
        workflow_id: &str,
        include_details: bool,
    ) -> Result<Value, RpcError> {
        self.call(
            "get_workflow_report",
            json!({ "workflow_id": workflow_id, "include_details": include_details }),
        )
    }

    pub fn get_workflow_summary(&self, workflow_id: &str) -> Result<Value, RpcError> {
        self.call("get_workflow_summary", json!({ "workflow_id": workflow_id }))
    }

    pub fn delete_workflow(&self, workflow_id: &str, force: bool) -> Result<Value, RpcError> {
        self.call(
            "delete_workflow",
            json!({ "workflow_id": workflow_id, "force": force }),
        )
    }

    pub fn bulk_delete_workflows(&self, filters: Value) -> Result<Value, RpcError> {
        self.call("bulk_delete_workflows", filters)
    }

    // --- Admin and queries ----------------------------------------------

    pub fn get_system_status(&self) -> Result<Value, RpcError> {
        self.call("get_system_status", json!({}))
    }

    pub fn clear_cache(&self, cache_types: Option<&[String]>) -> Result<Value, RpcError> {
        self.call("clear_cache", json!({ "cache_types": cache_types }))
    }

    pub fn get_cache_stats(&self) -> Result<Value, RpcError> {
        self.call("get_cache_stats", json!({}))
    }

    pub fn cleanup_cache(&self, max_age_hours: u64) -> Result<Value, RpcError> {
        self.call("cleanup_cache", json!({ "max_age_hours": max_age_hours }))
    }

    pub fn rebuild_cache(&self) -> Result<Value, RpcError> {
        self.call("rebuild_cache", json!({}))
    }

    pub fn reload_agent(&self, agent_id: &str) -> Result<Value, RpcError> {
        self.call("reload_agent", json!({ "agent_id": agent_id }))
    }

    pub fn run_gc(&self) -> Result<Value, RpcError> {
        self.call("run_gc", json!({}))
    }

    pub fn enable_maintenance_mode(
        &self,
        reason: Option<&str>,
        enabled_by: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "enable_maintenance_mode",
            json!({ "reason": reason, "enabled_by": enabled_by }),
        )
    }

    pub fn disable_maintenance_mode(&self) -> Result<Value, RpcError> {
        self.call("disable_maintenance_mode", json!({}))
    }

    pub fn create_checkpoint(
        &self,
        name: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<Value, RpcError> {
        self.call(
            "create_checkpoint",
            json!({ "name": name, "metadata": metadata }),
        )
    }

    pub fn get_stats(&self) -> Result<Value, RpcError> {
        self.call("get_stats", json!({}))
    }

    pub fn get_audit_log(&self, limit: u64, offset: u64) -> Result<Value, RpcError> {
        self.call("get_audit_log", json!({ "limit": limit, "offset": offset }))
    }

    pub fn get_performance_report(
        &self,
        time_range: &str,
        operation: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "get_performance_report",
            json!({ "time_range": time_range, "operation": operation }),
        )
    }

    pub fn get_health_report(&self) -> Result<Value, RpcError> {
        self.call("get_health_report", json!({}))
    }

    pub fn get_validation_history(&self, file_path: &str, limit: u64) -> Result<Value, RpcError> {
        self.call(
            "get_validation_history",
            json!({ "file_path": file_path, "limit": limit }),
        )
    }

    pub fn get_available_validators(
        &self,
        validator_type: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "get_available_validators",
            json!({ "validator_type": validator_type }),
        )
    }

    pub fn export_validation(
        &self,
        validation_id: &str,
        include_recommendations: bool,
    ) -> Result<Value, RpcError> {
        self.call(
            "export_validation",
            json!({
                "validation_id": validation_id,
                "include_recommendations": include_recommendations,
            }),
        )
    }

    pub fn export_recommendations(&self, validation_id: &str) -> Result<Value, RpcError> {
        self.call(
            "export_recommendations",
            json!({ "validation_id": validation_id }),
        )
    }

    pub fn export_workflow(
        &self,
        workflow_id: &str,
        include_validations: bool,
    ) -> Result<Value, RpcError> {
        self.call(
            "export_workflow",
            json!({ "workflow_id": workflow_id, "include_validations": include_validations }),
        )
    }
}

/// Async convenience wrapper: submits the synchronous client to the
/// blocking pool and awaits the result, so callers on a cooperative
/// scheduler never block their event loop.
pub struct AsyncClient {
    inner: Arc<Client>,
}

impl AsyncClient {
    pub fn new(server: &Server) -> Self {
        Self {
            inner: Arc::new(Client::new(server)),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            inner: Arc::new(client),
        }
    }

    /// Invoke a method by name on the worker pool. Retry and backoff live
    /// in the synchronous client underneath.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let inner = Arc::clone(&self.inner);
        let method = method.to_string();
        tokio::task::spawn_blocking(move || inner.call(&method, params))
            .await
            .unwrap_or_else(|e| Err(RpcError::Internal(format!("worker panicked: {e}"))))
    }

    pub async fn validate_folder(
        &self,
        folder_path: &str,
        recursive: bool,
    ) -> Result<Value, RpcError> {
        self.call(
            "validate_folder",
            json!({ "folder_path": folder_path, "recursive": recursive }),
        )
        .await
    }

    pub async fn validate_file(&self, file_path: &str) -> Result<Value, RpcError> {
        self.call("validate_file", json!({ "file_path": file_path }))
            .await
    }

    pub async fn validate_content(
        &self,
        content: &str,
        file_path: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "validate_content",
            json!({ "content": content, "file_path": file_path }),
        )
        .await
    }

    pub async fn get_validation(&self, validation_id: &str) -> Result<Value, RpcError> {
        self.call("get_validation", json!({ "validation_id": validation_id }))
            .await
    }

    pub async fn list_validations(&self, limit: u64, offset: u64) -> Result<Value, RpcError> {
        self.call("list_validations", json!({ "limit": limit, "offset": offset }))
            .await
    }

    pub async fn approve(&self, ids: &[String]) -> Result<Value, RpcError> {
        self.call("approve", json!({ "ids": ids })).await
    }

    pub async fn reject(&self, ids: &[String], reason: Option<&str>) -> Result<Value, RpcError> {
        self.call("reject", json!({ "ids": ids, "reason": reason }))
            .await
    }

    pub async fn enhance(&self, ids: &[String]) -> Result<Value, RpcError> {
        self.call("enhance", json!({ "ids": ids })).await
    }

    pub async fn enhance_preview(&self, validation_id: &str) -> Result<Value, RpcError> {
        self.call("enhance_preview", json!({ "validation_id": validation_id }))
            .await
    }

    pub async fn generate_recommendations(
        &self,
        validation_id: &str,
        threshold: f64,
    ) -> Result<Value, RpcError> {
        self.call(
            "generate_recommendations",
            json!({ "validation_id": validation_id, "threshold": threshold }),
        )
        .await
    }

    pub async fn apply_recommendations(
        &self,
        validation_id: &str,
        dry_run: bool,
    ) -> Result<Value, RpcError> {
        self.call(
            "apply_recommendations",
            json!({ "validation_id": validation_id, "dry_run": dry_run }),
        )
        .await
    }

    pub async fn create_workflow(
        &self,
        workflow_type: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        self.call(
            "create_workflow",
            json!({ "workflow_type": workflow_type, "params": params }),
        )
        .await
    }

    pub async fn get_workflow_summary(&self, workflow_id: &str) -> Result<Value, RpcError> {
        self.call("get_workflow_summary", json!({ "workflow_id": workflow_id }))
            .await
    }

    pub async fn control_workflow(
        &self,
        workflow_id: &str,
        action: &str,
    ) -> Result<Value, RpcError> {
        self.call(
            "control_workflow",
            json!({ "workflow_id": workflow_id, "action": action }),
        )
        .await
    }

    pub async fn get_system_status(&self) -> Result<Value, RpcError> {
        self.call("get_system_status", json!({})).await
    }

    pub async fn get_stats(&self) -> Result<Value, RpcError> {
        self.call("get_stats", json!({})).await
    }

    pub async fn get_health_report(&self) -> Result<Value, RpcError> {
        self.call("get_health_report", json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_100ms() {
        assert_eq!(backoff_delay(0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn unwrap_response_maps_error_objects() {
        let ok = json!({"jsonrpc": "2.0", "result": {"x": 1}, "id": 1});
        assert_eq!(unwrap_response(ok).unwrap()["x"], 1);

        let err = json!({
            "jsonrpc": "2.0",
            "error": {"code": -32001, "message": "Validation v not found"},
            "id": 1
        });
        let e = unwrap_response(err).unwrap_err();
        assert_eq!(e.code(), codes::RESOURCE_NOT_FOUND);
        assert!(!e.is_transient());
    }
}
