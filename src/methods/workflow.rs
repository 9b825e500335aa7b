//! Workflow methods: creation, inspection, control, deletion.

use super::Context;
use chrono::{DateTime, Utc};
use mdcheck_rpc::{HandlerResult, RpcError, params};
use mdcheck_store::{Workflow, WorkflowFilter, WorkflowState, WorkflowType, ts_millis};
use serde_json::{Value, json};
use std::str::FromStr;
use tracing::info;

fn serialize_workflow(workflow: &Workflow) -> Value {
    json!({
        "id": workflow.id,
        "workflow_type": workflow.workflow_type,
        "name": workflow.metadata["name"],
        "description": workflow.metadata["description"],
        "status": workflow.state,
        "params": workflow.input_params,
        "progress": workflow.progress_percent,
        "current_step": workflow.current_step,
        "total_steps": workflow.total_steps,
        "error_message": workflow.error_message,
        "metadata": workflow.metadata,
        "created_at": ts_millis::to_string(&workflow.created_at),
        "updated_at": ts_millis::to_string(&workflow.updated_at),
        "completed_at": workflow.completed_at.map(|ts| ts_millis::to_string(&ts)),
    })
}

fn parse_datetime(raw: &str, key: &str) -> Result<DateTime<Utc>, RpcError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RpcError::InvalidParams(format!("Parameter '{key}' must be an RFC 3339 timestamp")))
}

/// `create_workflow(workflow_type, params, name?, description?)`
pub(crate) fn create_workflow(ctx: &Context, p: &params::Params) -> HandlerResult {
    let workflow_type = params::require_str(p, "workflow_type")?;
    let workflow_params = params::require_object(p, "params")?;
    let name = params::opt_string(p, "name")?;
    let description = params::opt_string(p, "description")?;

    info!(workflow_type, "creating workflow");
    let workflow = ctx.workflows.create(
        workflow_type,
        Value::Object(workflow_params.clone()),
        name,
        description,
    )?;

    Ok(json!({
        "success": true,
        "workflow_id": workflow.id,
        "workflow_type": workflow.workflow_type,
        "status": workflow.state,
        "created_at": ts_millis::to_string(&workflow.created_at),
    }))
}

/// `get_workflow(workflow_id)`
pub(crate) fn get_workflow(ctx: &Context, p: &params::Params) -> HandlerResult {
    let workflow_id = params::require_str(p, "workflow_id")?;
    let workflow = ctx.workflows.get(workflow_id)?;
    Ok(json!({ "workflow": serialize_workflow(&workflow) }))
}

/// `list_workflows(limit=100, offset=0, status?, workflow_type?,
/// created_after?, created_before?)`
pub(crate) fn list_workflows(ctx: &Context, p: &params::Params) -> HandlerResult {
    let limit = params::opt_u64(p, "limit", 100)? as usize;
    let offset = params::opt_u64(p, "offset", 0)? as usize;

    let state = params::opt_str(p, "status")?
        .map(|s| {
            WorkflowState::from_str(&s.to_lowercase())
                .map_err(|_| RpcError::InvalidParams(format!("Invalid status: {s}")))
        })
        .transpose()?;
    let workflow_type = params::opt_str(p, "workflow_type")?
        .map(|s| {
            WorkflowType::from_str(s)
                .map_err(|_| RpcError::InvalidParams(format!("Invalid workflow type: {s}")))
        })
        .transpose()?;
    let created_after = params::opt_str(p, "created_after")?
        .map(|raw| parse_datetime(raw, "created_after"))
        .transpose()?;
    let created_before = params::opt_str(p, "created_before")?
        .map(|raw| parse_datetime(raw, "created_before"))
        .transpose()?;

    let (workflows, total) = ctx.store.list_workflows(&WorkflowFilter {
        limit,
        offset,
        state,
        workflow_type,
        created_after,
        created_before,
    })?;

    Ok(json!({
        "workflows": workflows.iter().map(serialize_workflow).collect::<Vec<_>>(),
        "total": total,
        "limit": limit,
        "offset": offset,
    }))
}

/// `control_workflow(workflow_id, action ∈ {pause, resume, cancel})`
pub(crate) fn control_workflow(ctx: &Context, p: &params::Params) -> HandlerResult {
    let workflow_id = params::require_str(p, "workflow_id")?;
    let action = params::require_str(p, "action")?;

    info!(workflow_id, action, "controlling workflow");

    let new_status = match action {
        "pause" => ctx.workflows.pause(workflow_id)?,
        "resume" => ctx.workflows.resume(workflow_id)?,
        "cancel" => ctx.workflows.cancel(workflow_id)?,
        other => {
            return Err(RpcError::InvalidParams(format!(
                "Invalid action: {other}. Must be 'pause', 'resume', or 'cancel'"
            )));
        }
    };

    Ok(json!({
        "success": true,
        "workflow_id": workflow_id,
        "action": action,
        "new_status": new_status,
    }))
}

/// `get_workflow_report(workflow_id, include_details=true)`
pub(crate) fn get_workflow_report(ctx: &Context, p: &params::Params) -> HandlerResult {
    let workflow_id = params::require_str(p, "workflow_id")?;
    let include_details = params::opt_bool(p, "include_details", true)?;

    let report = ctx.workflows.report(workflow_id, include_details)?;
    Ok(json!({ "workflow_id": workflow_id, "report": report }))
}

/// `get_workflow_summary(workflow_id)`
pub(crate) fn get_workflow_summary(ctx: &Context, p: &params::Params) -> HandlerResult {
    let workflow_id = params::require_str(p, "workflow_id")?;

    let summary = ctx.workflows.summary(workflow_id)?;

    Ok(json!({
        "workflow_id": workflow_id,
        "status": summary.status,
        "progress_percent": summary.progress_percent,
        "files_processed": summary.files_processed,
        "files_total": summary.files_total,
        "errors_count": summary.errors_count,
        "duration_seconds": summary.duration_seconds,
        "eta_seconds": summary.eta_seconds,
    }))
}

/// `delete_workflow(workflow_id, force=false)` — refuses a running
/// workflow unless forced, in which case it is cancelled first.
pub(crate) fn delete_workflow(ctx: &Context, p: &params::Params) -> HandlerResult {
    let workflow_id = params::require_str(p, "workflow_id")?;
    let force = params::opt_bool(p, "force", false)?;

    info!(workflow_id, force, "deleting workflow");
    ctx.workflows.delete(workflow_id, force)?;

    let _ = ctx.store.record_audit(
        "delete_workflow",
        None,
        "ok",
        json!({ "workflow_id": workflow_id, "force": force }),
    );

    Ok(json!({ "success": true, "workflow_id": workflow_id }))
}

/// `bulk_delete_workflows(workflow_ids? | status? | workflow_type? |
/// created_before?, force=false)`
pub(crate) fn bulk_delete_workflows(ctx: &Context, p: &params::Params) -> HandlerResult {
    let workflow_ids = params::opt_string_list(p, "workflow_ids")?;
    let force = params::opt_bool(p, "force", false)?;

    let targets: Vec<Workflow> = match workflow_ids {
        Some(ids) => {
            let mut workflows = Vec::new();
            for id in &ids {
                if let Ok(workflow) = ctx.workflows.get(id) {
                    workflows.push(workflow);
                }
            }
            workflows
        }
        None => {
            let state = params::opt_str(p, "status")?
                .map(|s| {
                    WorkflowState::from_str(&s.to_lowercase())
                        .map_err(|_| RpcError::InvalidParams(format!("Invalid status: {s}")))
                })
                .transpose()?;
            let workflow_type = params::opt_str(p, "workflow_type")?
                .map(|s| {
                    WorkflowType::from_str(s).map_err(|_| {
                        RpcError::InvalidParams(format!("Invalid workflow type: {s}"))
                    })
                })
                .transpose()?;
            let created_before = params::opt_str(p, "created_before")?
                .map(|raw| parse_datetime(raw, "created_before"))
                .transpose()?;

            let (workflows, _) = ctx.store.list_workflows(&WorkflowFilter {
                limit: 10_000,
                offset: 0,
                state,
                workflow_type,
                created_after: None,
                created_before,
            })?;
            workflows
        }
    };

    info!(count = targets.len(), "bulk deleting workflows");

    let mut deleted_count = 0usize;
    let mut errors: Vec<Value> = Vec::new();

    for workflow in &targets {
        match ctx.workflows.delete(&workflow.id, force) {
            Ok(()) => deleted_count += 1,
            Err(e) => errors.push(json!({
                "workflow_id": workflow.id,
                "error": e.to_string(),
            })),
        }
    }

    Ok(json!({
        "success": true,
        "deleted_count": deleted_count,
        "errors": errors,
    }))
}
