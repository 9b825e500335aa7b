//! File, content, and folder validation methods.

use super::Context;
use mdcheck_rpc::{HandlerResult, RpcError, params};
use mdcheck_store::{ValidationFilter, ValidationStatus};
use mdcheck_utils::fs as mdfs;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// `validate_folder(folder_path, recursive=true)`
pub(crate) fn validate_folder(ctx: &Context, p: &params::Params) -> HandlerResult {
    let folder_path = params::require_str(p, "folder_path")?;
    let recursive = params::opt_bool(p, "recursive", true)?;

    let folder = Path::new(folder_path);
    if !folder.exists() {
        return Err(RpcError::NotFound(format!(
            "Folder does not exist: {folder_path}"
        )));
    }

    info!(folder_path, recursive, "validating folder");
    let report = ctx.ingestion.ingest_folder(folder, recursive);

    Ok(json!({
        "success": true,
        "message": format!("Validated {} files", report.files_processed),
        "results": serde_json::to_value(&report)?,
    }))
}

/// `validate_file(file_path, family="words", validation_types=null)`
pub(crate) fn validate_file(ctx: &Context, p: &params::Params) -> HandlerResult {
    let file_path = params::require_str(p, "file_path")?;
    // Accepted for interface compatibility; the detector decides the family.
    let _family = params::opt_str(p, "family")?.unwrap_or("words");
    let validation_types = params::opt_string_list(p, "validation_types")?.unwrap_or_default();

    let path = Path::new(file_path);
    if !path.exists() {
        return Err(RpcError::NotFound(format!("File not found: {file_path}")));
    }

    info!(file_path, "validating file");
    let content = mdfs::read_text(path).map_err(|e| RpcError::Internal(e.to_string()))?;
    let analysis = ctx.ingestion.analyze(path, &content);

    // Every invocation persists a fresh record; revalidation never
    // overwrites earlier outcomes.
    let record = ctx
        .ingestion
        .persist(&analysis, file_path, content, validation_types, None)?;

    Ok(json!({
        "success": true,
        "validation_id": record.id,
        "status": record.status,
        "severity": record.severity,
        "findings": analysis.findings().collect::<Vec<_>>(),
        "file_path": file_path,
    }))
}

/// `validate_content(content, file_path="temp.md", validation_types=null)`
pub(crate) fn validate_content(ctx: &Context, p: &params::Params) -> HandlerResult {
    let content = params::require_str(p, "content")?;
    let file_path = params::opt_str(p, "file_path")?.unwrap_or("temp.md");
    let validation_types = params::opt_string_list(p, "validation_types")?.unwrap_or_default();

    info!(file_path, "validating content for virtual path");

    // The content goes through a scoped temp file so family detection and
    // the pipeline see a real document; the temp is released on all exit
    // paths when it drops.
    let mut temp = tempfile::Builder::new()
        .suffix(".md")
        .tempfile()
        .map_err(|e| RpcError::Internal(e.to_string()))?;
    temp.write_all(content.as_bytes())
        .map_err(|e| RpcError::Internal(e.to_string()))?;
    temp.flush().map_err(|e| RpcError::Internal(e.to_string()))?;

    let analysis = ctx.ingestion.analyze(temp.path(), content);
    let record = ctx.ingestion.persist(
        &analysis,
        file_path,
        content.to_string(),
        validation_types,
        None,
    )?;

    Ok(json!({
        "success": true,
        "validation_id": record.id,
        "status": record.status,
        "severity": record.severity,
        "findings": analysis.findings().collect::<Vec<_>>(),
    }))
}

/// `get_validation(validation_id)`
pub(crate) fn get_validation(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;

    let record = ctx
        .store
        .get_validation(validation_id)?
        .ok_or_else(|| RpcError::NotFound(format!("Validation {validation_id} not found")))?;

    Ok(json!({ "validation": serde_json::to_value(&record)? }))
}

/// `list_validations(limit=100, offset=0, status?, file_path?)`
pub(crate) fn list_validations(ctx: &Context, p: &params::Params) -> HandlerResult {
    let limit = params::opt_u64(p, "limit", 100)? as usize;
    let offset = params::opt_u64(p, "offset", 0)? as usize;
    let status = parse_status(params::opt_str(p, "status")?)?;
    let file_path = params::opt_string(p, "file_path")?;

    let (records, total) = ctx.store.list_validations(&ValidationFilter {
        limit,
        offset,
        status,
        file_path,
    })?;

    Ok(json!({
        "validations": serde_json::to_value(&records)?,
        "total": total,
        "limit": limit,
        "offset": offset,
    }))
}

/// `update_validation(validation_id, notes?, status?)`
pub(crate) fn update_validation(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;
    let notes = params::opt_str(p, "notes")?;
    let status = parse_status(params::opt_str(p, "status")?)?;

    let updated = ctx.store.update_validation(validation_id, notes, status)?;
    if !updated {
        return Err(RpcError::NotFound(format!(
            "Validation {validation_id} not found"
        )));
    }

    info!(validation_id, "updated validation");
    Ok(json!({ "success": true, "validation_id": validation_id }))
}

/// `delete_validation(validation_id)` — idempotent hard delete.
pub(crate) fn delete_validation(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;

    if ctx.store.delete_validation(validation_id)? {
        info!(validation_id, "deleted validation");
    }

    Ok(json!({ "success": true, "validation_id": validation_id }))
}

/// `revalidate(validation_id)` — rerun against the original path; the
/// original record is left untouched.
pub(crate) fn revalidate(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;

    let original = ctx
        .store
        .get_validation(validation_id)?
        .ok_or_else(|| RpcError::NotFound(format!("Validation {validation_id} not found")))?;

    let rerun_params: params::Params = json!({
        "file_path": original.file_path,
        "validation_types": original.validation_types,
    })
    .as_object()
    .cloned()
    .unwrap_or_default();

    let result = validate_file(ctx, &rerun_params)?;
    let new_validation_id = result["validation_id"].clone();

    info!(
        original = validation_id,
        new = %new_validation_id,
        "revalidated"
    );

    Ok(json!({
        "success": true,
        "new_validation_id": new_validation_id,
        "original_validation_id": validation_id,
    }))
}

fn parse_status(raw: Option<&str>) -> Result<Option<ValidationStatus>, RpcError> {
    raw.map(|s| {
        ValidationStatus::from_str(&s.to_lowercase())
            .map_err(|_| RpcError::InvalidParams(format!("Invalid status: {s}")))
    })
    .transpose()
}
