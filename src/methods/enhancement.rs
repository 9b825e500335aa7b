//! Enhancement methods: apply, preview, batch, auto-apply, comparison.

use super::Context;
use mdcheck_enhance::EnhanceError;
use mdcheck_rpc::{HandlerResult, RpcError, params};
use mdcheck_store::ValidationStatus;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::info;

/// Map engine errors onto the wire taxonomy: absent resources are
/// not-found, gating violations are validation failures, everything else
/// is internal.
fn enhance_err(e: EnhanceError) -> RpcError {
    match e {
        EnhanceError::NotFound { .. } | EnhanceError::FileNotFound { .. } => {
            RpcError::NotFound(e.to_string())
        }
        EnhanceError::NotApproved { .. }
        | EnhanceError::InvalidFilePath { .. }
        | EnhanceError::UnsafePath { .. }
        | EnhanceError::NotWritable { .. }
        | EnhanceError::NotEnhanced { .. } => RpcError::ValidationFailed(e.to_string()),
        EnhanceError::Failed { .. } => RpcError::Internal(e.to_string()),
    }
}

fn diff_value(report: &mdcheck_utils::diff::DiffReport) -> Value {
    serde_json::to_value(report).unwrap_or(Value::Null)
}

/// `enhance(ids)` — per-id outcomes; one failure never aborts the batch.
pub(crate) fn enhance(ctx: &Context, p: &params::Params) -> HandlerResult {
    let ids = params::require_string_list(p, "ids")?;

    let mut enhanced_count = 0usize;
    let mut errors: Vec<String> = Vec::new();
    let mut enhancements: Vec<Value> = Vec::new();

    info!(count = ids.len(), "enhancing validation records");

    for validation_id in &ids {
        match ctx.enhancer.enhance_one(validation_id) {
            Ok(outcome) => {
                enhanced_count += 1;
                enhancements.push(serde_json::to_value(&outcome)?);
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    let _ = ctx.store.record_audit(
        "enhance",
        None,
        if errors.is_empty() { "ok" } else { "partial" },
        json!({ "requested": ids.len(), "enhanced": enhanced_count }),
    );

    info!(enhanced_count, total = ids.len(), "enhancement pass complete");

    Ok(json!({
        "success": true,
        "enhanced_count": enhanced_count,
        "errors": errors,
        "enhancements": enhancements,
    }))
}

/// `enhance_batch(ids, batch_size=10, threshold=0.7)`
pub(crate) fn enhance_batch(ctx: &Context, p: &params::Params) -> HandlerResult {
    let started = Instant::now();
    let ids = params::require_string_list(p, "ids")?;
    let batch_size = (params::opt_u64(p, "batch_size", 10)? as usize).max(1);
    // Advisory until recommendation-driven enhancement is wired in.
    let _threshold = params::opt_f64(p, "threshold", 0.7)?;

    let total = ids.len();
    let mut enhanced_count = 0usize;
    let mut failed_count = 0usize;
    let mut skipped_count = 0usize;
    let mut errors: Vec<String> = Vec::new();
    let mut results: Vec<Value> = Vec::new();

    info!(total, batch_size, "batch enhancing validations");

    for (batch_index, chunk) in ids.chunks(batch_size).enumerate() {
        for validation_id in chunk {
            match ctx.enhancer.enhance_one(validation_id) {
                Ok(_) => {
                    enhanced_count += 1;
                    results.push(json!({ "validation_id": validation_id, "status": "enhanced" }));
                }
                Err(e @ EnhanceError::NotApproved { .. }) => {
                    skipped_count += 1;
                    errors.push(e.to_string());
                }
                Err(e) => {
                    failed_count += 1;
                    errors.push(e.to_string());
                }
            }
        }
        let processed = ((batch_index + 1) * batch_size).min(total);
        info!(processed, total, "batch enhancement progress");
    }

    Ok(json!({
        "success": enhanced_count > 0,
        "total": total,
        "enhanced_count": enhanced_count,
        "failed_count": failed_count,
        "skipped_count": skipped_count,
        "errors": errors,
        "results": results,
        "processing_time_ms": started.elapsed().as_secs_f64() * 1000.0,
    }))
}

/// `enhance_preview(validation_id, threshold=0.7, recommendation_types?)`
/// — no file writes, no record mutation.
pub(crate) fn enhance_preview(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;
    let _threshold = params::opt_f64(p, "threshold", 0.7)?;
    let _recommendation_types = params::opt_string_list(p, "recommendation_types")?;

    info!(validation_id, "previewing enhancement");

    let preview = ctx
        .enhancer
        .preview(validation_id)
        .map_err(enhance_err)?;

    Ok(json!({
        "success": true,
        "validation_id": validation_id,
        "original_content": preview.original_content,
        "enhanced_content": preview.enhanced_content,
        "diff": diff_value(&preview.diff),
        "changes_summary": {
            "additions": preview.diff.additions_count,
            "deletions": preview.diff.deletions_count,
            "modifications": preview.diff.modifications_count,
        },
    }))
}

/// `enhance_auto_apply(validation_id, threshold=0.9, recommendation_types?,
/// preview_first=true)` — the threshold and type filter are advisory at
/// this layer.
pub(crate) fn enhance_auto_apply(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;
    let threshold = params::opt_f64(p, "threshold", 0.9)?;
    let _recommendation_types = params::opt_string_list(p, "recommendation_types")?;
    let preview_first = params::opt_bool(p, "preview_first", true)?;

    info!(validation_id, threshold, "auto-applying enhancement");

    let record = ctx
        .store
        .get_validation(validation_id)?
        .ok_or_else(|| RpcError::NotFound(format!("Validation {validation_id} not found")))?;

    let preview = if preview_first {
        let preview = ctx
            .enhancer
            .preview(validation_id)
            .map_err(enhance_err)?;
        Some(json!({
            "original_content": preview.original_content,
            "enhanced_content": preview.enhanced_content,
            "diff": diff_value(&preview.diff),
        }))
    } else {
        None
    };

    if record.status != ValidationStatus::Approved {
        return Ok(json!({
            "success": false,
            "validation_id": validation_id,
            "applied_count": 0,
            "skipped_count": 1,
            "applied_recommendations": [],
            "preview": preview,
        }));
    }

    let applied = match ctx.enhancer.enhance_one(validation_id) {
        Ok(_) => 1,
        Err(_) => 0,
    };

    Ok(json!({
        "success": applied > 0,
        "validation_id": validation_id,
        "applied_count": applied,
        "skipped_count": 1 - applied,
        "applied_recommendations": [],
        "preview": preview,
    }))
}

/// `get_enhancement_comparison(validation_id, format="unified")`
pub(crate) fn get_enhancement_comparison(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;
    let _format = params::opt_str(p, "format")?.unwrap_or("unified");

    let comparison = ctx
        .enhancer
        .comparison(validation_id)
        .map_err(enhance_err)?;

    Ok(json!({
        "validation_id": validation_id,
        "original_content": comparison.original_content,
        "enhanced_content": comparison.enhanced_content,
        "diff": diff_value(&comparison.diff),
        "statistics": {
            "lines_added": comparison.diff.additions_count,
            "lines_removed": comparison.diff.deletions_count,
            "lines_modified": comparison.diff.modifications_count,
            "total_changes": comparison.diff.total_changes,
        },
        "recommendations_applied": [],
    }))
}
