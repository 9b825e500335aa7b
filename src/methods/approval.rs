//! Approval state transitions, single and batched.

use super::Context;
use mdcheck_rpc::{HandlerResult, params};
use mdcheck_store::ValidationStatus;
use serde_json::json;
use std::time::Instant;
use tracing::{error, info};

/// Update a batch of records in one transaction, reporting per-id errors
/// for missing records. A database failure rolls the whole batch back and
/// yields a zero success count.
fn batch_update(
    ctx: &Context,
    ids: &[String],
    status: ValidationStatus,
    note: Option<&str>,
) -> (usize, Vec<String>) {
    match ctx.store.update_validation_status_batch(ids, status, note) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "batch status update failed");
            (0, vec![format!("Database error: {e}")])
        }
    }
}

/// `approve(ids)` — `ids` is a single id or a list.
pub(crate) fn approve(ctx: &Context, p: &params::Params) -> HandlerResult {
    let ids = params::string_or_list(p, "ids")?;

    if ids.is_empty() {
        info!("no validation ids provided for approval");
        return Ok(json!({
            "success": true, "approved_count": 0, "failed_count": 0, "errors": []
        }));
    }

    info!(count = ids.len(), "approving validations");
    let (approved, errors) = batch_update(ctx, &ids, ValidationStatus::Approved, None);

    let _ = ctx.store.record_audit(
        "approve",
        None,
        "ok",
        json!({ "requested": ids.len(), "approved": approved }),
    );

    Ok(json!({
        "success": true,
        "approved_count": approved,
        "failed_count": ids.len() - approved,
        "errors": errors,
    }))
}

/// `reject(ids, reason?)`
pub(crate) fn reject(ctx: &Context, p: &params::Params) -> HandlerResult {
    let ids = params::string_or_list(p, "ids")?;
    let reason = params::opt_string(p, "reason")?;

    if ids.is_empty() {
        info!("no validation ids provided for rejection");
        return Ok(json!({
            "success": true, "rejected_count": 0, "failed_count": 0, "errors": []
        }));
    }

    info!(count = ids.len(), "rejecting validations");
    let (rejected, errors) =
        batch_update(ctx, &ids, ValidationStatus::Rejected, reason.as_deref());

    let _ = ctx.store.record_audit(
        "reject",
        None,
        "ok",
        json!({ "requested": ids.len(), "rejected": rejected, "reason": reason }),
    );

    Ok(json!({
        "success": true,
        "rejected_count": rejected,
        "failed_count": ids.len() - rejected,
        "errors": errors,
    }))
}

/// `bulk_approve(ids, batch_size=100)` — explicit batches bound
/// transaction size; each batch commits once.
pub(crate) fn bulk_approve(ctx: &Context, p: &params::Params) -> HandlerResult {
    let started = Instant::now();
    let ids = params::require_string_list(p, "ids")?;
    let batch_size = (params::opt_u64(p, "batch_size", 100)? as usize).max(1);

    let total = ids.len();
    if total == 0 {
        return Ok(json!({
            "success": true, "total": 0, "approved_count": 0, "failed_count": 0,
            "errors": [], "processing_time_ms": 0.0
        }));
    }

    info!(total, batch_size, "bulk approving validations");

    let mut approved = 0usize;
    let mut errors: Vec<String> = Vec::new();
    for chunk in ids.chunks(batch_size) {
        let (count, chunk_errors) = batch_update(ctx, chunk, ValidationStatus::Approved, None);
        approved += count;
        errors.extend(chunk_errors);
    }

    let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!(approved, total, processing_time_ms, "bulk approve complete");

    Ok(json!({
        "success": approved > 0,
        "total": total,
        "approved_count": approved,
        "failed_count": total - approved,
        "errors": errors,
        "processing_time_ms": processing_time_ms,
    }))
}

/// `bulk_reject(ids, reason?, batch_size=100)`
pub(crate) fn bulk_reject(ctx: &Context, p: &params::Params) -> HandlerResult {
    let started = Instant::now();
    let ids = params::require_string_list(p, "ids")?;
    let reason = params::opt_string(p, "reason")?;
    let batch_size = (params::opt_u64(p, "batch_size", 100)? as usize).max(1);

    let total = ids.len();
    if total == 0 {
        return Ok(json!({
            "success": true, "total": 0, "rejected_count": 0, "failed_count": 0,
            "errors": [], "processing_time_ms": 0.0
        }));
    }

    info!(total, batch_size, "bulk rejecting validations");

    let mut rejected = 0usize;
    let mut errors: Vec<String> = Vec::new();
    for chunk in ids.chunks(batch_size) {
        let (count, chunk_errors) =
            batch_update(ctx, chunk, ValidationStatus::Rejected, reason.as_deref());
        rejected += count;
        errors.extend(chunk_errors);
    }

    let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!(rejected, total, processing_time_ms, "bulk reject complete");

    Ok(json!({
        "success": rejected > 0,
        "total": total,
        "rejected_count": rejected,
        "failed_count": total - rejected,
        "errors": errors,
        "processing_time_ms": processing_time_ms,
    }))
}
