//! Recommendation lifecycle: generate, review, apply, delete.

use super::Context;
use mdcheck_recommend::replace_first;
use mdcheck_rpc::{HandlerResult, RpcError, params};
use mdcheck_store::{
    NewRecommendation, Recommendation, RecommendationFilter, RecommendationStatus,
};
use mdcheck_utils::fs as mdfs;
use camino::Utf8Path;
use serde_json::{Value, json};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Generate drafts for a validation, filter, and persist them. Shared by
/// `generate_recommendations` and `rebuild_recommendations`.
fn generate_for(
    ctx: &Context,
    validation_id: &str,
    threshold: f64,
    types: Option<&[String]>,
) -> Result<Vec<Recommendation>, RpcError> {
    let validation = ctx
        .store
        .get_validation(validation_id)?
        .ok_or_else(|| RpcError::NotFound(format!("Validation {validation_id} not found")))?;

    // Prefer the stored content; fall back to the file on disk.
    let content = if !validation.content.is_empty() {
        validation.content.clone()
    } else {
        let path = Path::new(&validation.file_path);
        if path.exists() {
            mdfs::read_text(path).unwrap_or_else(|e| {
                warn!(file = %validation.file_path, error = %e, "could not read content");
                String::new()
            })
        } else {
            String::new()
        }
    };

    let drafts = ctx.generator.generate(&validation, &content);

    let mut stored = Vec::new();
    for draft in drafts {
        if draft.confidence < threshold {
            continue;
        }
        if let Some(types) = types
            && !types.iter().any(|t| t == &draft.kind)
        {
            continue;
        }

        let record = ctx.store.create_recommendation(NewRecommendation {
            validation_id: validation_id.to_string(),
            kind: draft.kind,
            title: truncate(&draft.title, 200),
            description: draft.rationale.clone(),
            scope: draft.scope,
            instruction: draft.instruction,
            rationale: draft.rationale,
            severity: draft.severity,
            original_content: draft.original_content,
            proposed_content: draft.proposed_content,
            diff: None,
            confidence: draft.confidence,
            priority: 0,
            metadata: draft.metadata,
        })?;
        stored.push(record);
    }

    Ok(stored)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

/// `generate_recommendations(validation_id, threshold=0.7, types?)`
pub(crate) fn generate_recommendations(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;
    let threshold = params::opt_f64(p, "threshold", 0.7)?;
    let types = params::opt_string_list(p, "types")?;

    info!(validation_id, threshold, "generating recommendations");
    let stored = generate_for(ctx, validation_id, threshold, types.as_deref())?;

    Ok(json!({
        "success": true,
        "validation_id": validation_id,
        "recommendation_count": stored.len(),
        "recommendations": serde_json::to_value(&stored)?,
        "threshold_used": threshold,
    }))
}

/// `rebuild_recommendations(validation_id, threshold=0.7)` — delete, then
/// regenerate.
pub(crate) fn rebuild_recommendations(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;
    let threshold = params::opt_f64(p, "threshold", 0.7)?;

    info!(validation_id, "rebuilding recommendations");
    let deleted_count = ctx.store.delete_recommendations_for(validation_id)?;
    let stored = generate_for(ctx, validation_id, threshold, None)?;

    Ok(json!({
        "success": true,
        "validation_id": validation_id,
        "deleted_count": deleted_count,
        "generated_count": stored.len(),
    }))
}

/// `get_recommendations(validation_id, status?, type?)`
pub(crate) fn get_recommendations(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;
    let status = params::opt_str(p, "status")?
        .map(|s| {
            RecommendationStatus::from_str(&s.to_lowercase())
                .map_err(|_| RpcError::InvalidParams(format!("Invalid status: {s}")))
        })
        .transpose()?;
    let kind = params::opt_string(p, "type")?;

    let recommendations = ctx.store.list_recommendations(&RecommendationFilter {
        validation_id: Some(validation_id.to_string()),
        status,
        kind,
    })?;

    Ok(json!({
        "validation_id": validation_id,
        "recommendations": serde_json::to_value(&recommendations)?,
        "total": recommendations.len(),
    }))
}

/// `review_recommendation(recommendation_id, action, notes?)`
pub(crate) fn review_recommendation(ctx: &Context, p: &params::Params) -> HandlerResult {
    let recommendation_id = params::require_str(p, "recommendation_id")?;
    let action = params::require_str(p, "action")?;
    let notes = params::opt_string(p, "notes")?;

    let new_status = match action {
        "approve" => RecommendationStatus::Approved,
        "reject" => RecommendationStatus::Rejected,
        other => {
            return Err(RpcError::InvalidParams(format!(
                "Invalid action: {other}. Must be 'approve' or 'reject'"
            )));
        }
    };

    let recommendation = ctx
        .store
        .get_recommendation(recommendation_id)?
        .ok_or_else(|| {
            RpcError::NotFound(format!("Recommendation {recommendation_id} not found"))
        })?;

    // pending | approved | rejected may be re-reviewed; applied is final.
    if recommendation.status == RecommendationStatus::Applied {
        return Err(RpcError::InvalidParams(format!(
            "Recommendation {recommendation_id} is already applied"
        )));
    }

    info!(recommendation_id, action, "reviewing recommendation");
    ctx.store
        .update_recommendation_status(recommendation_id, new_status, notes.as_deref())?;

    Ok(json!({
        "success": true,
        "recommendation_id": recommendation_id,
        "action": action,
        "new_status": new_status,
    }))
}

/// `bulk_review_recommendations(recommendation_ids, action, notes?)`
pub(crate) fn bulk_review_recommendations(ctx: &Context, p: &params::Params) -> HandlerResult {
    let recommendation_ids = params::require_string_list(p, "recommendation_ids")?;
    let action = params::require_str(p, "action")?;
    let notes = params::opt_string(p, "notes")?;

    if !matches!(action, "approve" | "reject") {
        return Err(RpcError::InvalidParams(format!("Invalid action: {action}")));
    }

    info!(
        count = recommendation_ids.len(),
        action, "bulk reviewing recommendations"
    );

    let mut reviewed_count = 0usize;
    let mut errors: Vec<Value> = Vec::new();

    for recommendation_id in &recommendation_ids {
        let review_params: params::Params = json!({
            "recommendation_id": recommendation_id,
            "action": action,
            "notes": notes,
        })
        .as_object()
        .cloned()
        .unwrap_or_default();

        match review_recommendation(ctx, &review_params) {
            Ok(_) => reviewed_count += 1,
            Err(e) => errors.push(json!({
                "recommendation_id": recommendation_id,
                "error": e.to_string(),
            })),
        }
    }

    Ok(json!({
        "success": true,
        "reviewed_count": reviewed_count,
        "errors": errors,
        "action": action,
    }))
}

/// `apply_recommendations(validation_id, recommendation_ids?, dry_run=false,
/// create_backup=true)`
///
/// Targets are the approved recommendations, in caller order when ids are
/// given and creation order otherwise. Each one replaces the first
/// occurrence of its original snippet in the evolving file content.
pub(crate) fn apply_recommendations(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;
    let recommendation_ids = params::opt_string_list(p, "recommendation_ids")?;
    let dry_run = params::opt_bool(p, "dry_run", false)?;
    let create_backup = params::opt_bool(p, "create_backup", true)?;

    info!(validation_id, dry_run, "applying recommendations");

    let validation = ctx
        .store
        .get_validation(validation_id)?
        .ok_or_else(|| RpcError::NotFound(format!("Validation {validation_id} not found")))?;

    let candidates: Vec<Recommendation> = match &recommendation_ids {
        Some(ids) => {
            let mut loaded = Vec::new();
            for id in ids {
                if let Some(recommendation) = ctx.store.get_recommendation(id)? {
                    loaded.push(recommendation);
                }
            }
            loaded
        }
        None => ctx.store.list_recommendations(&RecommendationFilter {
            validation_id: Some(validation_id.to_string()),
            ..RecommendationFilter::default()
        })?,
    };

    let approved: Vec<&Recommendation> = candidates
        .iter()
        .filter(|r| r.status == RecommendationStatus::Approved)
        .collect();

    if approved.is_empty() {
        return Ok(json!({
            "success": true,
            "validation_id": validation_id,
            "applied_count": 0,
            "skipped_count": candidates.len(),
            "errors": [],
            "message": "No approved recommendations to apply",
        }));
    }

    let file_path = Path::new(&validation.file_path);

    let mut backup_path: Option<String> = None;
    if create_backup && !dry_run && file_path.exists() {
        match mdfs::backup_file(file_path) {
            Ok(path) => {
                info!(backup = %path.display(), "created backup");
                backup_path = Some(path.display().to_string());
            }
            Err(e) => warn!(error = %e, "failed to create backup"),
        }
    }

    let mut applied_count = 0usize;
    let mut skipped_count = 0usize;
    let mut errors: Vec<Value> = Vec::new();

    if dry_run {
        for recommendation in &approved {
            let has_edit = recommendation
                .original_content
                .as_deref()
                .is_some_and(|s| !s.is_empty())
                && recommendation
                    .proposed_content
                    .as_deref()
                    .is_some_and(|s| !s.is_empty());
            if has_edit {
                applied_count += 1;
            } else {
                skipped_count += 1;
            }
        }
    } else if !file_path.exists() {
        errors.push(json!({ "error": format!("File not found: {}", validation.file_path) }));
    } else {
        let mut content =
            mdfs::read_text(file_path).map_err(|e| RpcError::Internal(e.to_string()))?;

        for recommendation in &approved {
            let (Some(original), Some(proposed)) = (
                recommendation
                    .original_content
                    .as_deref()
                    .filter(|s| !s.is_empty()),
                recommendation
                    .proposed_content
                    .as_deref()
                    .filter(|s| !s.is_empty()),
            ) else {
                skipped_count += 1;
                errors.push(json!({
                    "recommendation_id": recommendation.id,
                    "error": "Recommendation missing original/proposed content",
                }));
                continue;
            };

            match replace_first(&content, original, proposed) {
                Some(updated) => {
                    content = updated;
                    applied_count += 1;
                    ctx.store.update_recommendation_status(
                        &recommendation.id,
                        RecommendationStatus::Applied,
                        None,
                    )?;
                }
                None => {
                    skipped_count += 1;
                    errors.push(json!({
                        "recommendation_id": recommendation.id,
                        "error": "Original content not found in file",
                    }));
                }
            }
        }

        if applied_count > 0 {
            let utf8_path = Utf8Path::from_path(file_path).ok_or_else(|| {
                RpcError::Internal(format!("Non-UTF-8 path: {}", validation.file_path))
            })?;
            mdfs::write_text_crlf_atomic(utf8_path, &content)
                .map_err(|e| RpcError::Internal(e.to_string()))?;
            info!(applied_count, file = %validation.file_path, "applied recommendations");
        }
    }

    let _ = ctx.store.record_audit(
        "apply_recommendations",
        None,
        "ok",
        json!({ "validation_id": validation_id, "applied": applied_count, "dry_run": dry_run }),
    );

    let mut result = json!({
        "success": true,
        "validation_id": validation_id,
        "applied_count": applied_count,
        "skipped_count": skipped_count,
        "errors": errors,
    });
    let obj = result.as_object_mut().expect("result is an object");
    if let Some(backup_path) = backup_path {
        obj.insert("backup_path".to_string(), json!(backup_path));
    }
    if dry_run {
        obj.insert("dry_run".to_string(), json!(true));
    }

    Ok(result)
}

/// `delete_recommendation(recommendation_id)` — a second delete of the same
/// id reports not-found.
pub(crate) fn delete_recommendation(ctx: &Context, p: &params::Params) -> HandlerResult {
    let recommendation_id = params::require_str(p, "recommendation_id")?;

    if !ctx.store.delete_recommendation(recommendation_id)? {
        return Err(RpcError::NotFound(format!(
            "Recommendation {recommendation_id} not found"
        )));
    }

    info!(recommendation_id, "deleted recommendation");
    Ok(json!({ "success": true, "recommendation_id": recommendation_id }))
}

/// `mark_recommendations_applied(recommendation_ids)`
pub(crate) fn mark_recommendations_applied(ctx: &Context, p: &params::Params) -> HandlerResult {
    let recommendation_ids = params::require_string_list(p, "recommendation_ids")?;

    info!(
        count = recommendation_ids.len(),
        "marking recommendations applied"
    );

    let mut marked_count = 0usize;
    let mut errors: Vec<Value> = Vec::new();

    for recommendation_id in &recommendation_ids {
        if ctx.store.get_recommendation(recommendation_id)?.is_none() {
            errors.push(json!({
                "recommendation_id": recommendation_id,
                "error": "Recommendation not found",
            }));
            continue;
        }

        ctx.store.update_recommendation_status(
            recommendation_id,
            RecommendationStatus::Applied,
            None,
        )?;
        marked_count += 1;
    }

    Ok(json!({
        "success": true,
        "marked_count": marked_count,
        "errors": errors,
    }))
}
