//! Read-only query surface: stats, audit, performance, health, exports.

use super::Context;
use super::admin::component_map;
use chrono::{DateTime, Duration, Utc};
use mdcheck_rpc::{HandlerResult, RpcError, params};
use mdcheck_store::{AuditFilter, RecommendationFilter, ts_millis};
use serde_json::{Value, json};

const EXPORT_SCHEMA_VERSION: &str = "1.0";

fn export_envelope(data: Value) -> Value {
    json!({
        "schema_version": EXPORT_SCHEMA_VERSION,
        "exported_at": ts_millis::to_string(&Utc::now()),
        "data": data,
    })
}

fn parse_date(raw: &str, key: &str) -> Result<DateTime<Utc>, RpcError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RpcError::InvalidParams(format!("Parameter '{key}' must be an RFC 3339 timestamp")))
}

/// `get_stats()`
pub(crate) fn get_stats(ctx: &Context, _p: &params::Params) -> HandlerResult {
    let validations = ctx.store.count_validations_by_status()?;
    let recommendations = ctx.store.count_recommendations_by_status()?;
    let workflows = ctx.store.count_workflows_by_status()?;
    let cache = ctx.store.cache_stats()?;

    Ok(json!({
        "validations": {
            "total": validations.values().sum::<i64>(),
            "by_status": validations,
        },
        "recommendations": {
            "total": recommendations.values().sum::<i64>(),
            "by_status": recommendations,
        },
        "workflows": {
            "total": workflows.values().sum::<i64>(),
            "by_status": workflows,
        },
        "cache": cache,
        "agents": { "count": 2 },
    }))
}

/// `get_audit_log(limit=100, offset=0, operation?, user?, status?,
/// start_date?, end_date?)`
pub(crate) fn get_audit_log(ctx: &Context, p: &params::Params) -> HandlerResult {
    let limit = params::opt_u64(p, "limit", 100)? as usize;
    let offset = params::opt_u64(p, "offset", 0)? as usize;
    let operation = params::opt_string(p, "operation")?;
    let user = params::opt_string(p, "user")?;
    let status = params::opt_string(p, "status")?;
    let start_date = params::opt_str(p, "start_date")?
        .map(|raw| parse_date(raw, "start_date"))
        .transpose()?;
    let end_date = params::opt_str(p, "end_date")?
        .map(|raw| parse_date(raw, "end_date"))
        .transpose()?;

    let (entries, total) = ctx.store.list_audit(&AuditFilter {
        limit,
        offset,
        operation,
        user,
        status,
        start_date,
        end_date,
    })?;

    Ok(json!({
        "entries": serde_json::to_value(&entries)?,
        "total": total,
        "limit": limit,
        "offset": offset,
    }))
}

/// `get_performance_report(time_range ∈ {1h, 24h, 7d, 30d}, operation?)`
pub(crate) fn get_performance_report(ctx: &Context, p: &params::Params) -> HandlerResult {
    let time_range = params::opt_str(p, "time_range")?.unwrap_or("24h");
    let operation = params::opt_string(p, "operation")?;

    let window = match time_range {
        "1h" => Duration::hours(1),
        "24h" => Duration::hours(24),
        "7d" => Duration::days(7),
        "30d" => Duration::days(30),
        other => {
            return Err(RpcError::InvalidParams(format!(
                "Invalid time_range: {other}. Must be one of 1h, 24h, 7d, 30d"
            )));
        }
    };

    let stats = ctx
        .store
        .performance_stats(Utc::now() - window, operation.as_deref())?;

    Ok(json!({
        "time_range": time_range,
        "operations": serde_json::to_value(&stats)?,
        "generated_at": ts_millis::to_string(&Utc::now()),
    }))
}

/// `get_health_report()`
pub(crate) fn get_health_report(ctx: &Context, _p: &params::Params) -> HandlerResult {
    let (components, overall) = component_map(ctx);
    let maintenance = ctx.store.maintenance()?;

    let (recent_errors, _) = ctx.store.list_audit(&AuditFilter {
        limit: 10,
        offset: 0,
        status: Some("error".to_string()),
        ..AuditFilter::default()
    })?;

    let perf = ctx
        .store
        .performance_stats(Utc::now() - Duration::hours(1), None)?;
    let total_samples: usize = perf.values().map(|s| s.count).sum();
    let avg_duration_ms = if total_samples > 0 {
        perf.values()
            .map(|s| s.avg_duration_ms * s.count as f64)
            .sum::<f64>()
            / total_samples as f64
    } else {
        0.0
    };

    let mut advice: Vec<String> = Vec::new();
    if maintenance.enabled {
        advice.push("Maintenance mode is enabled; disable it to resume writes".to_string());
    }
    if !ctx.llm.is_available() {
        advice.push(
            "LLM service is unreachable; enhancement and generation are degraded".to_string(),
        );
    }
    if advice.is_empty() {
        advice.push("System operating normally".to_string());
    }

    Ok(json!({
        "overall_health": overall,
        "components": components,
        "recent_errors": serde_json::to_value(&recent_errors)?,
        "performance_summary": {
            "window": "1h",
            "operations": perf.len(),
            "total_samples": total_samples,
            "avg_duration_ms": avg_duration_ms,
        },
        "recommendations": advice,
    }))
}

/// `get_validation_history(file_path, limit=50)`
pub(crate) fn get_validation_history(ctx: &Context, p: &params::Params) -> HandlerResult {
    let file_path = params::require_str(p, "file_path")?;
    let limit = params::opt_u64(p, "limit", 50)? as usize;

    let history = ctx.store.validations_for_file(file_path, limit)?;

    Ok(json!({
        "file_path": file_path,
        "history": serde_json::to_value(&history)?,
        "total": history.len(),
    }))
}

/// `get_available_validators(validator_type?)`
pub(crate) fn get_available_validators(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validator_type = params::opt_str(p, "validator_type")?;

    let validators = [
        ("header_validation", "header", "Required, typed, enumerated, and forbidden front-matter fields"),
        ("external_links", "body", "External link policy"),
        ("missing_code_language", "body", "Language tags on fenced code blocks"),
        ("heading_structure", "body", "Heading levels increase one step at a time"),
        ("title_consistency", "body", "Front-matter title appears in the body"),
    ];

    let filtered: Vec<Value> = validators
        .iter()
        .filter(|(_, kind, _)| validator_type.is_none_or(|t| t == *kind))
        .map(|(name, kind, description)| {
            json!({ "name": name, "type": kind, "description": description })
        })
        .collect();

    Ok(json!({
        "validators": filtered,
        "total": filtered.len(),
        "families": ctx.detector.available_families(),
    }))
}

/// `export_validation(validation_id, include_recommendations=false)`
pub(crate) fn export_validation(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;
    let include_recommendations = params::opt_bool(p, "include_recommendations", false)?;

    let validation = ctx
        .store
        .get_validation(validation_id)?
        .ok_or_else(|| RpcError::NotFound(format!("Validation {validation_id} not found")))?;

    let mut data = json!({ "validation": serde_json::to_value(&validation)? });
    if include_recommendations {
        let recommendations = ctx.store.list_recommendations(&RecommendationFilter {
            validation_id: Some(validation_id.to_string()),
            ..RecommendationFilter::default()
        })?;
        data.as_object_mut()
            .expect("data is an object")
            .insert(
                "recommendations".to_string(),
                serde_json::to_value(&recommendations)?,
            );
    }

    Ok(export_envelope(data))
}

/// `export_recommendations(validation_id)`
pub(crate) fn export_recommendations(ctx: &Context, p: &params::Params) -> HandlerResult {
    let validation_id = params::require_str(p, "validation_id")?;

    if ctx.store.get_validation(validation_id)?.is_none() {
        return Err(RpcError::NotFound(format!(
            "Validation {validation_id} not found"
        )));
    }

    let recommendations = ctx.store.list_recommendations(&RecommendationFilter {
        validation_id: Some(validation_id.to_string()),
        ..RecommendationFilter::default()
    })?;

    Ok(export_envelope(json!({
        "validation_id": validation_id,
        "recommendations": serde_json::to_value(&recommendations)?,
    })))
}

/// `export_workflow(workflow_id, include_validations=false)`
pub(crate) fn export_workflow(ctx: &Context, p: &params::Params) -> HandlerResult {
    let workflow_id = params::require_str(p, "workflow_id")?;
    let include_validations = params::opt_bool(p, "include_validations", false)?;

    let workflow = ctx.workflows.get(workflow_id)?;

    let mut data = json!({ "workflow": serde_json::to_value(&workflow)? });
    if include_validations {
        // Only batch workflows reference validations directly.
        let mut validations = Vec::new();
        if let Some(ids) = workflow.input_params["validation_ids"].as_array() {
            for id in ids.iter().filter_map(Value::as_str) {
                if let Some(record) = ctx.store.get_validation(id)? {
                    validations.push(serde_json::to_value(&record)?);
                }
            }
        }
        data.as_object_mut()
            .expect("data is an object")
            .insert("validations".to_string(), Value::Array(validations));
    }

    Ok(export_envelope(data))
}
