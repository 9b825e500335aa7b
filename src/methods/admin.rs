//! Administrative operations: status, cache, lifecycle, maintenance.

use super::Context;
use chrono::Utc;
use mdcheck_rpc::{HandlerResult, RpcError, params};
use mdcheck_store::ts_millis;
use serde_json::{Value, json};
use sysinfo::{Disks, System};
use tracing::info;

/// CPU, memory, and disk usage percentages for the status surface.
fn resource_usage() -> (f64, f64, f64) {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu_usage();

    let cpu_percent = f64::from(system.global_cpu_usage());
    let memory_percent = if system.total_memory() > 0 {
        100.0 * system.used_memory() as f64 / system.total_memory() as f64
    } else {
        0.0
    };

    let disks = Disks::new_with_refreshed_list();
    let (total, available) = disks.iter().fold((0u64, 0u64), |(t, a), disk| {
        (t + disk.total_space(), a + disk.available_space())
    });
    let disk_percent = if total > 0 {
        100.0 * (total - available) as f64 / total as f64
    } else {
        0.0
    };

    (cpu_percent, memory_percent, disk_percent)
}

/// Component health map shared by `get_system_status` and
/// `get_health_report`.
pub(crate) fn component_map(ctx: &Context) -> (Value, &'static str) {
    let database_ok = ctx.store.ping();
    let llm_available = ctx.llm.is_available();
    let cache_stats = ctx.store.cache_stats().ok();

    let components = json!({
        "database": {
            "status": if database_ok { "healthy" } else { "unhealthy" },
            "details": {
                "path": ctx.config.database_path.as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| ":memory:".to_string()),
            },
        },
        "cache": {
            "status": "healthy",
            "details": cache_stats,
        },
        "agents": {
            "status": if llm_available { "healthy" } else { "unavailable" },
            "details": {
                "llm_model": ctx.llm.default_model(),
                "llm_available": llm_available,
            },
        },
    });

    let overall = if !database_ok {
        "unhealthy"
    } else if llm_available {
        "healthy"
    } else {
        "degraded"
    };

    (components, overall)
}

/// `get_system_status()`
pub(crate) fn get_system_status(ctx: &Context, _p: &params::Params) -> HandlerResult {
    let (components, overall) = component_map(ctx);
    let (cpu_percent, memory_percent, disk_percent) = resource_usage();
    let maintenance = ctx.store.maintenance()?;

    Ok(json!({
        "status": overall,
        "components": components,
        "resources": {
            "cpu_percent": cpu_percent,
            "memory_percent": memory_percent,
            "disk_percent": disk_percent,
        },
        "maintenance_mode": maintenance.enabled,
        "uptime_seconds": ctx.started_at.elapsed().as_secs(),
    }))
}

/// `clear_cache(cache_types?)` — persisted entries, plus the in-memory
/// rule and prompt caches when they are in scope.
pub(crate) fn clear_cache(ctx: &Context, p: &params::Params) -> HandlerResult {
    let cache_types = params::opt_string_list(p, "cache_types")?;

    let all = cache_types.is_none();
    let in_scope = |name: &str| {
        all || cache_types
            .as_ref()
            .is_some_and(|types| types.iter().any(|t| t == name))
    };

    let mut cleared = ctx.store.clear_cache(cache_types.as_deref())?;

    if in_scope("rules") {
        cleared += ctx.rules.cached_count();
        ctx.rules.reload(None);
    }
    if in_scope("prompts") {
        cleared += ctx.prompts.cached_count();
        ctx.prompts.clear_cache();
    }

    info!(cleared, "cleared caches");

    Ok(json!({
        "success": true,
        "cleared_items": cleared,
        "cache_types_cleared": cache_types.unwrap_or_else(|| vec!["all".to_string()]),
    }))
}

/// `get_cache_stats()`
pub(crate) fn get_cache_stats(ctx: &Context, _p: &params::Params) -> HandlerResult {
    let stats = ctx.store.cache_stats()?;
    let mut by_type = stats.by_type.clone();
    by_type.insert("rules_memory".to_string(), ctx.rules.cached_count());
    by_type.insert("prompts_memory".to_string(), ctx.prompts.cached_count());

    Ok(json!({
        "total_items": stats.total_items + ctx.rules.cached_count() + ctx.prompts.cached_count(),
        "total_size_bytes": stats.total_size_bytes,
        "hit_rate": 0.0,
        "by_type": by_type,
    }))
}

/// `cleanup_cache(max_age_hours=24)`
pub(crate) fn cleanup_cache(ctx: &Context, p: &params::Params) -> HandlerResult {
    let max_age_hours = params::opt_u64(p, "max_age_hours", 24)? as i64;
    let cleaned = ctx.store.cleanup_cache(max_age_hours)?;
    info!(cleaned, max_age_hours, "cleaned cache");
    Ok(json!({ "success": true, "cleaned_items": cleaned }))
}

/// `rebuild_cache()` — clear everything, then re-prime rules and prompts
/// from disk.
pub(crate) fn rebuild_cache(ctx: &Context, _p: &params::Params) -> HandlerResult {
    ctx.store.clear_cache(None)?;
    ctx.rules.reload(None);
    ctx.prompts.clear_cache();

    let mut rebuilt = 0usize;
    for family in ctx.detector.available_families() {
        ctx.rules.get(&family);
        rebuilt += 1;
    }
    for domain in ctx.prompts.domains() {
        ctx.prompts.keys(&domain);
        rebuilt += 1;
    }

    info!(rebuilt, "rebuilt caches");
    Ok(json!({ "success": true, "rebuilt_items": rebuilt }))
}

/// `reload_agent(agent_id)`
pub(crate) fn reload_agent(ctx: &Context, p: &params::Params) -> HandlerResult {
    let agent_id = params::require_str(p, "agent_id")?;

    match agent_id {
        "rules" => ctx.rules.reload(None),
        "prompts" => ctx.prompts.clear_cache(),
        other => {
            return Err(RpcError::NotFound(format!("Agent {other} not found")));
        }
    }

    info!(agent_id, "reloaded agent");
    Ok(json!({
        "success": true,
        "agent_id": agent_id,
        "reloaded_at": ts_millis::to_string(&Utc::now()),
    }))
}

/// `run_gc()` — storage reclamation: expired cache rows are pruned and the
/// database is compacted.
pub(crate) fn run_gc(ctx: &Context, _p: &params::Params) -> HandlerResult {
    let collected = ctx.store.cleanup_cache(24)?;
    ctx.store.vacuum()?;

    info!(collected, "ran storage reclamation");
    Ok(json!({
        "success": true,
        "collected_objects": collected,
        "generation": "full",
        "stats": { "expired_cache_entries": collected, "vacuumed": true },
    }))
}

/// `enable_maintenance_mode(reason?, enabled_by?)`
pub(crate) fn enable_maintenance_mode(ctx: &Context, p: &params::Params) -> HandlerResult {
    let reason = params::opt_string(p, "reason")?;
    let enabled_by = params::opt_string(p, "enabled_by")?;

    let flag = ctx
        .store
        .set_maintenance(true, reason.as_deref(), enabled_by.as_deref())?;

    let _ = ctx.store.record_audit(
        "enable_maintenance_mode",
        enabled_by.as_deref(),
        "ok",
        json!({ "reason": reason }),
    );

    info!(?reason, "enabled maintenance mode");
    Ok(json!({
        "success": true,
        "enabled_at": flag.enabled_at.map(|ts| ts_millis::to_string(&ts)),
    }))
}

/// `disable_maintenance_mode()`
pub(crate) fn disable_maintenance_mode(ctx: &Context, _p: &params::Params) -> HandlerResult {
    ctx.store.set_maintenance(false, None, None)?;
    let _ = ctx
        .store
        .record_audit("disable_maintenance_mode", None, "ok", json!({}));

    info!("disabled maintenance mode");
    Ok(json!({
        "success": true,
        "disabled_at": ts_millis::to_string(&Utc::now()),
    }))
}

/// `create_checkpoint(name?, metadata?)` — snapshots entity counts along
/// with caller metadata.
pub(crate) fn create_checkpoint(ctx: &Context, p: &params::Params) -> HandlerResult {
    let name = params::opt_string(p, "name")?
        .unwrap_or_else(|| format!("checkpoint_{}", Utc::now().format("%Y%m%d_%H%M%S")));
    let caller_metadata = params::opt_object(p, "metadata")?
        .cloned()
        .unwrap_or_default();

    let mut metadata = serde_json::Map::new();
    metadata.extend(caller_metadata);
    metadata.insert(
        "counts".to_string(),
        json!({
            "validations": ctx.store.count_validations_by_status()?,
            "recommendations": ctx.store.count_recommendations_by_status()?,
            "workflows": ctx.store.count_workflows_by_status()?,
        }),
    );

    let checkpoint = ctx
        .store
        .create_checkpoint(&name, Value::Object(metadata))?;

    info!(checkpoint_id = %checkpoint.id, name = %checkpoint.name, "created checkpoint");
    Ok(json!({
        "success": true,
        "checkpoint_id": checkpoint.id,
        "name": checkpoint.name,
        "created_at": ts_millis::to_string(&checkpoint.created_at),
    }))
}
