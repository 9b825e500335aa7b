//! Server assembly: builds the components, registers every method, and
//! exposes the dispatcher.

use crate::config::ServerConfig;
use crate::methods::{
    Context, admin, approval, enhancement, query, recommendation, validation, workflow,
};
use anyhow::{Context as _, Result};
use mdcheck_enhance::Enhancer;
use mdcheck_ingest::Ingestion;
use mdcheck_llm::{LlmBackend, OllamaBackend};
use mdcheck_prompts::PromptLoader;
use mdcheck_recommend::{FindingDrivenGenerator, RecommendationGenerator};
use mdcheck_rpc::{Dispatcher, MethodRegistry};
use mdcheck_rules::{FamilyDetector, RuleManager};
use mdcheck_store::Store;
use mdcheck_workflow::WorkflowManager;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

macro_rules! method {
    ($registry:expr, $ctx:expr, $name:literal, $handler:path) => {{
        let ctx = Arc::clone($ctx);
        $registry.register($name, Box::new(move |params| $handler(&ctx, params)));
    }};
}

/// The assembled validation server: one dispatcher over the full method
/// registry. Construct once at startup; `handle` is then safe to call from
/// any thread.
pub struct Server {
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Build a server with the default Ollama backend and the built-in
    /// recommendation generator.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let llm: Arc<dyn LlmBackend> = Arc::new(
            OllamaBackend::new(config.llm.clone()).context("failed to construct LLM backend")?,
        );
        Self::with_components(config, llm, Arc::new(FindingDrivenGenerator::new()))
    }

    /// Build a server with injected LLM and generator capabilities.
    pub fn with_components(
        config: ServerConfig,
        llm: Arc<dyn LlmBackend>,
        generator: Arc<dyn RecommendationGenerator>,
    ) -> Result<Self> {
        let store = Arc::new(match &config.database_path {
            Some(path) => Store::open(path)
                .with_context(|| format!("failed to open database: {}", path.display()))?,
            None => Store::open_in_memory().context("failed to open in-memory database")?,
        });

        let rules = Arc::new(RuleManager::new(&config.rules_dir));
        let detector = FamilyDetector::new(&config.rules_dir, &config.truth_dir);
        let prompts = Arc::new(PromptLoader::new(&config.prompts_dir));

        let ingestion = Arc::new(Ingestion::new(
            Arc::clone(&store),
            Arc::clone(&rules),
            detector.clone(),
        ));
        let enhancer = Arc::new(Enhancer::new(
            Arc::clone(&store),
            Arc::clone(&llm),
            Arc::clone(&prompts),
        ));
        let workflows = Arc::new(WorkflowManager::new(
            Arc::clone(&store),
            Arc::clone(&ingestion),
            Arc::clone(&enhancer),
            Arc::clone(&generator),
        ));

        let ctx = Arc::new(Context {
            config,
            store: Arc::clone(&store),
            rules,
            detector,
            prompts,
            llm,
            ingestion,
            enhancer,
            generator,
            workflows,
            started_at: Instant::now(),
        });

        startup_checks(&ctx);

        let mut registry = MethodRegistry::new();
        register_methods(&mut registry, &ctx);
        info!(methods = registry.len(), "server ready");

        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(registry, Some(store))),
        })
    }

    /// Handle one JSON-RPC request synchronously.
    pub fn handle(&self, request: &Value) -> Value {
        self.dispatcher.handle(request)
    }

    /// Handle one JSON-RPC request on the blocking pool.
    pub async fn handle_async(&self, request: Value) -> Value {
        Arc::clone(&self.dispatcher).handle_async(request).await
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Registered method names in registration order.
    pub fn method_names(&self) -> Vec<String> {
        self.dispatcher.registry().method_names().to_vec()
    }
}

/// Non-fatal environment probes, logged at startup.
fn startup_checks(ctx: &Context) {
    if !ctx.store.ping() {
        warn!("database did not answer the startup probe");
    }
    if !ctx.config.rules_dir.exists() {
        warn!(dir = %ctx.config.rules_dir.display(), "rules directory not found");
    }
    if !ctx.config.prompts_dir.exists() {
        warn!(dir = %ctx.config.prompts_dir.display(), "prompts directory not found");
    }
    if ctx.llm.is_available() {
        info!(model = ctx.llm.default_model(), "LLM service reachable");
    } else {
        warn!("LLM service unreachable; enhancement will be degraded");
    }
}

fn register_methods(registry: &mut MethodRegistry, ctx: &Arc<Context>) {
    // Validation methods
    method!(registry, ctx, "validate_folder", validation::validate_folder);
    method!(registry, ctx, "validate_file", validation::validate_file);
    method!(registry, ctx, "validate_content", validation::validate_content);
    method!(registry, ctx, "get_validation", validation::get_validation);
    method!(registry, ctx, "list_validations", validation::list_validations);
    method!(registry, ctx, "update_validation", validation::update_validation);
    method!(registry, ctx, "delete_validation", validation::delete_validation);
    method!(registry, ctx, "revalidate", validation::revalidate);

    // Approval methods
    method!(registry, ctx, "approve", approval::approve);
    method!(registry, ctx, "reject", approval::reject);
    method!(registry, ctx, "bulk_approve", approval::bulk_approve);
    method!(registry, ctx, "bulk_reject", approval::bulk_reject);

    // Enhancement methods
    method!(registry, ctx, "enhance", enhancement::enhance);
    method!(registry, ctx, "enhance_batch", enhancement::enhance_batch);
    method!(registry, ctx, "enhance_preview", enhancement::enhance_preview);
    method!(registry, ctx, "enhance_auto_apply", enhancement::enhance_auto_apply);
    method!(
        registry,
        ctx,
        "get_enhancement_comparison",
        enhancement::get_enhancement_comparison
    );

    // Admin methods
    method!(registry, ctx, "get_system_status", admin::get_system_status);
    method!(registry, ctx, "clear_cache", admin::clear_cache);
    method!(registry, ctx, "get_cache_stats", admin::get_cache_stats);
    method!(registry, ctx, "cleanup_cache", admin::cleanup_cache);
    method!(registry, ctx, "rebuild_cache", admin::rebuild_cache);
    method!(registry, ctx, "reload_agent", admin::reload_agent);
    method!(registry, ctx, "run_gc", admin::run_gc);
    method!(
        registry,
        ctx,
        "enable_maintenance_mode",
        admin::enable_maintenance_mode
    );
    method!(
        registry,
        ctx,
        "disable_maintenance_mode",
        admin::disable_maintenance_mode
    );
    method!(registry, ctx, "create_checkpoint", admin::create_checkpoint);

    // Workflow methods
    method!(registry, ctx, "create_workflow", workflow::create_workflow);
    method!(registry, ctx, "get_workflow", workflow::get_workflow);
    method!(registry, ctx, "list_workflows", workflow::list_workflows);
    method!(registry, ctx, "control_workflow", workflow::control_workflow);
    method!(registry, ctx, "get_workflow_report", workflow::get_workflow_report);
    method!(registry, ctx, "get_workflow_summary", workflow::get_workflow_summary);
    method!(registry, ctx, "delete_workflow", workflow::delete_workflow);
    method!(
        registry,
        ctx,
        "bulk_delete_workflows",
        workflow::bulk_delete_workflows
    );

    // Query methods
    method!(registry, ctx, "get_stats", query::get_stats);
    method!(registry, ctx, "get_audit_log", query::get_audit_log);
    method!(
        registry,
        ctx,
        "get_performance_report",
        query::get_performance_report
    );
    method!(registry, ctx, "get_health_report", query::get_health_report);
    method!(
        registry,
        ctx,
        "get_validation_history",
        query::get_validation_history
    );
    method!(
        registry,
        ctx,
        "get_available_validators",
        query::get_available_validators
    );
    method!(registry, ctx, "export_validation", query::export_validation);
    method!(
        registry,
        ctx,
        "export_recommendations",
        query::export_recommendations
    );
    method!(registry, ctx, "export_workflow", query::export_workflow);

    // Recommendation methods
    method!(
        registry,
        ctx,
        "generate_recommendations",
        recommendation::generate_recommendations
    );
    method!(
        registry,
        ctx,
        "rebuild_recommendations",
        recommendation::rebuild_recommendations
    );
    method!(registry, ctx, "get_recommendations", recommendation::get_recommendations);
    method!(
        registry,
        ctx,
        "review_recommendation",
        recommendation::review_recommendation
    );
    method!(
        registry,
        ctx,
        "bulk_review_recommendations",
        recommendation::bulk_review_recommendations
    );
    method!(
        registry,
        ctx,
        "apply_recommendations",
        recommendation::apply_recommendations
    );
    method!(
        registry,
        ctx,
        "delete_recommendation",
        recommendation::delete_recommendation
    );
    method!(
        registry,
        ctx,
        "mark_recommendations_applied",
        recommendation::mark_recommendations_applied
    );
}
