//! Method handlers behind the JSON-RPC dispatcher.
//!
//! Handlers are free functions over a shared [`Context`]; the server binds
//! each one into the registry as a closure. Every handler takes the
//! named-parameter object and returns a result object or a typed error.

pub(crate) mod admin;
pub(crate) mod approval;
pub(crate) mod enhancement;
pub(crate) mod query;
pub(crate) mod recommendation;
pub(crate) mod validation;
pub(crate) mod workflow;

use crate::config::ServerConfig;
use mdcheck_enhance::Enhancer;
use mdcheck_ingest::Ingestion;
use mdcheck_llm::LlmBackend;
use mdcheck_prompts::PromptLoader;
use mdcheck_recommend::RecommendationGenerator;
use mdcheck_rules::{FamilyDetector, RuleManager};
use mdcheck_store::Store;
use mdcheck_workflow::WorkflowManager;
use std::sync::Arc;
use std::time::Instant;

/// Shared server components handed to every handler.
pub struct Context {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub rules: Arc<RuleManager>,
    pub detector: FamilyDetector,
    pub prompts: Arc<PromptLoader>,
    pub llm: Arc<dyn LlmBackend>,
    pub ingestion: Arc<Ingestion>,
    pub enhancer: Arc<Enhancer>,
    pub generator: Arc<dyn RecommendationGenerator>,
    pub workflows: Arc<WorkflowManager>,
    pub started_at: Instant,
}
