//! Workflow worker: resolves steps and executes them cooperatively.

use crate::control::{ControlState, WorkflowControl};
use crate::manager::ControlMap;
use camino::Utf8Path;
use mdcheck_enhance::Enhancer;
use mdcheck_ingest::Ingestion;
use mdcheck_recommend::{RecommendationGenerator, replace_first};
use mdcheck_store::{RecommendationStatus, Store, Workflow, WorkflowState, WorkflowType};
use mdcheck_utils::fs as mdfs;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PAUSE_POLL: Duration = Duration::from_millis(50);

/// Default confidence floor for recommendations generated during an audit.
const AUDIT_THRESHOLD: f64 = 0.7;

enum Step {
    ValidateFile(PathBuf),
    AuditFile(PathBuf),
    Enhance(String),
    ApplyRecommendation(String),
}

enum Gate {
    Go,
    Cancelled,
}

pub(crate) struct Worker {
    store: Arc<Store>,
    ingestion: Arc<Ingestion>,
    enhancer: Arc<Enhancer>,
    generator: Arc<dyn RecommendationGenerator>,
    controls: ControlMap,
    workflow_id: String,
    control: Arc<WorkflowControl>,
}

impl Worker {
    pub(crate) fn new(
        store: Arc<Store>,
        ingestion: Arc<Ingestion>,
        enhancer: Arc<Enhancer>,
        generator: Arc<dyn RecommendationGenerator>,
        controls: ControlMap,
        workflow_id: String,
        control: Arc<WorkflowControl>,
    ) -> Self {
        Self {
            store,
            ingestion,
            enhancer,
            generator,
            controls,
            workflow_id,
            control,
        }
    }

    fn release_control(&self) {
        self.controls
            .lock()
            .expect("controls mutex poisoned")
            .remove(&self.workflow_id);
    }

    pub(crate) fn run(self) {
        let id = &self.workflow_id;

        let workflow = match self.store.get_workflow(id) {
            Ok(Some(workflow)) => workflow,
            _ => {
                warn!(workflow_id = %id, "workflow disappeared before execution");
                return;
            }
        };

        if self
            .store
            .set_workflow_state(id, WorkflowState::Running, None)
            .is_err()
        {
            return;
        }

        let steps = match self.resolve_steps(&workflow) {
            Ok(steps) => steps,
            Err(reason) => {
                let _ = self
                    .store
                    .set_workflow_state(id, WorkflowState::Failed, Some(&reason));
                self.release_control();
                return;
            }
        };

        let total = steps.len() as i64;
        let _ = self.store.merge_workflow_metadata(
            id,
            &json!({ "files_total": total, "files_processed": 0, "errors_count": 0 }),
        );
        let _ = self.store.update_workflow_progress(id, 0, total, 0.0);

        let mut errors: Vec<String> = Vec::new();
        let mut succeeded = 0usize;

        for (index, step) in steps.iter().enumerate() {
            match self.gate() {
                Gate::Go => {}
                Gate::Cancelled => {
                    debug!(workflow_id = %id, step = index, "workflow cancelled");
                    self.release_control();
                    return;
                }
            }

            match self.run_step(step) {
                Ok(()) => succeeded += 1,
                Err(e) => errors.push(e),
            }

            let current = (index + 1) as i64;
            let percent = round1(100.0 * current as f64 / total.max(1) as f64);
            let _ = self.store.update_workflow_progress(id, current, total, percent);
            let _ = self.store.merge_workflow_metadata(
                id,
                &json!({ "files_processed": current, "errors_count": errors.len() }),
            );
        }

        if !errors.is_empty() {
            let _ = self
                .store
                .merge_workflow_metadata(id, &json!({ "errors": errors }));
        }

        // A cancel that raced the final step wins.
        if self.control.state() == ControlState::Cancel {
            self.release_control();
            return;
        }

        let error_message = (!errors.is_empty()).then(|| errors.join("; "));
        if succeeded == 0 && !errors.is_empty() {
            let _ = self
                .store
                .set_workflow_state(id, WorkflowState::Failed, error_message.as_deref());
        } else {
            let _ = self.store.update_workflow_progress(id, total, total, 100.0);
            let _ = self
                .store
                .set_workflow_state(id, WorkflowState::Completed, error_message.as_deref());
        }

        info!(
            workflow_id = %id,
            steps = total,
            succeeded,
            failed = errors.len(),
            "workflow finished"
        );
        self.release_control();
    }

    /// Block while paused; report cancellation.
    fn gate(&self) -> Gate {
        loop {
            match self.control.state() {
                ControlState::Run => return Gate::Go,
                ControlState::Cancel => return Gate::Cancelled,
                ControlState::Pause => std::thread::sleep(PAUSE_POLL),
            }
        }
    }

    fn resolve_steps(&self, workflow: &Workflow) -> Result<Vec<Step>, String> {
        let params = &workflow.input_params;
        match workflow.workflow_type {
            WorkflowType::ValidateDirectory | WorkflowType::FullAudit => {
                let directory = params["directory_path"]
                    .as_str()
                    .ok_or("Missing required workflow parameter: directory_path")?;
                let recursive = params["recursive"].as_bool().unwrap_or(true);

                let root = PathBuf::from(directory);
                if !root.exists() {
                    return Err(format!("Folder does not exist: {directory}"));
                }

                let files = mdfs::list_markdown_files(&root, recursive);
                Ok(files
                    .into_iter()
                    .map(|path| match workflow.workflow_type {
                        WorkflowType::FullAudit => Step::AuditFile(path),
                        _ => Step::ValidateFile(path),
                    })
                    .collect())
            }
            WorkflowType::BatchEnhance => Ok(string_list(params, "validation_ids")
                .into_iter()
                .map(Step::Enhance)
                .collect()),
            WorkflowType::RecommendationBatch => Ok(string_list(params, "recommendation_ids")
                .into_iter()
                .map(Step::ApplyRecommendation)
                .collect()),
        }
    }

    fn run_step(&self, step: &Step) -> Result<(), String> {
        match step {
            Step::ValidateFile(path) => {
                self.ingestion.process_file(path)?;
                Ok(())
            }
            Step::AuditFile(path) => self.audit_file(path),
            Step::Enhance(validation_id) => self
                .enhancer
                .enhance_one(validation_id)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Step::ApplyRecommendation(recommendation_id) => {
                self.apply_recommendation(recommendation_id)
            }
        }
    }

    /// Validate a file, then generate and persist recommendations for the
    /// record it produced.
    fn audit_file(&self, path: &Path) -> Result<(), String> {
        let outcome = self.ingestion.process_file(path)?;

        let Some(validation_id) = outcome.validation_id else {
            return Ok(());
        };

        let record = self
            .store
            .get_validation(&validation_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Validation {validation_id} not found"))?;

        let content = mdfs::read_text(path).map_err(|e| e.to_string())?;
        let drafts = self.generator.generate(&record, &content);

        for draft in drafts
            .into_iter()
            .filter(|d| d.confidence >= AUDIT_THRESHOLD)
        {
            self.store
                .create_recommendation(mdcheck_store::NewRecommendation {
                    validation_id: validation_id.clone(),
                    kind: draft.kind,
                    title: draft.title,
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
                })
                .map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    /// Apply one approved recommendation to its file and mark it applied.
    fn apply_recommendation(&self, recommendation_id: &str) -> Result<(), String> {
        let recommendation = self
            .store
            .get_recommendation(recommendation_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Recommendation {recommendation_id} not found"))?;

        if recommendation.status != RecommendationStatus::Approved {
            return Err(format!(
                "Recommendation {recommendation_id} not approved (status: {})",
                recommendation.status
            ));
        }

        let (Some(original), Some(proposed)) = (
            recommendation.original_content.as_deref(),
            recommendation.proposed_content.as_deref(),
        ) else {
            return Err(format!(
                "Recommendation {recommendation_id} missing original/proposed content"
            ));
        };

        let validation = self
            .store
            .get_validation(&recommendation.validation_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Validation {} not found", recommendation.validation_id))?;

        let path = PathBuf::from(&validation.file_path);
        let content = mdfs::read_text(&path).map_err(|e| e.to_string())?;

        let updated = replace_first(&content, original, proposed)
            .ok_or("Original content not found in file")?;

        let utf8_path = Utf8Path::from_path(&path)
            .ok_or_else(|| format!("Non-UTF-8 path: {}", path.display()))?;
        mdfs::write_text_crlf_atomic(utf8_path, &updated).map_err(|e| e.to_string())?;

        self.store
            .update_recommendation_status(recommendation_id, RecommendationStatus::Applied, None)
            .map_err(|e| e.to_string())?;

        Ok(())
    }
}

fn string_list(params: &serde_json::Value, key: &str) -> Vec<String> {
    params[key]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
