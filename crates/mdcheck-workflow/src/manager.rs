//! Workflow lifecycle: creation, control, summaries, deletion.

use crate::control::{ControlState, WorkflowControl};
use crate::worker::Worker;
use chrono::Utc;
use mdcheck_enhance::Enhancer;
use mdcheck_ingest::Ingestion;
use mdcheck_recommend::RecommendationGenerator;
use mdcheck_store::{Store, StoreError, Workflow, WorkflowState, WorkflowType};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow {id} not found")]
    NotFound { id: String },

    #[error(
        "Invalid workflow type: {0}. Valid types: validate_directory, batch_enhance, \
         full_audit, recommendation_batch"
    )]
    InvalidType(String),

    #[error("Missing required workflow parameter: {0}")]
    MissingParam(&'static str),

    #[error("Cannot {action} workflow {id} in state {state}")]
    InvalidTransition {
        id: String,
        action: &'static str,
        state: WorkflowState,
    },

    #[error("Cannot delete running workflow {id}. Cancel it first or use force=true")]
    DeleteRunning { id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Dashboard-shaped progress view.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub status: WorkflowState,
    pub progress_percent: f64,
    pub files_processed: i64,
    pub files_total: i64,
    pub errors_count: i64,
    pub duration_seconds: f64,
    pub eta_seconds: f64,
}

pub(crate) type ControlMap = Arc<Mutex<HashMap<String, Arc<WorkflowControl>>>>;

/// Creates workflows, spawns their workers, and arbitrates control actions.
pub struct WorkflowManager {
    pub(crate) store: Arc<Store>,
    pub(crate) ingestion: Arc<Ingestion>,
    pub(crate) enhancer: Arc<Enhancer>,
    pub(crate) generator: Arc<dyn RecommendationGenerator>,
    controls: ControlMap,
}

impl WorkflowManager {
    pub fn new(
        store: Arc<Store>,
        ingestion: Arc<Ingestion>,
        enhancer: Arc<Enhancer>,
        generator: Arc<dyn RecommendationGenerator>,
    ) -> Self {
        Self {
            store,
            ingestion,
            enhancer,
            generator,
            controls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate type and params, persist the workflow, and spawn its worker.
    pub fn create(
        &self,
        workflow_type: &str,
        params: Value,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Workflow, WorkflowError> {
        let parsed_type = WorkflowType::from_str(workflow_type)
            .map_err(|_| WorkflowError::InvalidType(workflow_type.to_string()))?;

        Self::validate_params(parsed_type, &params)?;

        let workflow = self.store.create_workflow(
            parsed_type,
            params,
            json!({ "name": name, "description": description }),
        )?;

        let control = Arc::new(WorkflowControl::new());
        self.controls
            .lock()
            .expect("controls mutex poisoned")
            .insert(workflow.id.clone(), Arc::clone(&control));

        let worker = Worker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.ingestion),
            Arc::clone(&self.enhancer),
            Arc::clone(&self.generator),
            Arc::clone(&self.controls),
            workflow.id.clone(),
            control,
        );
        let thread_name = format!("workflow-{}", workflow.id);
        if let Err(e) = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker.run())
        {
            warn!(workflow_id = %workflow.id, error = %e, "failed to spawn workflow worker");
            self.store
                .set_workflow_state(&workflow.id, WorkflowState::Failed, Some(&e.to_string()))?;
        }

        info!(workflow_id = %workflow.id, workflow_type, "created workflow");
        Ok(workflow)
    }

    fn validate_params(workflow_type: WorkflowType, params: &Value) -> Result<(), WorkflowError> {
        match workflow_type {
            WorkflowType::ValidateDirectory | WorkflowType::FullAudit => {
                if params["directory_path"].as_str().is_none() {
                    return Err(WorkflowError::MissingParam("directory_path"));
                }
            }
            WorkflowType::BatchEnhance => {
                if params["validation_ids"].as_array().is_none() {
                    return Err(WorkflowError::MissingParam("validation_ids"));
                }
            }
            WorkflowType::RecommendationBatch => {
                if params["recommendation_ids"].as_array().is_none() {
                    return Err(WorkflowError::MissingParam("recommendation_ids"));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Workflow, WorkflowError> {
        self.store
            .get_workflow(id)?
            .ok_or_else(|| WorkflowError::NotFound { id: id.to_string() })
    }

    fn control_for(&self, id: &str) -> Option<Arc<WorkflowControl>> {
        self.controls
            .lock()
            .expect("controls mutex poisoned")
            .get(id)
            .cloned()
    }

    /// Pause a running workflow.
    pub fn pause(&self, id: &str) -> Result<WorkflowState, WorkflowError> {
        let workflow = self.get(id)?;
        if workflow.state != WorkflowState::Running {
            return Err(WorkflowError::InvalidTransition {
                id: id.to_string(),
                action: "pause",
                state: workflow.state,
            });
        }

        if let Some(control) = self.control_for(id) {
            control.request_pause();
        }
        self.store
            .set_workflow_state(id, WorkflowState::Paused, None)?;
        Ok(WorkflowState::Paused)
    }

    /// Resume a paused workflow.
    pub fn resume(&self, id: &str) -> Result<WorkflowState, WorkflowError> {
        let workflow = self.get(id)?;
        if workflow.state != WorkflowState::Paused {
            return Err(WorkflowError::InvalidTransition {
                id: id.to_string(),
                action: "resume",
                state: workflow.state,
            });
        }

        if let Some(control) = self.control_for(id) {
            control.request_resume();
        }
        self.store
            .set_workflow_state(id, WorkflowState::Running, None)?;
        Ok(WorkflowState::Running)
    }

    /// Cancel a running or paused workflow. The worker honors the flag at
    /// its next step boundary.
    pub fn cancel(&self, id: &str) -> Result<WorkflowState, WorkflowError> {
        let workflow = self.get(id)?;
        if !matches!(
            workflow.state,
            WorkflowState::Running | WorkflowState::Paused
        ) {
            return Err(WorkflowError::InvalidTransition {
                id: id.to_string(),
                action: "cancel",
                state: workflow.state,
            });
        }

        if let Some(control) = self.control_for(id) {
            control.request_cancel();
        }
        self.store
            .set_workflow_state(id, WorkflowState::Cancelled, None)?;
        Ok(WorkflowState::Cancelled)
    }

    pub fn summary(&self, id: &str) -> Result<WorkflowSummary, WorkflowError> {
        let workflow = self.get(id)?;

        let metadata = &workflow.metadata;
        let files_total = metadata["files_total"]
            .as_i64()
            .unwrap_or(workflow.total_steps);
        let files_processed = metadata["files_processed"]
            .as_i64()
            .unwrap_or(workflow.current_step);
        let errors_count = metadata["errors_count"].as_i64().unwrap_or(0);

        let end = workflow.completed_at.unwrap_or_else(Utc::now);
        let duration_seconds =
            (end - workflow.created_at).num_milliseconds().max(0) as f64 / 1000.0;

        let terminal = matches!(
            workflow.state,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        );
        let eta_seconds = if terminal {
            0.0
        } else {
            let remaining = (workflow.total_steps - workflow.current_step).max(0) as f64;
            duration_seconds * remaining / workflow.current_step.max(1) as f64
        };

        Ok(WorkflowSummary {
            status: workflow.state,
            progress_percent: workflow.progress_percent,
            files_processed,
            files_total,
            errors_count,
            duration_seconds,
            eta_seconds,
        })
    }

    /// Detailed report; `include_details` adds per-step metrics and the
    /// collected error list.
    pub fn report(&self, id: &str, include_details: bool) -> Result<Value, WorkflowError> {
        let workflow = self.get(id)?;
        let summary = self.summary(id)?;

        let mut report = json!({
            "workflow_id": workflow.id,
            "workflow_type": workflow.workflow_type,
            "status": workflow.state,
            "progress_percent": workflow.progress_percent,
            "current_step": workflow.current_step,
            "total_steps": workflow.total_steps,
            "duration_seconds": summary.duration_seconds,
            "eta_seconds": summary.eta_seconds,
            "errors_count": summary.errors_count,
        });

        if include_details {
            let steps_done = workflow.current_step.max(0);
            let avg_step_seconds = if steps_done > 0 {
                summary.duration_seconds / steps_done as f64
            } else {
                0.0
            };
            let details = json!({
                "input_params": workflow.input_params,
                "metadata": workflow.metadata,
                "error_message": workflow.error_message,
                "avg_step_duration_seconds": avg_step_seconds,
            });
            report
                .as_object_mut()
                .expect("report is an object")
                .insert("details".to_string(), details);
        }

        Ok(report)
    }

    /// Delete a workflow. A running workflow is refused unless `force`, in
    /// which case it is cancelled first.
    pub fn delete(&self, id: &str, force: bool) -> Result<(), WorkflowError> {
        let workflow = self.get(id)?;

        if workflow.state == WorkflowState::Running {
            if !force {
                return Err(WorkflowError::DeleteRunning { id: id.to_string() });
            }
            let _ = self.cancel(id);
        }

        self.store.delete_workflow(id)?;
        self.controls
            .lock()
            .expect("controls mutex poisoned")
            .remove(id);
        Ok(())
    }

    /// Whether the control flag for a workflow currently reads cancelled.
    pub fn is_cancelled(&self, id: &str) -> bool {
        self.control_for(id)
            .is_some_and(|control| control.state() == ControlState::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdcheck_enhance::Enhancer;
    use mdcheck_ingest::Ingestion;
    use mdcheck_llm::{ChatMessage, LlmBackend, LlmError};
    use mdcheck_prompts::PromptLoader;
    use mdcheck_recommend::FindingDrivenGenerator;
    use mdcheck_rules::{FamilyDetector, RuleManager};
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    struct StubLlm;

    impl LlmBackend for StubLlm {
        fn generate(
            &self,
            _model: Option<&str>,
            _prompt: &str,
            _options: Option<&Value>,
        ) -> Result<String, LlmError> {
            Ok("generated".to_string())
        }

        fn chat(
            &self,
            _model: Option<&str>,
            _messages: &[ChatMessage],
        ) -> Result<String, LlmError> {
            Ok("# Enhanced\n".to_string())
        }

        fn embed(
            &self,
            _model: Option<&str>,
            _inputs: &[String],
        ) -> Result<Vec<Vec<f64>>, LlmError> {
            Ok(Vec::new())
        }

        fn list_models(&self) -> Result<Vec<String>, LlmError> {
            Ok(vec!["stub".to_string()])
        }

        fn model_info(&self, _model: Option<&str>) -> Result<Value, LlmError> {
            Ok(Value::Null)
        }

        fn is_available(&self) -> bool {
            true
        }

        fn default_model(&self) -> &str {
            "stub"
        }
    }

    fn manager(dir: &TempDir) -> Arc<WorkflowManager> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let rules_dir = dir.path().join("rules");
        fs::create_dir_all(&rules_dir).unwrap();
        fs::write(
            rules_dir.join("words.json"),
            r#"{"validation_requirements": {"required_fields": ["title"]}}"#,
        )
        .unwrap();

        let rules = Arc::new(RuleManager::new(&rules_dir));
        let detector = FamilyDetector::new(&rules_dir, dir.path().join("truth"));
        let ingestion = Arc::new(Ingestion::new(Arc::clone(&store), rules, detector));
        let prompts = Arc::new(PromptLoader::new(dir.path().join("prompts")));
        let enhancer = Arc::new(Enhancer::new(
            Arc::clone(&store),
            Arc::new(StubLlm),
            prompts,
        ));
        Arc::new(WorkflowManager::new(
            store,
            ingestion,
            enhancer,
            Arc::new(FindingDrivenGenerator::new()),
        ))
    }

    fn wait_terminal(manager: &WorkflowManager, id: &str) -> Workflow {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let workflow = manager.get(id).unwrap();
            if matches!(
                workflow.state,
                WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
            ) {
                return workflow;
            }
            assert!(Instant::now() < deadline, "workflow did not finish in time");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn rejects_unknown_type_and_missing_params() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        let err = mgr
            .create("make_coffee", json!({}), None, None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidType(_)));

        let err = mgr
            .create("validate_directory", json!({}), None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::MissingParam("directory_path")
        ));

        let err = mgr.create("batch_enhance", json!({}), None, None).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingParam("validation_ids")));
    }

    #[test]
    fn validate_directory_workflow_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let docs = dir.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("one.md"), "---\ntitle: One\n---\n# One\n").unwrap();
        fs::write(docs.join("two.md"), "---\nweight: 2\n---\n# Two\n").unwrap();

        let workflow = mgr
            .create(
                "validate_directory",
                json!({"directory_path": docs.display().to_string(), "recursive": true}),
                Some("scan".to_string()),
                None,
            )
            .unwrap();

        let finished = wait_terminal(&mgr, &workflow.id);
        assert_eq!(finished.state, WorkflowState::Completed);
        assert_eq!(finished.progress_percent, 100.0);
        assert_eq!(finished.total_steps, 2);
        assert_eq!(finished.metadata["files_total"], 2);
        assert!(finished.completed_at.is_some());

        let summary = mgr.summary(&workflow.id).unwrap();
        assert_eq!(summary.status, WorkflowState::Completed);
        assert_eq!(summary.files_total, 2);
        assert_eq!(summary.eta_seconds, 0.0);
    }

    #[test]
    fn missing_directory_fails_workflow() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        let workflow = mgr
            .create(
                "validate_directory",
                json!({"directory_path": dir.path().join("nope").display().to_string()}),
                None,
                None,
            )
            .unwrap();

        let finished = wait_terminal(&mgr, &workflow.id);
        assert_eq!(finished.state, WorkflowState::Failed);
        assert!(
            finished
                .error_message
                .unwrap()
                .contains("Folder does not exist")
        );
    }

    #[test]
    fn batch_enhance_records_per_step_errors() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        let workflow = mgr
            .create(
                "batch_enhance",
                json!({"validation_ids": ["does-not-exist"]}),
                None,
                None,
            )
            .unwrap();

        let finished = wait_terminal(&mgr, &workflow.id);
        // The only step failed, so the workflow failed.
        assert_eq!(finished.state, WorkflowState::Failed);
        assert!(finished.error_message.unwrap().contains("not found"));
        assert_eq!(finished.metadata["errors_count"], 1);
    }

    #[test]
    fn empty_batch_completes_immediately() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        let workflow = mgr
            .create("batch_enhance", json!({"validation_ids": []}), None, None)
            .unwrap();

        let finished = wait_terminal(&mgr, &workflow.id);
        assert_eq!(finished.state, WorkflowState::Completed);
        assert_eq!(finished.progress_percent, 100.0);
    }

    #[test]
    fn control_validates_transitions() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        let workflow = mgr
            .create("batch_enhance", json!({"validation_ids": []}), None, None)
            .unwrap();
        wait_terminal(&mgr, &workflow.id);

        // A completed workflow accepts no control action.
        assert!(matches!(
            mgr.pause(&workflow.id),
            Err(WorkflowError::InvalidTransition { action: "pause", .. })
        ));
        assert!(matches!(
            mgr.resume(&workflow.id),
            Err(WorkflowError::InvalidTransition { action: "resume", .. })
        ));
        assert!(matches!(
            mgr.cancel(&workflow.id),
            Err(WorkflowError::InvalidTransition { action: "cancel", .. })
        ));

        assert!(matches!(
            mgr.pause("missing"),
            Err(WorkflowError::NotFound { .. })
        ));
    }

    #[test]
    fn pause_resume_cancel_on_synthetic_running_workflow() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        // Synthesize a running workflow without a live worker.
        let workflow = mgr
            .store
            .create_workflow(WorkflowType::BatchEnhance, json!({}), json!({}))
            .unwrap();
        mgr.store
            .set_workflow_state(&workflow.id, WorkflowState::Running, None)
            .unwrap();

        assert_eq!(mgr.pause(&workflow.id).unwrap(), WorkflowState::Paused);
        assert_eq!(mgr.resume(&workflow.id).unwrap(), WorkflowState::Running);
        assert_eq!(mgr.cancel(&workflow.id).unwrap(), WorkflowState::Cancelled);

        // Cancelled is terminal.
        assert!(mgr.resume(&workflow.id).is_err());
    }

    #[test]
    fn delete_refuses_running_without_force() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        let workflow = mgr
            .store
            .create_workflow(WorkflowType::BatchEnhance, json!({}), json!({}))
            .unwrap();
        mgr.store
            .set_workflow_state(&workflow.id, WorkflowState::Running, None)
            .unwrap();

        assert!(matches!(
            mgr.delete(&workflow.id, false),
            Err(WorkflowError::DeleteRunning { .. })
        ));

        mgr.delete(&workflow.id, true).unwrap();
        assert!(matches!(
            mgr.get(&workflow.id),
            Err(WorkflowError::NotFound { .. })
        ));
    }

    #[test]
    fn report_includes_details_on_request() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);

        let workflow = mgr
            .create("batch_enhance", json!({"validation_ids": []}), None, None)
            .unwrap();
        wait_terminal(&mgr, &workflow.id);

        let brief = mgr.report(&workflow.id, false).unwrap();
        assert!(brief.get("details").is_none());

        let full = mgr.report(&workflow.id, true).unwrap();
        assert!(full.get("details").is_some());
        assert_eq!(full["status"], "completed");
    }
}
