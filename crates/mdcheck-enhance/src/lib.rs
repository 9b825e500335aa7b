//! LLM-backed content enhancement.
//!
//! The engine gates on approval and path safety, asks the model for a
//! revised document, writes it back atomically with CRLF normalization,
//! and records original, enhanced, diff, and provenance on the validation
//! record. Preview runs the same call without touching the file or the
//! record.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use mdcheck_llm::{ChatMessage, LlmBackend};
use mdcheck_prompts::PromptLoader;
use mdcheck_store::{Store, ValidationRecord, ValidationStatus, ts_millis};
use mdcheck_utils::diff::{self, DiffReport};
use mdcheck_utils::{fs as mdfs, paths};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Used when the prompt loader has no `enhancer/enhance_markdown` template.
const FALLBACK_PROMPT: &str = "Please enhance this markdown document by:\n\
1. Improving clarity and readability\n\
2. Fixing any grammatical issues\n\
3. Ensuring proper formatting\n\
4. Adding missing sections if needed\n\
5. Maintaining the original meaning and structure\n\
\n\
Original content:\n\
{content}\n\
\n\
Enhanced content:";

const SYSTEM_MESSAGE: &str = "You are a technical writing assistant. Enhance markdown \
documents while preserving their structure and meaning.";

/// Failures while enhancing one record. Each message is the user-visible,
/// per-id error string.
#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("Validation {id} not found")]
    NotFound { id: String },

    #[error("Validation {id} not approved (status: {status})")]
    NotApproved { id: String, status: ValidationStatus },

    #[error(
        "Cannot enhance validation {id}: invalid file path '{path}'. \
         This validation was created without a valid file reference."
    )]
    InvalidFilePath { id: String, path: String },

    #[error("Unsafe file path: {path}")]
    UnsafePath { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Cannot write to file: {path}")]
    NotWritable { path: String },

    #[error("Enhancement failed for {id}: {reason}")]
    Failed { id: String, reason: String },

    #[error("Validation {id} has not been enhanced")]
    NotEnhanced { id: String },
}

/// Audit payload describing one completed enhancement.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EnhancementOutcome {
    pub validation_id: String,
    pub action: &'static str,
    #[serde(with = "ts_millis")]
    pub timestamp: DateTime<Utc>,
    pub original_size: usize,
    pub enhanced_size: usize,
    pub model_used: String,
}

/// Preview of an enhancement: nothing on disk or in the store changes.
#[derive(Debug, Clone)]
pub struct Preview {
    pub validation_id: String,
    pub original_content: String,
    pub enhanced_content: String,
    pub diff: DiffReport,
}

/// Stored before/after comparison for an ENHANCED record.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub validation_id: String,
    pub original_content: String,
    pub enhanced_content: String,
    pub diff: DiffReport,
}

pub struct Enhancer {
    store: Arc<Store>,
    llm: Arc<dyn LlmBackend>,
    prompts: Arc<PromptLoader>,
}

impl Enhancer {
    pub fn new(store: Arc<Store>, llm: Arc<dyn LlmBackend>, prompts: Arc<PromptLoader>) -> Self {
        Self {
            store,
            llm,
            prompts,
        }
    }

    /// Enhance one approved record: call the model, write the file back
    /// atomically, persist enhancement data, transition to ENHANCED.
    pub fn enhance_one(&self, validation_id: &str) -> Result<EnhancementOutcome, EnhanceError> {
        let mut record = self.load(validation_id)?;

        if record.status != ValidationStatus::Approved {
            return Err(EnhanceError::NotApproved {
                id: validation_id.to_string(),
                status: record.status,
            });
        }

        let file_path = self.checked_path(&record)?;
        if !paths::validate_write_path(&file_path) {
            return Err(EnhanceError::NotWritable {
                path: file_path.display().to_string(),
            });
        }

        let original_content = self.read_original(validation_id, &file_path)?;
        let enhanced_content = self.run_model(validation_id, &original_content)?;

        // The file is updated first; the record only transitions once the
        // write has landed.
        let utf8_path =
            Utf8Path::from_path(&file_path).ok_or_else(|| EnhanceError::UnsafePath {
                path: file_path.display().to_string(),
            })?;
        mdfs::write_text_crlf_atomic(utf8_path, &enhanced_content).map_err(|e| {
            EnhanceError::Failed {
                id: validation_id.to_string(),
                reason: e.to_string(),
            }
        })?;

        let report = diff::generate(&original_content, &enhanced_content);
        let outcome = EnhancementOutcome {
            validation_id: validation_id.to_string(),
            action: "enhance",
            timestamp: Utc::now(),
            original_size: original_content.len(),
            enhanced_size: enhanced_content.len(),
            model_used: self.llm.default_model().to_string(),
        };

        let mut results = match record.validation_results.take() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        results.insert("original_content".to_string(), json!(original_content));
        results.insert("enhanced_content".to_string(), json!(enhanced_content));
        results.insert("diff".to_string(), json!(report.unified_diff));
        results.insert(
            "enhancement_timestamp".to_string(),
            json!(ts_millis::to_string(&outcome.timestamp)),
        );
        results.insert("model_used".to_string(), json!(outcome.model_used));
        record.validation_results = serde_json::Value::Object(results);
        record.status = ValidationStatus::Enhanced;

        let audit_line = serde_json::to_string(&outcome).unwrap_or_default();
        if record.notes.is_empty() {
            record.notes = format!("Enhanced: {audit_line}");
        } else {
            record.notes = format!("{}\n\nEnhanced: {audit_line}", record.notes);
        }

        self.store
            .save_validation(&record)
            .map_err(|e| EnhanceError::Failed {
                id: validation_id.to_string(),
                reason: e.to_string(),
            })?;

        info!(
            validation_id,
            original = outcome.original_size,
            enhanced = outcome.enhanced_size,
            "enhanced validation"
        );
        Ok(outcome)
    }

    /// Run the enhancement model call without applying anything.
    pub fn preview(&self, validation_id: &str) -> Result<Preview, EnhanceError> {
        let record = self.load(validation_id)?;
        let file_path = self.checked_path(&record)?;
        let original_content = self.read_original(validation_id, &file_path)?;
        let enhanced_content = self.run_model(validation_id, &original_content)?;
        let diff = diff::generate(&original_content, &enhanced_content);

        Ok(Preview {
            validation_id: validation_id.to_string(),
            original_content,
            enhanced_content,
            diff,
        })
    }

    /// Stored before/after comparison; requires `status = ENHANCED`.
    pub fn comparison(&self, validation_id: &str) -> Result<Comparison, EnhanceError> {
        let record = self.load(validation_id)?;

        if record.status != ValidationStatus::Enhanced {
            return Err(EnhanceError::NotEnhanced {
                id: validation_id.to_string(),
            });
        }

        let results = &record.validation_results;
        let original_content = results["original_content"].as_str().unwrap_or_default();
        let enhanced_content = results["enhanced_content"].as_str().unwrap_or_default();

        Ok(Comparison {
            validation_id: validation_id.to_string(),
            original_content: original_content.to_string(),
            enhanced_content: enhanced_content.to_string(),
            diff: diff::generate(original_content, enhanced_content),
        })
    }

    fn load(&self, validation_id: &str) -> Result<ValidationRecord, EnhanceError> {
        self.store
            .get_validation(validation_id)
            .map_err(|e| EnhanceError::Failed {
                id: validation_id.to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| EnhanceError::NotFound {
                id: validation_id.to_string(),
            })
    }

    /// Reject placeholder paths, unsafe paths, and missing files.
    fn checked_path(&self, record: &ValidationRecord) -> Result<PathBuf, EnhanceError> {
        if matches!(record.file_path.as_str(), "unknown" | "Unknown" | "") {
            return Err(EnhanceError::InvalidFilePath {
                id: record.id.clone(),
                path: record.file_path.clone(),
            });
        }

        let path = PathBuf::from(&record.file_path);
        if !paths::is_safe_path(&path) {
            return Err(EnhanceError::UnsafePath {
                path: record.file_path.clone(),
            });
        }
        if !path.exists() {
            return Err(EnhanceError::FileNotFound {
                path: record.file_path.clone(),
            });
        }

        Ok(path)
    }

    fn read_original(&self, validation_id: &str, path: &Path) -> Result<String, EnhanceError> {
        mdfs::read_text(path).map_err(|e| EnhanceError::Failed {
            id: validation_id.to_string(),
            reason: e.to_string(),
        })
    }

    fn run_model(&self, validation_id: &str, original: &str) -> Result<String, EnhanceError> {
        let template = {
            let loaded = self.prompts.get("enhancer", "enhance_markdown");
            if loaded.is_empty() {
                FALLBACK_PROMPT.to_string()
            } else {
                loaded
            }
        };
        let prompt = template.replace("{content}", original);

        let messages = [
            ChatMessage::system(SYSTEM_MESSAGE),
            ChatMessage::user(prompt),
        ];

        let enhanced = self
            .llm
            .chat(None, &messages)
            .map_err(|e| {
                error!(validation_id, error = %e, "enhancement model call failed");
                EnhanceError::Failed {
                    id: validation_id.to_string(),
                    reason: e.to_string(),
                }
            })?
            .trim()
            .to_string();

        // An empty response must leave the file and the record untouched.
        if enhanced.is_empty() {
            return Err(EnhanceError::Failed {
                id: validation_id.to_string(),
                reason: "model returned empty content".to_string(),
            });
        }

        Ok(enhanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdcheck_llm::LlmError;
    use mdcheck_store::{NewValidation, Severity};
    use serde_json::Value;
    use std::fs;
    use tempfile::TempDir;

    struct StubLlm {
        reply: String,
    }

    impl LlmBackend for StubLlm {
        fn generate(
            &self,
            _model: Option<&str>,
            _prompt: &str,
            _options: Option<&Value>,
        ) -> Result<String, LlmError> {
            Ok(self.reply.clone())
        }

        fn chat(
            &self,
            _model: Option<&str>,
            _messages: &[ChatMessage],
        ) -> Result<String, LlmError> {
            Ok(self.reply.clone())
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

    fn setup(reply: &str) -> (TempDir, Arc<Store>, Enhancer) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let prompts = Arc::new(PromptLoader::new(dir.path().join("prompts")));
        let llm = Arc::new(StubLlm {
            reply: reply.to_string(),
        });
        let enhancer = Enhancer::new(Arc::clone(&store), llm, prompts);
        (dir, store, enhancer)
    }

    fn approved_record(store: &Store, path: &Path) -> ValidationRecord {
        store
            .create_validation(NewValidation {
                file_path: path.display().to_string(),
                status: Some(ValidationStatus::Approved),
                severity: Some(Severity::Info),
                validation_results: serde_json::json!({"findings": []}),
                ..NewValidation::default()
            })
            .unwrap()
    }

    #[test]
    fn enhance_writes_file_and_transitions_record() {
        let (dir, store, enhancer) = setup("# Hi\n\nHello, world.");
        let doc = dir.path().join("doc.md");
        fs::write(&doc, "# Hi\n\nHello.\n").unwrap();
        let record = approved_record(&store, &doc);

        let outcome = enhancer.enhance_one(&record.id).unwrap();
        assert_eq!(outcome.model_used, "stub");

        // CRLF normalized on write.
        let written = fs::read(&doc).unwrap();
        assert_eq!(written, b"# Hi\r\n\r\nHello, world.");

        let loaded = store.get_validation(&record.id).unwrap().unwrap();
        assert_eq!(loaded.status, ValidationStatus::Enhanced);
        let results = &loaded.validation_results;
        assert_eq!(results["original_content"], "# Hi\n\nHello.\n");
        assert_eq!(results["enhanced_content"], "# Hi\n\nHello, world.");
        assert!(results["diff"].as_str().unwrap().contains("Hello, world."));
        assert!(results["enhancement_timestamp"].is_string());
        assert_eq!(results["model_used"], "stub");
        assert!(loaded.notes.contains("Enhanced:"));
    }

    #[test]
    fn enhance_requires_approval() {
        let (dir, store, enhancer) = setup("anything");
        let doc = dir.path().join("doc.md");
        fs::write(&doc, "# Hi\n").unwrap();

        let record = store
            .create_validation(NewValidation {
                file_path: doc.display().to_string(),
                status: Some(ValidationStatus::Pass),
                ..NewValidation::default()
            })
            .unwrap();

        let err = enhancer.enhance_one(&record.id).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Validation {} not approved (status: pass)", record.id)
        );
        // File untouched.
        assert_eq!(fs::read_to_string(&doc).unwrap(), "# Hi\n");
    }

    #[test]
    fn re_enhancing_requires_re_approval() {
        let (dir, store, enhancer) = setup("# changed\n");
        let doc = dir.path().join("doc.md");
        fs::write(&doc, "# Hi\n").unwrap();
        let record = approved_record(&store, &doc);

        enhancer.enhance_one(&record.id).unwrap();
        let err = enhancer.enhance_one(&record.id).unwrap_err();
        assert!(matches!(err, EnhanceError::NotApproved { .. }));
    }

    #[test]
    fn unknown_file_path_blocks_enhancement() {
        let (_dir, store, enhancer) = setup("anything");
        let record = store
            .create_validation(NewValidation {
                file_path: "unknown".to_string(),
                status: Some(ValidationStatus::Approved),
                ..NewValidation::default()
            })
            .unwrap();

        let err = enhancer.enhance_one(&record.id).unwrap_err();
        assert!(matches!(err, EnhanceError::InvalidFilePath { .. }));
    }

    #[test]
    fn empty_model_reply_leaves_everything_untouched() {
        let (dir, store, enhancer) = setup("   ");
        let doc = dir.path().join("doc.md");
        fs::write(&doc, "# Hi\n").unwrap();
        let record = approved_record(&store, &doc);

        let err = enhancer.enhance_one(&record.id).unwrap_err();
        assert!(err.to_string().contains("empty content"));
        assert_eq!(fs::read_to_string(&doc).unwrap(), "# Hi\n");
        assert_eq!(
            store.get_validation(&record.id).unwrap().unwrap().status,
            ValidationStatus::Approved
        );
    }

    #[test]
    fn preview_does_not_mutate() {
        let (dir, store, enhancer) = setup("# Hi\n\nBetter.\n");
        let doc = dir.path().join("doc.md");
        fs::write(&doc, "# Hi\n\nHello.\n").unwrap();
        let record = approved_record(&store, &doc);

        let preview = enhancer.preview(&record.id).unwrap();
        assert_eq!(preview.original_content, "# Hi\n\nHello.\n");
        assert!(preview.diff.additions_count >= 1);

        assert_eq!(fs::read_to_string(&doc).unwrap(), "# Hi\n\nHello.\n");
        assert_eq!(
            store.get_validation(&record.id).unwrap().unwrap().status,
            ValidationStatus::Approved
        );
    }

    #[test]
    fn comparison_requires_enhanced_status() {
        let (dir, store, enhancer) = setup("# new\n");
        let doc = dir.path().join("doc.md");
        fs::write(&doc, "# old\n").unwrap();
        let record = approved_record(&store, &doc);

        assert!(matches!(
            enhancer.comparison(&record.id),
            Err(EnhanceError::NotEnhanced { .. })
        ));

        enhancer.enhance_one(&record.id).unwrap();
        let comparison = enhancer.comparison(&record.id).unwrap();
        assert_eq!(comparison.original_content, "# old\n");
        assert!(comparison.diff.additions_count >= 1);
        assert!(comparison.diff.deletions_count >= 1);
    }
}
