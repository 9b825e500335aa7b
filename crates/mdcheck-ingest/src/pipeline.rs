//! The ingestion pipeline: read, detect family, split, validate, persist.

use crate::findings::{Finding, HeaderValue};
use chrono::{DateTime, Utc};
use mdcheck_rules::{FamilyDetector, RuleManager};
use mdcheck_store::{
    NewValidation, Severity, Store, StoreError, ValidationRecord, ValidationStatus,
};
use mdcheck_utils::{frontmatter, fs as mdfs};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

static EXTERNAL_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\((https?://[^)]+)\)").expect("link regex is valid"));

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(\w*)\n(.*?)\n```").expect("code-block regex is valid"));

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+)$").expect("heading regex is valid"));

/// Outcome of one validator group.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub valid: bool,
    pub findings: Vec<Finding>,
}

impl Validation {
    fn from_findings(findings: Vec<Finding>) -> Self {
        let valid = findings.iter().all(|f| f.severity != Severity::Error);
        Self { valid, findings }
    }
}

/// Per-file processing result inside a folder report.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file_path: String,
    pub family: Option<String>,
    pub header_valid: bool,
    pub body_valid: bool,
    pub validation_created: bool,
    pub validation_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Summary of one folder ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct FolderReport {
    pub folder_path: String,
    pub start_time: DateTime<Utc>,
    pub files_found: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub validations_created: usize,
    pub families_detected: std::collections::BTreeMap<String, usize>,
    pub errors: Vec<FileError>,
    pub file_results: Vec<FileOutcome>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Full analysis of one document, before persistence.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub family: Option<String>,
    pub header: Validation,
    pub body: Validation,
}

impl Analysis {
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.header.findings.iter().chain(self.body.findings.iter())
    }

    pub fn severity(&self) -> Severity {
        Severity::roll_up(self.findings().map(|f| f.severity))
    }

    pub fn status(&self) -> ValidationStatus {
        if self.header.valid && self.body.valid {
            ValidationStatus::Pass
        } else {
            ValidationStatus::Fail
        }
    }

    /// One line per finding, `[kind] message`.
    pub fn notes(&self) -> String {
        self.findings()
            .map(|f| format!("[{}] {}", f.kind, f.message))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn results_json(&self) -> serde_json::Value {
        json!({
            "family": self.family,
            "header_valid": self.header.valid,
            "body_valid": self.body.valid,
            "findings": self.findings().collect::<Vec<_>>(),
        })
    }
}

/// Handles recursive ingestion and validation of markdown files.
pub struct Ingestion {
    store: Arc<Store>,
    rules: Arc<RuleManager>,
    detector: FamilyDetector,
}

impl Ingestion {
    pub fn new(store: Arc<Store>, rules: Arc<RuleManager>, detector: FamilyDetector) -> Self {
        Self {
            store,
            rules,
            detector,
        }
    }

    /// Ingest every `.md` file under `folder`. Single-file failures are
    /// recorded per file; the walk always completes.
    ///
    /// Callers must check the folder exists first; a missing folder simply
    /// produces an empty report here.
    pub fn ingest_folder(&self, folder: &Path, recursive: bool) -> FolderReport {
        let start = Instant::now();
        let start_time = Utc::now();
        let md_files = mdfs::list_markdown_files(folder, recursive);

        let mut report = FolderReport {
            folder_path: folder.display().to_string(),
            start_time,
            files_found: md_files.len(),
            files_processed: 0,
            files_failed: 0,
            validations_created: 0,
            families_detected: Default::default(),
            errors: Vec::new(),
            file_results: Vec::new(),
            end_time: start_time,
            duration_seconds: 0.0,
        };

        for md_file in &md_files {
            match self.process_file(md_file) {
                Ok(outcome) => {
                    if outcome.validation_created {
                        report.validations_created += 1;
                    }
                    if let Some(family) = &outcome.family {
                        *report.families_detected.entry(family.clone()).or_insert(0) += 1;
                    }
                    report.file_results.push(outcome);
                    report.files_processed += 1;
                }
                Err(error) => {
                    report.errors.push(FileError {
                        file: md_file.display().to_string(),
                        error,
                        timestamp: Utc::now(),
                    });
                    report.files_failed += 1;
                }
            }
        }

        report.end_time = Utc::now();
        report.duration_seconds = start.elapsed().as_secs_f64();
        debug!(
            folder = %report.folder_path,
            processed = report.files_processed,
            failed = report.files_failed,
            "folder ingestion complete"
        );
        report
    }

    /// Process a single file: analyze it and, when there are findings,
    /// persist a validation record. A persistence failure is downgraded to
    /// a logged warning so batch ingestion completes.
    pub fn process_file(&self, file_path: &Path) -> Result<FileOutcome, String> {
        let content = mdfs::read_text(file_path).map_err(|e| e.to_string())?;
        let analysis = self.analyze(file_path, &content);

        let mut outcome = FileOutcome {
            file_path: file_path.display().to_string(),
            family: analysis.family.clone(),
            header_valid: analysis.header.valid,
            body_valid: analysis.body.valid,
            validation_created: false,
            validation_id: None,
            error: None,
        };

        if analysis.findings().next().is_some() {
            match self.persist(&analysis, &outcome.file_path, String::new(), Vec::new(), None) {
                Ok(record) => {
                    outcome.validation_id = Some(record.id);
                    outcome.validation_created = true;
                }
                Err(e) => {
                    warn!(file = %outcome.file_path, error = %e, "could not create validation record");
                    outcome.error = Some(e.to_string());
                }
            }
        }

        Ok(outcome)
    }

    /// Run header and body validation without touching the store.
    pub fn analyze(&self, file_path: &Path, content: &str) -> Analysis {
        let family = self.detector.detect(file_path);
        let (header_raw, body) = frontmatter::split(content);

        let mut header_findings = Vec::new();
        let header_data = match header_raw {
            Some(raw) if !raw.trim().is_empty() => {
                match serde_yaml::from_str::<serde_yaml::Value>(raw) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        header_findings.push(Finding::invalid_header_syntax(&e.to_string()));
                        None
                    }
                }
            }
            _ => None,
        };

        if let (Some(family), Some(serde_yaml::Value::Mapping(mapping))) =
            (family.as_deref(), header_data.as_ref())
        {
            header_findings.extend(self.validate_header(mapping, family));
        }

        let body_findings = Self::validate_body(body, header_data.as_ref());

        Analysis {
            family,
            header: Validation::from_findings(header_findings),
            body: Validation::from_findings(body_findings),
        }
    }

    /// Persist a record for an analysis. Status and severity derive from
    /// the findings; `notes` defaults to one line per finding.
    pub fn persist(
        &self,
        analysis: &Analysis,
        file_path: &str,
        content: String,
        validation_types: Vec<String>,
        notes: Option<String>,
    ) -> Result<ValidationRecord, StoreError> {
        let mut rules_applied = Vec::new();
        if !analysis.header.findings.is_empty() || analysis.family.is_some() {
            rules_applied.push("header_validation".to_string());
        }
        rules_applied.push("body_validation".to_string());

        self.store.create_validation(NewValidation {
            file_path: file_path.to_string(),
            status: Some(analysis.status()),
            severity: Some(analysis.severity()),
            rules_applied,
            validation_types,
            validation_results: analysis.results_json(),
            content,
            notes: notes.unwrap_or_else(|| analysis.notes()),
        })
    }

    fn validate_header(&self, header: &serde_yaml::Mapping, family: &str) -> Vec<Finding> {
        let rules = self.rules.get(family);
        let requirements = &rules.validation_requirements;
        let mut findings = Vec::new();

        let get = |field: &str| header.get(field);

        for field in &requirements.required_fields {
            if get(field).is_none() {
                findings.push(Finding::missing_required_field(field));
            }
        }

        for (field, expected) in &requirements.field_types {
            if let Some(value) = get(field) {
                let actual = HeaderValue::of(value);
                if !actual.matches(expected) {
                    findings.push(Finding::invalid_field_type(field, expected, actual.name()));
                }
            }
        }

        for (field, valid_values) in &requirements.field_enums {
            if let Some(value) = get(field) {
                let value_json = yaml_to_json(value);
                if !valid_values.contains(&value_json) {
                    findings.push(Finding::invalid_enum_value(field, &value_json, valid_values));
                }
            }
        }

        for field in &requirements.forbidden_fields {
            if get(field).is_some() {
                findings.push(Finding::forbidden_field(field));
            }
        }

        findings
    }

    fn validate_body(body: &str, header: Option<&serde_yaml::Value>) -> Vec<Finding> {
        let mut findings = Vec::new();

        let links: Vec<String> = EXTERNAL_LINK
            .captures_iter(body)
            .map(|c| c[2].to_string())
            .collect();
        if !links.is_empty() {
            findings.push(Finding::external_links(links));
        }

        for (index, captures) in CODE_BLOCK.captures_iter(body).enumerate() {
            if captures[1].is_empty() {
                findings.push(Finding::missing_code_language(index));
            }
        }

        let mut prev_level = 0usize;
        for captures in HEADING.captures_iter(body) {
            let level = captures[1].len();
            let title = captures[2].trim();
            if level > prev_level + 1 {
                findings.push(Finding::heading_structure(title, prev_level, level));
            }
            prev_level = level;
        }

        if let Some(title) = header
            .and_then(|h| h.get("title"))
            .and_then(|t| t.as_str())
            && !title.is_empty()
            && !body.contains(title)
        {
            findings.push(Finding::title_consistency(title));
        }

        findings
    }
}

fn yaml_to_json(value: &serde_yaml::Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn ingestion(dir: &TempDir) -> Ingestion {
        let rules_dir = dir.path().join("rules");
        fs::create_dir_all(&rules_dir).unwrap();
        fs::write(
            rules_dir.join("words.json"),
            r#"{
                "validation_requirements": {
                    "required_fields": ["title"],
                    "field_types": {"weight": "int"},
                    "field_enums": {"draft": [true, false]},
                    "forbidden_fields": ["secret"]
                }
            }"#,
        )
        .unwrap();

        let store = Arc::new(Store::open_in_memory().unwrap());
        let rules = Arc::new(RuleManager::new(&rules_dir));
        let detector = FamilyDetector::new(&rules_dir, dir.path().join("truth"));
        Ingestion::new(store, rules, detector)
    }

    fn write_doc(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn clean_document_has_no_findings() {
        let dir = TempDir::new().unwrap();
        let ing = ingestion(&dir);
        let doc = write_doc(&dir, "doc.md", "---\ntitle: Hi\n---\n# Hi\n\nHello.\n");

        let analysis = ing.analyze(&doc, &mdfs::read_text(&doc).unwrap());
        assert_eq!(analysis.family.as_deref(), Some("words"));
        assert!(analysis.header.valid);
        assert!(analysis.body.valid);
        assert_eq!(analysis.findings().count(), 0);
        assert_eq!(analysis.status(), ValidationStatus::Pass);
    }

    #[test]
    fn missing_required_field_fails_header() {
        let dir = TempDir::new().unwrap();
        let ing = ingestion(&dir);
        let doc = write_doc(&dir, "doc.md", "---\nweight: 3\n---\n# Doc\n");

        let analysis = ing.analyze(&doc, &mdfs::read_text(&doc).unwrap());
        assert!(!analysis.header.valid);
        assert_eq!(analysis.status(), ValidationStatus::Fail);
        assert_eq!(analysis.severity(), Severity::Error);

        let kinds: Vec<_> = analysis.findings().map(|f| f.kind.clone()).collect();
        assert!(kinds.contains(&"missing_required_field".to_string()));
    }

    #[test]
    fn field_type_and_enum_checks() {
        let dir = TempDir::new().unwrap();
        let ing = ingestion(&dir);
        let doc = write_doc(
            &dir,
            "doc.md",
            "---\ntitle: Hi\nweight: heavy\ndraft: maybe\nsecret: x\n---\n# Hi\n",
        );

        let analysis = ing.analyze(&doc, &mdfs::read_text(&doc).unwrap());
        let kinds: Vec<_> = analysis.findings().map(|f| f.kind.clone()).collect();
        assert!(kinds.contains(&"invalid_field_type".to_string()));
        assert!(kinds.contains(&"invalid_enum_value".to_string()));
        assert!(kinds.contains(&"forbidden_field".to_string()));
    }

    #[test]
    fn invalid_header_syntax_still_validates_body() {
        let dir = TempDir::new().unwrap();
        let ing = ingestion(&dir);
        let doc = write_doc(
            &dir,
            "doc.md",
            "---\ntitle: [unclosed\n---\n# Doc\n\n```\ncode\n```\n",
        );

        let analysis = ing.analyze(&doc, &mdfs::read_text(&doc).unwrap());
        let kinds: Vec<_> = analysis.findings().map(|f| f.kind.clone()).collect();
        assert!(kinds.contains(&"invalid_header_syntax".to_string()));
        assert!(kinds.contains(&"missing_code_language".to_string()));
    }

    #[test]
    fn body_validators_fire() {
        let dir = TempDir::new().unwrap();
        let ing = ingestion(&dir);
        let body = "\
# Title

[ext](https://example.com) and [int](./local.md)

```
no language
```

```rust
fn ok() {}
```

#### Jumped
";
        let doc = write_doc(&dir, "doc.md", &format!("---\ntitle: Other\n---\n{body}"));

        let analysis = ing.analyze(&doc, &mdfs::read_text(&doc).unwrap());
        let kinds: Vec<_> = analysis.findings().map(|f| f.kind.clone()).collect();

        assert!(kinds.contains(&"external_links".to_string()));
        assert!(kinds.contains(&"missing_code_language".to_string()));
        assert!(kinds.contains(&"heading_structure".to_string()));
        assert!(kinds.contains(&"title_consistency".to_string()));

        // Internal links and tagged blocks produce nothing extra.
        let external = analysis
            .findings()
            .find(|f| f.kind == "external_links")
            .unwrap();
        assert_eq!(external.extra["count"], 1);

        // Only warnings and infos here, so the document still passes.
        assert_eq!(analysis.status(), ValidationStatus::Pass);
        assert_eq!(analysis.severity(), Severity::Warning);
    }

    #[test]
    fn severity_stops_at_first_error() {
        let dir = TempDir::new().unwrap();
        let ing = ingestion(&dir);
        // Missing title (error) plus external link (warning).
        let doc = write_doc(
            &dir,
            "doc.md",
            "---\nweight: 1\n---\n[x](https://example.com)\n",
        );

        let analysis = ing.analyze(&doc, &mdfs::read_text(&doc).unwrap());
        assert_eq!(analysis.severity(), Severity::Error);
    }

    #[test]
    fn folder_ingestion_counts_and_isolates_failures() {
        let dir = TempDir::new().unwrap();
        let ing = ingestion(&dir);
        let docs = dir.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("good.md"), "---\ntitle: A\n---\n# A\n").unwrap();
        fs::write(docs.join("bad.md"), "---\nweight: 1\n---\n# B\n").unwrap();
        // Invalid UTF-8 makes the read itself fail.
        fs::write(docs.join("binary.md"), [0xff, 0xfe, 0x00]).unwrap();

        let report = ing.ingest_folder(&docs, true);
        assert_eq!(report.files_found, 3);
        assert_eq!(report.files_processed, 2);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].file.ends_with("binary.md"));
        // bad.md is missing its required title, so one record was created.
        assert_eq!(report.validations_created, 1);
        assert_eq!(report.families_detected.get("words"), Some(&2));
    }

    #[test]
    fn empty_folder_processes_nothing() {
        let dir = TempDir::new().unwrap();
        let ing = ingestion(&dir);
        let docs = dir.path().join("docs");
        fs::create_dir_all(&docs).unwrap();

        let report = ing.ingest_folder(&docs, true);
        assert_eq!(report.files_found, 0);
        assert_eq!(report.files_processed, 0);
    }

    #[test]
    fn persist_writes_notes_from_findings() {
        let dir = TempDir::new().unwrap();
        let ing = ingestion(&dir);
        let doc = write_doc(&dir, "doc.md", "---\nweight: 1\n---\n# Doc\n");

        let content = mdfs::read_text(&doc).unwrap();
        let analysis = ing.analyze(&doc, &content);
        let record = ing
            .persist(&analysis, &doc.display().to_string(), content, vec![], None)
            .unwrap();

        assert_eq!(record.status, ValidationStatus::Fail);
        assert!(record.notes.contains("[missing_required_field]"));
        assert_eq!(record.validation_results["header_valid"], false);
    }
}
