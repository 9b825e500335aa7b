//! Built-in generator deriving recommendations from validation findings.

use crate::{DraftRecommendation, RecommendationGenerator};
use mdcheck_store::ValidationRecord;
use serde_json::{Value, json};
use tracing::debug;

/// Turns the findings on a validation record into candidate edits.
///
/// Header and structure findings become advisory recommendations; untagged
/// code fences get a concrete first-occurrence text fix.
#[derive(Debug, Default)]
pub struct FindingDrivenGenerator;

impl FindingDrivenGenerator {
    pub fn new() -> Self {
        Self
    }

    fn confidence_for(severity: &str) -> f64 {
        match severity {
            "error" => 0.9,
            "warning" => 0.7,
            _ => 0.6,
        }
    }

    fn severity_label(severity: &str) -> String {
        match severity {
            "error" => "high",
            "warning" => "medium",
            _ => "low",
        }
        .to_string()
    }

    fn draft_for(finding: &Value, content: &str) -> Option<DraftRecommendation> {
        let kind = finding["type"].as_str()?;
        let severity = finding["severity"].as_str().unwrap_or("info");
        let message = finding["message"].as_str().unwrap_or_default();
        let confidence = Self::confidence_for(severity);
        let severity_label = Self::severity_label(severity);
        let metadata = json!({ "finding": finding });

        let draft = match kind {
            "missing_required_field"
            | "invalid_field_type"
            | "invalid_enum_value"
            | "forbidden_field"
            | "invalid_header_syntax" => {
                let field = finding["field"].as_str().unwrap_or("");
                DraftRecommendation {
                    kind: "header_fix".to_string(),
                    title: message.to_string(),
                    scope: "header".to_string(),
                    instruction: if field.is_empty() {
                        "Correct the document front-matter".to_string()
                    } else {
                        format!("Correct the front-matter field '{field}'")
                    },
                    rationale: message.to_string(),
                    severity: severity_label,
                    confidence,
                    original_content: None,
                    proposed_content: None,
                    metadata,
                }
            }
            "missing_code_language" => {
                // Concrete fix: tag the first untagged fence.
                let has_untagged = content.contains("```\n") || content.contains("```\r\n");
                let (original, proposed) = if has_untagged {
                    if content.contains("```\r\n") && !content.contains("```\n") {
                        (Some("```\r\n".to_string()), Some("```text\r\n".to_string()))
                    } else {
                        (Some("```\n".to_string()), Some("```text\n".to_string()))
                    }
                } else {
                    (None, None)
                };
                DraftRecommendation {
                    kind: "code_block_language".to_string(),
                    title: message.to_string(),
                    scope: "body".to_string(),
                    instruction: "Add a language tag to the fenced code block".to_string(),
                    rationale: "Untagged code blocks render without syntax highlighting"
                        .to_string(),
                    severity: severity_label,
                    confidence: 0.8,
                    original_content: original,
                    proposed_content: proposed,
                    metadata,
                }
            }
            "external_links" => DraftRecommendation {
                kind: "link_policy".to_string(),
                title: message.to_string(),
                scope: "body".to_string(),
                instruction: "Replace external links with internal references".to_string(),
                rationale: message.to_string(),
                severity: severity_label,
                confidence,
                original_content: None,
                proposed_content: None,
                metadata,
            },
            "heading_structure" => DraftRecommendation {
                kind: "structure".to_string(),
                title: message.to_string(),
                scope: "body".to_string(),
                instruction: "Adjust heading levels so they increase one step at a time"
                    .to_string(),
                rationale: message.to_string(),
                severity: severity_label,
                confidence,
                original_content: None,
                proposed_content: None,
                metadata,
            },
            "title_consistency" => DraftRecommendation {
                kind: "title_consistency".to_string(),
                title: message.to_string(),
                scope: "body".to_string(),
                instruction: "Mention the front-matter title in the document body".to_string(),
                rationale: message.to_string(),
                severity: severity_label,
                confidence,
                original_content: None,
                proposed_content: None,
                metadata,
            },
            _ => return None,
        };

        Some(draft)
    }
}

impl RecommendationGenerator for FindingDrivenGenerator {
    fn generate(&self, validation: &ValidationRecord, content: &str) -> Vec<DraftRecommendation> {
        let findings = validation.validation_results["findings"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let drafts: Vec<DraftRecommendation> = findings
            .iter()
            .filter_map(|finding| Self::draft_for(finding, content))
            .collect();

        debug!(
            validation_id = %validation.id,
            findings = findings.len(),
            drafts = drafts.len(),
            "generated recommendations from findings"
        );
        drafts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mdcheck_store::{Severity, ValidationStatus};

    fn record_with_findings(findings: Value) -> ValidationRecord {
        ValidationRecord {
            id: "v1".to_string(),
            file_path: "doc.md".to_string(),
            status: ValidationStatus::Fail,
            severity: Severity::Error,
            rules_applied: vec![],
            validation_types: vec![],
            validation_results: json!({ "findings": findings }),
            content: String::new(),
            notes: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn header_findings_become_advisory_drafts() {
        let record = record_with_findings(json!([
            {"type": "missing_required_field", "severity": "error",
             "field": "title", "message": "Required field 'title' is missing"}
        ]));

        let drafts = FindingDrivenGenerator::new().generate(&record, "");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, "header_fix");
        assert_eq!(drafts[0].confidence, 0.9);
        assert_eq!(drafts[0].severity, "high");
        assert!(drafts[0].original_content.is_none());
    }

    #[test]
    fn untagged_code_block_gets_concrete_fix() {
        let record = record_with_findings(json!([
            {"type": "missing_code_language", "severity": "info",
             "block_index": 0, "message": "Code block 1 missing language specification"}
        ]));

        let content = "# Doc\n\n```\nlet x = 1;\n```\n";
        let drafts = FindingDrivenGenerator::new().generate(&record, content);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, "code_block_language");
        assert_eq!(drafts[0].original_content.as_deref(), Some("```\n"));
        assert_eq!(drafts[0].proposed_content.as_deref(), Some("```text\n"));

        let applied = crate::replace_first(
            content,
            drafts[0].original_content.as_ref().unwrap(),
            drafts[0].proposed_content.as_ref().unwrap(),
        )
        .unwrap();
        assert!(applied.contains("```text\nlet x = 1;\n```\n"));
    }

    #[test]
    fn unknown_finding_kinds_are_skipped() {
        let record = record_with_findings(json!([
            {"type": "somebody_elses_problem", "severity": "error", "message": "?"}
        ]));

        assert!(FindingDrivenGenerator::new().generate(&record, "").is_empty());
    }

    #[test]
    fn no_findings_no_drafts() {
        let record = record_with_findings(json!([]));
        assert!(FindingDrivenGenerator::new().generate(&record, "").is_empty());
    }
}
