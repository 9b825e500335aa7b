//! Recommendation generation capability.
//!
//! Generation is a capability behind [`RecommendationGenerator`] so that an
//! LLM-driven generator can replace the built-in one without touching the
//! method layer. The built-in generator derives candidate edits from the
//! findings of a validation record.

mod apply;
mod generator;

pub use apply::replace_first;
pub use generator::FindingDrivenGenerator;

use mdcheck_store::ValidationRecord;
use serde::{Deserialize, Serialize};

/// A generated recommendation before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRecommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub scope: String,
    pub instruction: String,
    pub rationale: String,
    pub severity: String,
    pub confidence: f64,
    pub original_content: Option<String>,
    pub proposed_content: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Produces candidate edits for a validated document.
pub trait RecommendationGenerator: Send + Sync {
    /// Generate drafts from a validation record and the content it covered.
    /// Implementations must not persist anything.
    fn generate(&self, validation: &ValidationRecord, content: &str) -> Vec<DraftRecommendation>;
}
