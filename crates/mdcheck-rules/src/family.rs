use mdcheck_utils::{frontmatter, fs as mdfs};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Resolves the family of a document.
///
/// Resolution order: explicit `family` header field, then path substring
/// heuristics, then discovery against the configured rule and truth
/// directories (prefer `words`, else lexicographically first).
#[derive(Debug, Clone)]
pub struct FamilyDetector {
    rules_dir: PathBuf,
    truth_dir: PathBuf,
}

impl FamilyDetector {
    pub fn new(rules_dir: impl Into<PathBuf>, truth_dir: impl Into<PathBuf>) -> Self {
        Self {
            rules_dir: rules_dir.into(),
            truth_dir: truth_dir.into(),
        }
    }

    pub fn detect(&self, file_path: &Path) -> Option<String> {
        if let Some(family) = Self::from_header(file_path) {
            return Some(family);
        }
        if let Some(family) = Self::from_path(file_path) {
            return Some(family);
        }
        self.from_available_files()
    }

    fn from_header(file_path: &Path) -> Option<String> {
        let content = mdfs::read_text(file_path).ok()?;
        let (header, _) = frontmatter::split(&content);
        let header = header?;
        if header.is_empty() {
            return None;
        }

        // Header syntax errors are not the detector's problem.
        let parsed: serde_yaml::Value = serde_yaml::from_str(header).ok()?;
        parsed
            .get("family")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn from_path(file_path: &Path) -> Option<String> {
        let path = file_path.to_string_lossy().to_lowercase();

        if ["word", "vocab", "dictionary"].iter().any(|p| path.contains(p)) {
            return Some("words".to_string());
        }
        if ["code", "programming", "script"].iter().any(|p| path.contains(p)) {
            return Some("code".to_string());
        }
        if ["config", "setting"].iter().any(|p| path.contains(p)) {
            return Some("config".to_string());
        }

        None
    }

    fn from_available_files(&self) -> Option<String> {
        let available = self.available_families();
        if available.contains("words") {
            return Some("words".to_string());
        }
        available.into_iter().next()
    }

    /// Every family with a rule or truth file on disk, sorted.
    pub fn available_families(&self) -> BTreeSet<String> {
        let mut families = BTreeSet::new();
        for dir in [&self.rules_dir, &self.truth_dir] {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json")
                    && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                {
                    families.insert(stem.to_string());
                }
            }
        }
        families
    }

    pub fn has_family_support(&self, family: &str) -> bool {
        self.rules_dir.join(format!("{family}.json")).exists()
            || self.truth_dir.join(format!("{family}.json")).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn detector(dir: &TempDir) -> FamilyDetector {
        FamilyDetector::new(dir.path().join("rules"), dir.path().join("truth"))
    }

    #[test]
    fn header_field_wins_over_path() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("code-notes.md");
        fs::write(&doc, "---\nfamily: words\n---\n# Doc\n").unwrap();

        assert_eq!(detector(&dir).detect(&doc), Some("words".to_string()));
    }

    #[test]
    fn path_heuristics_apply_without_header() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("vocab").join("entry.md");
        fs::create_dir_all(doc.parent().unwrap()).unwrap();
        fs::write(&doc, "# Entry\n").unwrap();

        assert_eq!(detector(&dir).detect(&doc), Some("words".to_string()));

        let code_doc = dir.path().join("programming-guide.md");
        fs::write(&code_doc, "# Guide\n").unwrap();
        assert_eq!(detector(&dir).detect(&code_doc), Some("code".to_string()));
    }

    #[test]
    fn discovery_prefers_words_then_lexicographic() {
        let dir = TempDir::new().unwrap();
        let rules = dir.path().join("rules");
        fs::create_dir_all(&rules).unwrap();
        fs::write(rules.join("zeta.json"), "{}").unwrap();
        fs::write(rules.join("alpha.json"), "{}").unwrap();

        let doc = dir.path().join("plain.md");
        fs::write(&doc, "# Plain\n").unwrap();

        let det = detector(&dir);
        assert_eq!(det.detect(&doc), Some("alpha".to_string()));

        fs::write(rules.join("words.json"), "{}").unwrap();
        assert_eq!(det.detect(&doc), Some("words".to_string()));
    }

    #[test]
    fn no_sources_yields_none() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("plain.md");
        fs::write(&doc, "# Plain\n").unwrap();

        assert_eq!(detector(&dir).detect(&doc), None);
    }

    #[test]
    fn family_support_checks_both_dirs() {
        let dir = TempDir::new().unwrap();
        let truth = dir.path().join("truth");
        fs::create_dir_all(&truth).unwrap();
        fs::write(truth.join("code.json"), "{}").unwrap();

        let det = detector(&dir);
        assert!(det.has_family_support("code"));
        assert!(!det.has_family_support("words"));
    }
}
