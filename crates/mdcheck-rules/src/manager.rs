use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

/// YAML fields that are never editable, in any family.
const GLOBAL_NON_EDITABLE_FIELDS: &[&str] = &[
    "layout",
    "categories",
    "date",
    "draft",
    "lastmod",
    "title",
    "weight",
    "author",
];

/// Header validation rules consulted by the ingestion pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationRequirements {
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Field name → expected type (`string`, `int`, `float`, `bool`,
    /// `list`, `map`).
    #[serde(default)]
    pub field_types: HashMap<String, String>,
    #[serde(default)]
    pub field_enums: HashMap<String, Vec<serde_json::Value>>,
    #[serde(default)]
    pub forbidden_fields: Vec<String>,
}

/// Parsed rule document for one family.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FamilyRules {
    #[serde(skip)]
    pub family: String,
    #[serde(default)]
    pub plugin_aliases: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub api_patterns: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub non_editable_yaml_fields: BTreeSet<String>,
    #[serde(default)]
    pub validation_requirements: ValidationRequirements,
    #[serde(default)]
    pub code_quality_rules: serde_json::Value,
    #[serde(default)]
    pub format_patterns: HashMap<String, Vec<String>>,
}

/// Loads and caches per-family rule documents.
///
/// The cache is process-wide, single-writer-many-reader; invalidation is
/// explicit via [`RuleManager::reload`].
pub struct RuleManager {
    rules_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<FamilyRules>>>,
}

impl RuleManager {
    pub fn new(rules_dir: impl Into<PathBuf>) -> Self {
        Self {
            rules_dir: rules_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get rules for a family, loading from `<rules_dir>/<family>.json` on
    /// first access. A missing or unparsable document falls back to the
    /// built-in defaults for that family.
    pub fn get(&self, family: &str) -> Arc<FamilyRules> {
        if let Some(rules) = self.cache.read().expect("rules cache poisoned").get(family) {
            return Arc::clone(rules);
        }

        let rules = Arc::new(self.load(family));
        self.cache
            .write()
            .expect("rules cache poisoned")
            .insert(family.to_string(), Arc::clone(&rules));
        rules
    }

    fn load(&self, family: &str) -> FamilyRules {
        let path = self.rules_dir.join(format!("{family}.json"));

        if !path.exists() {
            warn!(family, path = %path.display(), "rules file not found, using defaults");
            return Self::default_rules(family);
        }

        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<FamilyRules>(&text).map_err(|e| e.to_string()));

        match parsed {
            Ok(mut rules) => {
                rules.family = family.to_string();
                for field in GLOBAL_NON_EDITABLE_FIELDS {
                    rules.non_editable_yaml_fields.insert((*field).to_string());
                }
                info!(family, "loaded rules");
                rules
            }
            Err(reason) => {
                error!(family, reason, "failed to load rules, using defaults");
                Self::default_rules(family)
            }
        }
    }

    fn default_rules(family: &str) -> FamilyRules {
        FamilyRules {
            family: family.to_string(),
            non_editable_yaml_fields: GLOBAL_NON_EDITABLE_FIELDS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            ..FamilyRules::default()
        }
    }

    pub fn api_patterns(&self, family: &str) -> HashMap<String, Vec<String>> {
        self.get(family).api_patterns.clone()
    }

    pub fn plugin_aliases(&self, family: &str) -> HashMap<String, Vec<String>> {
        self.get(family).plugin_aliases.clone()
    }

    pub fn dependencies(&self, family: &str, plugin_id: &str) -> Vec<String> {
        self.get(family)
            .dependencies
            .get(plugin_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn non_editable_fields(&self, family: &str) -> BTreeSet<String> {
        self.get(family).non_editable_yaml_fields.clone()
    }

    pub fn code_quality_rules(&self, family: &str) -> serde_json::Value {
        self.get(family).code_quality_rules.clone()
    }

    /// Drop cached rules; `None` clears every family.
    pub fn reload(&self, family: Option<&str>) {
        let mut cache = self.cache.write().expect("rules cache poisoned");
        match family {
            Some(family) => {
                cache.remove(family);
            }
            None => {
                cache.clear();
                info!("cleared all rule caches");
            }
        }
    }

    /// Number of cached rule documents.
    pub fn cached_count(&self) -> usize {
        self.cache.read().expect("rules cache poisoned").len()
    }
}
