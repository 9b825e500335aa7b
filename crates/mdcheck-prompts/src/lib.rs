//! Prompt template loading and formatting.
//!
//! Templates live in `<prompts_dir>/<domain>.json`. Each entry is either a
//! bare string or `{template, description}`. Formatting substitutes named
//! `{placeholder}` markers and never fails: a missing substitution is logged
//! and the unformatted template is returned.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, error, warn};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid"));

/// A single prompt template with its optional description.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PromptEntry {
    Bare(String),
    Documented {
        template: String,
        #[serde(default)]
        description: String,
    },
}

impl PromptEntry {
    pub fn template(&self) -> &str {
        match self {
            Self::Bare(template) => template,
            Self::Documented { template, .. } => template,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Bare(_) => "",
            Self::Documented { description, .. } => description,
        }
    }
}

type DomainPrompts = HashMap<String, PromptEntry>;

/// Loads and caches prompt documents by domain.
pub struct PromptLoader {
    prompts_dir: PathBuf,
    cache: RwLock<HashMap<String, DomainPrompts>>,
}

impl PromptLoader {
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        let prompts_dir = prompts_dir.into();
        if !prompts_dir.exists() {
            warn!(dir = %prompts_dir.display(), "prompts directory not found");
        }
        Self {
            prompts_dir,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn load_domain(&self, domain: &str) -> DomainPrompts {
        if let Some(prompts) = self.cache.read().expect("prompt cache poisoned").get(domain) {
            return prompts.clone();
        }

        let path = self.prompts_dir.join(format!("{domain}.json"));
        let prompts: DomainPrompts = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(parsed) => {
                    debug!(domain, "loaded prompts");
                    parsed
                }
                Err(e) => {
                    error!(domain, error = %e, "invalid JSON in prompt file");
                    HashMap::new()
                }
            },
            Err(_) => {
                warn!(domain, path = %path.display(), "prompt file not found");
                HashMap::new()
            }
        };

        self.cache
            .write()
            .expect("prompt cache poisoned")
            .insert(domain.to_string(), prompts.clone());
        prompts
    }

    /// Get a template string; empty when the domain or key is missing.
    pub fn get(&self, domain: &str, key: &str) -> String {
        match self.load_domain(domain).get(key) {
            Some(entry) => entry.template().to_string(),
            None => {
                warn!(domain, key, "prompt not found");
                String::new()
            }
        }
    }

    /// Get a template together with its description.
    pub fn get_with_description(&self, domain: &str, key: &str) -> (String, String) {
        match self.load_domain(domain).get(key) {
            Some(entry) => (entry.template().to_string(), entry.description().to_string()),
            None => {
                warn!(domain, key, "prompt not found");
                (String::new(), String::new())
            }
        }
    }

    /// Format a template with named substitutions.
    ///
    /// If the template references a placeholder with no matching
    /// substitution, the error is logged and the template is returned
    /// unformatted.
    pub fn format(&self, domain: &str, key: &str, args: &[(&str, &str)]) -> String {
        let template = self.get(domain, key);
        if template.is_empty() {
            return template;
        }
        format_template(&template, args).unwrap_or_else(|missing| {
            error!(domain, key, missing, "missing template argument");
            template
        })
    }

    /// Domains with a prompt file on disk, sorted.
    pub fn domains(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.prompts_dir) else {
            return Vec::new();
        };
        let mut domains: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
                } else {
                    None
                }
            })
            .collect();
        domains.sort();
        domains
    }

    /// Template keys available within a domain.
    pub fn keys(&self, domain: &str) -> Vec<String> {
        let mut keys: Vec<String> = self.load_domain(domain).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Force a domain to be re-read from disk on next access.
    pub fn reload(&self, domain: &str) {
        self.cache
            .write()
            .expect("prompt cache poisoned")
            .remove(domain);
    }

    pub fn clear_cache(&self) {
        self.cache.write().expect("prompt cache poisoned").clear();
    }

    /// Number of cached domains.
    pub fn cached_count(&self) -> usize {
        self.cache.read().expect("prompt cache poisoned").len()
    }
}

/// Substitute `{name}` placeholders; `Err(name)` on the first placeholder
/// with no provided value.
fn format_template(template: &str, args: &[(&str, &str)]) -> Result<String, String> {
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for captures in PLACEHOLDER.captures_iter(template) {
        let whole = captures.get(0).expect("capture 0 always present");
        let name = &captures[1];
        let Some((_, value)) = args.iter().find(|(k, _)| *k == name) else {
            return Err(name.to_string());
        };
        result.push_str(&template[last_end..whole.start()]);
        result.push_str(value);
        last_end = whole.end();
    }

    result.push_str(&template[last_end..]);
    Ok(result)
}
