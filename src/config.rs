//! Server configuration: environment-driven with code-level defaults.
//!
//! Configuration files are deliberately out of scope; the binary reads
//! flags and environment variables only.

use mdcheck_llm::LlmConfig;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SQLite database file; `None` runs fully in memory.
    pub database_path: Option<PathBuf>,
    /// Directory of `<family>.json` rule documents.
    pub rules_dir: PathBuf,
    /// Directory of `<family>.json` truth documents (family discovery only).
    pub truth_dir: PathBuf,
    /// Directory of `<domain>.json` prompt documents.
    pub prompts_dir: PathBuf,
    pub llm: LlmConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            rules_dir: PathBuf::from("rules"),
            truth_dir: PathBuf::from("truth"),
            prompts_dir: PathBuf::from("prompts"),
            llm: LlmConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `MDCHECK_DB`, `MDCHECK_RULES_DIR`, `MDCHECK_TRUTH_DIR`,
    /// `MDCHECK_PROMPTS_DIR`, and the `MDCHECK_LLM_*` variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: std::env::var_os("MDCHECK_DB").map(PathBuf::from),
            rules_dir: std::env::var_os("MDCHECK_RULES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.rules_dir),
            truth_dir: std::env::var_os("MDCHECK_TRUTH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.truth_dir),
            prompts_dir: std::env::var_os("MDCHECK_PROMPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.prompts_dir),
            llm: LlmConfig::from_env(),
        }
    }
}
