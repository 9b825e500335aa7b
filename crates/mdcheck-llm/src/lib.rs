//! LLM capability for mdcheck.
//!
//! The dispatcher and engines only see the [`LlmBackend`] trait; any
//! conforming implementation may be substituted. The shipped backend talks
//! to an Ollama-style local model service over HTTP.

mod ollama;
mod types;

pub use ollama::OllamaBackend;
pub use types::{ChatMessage, LlmConfig, Role};

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by LLM backends. All variants are recoverable: callers
/// skip the current item or report degraded health rather than aborting.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM backend is disabled")]
    Disabled,

    #[error("Cannot connect to LLM service at {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("LLM API error {status}: {reason}")]
    Api { status: u16, reason: String },

    #[error("LLM request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// Capability contract for a local model service.
///
/// Implementations are synchronous; async surfaces run them on a worker
/// pool. `model: None` selects the backend's configured default.
pub trait LlmBackend: Send + Sync {
    /// Single-prompt completion. Returns the generated text.
    fn generate(&self, model: Option<&str>, prompt: &str, options: Option<&Value>)
    -> Result<String, LlmError>;

    /// Multi-turn chat. Returns the assistant message content.
    fn chat(&self, model: Option<&str>, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Embed one or more inputs.
    fn embed(&self, model: Option<&str>, inputs: &[String]) -> Result<Vec<Vec<f64>>, LlmError>;

    /// Names of models the service has available.
    fn list_models(&self) -> Result<Vec<String>, LlmError>;

    /// Raw metadata for one model.
    fn model_info(&self, model: Option<&str>) -> Result<Value, LlmError>;

    /// Liveness probe; must not error.
    fn is_available(&self) -> bool;

    /// The model used when callers pass `None`.
    fn default_model(&self) -> &str;
}
