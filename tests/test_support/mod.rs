//! Shared fixtures for the integration suites: a server wired with a stub
//! LLM backend and a configurable recommendation generator.
//!
//! Included via `mod test_support;` in multiple test files; not every
//! helper is used in every suite.
#![allow(dead_code)]

use mdcheck::{Server, ServerConfig};
use mdcheck_llm::{ChatMessage, LlmBackend, LlmError};
use mdcheck_recommend::{DraftRecommendation, RecommendationGenerator};
use mdcheck_store::ValidationRecord;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// LLM stub with a swappable chat reply.
pub struct StubLlm {
    reply: Mutex<String>,
}

impl StubLlm {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply.to_string()),
        })
    }

    pub fn set_reply(&self, reply: &str) {
        *self.reply.lock().unwrap() = reply.to_string();
    }
}

impl LlmBackend for StubLlm {
    fn generate(
        &self,
        _model: Option<&str>,
        _prompt: &str,
        _options: Option<&Value>,
    ) -> Result<String, LlmError> {
        Ok(self.reply.lock().unwrap().clone())
    }

    fn chat(&self, _model: Option<&str>, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Ok(self.reply.lock().unwrap().clone())
    }

    fn embed(&self, _model: Option<&str>, _inputs: &[String]) -> Result<Vec<Vec<f64>>, LlmError> {
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

/// Generator stub returning a fixed set of drafts.
pub struct FixedGenerator {
    pub drafts: Vec<DraftRecommendation>,
}

impl RecommendationGenerator for FixedGenerator {
    fn generate(&self, _validation: &ValidationRecord, _content: &str) -> Vec<DraftRecommendation> {
        self.drafts.clone()
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub server: Server,
    pub llm: Arc<StubLlm>,
}

impl TestEnv {
    /// Server over a temp workspace: a `words` rule file requiring `title`,
    /// empty prompts, in-memory store, stub LLM.
    pub fn new(llm_reply: &str) -> Self {
        Self::with_generator(llm_reply, Vec::new())
    }

    pub fn with_generator(llm_reply: &str, drafts: Vec<DraftRecommendation>) -> Self {
        let dir = TempDir::new().unwrap();
        let rules_dir = dir.path().join("rules");
        fs::create_dir_all(&rules_dir).unwrap();
        fs::write(
            rules_dir.join("words.json"),
            r#"{"validation_requirements": {"required_fields": ["title"]}}"#,
        )
        .unwrap();

        let config = ServerConfig {
            database_path: None,
            rules_dir,
            truth_dir: dir.path().join("truth"),
            prompts_dir: dir.path().join("prompts"),
            llm: mdcheck::llm::LlmConfig::default(),
        };

        let llm = StubLlm::new(llm_reply);
        let server = Server::with_components(
            config,
            Arc::clone(&llm) as Arc<dyn LlmBackend>,
            Arc::new(FixedGenerator { drafts }),
        )
        .unwrap();

        Self { dir, server, llm }
    }

    pub fn write_doc(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Dispatch a request and unwrap the result, panicking on an error
    /// response.
    pub fn call(&self, method: &str, params: Value) -> Value {
        let response = self.server.handle(&serde_json::json!({
            "jsonrpc": "2.0", "method": method, "params": params, "id": 1
        }));
        if let Some(error) = response.get("error") {
            panic!("{method} failed: {error}");
        }
        response["result"].clone()
    }

    /// Dispatch a request expected to fail; returns the error object.
    pub fn call_err(&self, method: &str, params: Value) -> Value {
        let response = self.server.handle(&serde_json::json!({
            "jsonrpc": "2.0", "method": method, "params": params, "id": 1
        }));
        response
            .get("error")
            .unwrap_or_else(|| panic!("{method} unexpectedly succeeded: {response}"))
            .clone()
    }
}
