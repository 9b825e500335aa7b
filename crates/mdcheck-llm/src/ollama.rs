//! HTTP backend for an Ollama-style local model service.

use crate::{ChatMessage, LlmBackend, LlmConfig, LlmError};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// Blocking HTTP client for the Ollama API (`api/generate`, `api/chat`,
/// `api/embed`, `api/tags`, `api/show`).
pub struct OllamaBackend {
    http: reqwest::blocking::Client,
    config: LlmConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                url: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self, LlmError> {
        Self::new(LlmConfig::from_env())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn check_enabled(&self) -> Result<(), LlmError> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(LlmError::Disabled)
        }
    }

    fn map_transport_error(&self, url: &str, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                seconds: self.config.timeout_secs,
            }
        } else {
            LlmError::Connection {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }

    fn post(&self, path: &str, payload: &Value) -> Result<String, LlmError> {
        self.check_enabled()?;
        let url = self.endpoint(path);
        debug!(%url, "LLM request");

        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .map_err(|e| self.map_transport_error(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| self.map_transport_error(&url, e))?;

        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "LLM API error");
            return Err(LlmError::Api {
                status: status.as_u16(),
                reason: body,
            });
        }

        Ok(body)
    }

    fn get(&self, path: &str) -> Result<String, LlmError> {
        self.check_enabled()?;
        let url = self.endpoint(path);

        let response = self
            .http
            .get(&url)
            .send()
            .map_err(|e| self.map_transport_error(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| self.map_transport_error(&url, e))?;

        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                reason: body,
            });
        }

        Ok(body)
    }

    fn parse<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, LlmError> {
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    fn model_or_default<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model.unwrap_or(&self.config.model)
    }
}

impl LlmBackend for OllamaBackend {
    fn generate(
        &self,
        model: Option<&str>,
        prompt: &str,
        options: Option<&Value>,
    ) -> Result<String, LlmError> {
        let payload = json!({
            "model": self.model_or_default(model),
            "prompt": prompt,
            "stream": false,
            "options": options.cloned().unwrap_or_else(|| json!({})),
        });

        let body = self.post("api/generate", &payload)?;
        let parsed: GenerateResponse = Self::parse(&body)?;
        Ok(parsed.response)
    }

    fn chat(&self, model: Option<&str>, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let payload = json!({
            "model": self.model_or_default(model),
            "messages": messages,
            "stream": false,
        });

        let body = self.post("api/chat", &payload)?;
        let parsed: ChatResponse = Self::parse(&body)?;
        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }

    fn embed(&self, model: Option<&str>, inputs: &[String]) -> Result<Vec<Vec<f64>>, LlmError> {
        let payload = json!({
            "model": self.model_or_default(model),
            "input": inputs,
        });

        let body = self.post("api/embed", &payload)?;
        let parsed: EmbedResponse = Self::parse(&body)?;
        Ok(parsed.embeddings)
    }

    fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let body = self.get("api/tags")?;
        let parsed: TagsResponse = Self::parse(&body)?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    fn model_info(&self, model: Option<&str>) -> Result<Value, LlmError> {
        let payload = json!({ "name": self.model_or_default(model) });
        let body = self.post("api/show", &payload)?;
        Self::parse(&body)
    }

    fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        match self.list_models() {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "LLM availability check failed");
                false
            }
        }
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_backend() -> OllamaBackend {
        OllamaBackend::new(LlmConfig {
            enabled: false,
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn disabled_backend_short_circuits_every_method() {
        let backend = disabled_backend();

        assert!(matches!(
            backend.generate(None, "hi", None),
            Err(LlmError::Disabled)
        ));
        assert!(matches!(
            backend.chat(None, &[ChatMessage::user("hi")]),
            Err(LlmError::Disabled)
        ));
        assert!(matches!(
            backend.embed(None, &["hi".to_string()]),
            Err(LlmError::Disabled)
        ));
        assert!(matches!(backend.list_models(), Err(LlmError::Disabled)));
        assert!(matches!(backend.model_info(None), Err(LlmError::Disabled)));
        assert!(!backend.is_available());
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let backend = OllamaBackend::new(LlmConfig {
            base_url: "http://localhost:11434/".to_string(),
            ..LlmConfig::default()
        })
        .unwrap();

        assert_eq!(backend.endpoint("api/chat"), "http://localhost:11434/api/chat");
    }

    #[test]
    fn chat_response_parsing_tolerates_missing_message() {
        let parsed: ChatResponse = OllamaBackend::parse(r#"{"done": true}"#).unwrap();
        assert!(parsed.message.is_none());

        let parsed: ChatResponse =
            OllamaBackend::parse(r#"{"message": {"role": "assistant", "content": "hi"}}"#).unwrap();
        assert_eq!(parsed.message.unwrap().content, "hi");
    }
}
