//! Gemini backend implementation
//!
//! HTTP client for the Generative Language REST API (`generateContent`).
//!
//! # Configuration
//!
//! - `GEMINI_API_KEY` or `GOOGLE_API_KEY` (required)
//! - `GEMINI_MODEL` (default: models/gemini-2.0-flash-lite-preview)
//! - `GEMINI_SYSTEM_PROMPT`: system instruction that overrides the template's
//! - `GEMINI_HOST` (default: https://generativelanguage.googleapis.com)
//! - `GEMINI_TEMPERATURE`, `GEMINI_TOP_P`, `GEMINI_TOP_K`, `GEMINI_MAX_TOKENS`

use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::types::GenerationConfig;
use super::AIBackend;

pub const DEFAULT_GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "models/gemini-2.0-flash-lite-preview";

/// Gemini backend
#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    base_url: String,
    api_key: String,
    model: String,
    system_instruction: Option<String>,
    generation: GenerationConfig,
}

impl GeminiBackend {
    /// Create a backend against the public endpoint
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: DEFAULT_GEMINI_HOST.to_string(),
            api_key: api_key.to_string(),
            model: qualified_model(model),
            system_instruction: None,
            generation: GenerationConfig::default(),
        }
    }

    /// Point at a different host (proxies, the mock server in tests)
    pub fn with_host(mut self, host: &str) -> Self {
        self.base_url = host.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: qualified_model(model),
            ..self.clone()
        }
    }

    pub fn with_system_instruction(mut self, instruction: &str) -> Self {
        self.system_instruction = Some(instruction.to_string());
        self
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("GOOGLE_API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::AiConfiguration(
                    "Missing Gemini API key. Set GEMINI_API_KEY or GOOGLE_API_KEY in your environment."
                        .into(),
                )
            })?;
        let model = lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            temperature: parsed(&lookup, "GEMINI_TEMPERATURE", defaults.temperature),
            top_p: parsed(&lookup, "GEMINI_TOP_P", defaults.top_p),
            top_k: parsed(&lookup, "GEMINI_TOP_K", defaults.top_k),
            max_output_tokens: parsed(&lookup, "GEMINI_MAX_TOKENS", defaults.max_output_tokens),
        };

        let mut backend = Self::new(&api_key, &model).with_generation_config(generation);
        if let Some(host) = lookup("GEMINI_HOST") {
            backend = backend.with_host(&host);
        }
        if let Some(instruction) = lookup("GEMINI_SYSTEM_PROMPT").filter(|s| !s.is_empty()) {
            backend = backend.with_system_instruction(&instruction);
        }
        Ok(backend)
    }

    fn endpoint(&self, method: Option<&str>) -> String {
        match method {
            Some(method) => format!("{}/v1beta/{}:{}", self.base_url, self.model, method),
            None => format!("{}/v1beta/{}", self.base_url, self.model),
        }
    }
}

/// Model names are addressed as `models/<name>`
fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparseable setting");
            default
        }),
        None => default,
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfigBody,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfigBody {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl From<&GenerationConfig> for GenerationConfigBody {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl Content {
    pub(crate) fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

impl GenerateContentResponse {
    /// Every non-empty part of every candidate, newline-joined and trimmed
    pub(crate) fn joined_text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.text.as_deref())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

#[async_trait]
impl AIBackend for GeminiBackend {
    async fn generate_text(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let instruction = self.system_instruction.as_deref().or(system);
        let request = GenerateContentRequest {
            contents: vec![Content::text(Some("user"), prompt)],
            system_instruction: instruction.map(|text| Content::text(None, text)),
            generation_config: GenerationConfigBody::from(&self.generation),
        };

        let response = self
            .http_client
            .post(self.endpoint(Some("generateContent")))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: GenerateContentResponse = response.json().await?;
        let text = body.joined_text();
        debug!(model = %self.model, chars = text.len(), "Gemini response received");
        Ok(text)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(self.endpoint(None))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let result = GeminiBackend::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(Error::AiConfiguration(_))));
    }

    #[test]
    fn test_defaults_from_lookup() {
        let backend = GeminiBackend::from_lookup(lookup(&[("GOOGLE_API_KEY", "abc")])).unwrap();
        assert_eq!(backend.model(), DEFAULT_GEMINI_MODEL);
        assert_eq!(backend.host(), DEFAULT_GEMINI_HOST);
        assert_eq!(*backend.generation_config(), GenerationConfig::default());
        assert_eq!(backend.system_instruction(), None);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let backend = GeminiBackend::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_MODEL", "gemini-1.5-pro"),
            ("GEMINI_HOST", "http://localhost:9999/"),
            ("GEMINI_SYSTEM_PROMPT", "Be terse"),
            ("GEMINI_TEMPERATURE", "0.2"),
            ("GEMINI_TOP_K", "not-a-number"),
            ("GEMINI_MAX_TOKENS", "512"),
        ]))
        .unwrap();

        assert_eq!(backend.model(), "models/gemini-1.5-pro");
        assert_eq!(backend.host(), "http://localhost:9999");
        assert_eq!(backend.system_instruction(), Some("Be terse"));
        let generation = backend.generation_config();
        assert_eq!(generation.temperature, 0.2);
        assert_eq!(generation.top_k, 32);
        assert_eq!(generation.max_output_tokens, 512);
        assert_eq!(
            backend.endpoint(Some("generateContent")),
            "http://localhost:9999/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn test_request_shape() {
        let request = GenerateContentRequest {
            contents: vec![Content::text(Some("user"), "hi")],
            system_instruction: Some(Content::text(None, "sys")),
            generation_config: GenerationConfigBody::from(&GenerationConfig::default()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(json["generationConfig"]["topK"], 32);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_joined_text() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [
                {"content": {"role": "model", "parts": [{"text": "  first"}, {"text": ""}]}},
                {"finishReason": "SAFETY"},
                {"content": {"parts": [{"text": "second  "}]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(body.joined_text(), "first\nsecond");
        assert_eq!(GenerateContentResponse::default().joined_text(), "");
    }
}
