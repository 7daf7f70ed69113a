//! Pluggable AI backend abstraction for suggestion writing
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all AI operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `GeminiBackend`, `MockBackend`
//!
//! Clients are constructed explicitly and passed by reference; nothing is
//! cached process-wide.
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = AIClient::from_env()?;
//! let prompt = PromptLibrary::new().get(PromptId::GenerateSuggestions)?.clone();
//! let raw = generate_ai_suggestions(&client, &report, &prompt).await?;
//! let suggestions = parse_ai_suggestions(&raw)?;
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (gemini, mock). Default: gemini
//! - Gemini settings are documented on [`GeminiBackend`]

pub mod gemini;
mod mock;
pub mod parsing;
pub mod types;

pub use gemini::GeminiBackend;
pub use mock::{MockBackend, MOCK_SUGGESTIONS};
pub use parsing::parse_ai_suggestions;
pub use types::*;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::prompts::{suggestion_vars, Prompt};
use crate::report::Report;

/// Trait defining the interface for all AI backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// One-shot generation; `system` is an optional system instruction
    async fn generate_text(&self, prompt: &str, system: Option<&str>) -> Result<String>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
#[derive(Clone)]
pub enum AIClient {
    /// Generative Language REST API
    Gemini(GeminiBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `gemini` (default): see [`GeminiBackend::from_env`]
    /// - `mock`: canned responses
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AIClient::from_env`] over any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup("AI_BACKEND").unwrap_or_else(|| "gemini".to_string());

        match backend.to_lowercase().as_str() {
            "gemini" | "google" => GeminiBackend::from_lookup(lookup).map(AIClient::Gemini),
            "mock" => Ok(Self::mock()),
            _ => {
                warn!(backend = %backend, "Unknown AI_BACKEND, falling back to gemini");
                GeminiBackend::from_lookup(lookup).map(AIClient::Gemini)
            }
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::Gemini(b) => AIClient::Gemini(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }
}

#[async_trait]
impl AIBackend for AIClient {
    async fn generate_text(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        match self {
            AIClient::Gemini(b) => b.generate_text(prompt, system).await,
            AIClient::Mock(b) => b.generate_text(prompt, system).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Gemini(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Gemini(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Gemini(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

/// Fill the suggestion prompt from a report and return the raw model text
///
/// The text is expected to hold a JSON array; see [`parse_ai_suggestions`].
pub async fn generate_ai_suggestions<B: AIBackend + ?Sized>(
    backend: &B,
    report: &Report,
    prompt: &Prompt,
) -> Result<String> {
    let vars = suggestion_vars(report)?;
    let rendered = prompt.render_parts(&vars);
    let text = backend
        .generate_text(&rendered.user, rendered.system.as_deref())
        .await?;
    info!(
        model = backend.model(),
        prompt = %prompt.metadata.id,
        chars = text.len(),
        "AI suggestions generated"
    );
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::{PromptId, PromptLibrary};
    use std::collections::HashMap;

    #[test]
    fn test_ai_client_mock() {
        let client = AIClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_selects_backend() {
        let client = AIClient::from_lookup(lookup(&[("AI_BACKEND", "MOCK")])).unwrap();
        assert!(matches!(client, AIClient::Mock(_)));

        let client = AIClient::from_lookup(lookup(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert!(matches!(client, AIClient::Gemini(_)));

        // Unknown names fall back to gemini, which still needs a key
        let result = AIClient::from_lookup(lookup(&[("AI_BACKEND", "llama")]));
        assert!(matches!(result, Err(crate::Error::AiConfiguration(_))));
    }

    #[test]
    fn test_with_model() {
        let client = AIClient::from_lookup(lookup(&[("GEMINI_API_KEY", "k")]))
            .unwrap()
            .with_model("gemini-1.5-pro");
        assert_eq!(client.model(), "models/gemini-1.5-pro");

        // Mock ignores the override
        assert_eq!(AIClient::mock().with_model("other").model(), "mock");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = AIClient::mock();
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_generate_fills_prompt_from_report() {
        let backend = MockBackend::new();
        let mut library = PromptLibrary::embedded_only();
        let prompt = library.get(PromptId::GenerateSuggestions).unwrap().clone();

        let mut report = Report::default();
        report.summary.period = "2024-01 to 2024-03".to_string();

        let raw = generate_ai_suggestions(&backend, &report, &prompt)
            .await
            .unwrap();
        assert_eq!(parse_ai_suggestions(&raw).unwrap().len(), 2);

        let sent = backend.received_prompts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("2024-01 to 2024-03"));
        assert!(!sent[0].contains("{{summary}}"));
        // System section travels separately
        assert!(!sent[0].contains("personal finance coach"));
    }
}
