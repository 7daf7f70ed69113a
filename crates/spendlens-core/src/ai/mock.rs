//! Mock backend for testing
//!
//! Returns canned suggestion JSON so the suggest flow can run without network access.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::AIBackend;

/// Canned response shaped like a well-behaved model reply
pub const MOCK_SUGGESTIONS: &str = r#"[
  {
    "title": "Plan two home-cooked dinners a week",
    "insight": "Evening eating out is your most frequent discretionary spend.",
    "action": "Pick two weeknights and shop for them on Sunday.",
    "expected_saving": 25.0,
    "category": "eating_out"
  },
  {
    "title": "Set a weekly coffee budget",
    "insight": "Small coffee purchases add up across the week.",
    "action": "Load a fixed amount onto a coffee card each Monday.",
    "expected_saving": 12.0,
    "category": "dining.coffee"
  }
]"#;

/// Mock AI backend for testing
///
/// Records every prompt it receives so tests can inspect rendering.
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    response: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            response: MOCK_SUGGESTIONS.to_string(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Reply with `response` instead of the canned suggestions
    pub fn with_response(response: &str) -> Self {
        Self {
            response: response.to_string(),
            ..Self::new()
        }
    }

    /// Create a new instance with a different model (no-op for mock)
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }

    /// Prompts received so far
    pub fn received_prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn generate_text(&self, prompt: &str, _system: Option<&str>) -> Result<String> {
        if !self.healthy {
            return Err(Error::AiConfiguration("Mock backend is unhealthy".into()));
        }
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        Ok(self.response.clone())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
