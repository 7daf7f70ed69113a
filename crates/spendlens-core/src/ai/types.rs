//! AI backend response types
//!
//! These types are backend-agnostic and used across all AI implementations.

use serde::{Deserialize, Serialize};

/// A free-form suggestion written by a language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSuggestion {
    pub title: String,
    #[serde(default)]
    pub insight: String,
    #[serde(default)]
    pub action: String,
    /// Estimated monthly saving in the display currency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_saving: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Sampling parameters sent with every generation request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 32,
            max_output_tokens: 2048,
        }
    }
}
