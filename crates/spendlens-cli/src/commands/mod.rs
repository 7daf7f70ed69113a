//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `analyze` - Full report (text or JSON)
//! - `trends` - Monthly series and forecast
//! - `suggest` - AI-written suggestions
//! - `config` - Effective configuration
//! - `prompts` - Prompt library management commands

pub mod analyze;
pub mod config;
pub mod prompts;
pub mod suggest;
pub mod trends;

// Re-export command functions for main.rs
pub use analyze::*;
pub use config::*;
pub use prompts::*;
pub use suggest::*;
pub use trends::*;

use std::path::Path;

use anyhow::{Context, Result};
use spendlens_core::{load_transactions, AnalysisConfig, RawTransaction};

/// Resolve the analysis config (explicit path, data-dir override, embedded default)
pub fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    AnalysisConfig::load(path).context("Failed to load analysis config")
}

/// Load a transaction batch from a JSON file
pub fn load_batch(file: &Path) -> Result<Vec<RawTransaction>> {
    load_transactions(file).with_context(|| format!("Failed to load {}", file.display()))
}

/// Format a ratio as a signed percentage, e.g. `+12.5%`
pub fn format_pct(ratio: f64) -> String {
    format!("{:+.1}%", ratio * 100.0)
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
