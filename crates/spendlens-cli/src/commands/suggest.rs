//! Suggest command implementation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use spendlens_core::suggestions::format_currency;
use spendlens_core::{
    generate_ai_suggestions, parse_ai_suggestions, AIBackend, AIClient, AiSuggestion, Analyzer,
    GeminiBackend, Prompt, PromptId, PromptLibrary,
};
use tracing::{info, warn};

use super::{load_batch, load_config};
use crate::cli::Backend;

/// Environment variable naming a prompt template file
pub const PROMPT_ENV: &str = "GEMINI_SUGGESTION_PROMPT";

pub async fn cmd_suggest(
    config_path: Option<&Path>,
    file: &Path,
    prompt: Option<&Path>,
    backend: Option<Backend>,
    model: Option<&str>,
) -> Result<()> {
    let client = build_client(backend, model, |key| std::env::var(key).ok())
        .context("AI backend is not configured (set GEMINI_API_KEY, or use --backend mock)")?;

    let env_prompt = std::env::var(PROMPT_ENV).ok().map(PathBuf::from);
    let prompt_path = prompt.or(env_prompt.as_deref());

    let output = suggest_from_file(&client, config_path, file, prompt_path).await?;
    print!("{}", output);
    Ok(())
}

/// `--backend` wins over `AI_BACKEND`; `--model` overrides the backend's model
pub fn build_client<F>(backend: Option<Backend>, model: Option<&str>, lookup: F) -> Result<AIClient>
where
    F: Fn(&str) -> Option<String>,
{
    let client = match backend {
        Some(Backend::Mock) => AIClient::mock(),
        Some(Backend::Gemini) => GeminiBackend::from_lookup(lookup).map(AIClient::Gemini)?,
        None => AIClient::from_lookup(lookup)?,
    };
    Ok(match model {
        Some(model) => client.with_model(model),
        None => client,
    })
}

/// Run the analysis, ask the backend for suggestions and render the answer
pub async fn suggest_from_file(
    client: &AIClient,
    config_path: Option<&Path>,
    file: &Path,
    prompt_path: Option<&Path>,
) -> Result<String> {
    let config = load_config(config_path)?;
    let transactions = load_batch(file)?;
    let analyzer = Analyzer::with_config(config);
    let report = analyzer.analyse(&transactions)?;

    let prompt = resolve_prompt(prompt_path)?;
    info!(
        model = client.model(),
        host = client.host(),
        prompt = %prompt.metadata.id,
        "Requesting suggestions"
    );

    let raw = generate_ai_suggestions(client, &report, &prompt).await?;
    match parse_ai_suggestions(&raw) {
        Ok(suggestions) => Ok(render_ai_suggestions(
            &suggestions,
            analyzer.config().currency_symbol(),
        )),
        Err(e) => {
            warn!(error = %e, "Model reply was not a suggestion list, showing it verbatim");
            Ok(format!("{}\n", raw.trim()))
        }
    }
}

/// Explicit template file, else the library (override dir, then embedded)
pub fn resolve_prompt(path: Option<&Path>) -> Result<Prompt> {
    match path {
        Some(path) => Prompt::from_file(path)
            .with_context(|| format!("Failed to load prompt {}", path.display())),
        None => {
            let mut library = PromptLibrary::new();
            Ok(library.get(PromptId::GenerateSuggestions)?.clone())
        }
    }
}

pub fn render_ai_suggestions(suggestions: &[AiSuggestion], symbol: &str) -> String {
    let mut out = vec![String::new(), "✨ AI Suggestions".to_string()];
    if suggestions.is_empty() {
        out.push("   The model had nothing to add.".to_string());
    }
    for (i, suggestion) in suggestions.iter().enumerate() {
        let saving = suggestion
            .expected_saving
            .map(|v| format!(" (save ~{})", format_currency(v, symbol)))
            .unwrap_or_default();
        out.push(format!("   {}. {}{}", i + 1, suggestion.title, saving));
        if let Some(category) = &suggestion.category {
            out.push(format!("      [{}]", category));
        }
        if !suggestion.insight.is_empty() {
            out.push(format!("      {}", suggestion.insight));
        }
        if !suggestion.action.is_empty() {
            out.push(format!("      → {}", suggestion.action));
        }
    }
    out.push(String::new());
    out.join("\n")
}
