//! Prompt library for AI suggestion generation
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/spendlens/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! A template can also be loaded from an explicit path with [`Prompt::from_file`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::report::Report;

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const GENERATE_SUGGESTIONS: &str =
        include_str!("../../../prompts/generate_suggestions.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    GenerateSuggestions,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateSuggestions => "generate_suggestions",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::GenerateSuggestions]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::GenerateSuggestions => defaults::GENERATE_SUGGESTIONS,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// The prompt content (system + user sections)
    pub content: String,
    /// Whether this came from an override or explicit file
    pub is_override: bool,
    pub override_path: Option<PathBuf>,
}

/// A prompt ready to send: optional system instruction plus the user turn
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    /// Load a template from an explicit path
    ///
    /// Frontmatter is optional here; without it the file stem becomes the id.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Prompt file not found: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        let (metadata, body) = if content.trim_start().starts_with("---") {
            parse_prompt(&content)?
        } else {
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            (PromptMetadata { id, version: 0 }, content.trim().to_string())
        };
        Ok(Self {
            metadata,
            content: body,
            is_override: true,
            override_path: Some(path.to_path_buf()),
        })
    }

    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the whole prompt with `{{var}}` placeholders replaced
    pub fn render<V: AsRef<str>>(&self, vars: &HashMap<&str, V>) -> String {
        substitute(&self.content, vars)
    }

    /// Split into system and user parts, substituting into both
    ///
    /// A template without a `# User` section is sent whole as the user turn.
    pub fn render_parts<V: AsRef<str>>(&self, vars: &HashMap<&str, V>) -> RenderedPrompt {
        match self.user_section() {
            Some(user) => RenderedPrompt {
                system: self
                    .system_section()
                    .filter(|s| !s.is_empty())
                    .map(|s| substitute(s, vars)),
                user: substitute(user, vars),
            },
            None => RenderedPrompt {
                system: None,
                user: self.render(vars),
            },
        }
    }
}

/// Template variables for the suggestion prompt, as pretty JSON
pub fn suggestion_vars(report: &Report) -> Result<HashMap<&'static str, String>> {
    Ok(HashMap::from([
        ("summary", serde_json::to_string_pretty(&report.summary)?),
        ("patterns", serde_json::to_string_pretty(&report.patterns)?),
        ("recurring", serde_json::to_string_pretty(&report.recurring)?),
        ("anomalies", serde_json::to_string_pretty(&report.anomalies)?),
        (
            "top_saving_opportunities",
            serde_json::to_string_pretty(&report.summary.top_saving_opportunities)?,
        ),
        (
            "existing_suggestions",
            serde_json::to_string_pretty(&report.suggestions)?,
        ),
    ]))
}

/// Prompt library for loading and caching prompts
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Create a new prompt library with default paths
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Embedded prompts only, no override lookup
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::Prompt(format!("Prompt {} not cached", id.as_str())))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(override_path) = self.override_path(id).filter(|p| p.exists()) {
            let content = fs::read_to_string(&override_path)
                .map_err(|e| Error::Prompt(format!("Failed to read prompt override: {}", e)))?;
            let (metadata, body) = parse_prompt(&content)?;
            return Ok(Prompt {
                metadata,
                content: body,
                is_override: true,
                override_path: Some(override_path),
            });
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
            override_path: None,
        })
    }

    /// List all prompts with their override status
    pub fn list(&mut self) -> Vec<PromptInfo> {
        PromptId::all()
            .iter()
            .map(|&id| {
                let override_path = self.override_path(id).filter(|p| p.exists());
                let version = self.get(id).map(|p| p.metadata.version).unwrap_or(0);
                PromptInfo {
                    id: id.as_str().to_string(),
                    version,
                    has_override: override_path.is_some(),
                    override_path,
                }
            })
            .collect()
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_path(id).is_some_and(|p| p.exists())
    }

    pub fn override_dir(&self) -> Option<&PathBuf> {
        self.override_dir.as_ref()
    }

    fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.md", id.as_str())))
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Information about a prompt for listing
#[derive(Debug, Clone)]
pub struct PromptInfo {
    pub id: String,
    pub version: u32,
    pub has_override: bool,
    pub override_path: Option<PathBuf>,
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendlens").join("prompts").join("overrides"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    let Some(rest) = content.strip_prefix("---") else {
        return Err(Error::Prompt(
            "Prompt must start with YAML frontmatter (---)".into(),
        ));
    };
    let end = rest.find("---").ok_or_else(|| {
        Error::Prompt("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::Prompt(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

/// Text after `header` up to the next top-level header
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];
    let end = after_header.find("\n# ").unwrap_or(after_header.len());
    Some(after_header[..end].trim())
}

fn substitute<V: AsRef<str>>(template: &str, vars: &HashMap<&str, V>) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{}}}}}", key), value.as_ref())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt() {
        let content = r#"---
id: test_prompt
version: 2
---

# System
Be brief.

# User
Hello {{name}}"#;

        let (metadata, body) = parse_prompt(content).unwrap();
        assert_eq!(metadata.id, "test_prompt");
        assert_eq!(metadata.version, 2);
        assert!(body.starts_with("# System"));
    }

    #[test]
    fn test_parse_prompt_requires_frontmatter() {
        assert!(matches!(parse_prompt("# User\nhi"), Err(Error::Prompt(_))));
        assert!(matches!(
            parse_prompt("---\nid: x\nversion: 1\n"),
            Err(Error::Prompt(_))
        ));
    }

    #[test]
    fn test_extract_section() {
        let content = "# System\nsys text\n\n# User\nuser text\n## Detail\nmore";
        assert_eq!(extract_section(content, "# System"), Some("sys text"));
        // Second-level headers stay inside the section
        assert_eq!(
            extract_section(content, "# User"),
            Some("user text\n## Detail\nmore")
        );
        assert_eq!(extract_section(content, "# Missing"), None);
    }

    #[test]
    fn test_render_parts() {
        let prompt = Prompt {
            metadata: PromptMetadata {
                id: "t".into(),
                version: 1,
            },
            content: "# System\nCoach mode\n\n# User\nSpend: {{summary}} / {{summary}}".into(),
            is_override: false,
            override_path: None,
        };
        let vars = HashMap::from([("summary", "42")]);
        let rendered = prompt.render_parts(&vars);
        assert_eq!(rendered.system.as_deref(), Some("Coach mode"));
        assert_eq!(rendered.user, "Spend: 42 / 42");
    }

    #[test]
    fn test_embedded_default_has_every_placeholder() {
        let mut library = PromptLibrary::embedded_only();
        let prompt = library.get(PromptId::GenerateSuggestions).unwrap();
        assert_eq!(prompt.metadata.id, "generate_suggestions");
        assert!(!prompt.is_override);

        let vars = suggestion_vars(&Report::default()).unwrap();
        assert_eq!(vars.len(), 6);
        for key in vars.keys() {
            assert!(
                prompt.content.contains(&format!("{{{{{}}}}}", key)),
                "missing placeholder {}",
                key
            );
        }

        let rendered = prompt.render_parts(&vars);
        assert!(rendered.system.is_some());
        assert!(!rendered.user.contains("{{"));
    }

    #[test]
    fn test_override_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("generate_suggestions.md"),
            "---\nid: generate_suggestions\nversion: 7\n---\n# User\nCustom {{summary}}",
        )
        .unwrap();

        let mut library = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert!(library.has_override(PromptId::GenerateSuggestions));
        let prompt = library.get(PromptId::GenerateSuggestions).unwrap();
        assert!(prompt.is_override);
        assert_eq!(prompt.metadata.version, 7);

        let listed = library.list();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].has_override);
        assert_eq!(listed[0].version, 7);
    }

    #[test]
    fn test_from_file_without_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my_prompt.md");
        fs::write(&path, "Suggest things for {{summary}}\n").unwrap();

        let prompt = Prompt::from_file(&path).unwrap();
        assert_eq!(prompt.metadata.id, "my_prompt");
        assert_eq!(prompt.metadata.version, 0);

        let rendered = prompt.render_parts(&HashMap::from([("summary", "{}")]));
        assert_eq!(rendered.system, None);
        assert_eq!(rendered.user, "Suggest things for {}");
    }

    #[test]
    fn test_from_file_missing() {
        let err = Prompt::from_file(Path::new("/nonexistent/prompt.md")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
