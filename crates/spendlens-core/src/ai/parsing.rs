//! JSON parsing helpers for AI backend responses
//!
//! Model output often wraps the JSON payload in prose or code fences, so the
//! parser looks for the first JSON array and ignores anything after it.

use serde_json::Deserializer;

use crate::error::{Error, Result};

use super::types::AiSuggestion;

const RAW_PREVIEW_CHARS: usize = 200;

/// Parse the first JSON array of suggestions found in a model response
pub fn parse_ai_suggestions(response: &str) -> Result<Vec<AiSuggestion>> {
    let response = response.trim();
    let Some(start) = response.find('[') else {
        return Err(Error::InvalidData(format!(
            "No JSON array found in AI response | Raw: {}",
            preview(response)
        )));
    };

    let mut stream = Deserializer::from_str(&response[start..]).into_iter::<Vec<AiSuggestion>>();
    match stream.next() {
        Some(Ok(suggestions)) => Ok(suggestions),
        Some(Err(e)) => Err(Error::InvalidData(format!(
            "Invalid suggestions JSON from AI: {} | Raw: {}",
            e,
            preview(&response[start..])
        ))),
        None => Err(Error::InvalidData("Empty AI response".into())),
    }
}

/// Truncate long responses for error messages
fn preview(text: &str) -> String {
    if text.chars().count() > RAW_PREVIEW_CHARS {
        let head: String = text.chars().take(RAW_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let suggestions = parse_ai_suggestions(
            r#"[{"title": "Batch cook", "insight": "Takeaway doubled", "action": "Cook Sundays", "expected_saving": 40, "category": "eating_out"}]"#,
        )
        .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].title, "Batch cook");
        assert_eq!(suggestions[0].expected_saving, Some(40.0));
        assert_eq!(suggestions[0].category.as_deref(), Some("eating_out"));
    }

    #[test]
    fn test_parse_with_prose_and_fences() {
        let response = "Here are my ideas:\n```json\n[\n  {\"title\": \"Walk more\", \"insight\": \"x\", \"action\": \"y\"}\n]\n```\nLet me know [if] you need more.";
        let suggestions = parse_ai_suggestions(response).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].title, "Walk more");
        assert_eq!(suggestions[0].expected_saving, None);
        assert_eq!(suggestions[0].category, None);
    }

    #[test]
    fn test_missing_optional_text_fields() {
        let suggestions = parse_ai_suggestions(r#"[{"title": "Only a title"}]"#).unwrap();
        assert_eq!(suggestions[0].insight, "");
        assert_eq!(suggestions[0].action, "");
    }

    #[test]
    fn test_no_array() {
        let err = parse_ai_suggestions("I could not find anything useful.").unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_malformed_array() {
        let err = parse_ai_suggestions(r#"[{"insight": "no title"}]"#).unwrap_err();
        assert!(err.to_string().contains("Invalid suggestions JSON"));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).len(), RAW_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
