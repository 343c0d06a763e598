//! Prompts for entity and table extraction.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the requested JSON shape requires
//!    editing exactly one place, next to the parser that reads it back.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without a
//!    running model, making prompt regressions easy to catch.
//!
//! Callers can override the system message via
//! [`crate::config::PipelineConfig::system_prompt`]; the constant here is
//! used only when no override is provided.

use crate::config::PipelineConfig;
use crate::pipeline::chunk::TextChunk;

/// Default system prompt asking the model for one JSON object.
///
/// This prompt is used when `PipelineConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You extract structured data from document text.

Find in the user's text:
- entities: Names, Dates, Addresses
- tables: headers and rows

Respond in this JSON format:
{
  "entities": {
    "names": [],
    "dates": [],
    "addresses": []
  },
  "tables": [ { "headers": [], "rows": [] } ]
}

Rules:
- Output ONLY the JSON object
- Do NOT add commentary or explanations
- Copy values exactly as they appear in the text
- Every row must have one cell per header
- Use empty lists when nothing is found"#;

/// The two messages sent for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

impl ChatPrompt {
    /// Both messages rendered as one string, for diagnostics.
    pub fn prompt_text(&self) -> String {
        format!("[system]\n{}\n\n[user]\n{}", self.system, self.user)
    }
}

/// Build the prompt for one chunk.
pub fn build_prompt(chunk: &TextChunk, config: &PipelineConfig) -> ChatPrompt {
    let system = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT)
        .to_string();

    ChatPrompt {
        system,
        user: chunk.content.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> TextChunk {
        TextChunk {
            index: 0,
            content: text.to_string(),
            char_offset: 0,
        }
    }

    #[test]
    fn default_prompt_describes_the_json_shape() {
        for key in ["\"entities\"", "\"names\"", "\"dates\"", "\"addresses\"", "\"tables\"", "\"headers\"", "\"rows\""] {
            assert!(DEFAULT_SYSTEM_PROMPT.contains(key), "missing {key}");
        }
        assert!(DEFAULT_SYSTEM_PROMPT.contains("ONLY the JSON"));
    }

    #[test]
    fn user_message_is_the_chunk_text() {
        let p = build_prompt(&chunk("John Smith"), &PipelineConfig::default());
        assert_eq!(p.user, "John Smith");
        assert_eq!(p.system, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn system_prompt_override() {
        let config = PipelineConfig::builder()
            .system_prompt("Only names please.")
            .build()
            .unwrap();
        let p = build_prompt(&chunk("x"), &config);
        assert_eq!(p.system, "Only names please.");
    }

    #[test]
    fn prompt_text_contains_both_parts() {
        let p = build_prompt(&chunk("Total: 10"), &PipelineConfig::default());
        let text = p.prompt_text();
        assert!(text.contains("[system]"));
        assert!(text.ends_with("[user]\nTotal: 10"));
    }
}
