// src/intent.rs
//
// Three-way intent classification: the LLM is asked for a one-word label
// and anything unparseable defaults to Normal.

use crate::forms::FormType;
use crate::llm::{self, ResolvedEndpoint};
use crate::prompts;
use reqwest::Client;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Import,
    Export,
    Normal,
}

impl Intent {
    /// Parse a classifier reply. Case-insensitive; tolerates surrounding
    /// prose by scanning tokens for a known label (models occasionally pad
    /// the answer despite instructions). Aliases from the form names are
    /// accepted too. Unknown input defaults to Normal.
    pub fn parse(s: &str) -> Intent {
        for token in s.split(|c: char| !c.is_ascii_alphanumeric()) {
            match token.to_ascii_lowercase().as_str() {
                "import" | "b650" | "n10" => return Intent::Import,
                "export" | "b957" => return Intent::Export,
                "normal" => return Intent::Normal,
                _ => {}
            }
        }
        Intent::Normal
    }

    /// The declaration form this intent targets, if any.
    pub fn form_type(self) -> Option<FormType> {
        match self {
            Intent::Import => Some(FormType::Import),
            Intent::Export => Some(FormType::Export),
            Intent::Normal => None,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Import => write!(f, "import"),
            Intent::Export => write!(f, "export"),
            Intent::Normal => write!(f, "normal"),
        }
    }
}

/// Classify the latest user message. LLM failure is not fatal: the turn
/// degrades to a normal chat turn.
pub async fn classify(
    client: &Client,
    endpoint: &ResolvedEndpoint,
    history: &str,
    input: &str,
    documents: &str,
) -> Intent {
    let system = prompts::render_classification(history, documents);
    match llm::chat(client, endpoint, &system, input, 0.0).await {
        Ok(reply) => {
            let intent = Intent::parse(&reply);
            info!(raw = %reply.trim(), intent = %intent, "Intent classified");
            intent
        }
        Err(e) => {
            warn!(error = %e, "Intent classification failed — defaulting to normal");
            Intent::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_labels() {
        assert_eq!(Intent::parse("import"), Intent::Import);
        assert_eq!(Intent::parse("Export"), Intent::Export);
        assert_eq!(Intent::parse("NORMAL"), Intent::Normal);
    }

    #[test]
    fn test_parse_with_surrounding_prose() {
        assert_eq!(
            Intent::parse("The label is: import."),
            Intent::Import
        );
        assert_eq!(Intent::parse("export\n"), Intent::Export);
    }

    #[test]
    fn test_parse_form_aliases() {
        assert_eq!(Intent::parse("b650"), Intent::Import);
        assert_eq!(Intent::parse("N10"), Intent::Import);
        assert_eq!(Intent::parse("B957"), Intent::Export);
    }

    #[test]
    fn test_parse_unknown_defaults_to_normal() {
        assert_eq!(Intent::parse("I am not sure"), Intent::Normal);
        assert_eq!(Intent::parse(""), Intent::Normal);
    }

    #[test]
    fn test_form_type_mapping() {
        assert_eq!(Intent::Import.form_type(), Some(FormType::Import));
        assert_eq!(Intent::Export.form_type(), Some(FormType::Export));
        assert_eq!(Intent::Normal.form_type(), None);
    }
}
