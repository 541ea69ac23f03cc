// src/llm.rs
//
// OpenAI-compatible chat client shared by the intent classifier, the
// normal-chat chain, and the form-fill chain.

use crate::config::{LlmBackend, LlmSection};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Truncate very long document text to stay within context limits.
pub const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Resolved endpoint configuration ready to make API calls.
pub struct ResolvedEndpoint {
    pub base_url: String,
    pub model: String,
    api_key: String,
}

/// Resolve the LLM config section into a concrete endpoint.
pub fn resolve_endpoint(
    llm: &LlmSection,
) -> Result<ResolvedEndpoint, Box<dyn std::error::Error>> {
    match llm.backend {
        LlmBackend::Ollama => {
            info!(
                url = %llm.ollama.base_url,
                model = %llm.ollama.model,
                "Using Ollama (local) backend"
            );
            Ok(ResolvedEndpoint {
                base_url: llm.ollama.base_url.clone(),
                model: llm.ollama.model.clone(),
                api_key: "ollama".to_string(), // required by API but ignored
            })
        }
        LlmBackend::Remote => {
            let api_key = std::env::var("LLM_API_KEY")
                .map_err(|_| "LLM_API_KEY env var required for remote backend")?;
            info!(
                url = %llm.remote.base_url,
                model = %llm.remote.model,
                "Using remote API backend"
            );
            Ok(ResolvedEndpoint {
                base_url: llm.remote.base_url.clone(),
                model: llm.remote.model.clone(),
                api_key,
            })
        }
    }
}

/// Check if the Ollama server is reachable.
pub async fn check_ollama_health(client: &Client, base_url: &str) -> bool {
    // Ollama's health endpoint is at the root (not under /v1)
    let health_url = base_url.trim_end_matches("/v1").trim_end_matches("/v1/");

    match client
        .get(health_url)
        .timeout(std::time::Duration::from_secs(3))
        .send()
        .await
    {
        Ok(resp) => {
            if resp.status().is_success() {
                info!("Ollama server is reachable");
                true
            } else {
                warn!(status = %resp.status(), "Ollama server returned non-OK status");
                false
            }
        }
        Err(e) => {
            warn!(error = %e, "Ollama server not reachable");
            false
        }
    }
}

/// Verify the configured backend is usable before starting a turn.
pub async fn ensure_backend_ready(
    client: &Client,
    llm: &LlmSection,
    endpoint: &ResolvedEndpoint,
) -> Result<(), Box<dyn std::error::Error>> {
    if llm.backend == LlmBackend::Ollama
        && !check_ollama_health(client, &endpoint.base_url).await
    {
        return Err(format!(
            "Ollama is not running at {}. Start it with: ollama serve",
            endpoint.base_url
        )
        .into());
    }
    Ok(())
}

/// Send a system + user message pair and return the raw assistant text.
pub async fn chat(
    client: &Client,
    endpoint: &ResolvedEndpoint,
    system: &str,
    user: &str,
    temperature: f64,
) -> Result<String, Box<dyn std::error::Error>> {
    let request = ChatRequest {
        model: endpoint.model.clone(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: truncate_for_context(user).to_string(),
            },
        ],
        temperature,
    };

    let url = format!("{}/chat/completions", endpoint.base_url);

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", endpoint.api_key))
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(format!("LLM API error {status}: {body}").into());
    }

    let chat_response: ChatResponse = response.json().await?;
    let content = chat_response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or("Empty response from LLM")?;

    Ok(content)
}

/// Clip to MAX_PROMPT_CHARS without splitting a UTF-8 code point.
pub fn truncate_for_context(s: &str) -> &str {
    if s.len() <= MAX_PROMPT_CHARS {
        return s;
    }
    let mut end = MAX_PROMPT_CHARS;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Extract the outermost JSON object from a string that may contain
/// markdown fences or surrounding text (e.g. thinking tokens).
pub fn extract_json_object(s: &str) -> Result<&str, Box<dyn std::error::Error>> {
    let s = s
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let start = s.find('{').ok_or("No '{' found in LLM response")?;
    let end = s.rfind('}').ok_or("No '}' found in LLM response")?;
    if end <= start {
        return Err("Malformed JSON in LLM response".into());
    }
    Ok(&s[start..=end])
}
