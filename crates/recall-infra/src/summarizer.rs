//! Promotion of evicted messages via an OpenAI-compatible chat endpoint.
//!
//! The model sees the messages about to leave the short-term log and answers
//! with one JSON object `{"key": ..., "value": ...}` or `null` when nothing
//! is worth keeping.

use std::time::Duration;

use recall_core::memory::summarizer::{BoxSummarizer, Summarizer};
use recall_types::config::{MemoryConfig, SummarizerConfig};
use recall_types::error::{MemoryError, ProviderError};
use recall_types::memory::Promotion;
use recall_types::message::Message;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

const PROMOTION_SYSTEM_PROMPT: &str = r#"You decide whether messages leaving a conversation's short-term memory contain a durable fact about the user worth keeping.

Rules:
1. Keep only information useful in future conversations (names, preferences, decisions, stable facts)
2. Ignore greetings, small talk, and questions
3. The key is a short snake_case identifier, e.g. "user_name" or "favourite_drink"
4. The value is one self-contained sentence or phrase

Return exactly one JSON object {"key": string, "value": string}, or null if nothing is worth keeping. No prose."#;

/// Chat-completions summarizer.
///
/// Does NOT derive Debug so the API key cannot leak through formatting.
pub struct HttpSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl HttpSummarizer {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
        })
    }

    #[tracing::instrument(
        name = "summarize_evicted",
        skip(self, messages),
        fields(model = %self.model, message_count = messages.len())
    )]
    async fn request(&self, messages: Vec<ChatMessage>) -> Result<Option<Promotion>, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.0,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "chat API returned {status}: {text}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        parse_promotion(&content)
    }
}

/// Render messages as a transcript for the promotion prompt.
fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("[{}] {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the model's answer; tolerates a surrounding markdown code fence.
fn parse_promotion(raw: &str) -> Result<Option<Promotion>, ProviderError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if body.is_empty() {
        return Ok(None);
    }

    let promotion: Option<Promotion> = serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        ProviderError::InvalidResponse(format!("{e}: {preview}"))
    })?;

    Ok(promotion.filter(|p| !p.key.trim().is_empty() && !p.value.trim().is_empty()))
}

impl Summarizer for HttpSummarizer {
    fn summarize(
        &self,
        messages: &[Message],
    ) -> impl std::future::Future<Output = Result<Option<Promotion>, ProviderError>> + Send {
        let chat = vec![
            ChatMessage {
                role: "system",
                content: PROMOTION_SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: transcript(messages),
            },
        ];
        self.request(chat)
    }
}

/// Build the summarizer from `[summarizer]`, if configured.
pub fn build_summarizer(config: &MemoryConfig) -> Result<Option<BoxSummarizer>, MemoryError> {
    let Some(SummarizerConfig {
        endpoint,
        model,
        api_key_env,
    }) = &config.summarizer
    else {
        return Ok(None);
    };
    let api_key = std::env::var(api_key_env)
        .ok()
        .filter(|k| !k.is_empty())
        .map(SecretString::from);
    let summarizer = HttpSummarizer::new(endpoint, api_key, model, config.embedding_timeout())?;
    Ok(Some(BoxSummarizer::new(summarizer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recall_types::message::Role;

    #[test]
    fn test_parse_plain_object() {
        let p = parse_promotion(r#"{"key": "user_name", "value": "Alice"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(p.key, "user_name");
        assert_eq!(p.value, "Alice");
    }

    #[test]
    fn test_parse_fenced_object() {
        let raw = "```json\n{\"key\": \"drink\", \"value\": \"green tea\"}\n```";
        let p = parse_promotion(raw).unwrap().unwrap();
        assert_eq!(p.key, "drink");
    }

    #[test]
    fn test_parse_null_and_empty() {
        assert!(parse_promotion("null").unwrap().is_none());
        assert!(parse_promotion("   ").unwrap().is_none());
        assert!(parse_promotion(r#"{"key": "", "value": "x"}"#).unwrap().is_none());
    }

    #[test]
    fn test_parse_prose_is_invalid() {
        let err = parse_promotion("Sure! The user's name is Alice.").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_transcript_format() {
        let messages = vec![Message {
            session_id: "s".to_string(),
            seq: 1,
            role: Role::User,
            content: "My name is Alice".to_string(),
            created_at: Utc::now(),
            pinned: false,
        }];
        assert_eq!(transcript(&messages), "[user] My name is Alice");
    }

    #[test]
    fn test_build_without_config() {
        assert!(build_summarizer(&MemoryConfig::default()).unwrap().is_none());
    }
}
