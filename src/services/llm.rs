//! Generative-AI client
//!
//! The chatbot talks to the model through [`ChatModel`]. The production
//! implementation calls the `generateContent` endpoint of the Gemini API.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::{ChatMessage, MessageRole};

/// Instruction sent with every request and stored once per chat session
pub const SYSTEM_PROMPT: &str = "Your name is Cyber Justitia.
You are a helpful legal assistant who helps people with their legal problems.
You are an expert in UK law and Newcastle-upon-Tyne bylaws.
IMPORTANT: Do NOT say that you cannot provide legal advice. Instead, say that as a helpful legal assistant, you can provide general information and guidance on legal matters, but not official legal advice.
If you don't know the answer, just say that you don't know.";

/// Speaker of a turn replayed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

/// Rebuild the conversation from stored messages.
///
/// System rows are never replayed; the prompt travels separately.
pub fn history_from_messages(messages: &[ChatMessage]) -> Vec<ChatTurn> {
    messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                MessageRole::User => TurnRole::User,
                MessageRole::Bot => TurnRole::Model,
                MessageRole::System => return None,
            };
            Some(ChatTurn {
                role,
                text: m.text.clone(),
            })
        })
        .collect()
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce a reply to `message` given the earlier turns.
    async fn generate(&self, system: &str, history: &[ChatTurn], message: &str) -> Result<String>;
}

// ============================================================================
// Gemini wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

fn text_content(role: Option<&str>, text: &str) -> Content {
    Content {
        role: role.map(str::to_string),
        parts: vec![Part {
            text: text.to_string(),
        }],
    }
}

fn build_request(system: &str, history: &[ChatTurn], message: &str) -> GenerateContentRequest {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|turn| text_content(Some(turn.role.as_str()), &turn.text))
        .collect();
    contents.push(text_content(Some(TurnRole::User.as_str()), message));

    GenerateContentRequest {
        contents,
        system_instruction: text_content(None, system),
    }
}

fn extract_reply(response: GenerateContentResponse) -> Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        bail!("Prompt blocked by the model: {}", reason);
    }

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .ok_or_else(|| anyhow!("Model returned no candidates"))?;

    Ok(text)
}

/// Gemini `generateContent` client
pub struct GeminiChatModel {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiChatModel {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn generate(&self, system: &str, history: &[ChatTurn], message: &str) -> Result<String> {
        if self.api_key.is_empty() {
            bail!("LLM API key is not configured");
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            urlencoding::encode(&self.api_key)
        );
        let request = build_request(system, history, message);
        tracing::debug!("Sending {} turns to {}", request.contents.len(), self.model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Request to the model failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Model API error ({}): {}", status, body);
            bail!("Model API error ({})", status);
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to decode model response")?;
        extract_reply(parsed)
    }
}
