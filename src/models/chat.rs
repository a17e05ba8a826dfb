//! Chatbot sessions and messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::validation::{require_text, ValidationError};

pub const MESSAGE_TEXT_MAX: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Bot,
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Bot => "bot",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "bot" => Ok(MessageRole::Bot),
            "system" => Ok(MessageRole::System),
            _ => Err(ValidationError::InvalidChoice {
                field: "message role",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for MessageRole {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatSession {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    #[sqlx(try_from = "String")]
    pub role: MessageRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A message that passed validation and may be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    role: MessageRole,
    text: String,
}

impl NewMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Result<Self, ValidationError> {
        let text = text.into();
        validate_message_text(&text)?;
        Ok(Self { role, text })
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

pub fn validate_message_text(text: &str) -> Result<(), ValidationError> {
    require_text("Message", text, MESSAGE_TEXT_MAX)
}
