//! Completion request types for the upstream tutor model.
//!
//! These model the OpenAI-compatible chat-completions wire shape used by the
//! upstream provider, plus the conversation history the browser sends along.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a message in an upstream prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for PromptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptRole::System => write!(f, "system"),
            PromptRole::User => write!(f, "user"),
            PromptRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for PromptRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(PromptRole::System),
            "user" => Ok(PromptRole::User),
            "assistant" | "ai" => Ok(PromptRole::Assistant),
            other => Err(format!("invalid prompt role: '{other}'")),
        }
    }
}

/// A single message in an upstream prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }
}

/// One prior exchange as sent by the browser in `conversationHistory`.
///
/// Roles are accepted loosely (`ai` and `assistant` both map to the
/// assistant role); unknown roles are dropped when the prompt is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

impl HistoryEntry {
    /// Convert to a prompt message, or `None` if the role is unusable.
    pub fn to_prompt(&self) -> Option<PromptMessage> {
        match self.role.parse::<PromptRole>() {
            Ok(PromptRole::System) | Err(_) => None,
            Ok(role) => Some(PromptMessage {
                role,
                content: self.content.clone(),
            }),
        }
    }
}

/// Streaming chat-completions request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub temperature: f64,
    #[serde(default)]
    pub stream: bool,
}
