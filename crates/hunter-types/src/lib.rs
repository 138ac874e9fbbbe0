use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Episodic memory record: a past problem and how it was solved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    /// Backend-assigned row identifier.
    pub id: i64,
    /// Bounded-length prefix of `error_pattern`, for quick scanning only.
    pub task_signature: String,
    /// Description of the problem or error.
    pub error_pattern: String,
    /// Root cause analysis. Empty for automatically ingested records.
    pub root_cause: String,
    /// Summary of the fix.
    pub solution_summary: String,
    /// Embedding of the record, when one was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Cosine similarity to the query; only set on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    /// When the record was created.
    pub occurred_at: DateTime<Utc>,
}

impl Experience {
    /// `true` when pattern, cause and solution are all empty.
    pub fn is_blank(&self) -> bool {
        self.error_pattern.is_empty() && self.root_cause.is_empty() && self.solution_summary.is_empty()
    }
}

/// Semantic memory record: a static project rule injected into prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRule {
    pub id: i64,
    /// Free-text classification (e.g. `"naming"`, `"error_handling"`).
    pub category: String,
    pub rule_content: String,
    /// Higher sorts first.
    pub priority: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A retrieved experience rendered for an agent's context window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub content: String,
    /// Always `"system"` for entries produced from episodic memory.
    pub author: String,
    pub occurred_at: DateTime<Utc>,
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Tool,
}

/// One piece of a conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Text(String),
    FunctionCall {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    FunctionResponse {
        name: String,
        #[serde(default)]
        response: serde_json::Value,
    },
}

/// A single turn of a conversation, in the order it occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, parts: vec![Part::Text(text.into())] }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: Role::Model, parts: vec![Part::Text(text.into())] }
    }

    /// A model turn consisting of a single function call with no arguments.
    pub fn function_call(name: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::FunctionCall { name: name.into(), args: serde_json::Value::Null }],
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Non-empty text parts joined with a single space, or `None` when the
    /// turn carries no text at all.
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) if !t.is_empty() => Some(t.as_str()),
                _ => None,
            })
            .collect();
        if texts.is_empty() { None } else { Some(texts.join(" ")) }
    }

    /// `true` if any part is a call to the function `name`.
    pub fn calls(&self, name: &str) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::FunctionCall { name: n, .. } if n == name))
    }
}
