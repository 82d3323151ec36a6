// crates/core/src/types.rs
//! The uniform data model shared by all vendor adapters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which CLI tool produced a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Codex,
    ClaudeCode,
    Gemini,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Codex => "codex",
            Source::ClaudeCode => "claude_code",
            Source::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "codex" => Ok(Source::Codex),
            "claude_code" => Ok(Source::ClaudeCode),
            "gemini" => Ok(Source::Gemini),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of content a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Text,
    ToolCall,
    ToolResult,
    Thinking,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::ToolCall => "tool_call",
            ContentType::ToolResult => "tool_result",
            ContentType::Thinking => "thinking",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized message produced by a vendor adapter.
///
/// Ordinals are dense and 0-based within one parse of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub ordinal: i64,
    pub role: Role,
    pub content_type: ContentType,
    pub content_text: String,
    pub content_json: Option<String>,
    pub tool_name: Option<String>,
    pub token_count: i64,
    pub created_at: i64,
}

impl ParsedMessage {
    pub fn text(ordinal: i64, role: Role, content_text: String, created_at: i64) -> Self {
        Self {
            ordinal,
            role,
            content_type: ContentType::Text,
            content_text,
            content_json: None,
            tool_name: None,
            token_count: 0,
            created_at,
        }
    }

    pub fn thinking(ordinal: i64, content_text: String, created_at: i64) -> Self {
        Self {
            ordinal,
            role: Role::Assistant,
            content_type: ContentType::Thinking,
            content_text,
            content_json: None,
            tool_name: None,
            token_count: 0,
            created_at,
        }
    }

    pub fn tool_call(
        ordinal: i64,
        tool_name: String,
        content_text: String,
        content_json: Option<String>,
        created_at: i64,
    ) -> Self {
        Self {
            ordinal,
            role: Role::Assistant,
            content_type: ContentType::ToolCall,
            content_text,
            content_json,
            tool_name: Some(tool_name),
            token_count: 0,
            created_at,
        }
    }

    pub fn tool_result(
        ordinal: i64,
        content_text: String,
        content_json: Option<String>,
        created_at: i64,
    ) -> Self {
        Self {
            ordinal,
            role: Role::Tool,
            content_type: ContentType::ToolResult,
            content_text,
            content_json,
            tool_name: None,
            token_count: 0,
            created_at,
        }
    }

    /// True for a message a human actually typed.
    pub fn is_user_text(&self) -> bool {
        self.role == Role::User && self.content_type == ContentType::Text
    }
}

/// Normalized session metadata plus its message stream, from any vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSession {
    pub id: String,
    pub source: Source,
    pub project_path: Option<String>,
    pub project_name: Option<String>,
    pub cwd: Option<String>,
    pub model: Option<String>,
    pub git_branch: Option<String>,
    pub first_message_at: i64,
    pub last_message_at: i64,
    pub total_tokens: i64,
    pub compaction_count: i64,
    pub tools_used: Vec<String>,
    pub raw_path: String,
    pub title: Option<String>,
    pub messages: Vec<ParsedMessage>,
}

impl ParsedSession {
    pub fn message_count(&self) -> i64 {
        self.messages.len() as i64
    }

    pub fn user_message_count(&self) -> i64 {
        self.messages.iter().filter(|m| m.is_user_text()).count() as i64
    }

    /// Tool names observed in this session, sorted and deduplicated.
    pub fn tools_used_sorted(&self) -> Vec<String> {
        let mut tools = self.tools_used.clone();
        tools.sort();
        tools.dedup();
        tools
    }
}
