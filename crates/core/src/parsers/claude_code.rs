// crates/core/src/parsers/claude_code.rs
//! Adapter for Claude Code session files.
//!
//! Sessions live at `{root}/{project-slug}/{session-uuid}.jsonl`, one JSON
//! record per line. Record `type` is one of `user`, `assistant`, `system`,
//! `progress`, `file-history-snapshot`, `queue-operation`; message content
//! may be a plain string or an array of typed blocks.

use super::{
    file_mtime_epoch, infer_project_from_cwd, iso_to_epoch, read_jsonl_values, truncate_chars,
    TranscriptParser, TOOL_OUTPUT_TRUNCATE,
};
use crate::error::ParseError;
use crate::types::{ParsedMessage, ParsedSession, Role, Source};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct ClaudeCodeParser;

impl ClaudeCodeParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a user record's content, which may be a string or a block array.
    fn parse_user_content(&self, content: &Value, start_ordinal: i64, ts: i64) -> Vec<ParsedMessage> {
        let mut msgs = Vec::new();

        match content {
            Value::String(s) => {
                if !s.trim().is_empty() {
                    msgs.push(ParsedMessage::text(start_ordinal, Role::User, s.clone(), ts));
                }
            }
            Value::Array(blocks) => {
                for block in blocks {
                    let ordinal = start_ordinal + msgs.len() as i64;
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            let text = block.get("text").and_then(Value::as_str).unwrap_or("");
                            if !text.trim().is_empty() {
                                msgs.push(ParsedMessage::text(ordinal, Role::User, text.to_string(), ts));
                            }
                        }
                        Some("tool_result") => {
                            let result_text = flatten_tool_result(block.get("content"));
                            let side_channel = serde_json::json!({
                                "tool_use_id": block.get("tool_use_id"),
                            });
                            msgs.push(ParsedMessage::tool_result(
                                ordinal,
                                truncate_chars(&result_text, TOOL_OUTPUT_TRUNCATE),
                                Some(side_channel.to_string()),
                                ts,
                            ));
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        msgs
    }

    /// Parse an assistant record's content blocks.
    fn parse_assistant_content(
        &self,
        content: &Value,
        start_ordinal: i64,
        ts: i64,
    ) -> Vec<ParsedMessage> {
        let mut msgs = Vec::new();

        match content {
            Value::String(s) => {
                if !s.trim().is_empty() {
                    msgs.push(ParsedMessage::text(start_ordinal, Role::Assistant, s.clone(), ts));
                }
            }
            Value::Array(blocks) => {
                for block in blocks {
                    let ordinal = start_ordinal + msgs.len() as i64;
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            let text = block.get("text").and_then(Value::as_str).unwrap_or("");
                            if !text.trim().is_empty() {
                                msgs.push(ParsedMessage::text(
                                    ordinal,
                                    Role::Assistant,
                                    text.to_string(),
                                    ts,
                                ));
                            }
                        }
                        Some("thinking") => {
                            let text = block.get("thinking").and_then(Value::as_str).unwrap_or("");
                            if !text.trim().is_empty() {
                                msgs.push(ParsedMessage::thinking(
                                    ordinal,
                                    truncate_chars(text, 1000),
                                    ts,
                                ));
                            }
                        }
                        Some("tool_use") => {
                            let name = block
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or("")
                                .to_string();
                            let input = block.get("input").cloned().unwrap_or(Value::Null);
                            let input_text = input.to_string();
                            let side_channel = serde_json::json!({
                                "id": block.get("id"),
                                "name": name,
                                "input": truncate_chars(&input_text, 1000),
                            });
                            msgs.push(ParsedMessage::tool_call(
                                ordinal,
                                name,
                                truncate_chars(&input_text, 500),
                                Some(side_channel.to_string()),
                                ts,
                            ));
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        msgs
    }
}

/// Tool-result content may be a plain string or a list of text blocks.
fn flatten_tool_result(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            parts.join("\n")
        }
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl TranscriptParser for ClaudeCodeParser {
    fn source(&self) -> Source {
        Source::ClaudeCode
    }

    fn discover_files(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for base in roots {
            let Ok(entries) = std::fs::read_dir(base) else {
                continue;
            };
            for project_entry in entries.flatten() {
                let project_dir = project_entry.path();
                if !project_dir.is_dir() {
                    continue;
                }
                // Session files sit directly under the project directory;
                // subagent subdirectories are not walked.
                let Ok(session_entries) = std::fs::read_dir(&project_dir) else {
                    continue;
                };
                for entry in session_entries.flatten() {
                    let path = entry.path();
                    if path.is_file() && path.extension().is_some_and(|e| e == "jsonl") {
                        files.push(path);
                    }
                }
            }
        }
        files.sort();
        files
    }

    fn parse(&self, path: &Path) -> Result<Option<ParsedSession>, ParseError> {
        let records = read_jsonl_values(path)?;
        if records.is_empty() {
            return Ok(None);
        }

        let mut session_id: Option<String> = None;
        let mut cwd: Option<String> = None;
        let mut model: Option<String> = None;
        let mut git_branch: Option<String> = None;
        let mut tools_used: Vec<String> = Vec::new();
        let mut total_tokens: i64 = 0;
        let mut compaction_count: i64 = 0;

        let mut messages: Vec<ParsedMessage> = Vec::new();
        let mut ordinal: i64 = 0;
        let mut first_ts: i64 = 0;
        let mut last_ts: i64 = 0;
        let mut title: Option<String> = None;

        for rec in &records {
            let rec_type = rec.get("type").and_then(Value::as_str).unwrap_or("");
            let ts = rec
                .get("timestamp")
                .and_then(Value::as_str)
                .map(iso_to_epoch)
                .unwrap_or(0);
            if ts > 0 && (first_ts == 0 || ts < first_ts) {
                first_ts = ts;
            }
            if ts > last_ts {
                last_ts = ts;
            }

            if matches!(rec_type, "file-history-snapshot" | "queue-operation" | "progress") {
                continue;
            }
            if rec_type == "system" {
                if rec.get("subtype").and_then(Value::as_str) == Some("compact_boundary") {
                    compaction_count += 1;
                }
                continue;
            }

            if session_id.is_none() {
                session_id = rec.get("sessionId").and_then(Value::as_str).map(String::from);
            }
            if cwd.is_none() {
                cwd = rec.get("cwd").and_then(Value::as_str).map(String::from);
            }
            if git_branch.is_none() {
                git_branch = rec.get("gitBranch").and_then(Value::as_str).map(String::from);
            }

            let Some(message) = rec.get("message") else {
                continue;
            };

            if model.is_none() {
                model = message.get("model").and_then(Value::as_str).map(String::from);
            }

            if let Some(usage) = message.get("usage") {
                let input = usage.get("input_tokens").and_then(Value::as_i64).unwrap_or(0);
                let output = usage.get("output_tokens").and_then(Value::as_i64).unwrap_or(0);
                total_tokens = total_tokens.max(input + output);
            }

            let content = message.get("content").cloned().unwrap_or(Value::Null);

            match rec_type {
                "user" => {
                    for msg in self.parse_user_content(&content, ordinal, ts) {
                        if title.is_none() && msg.is_user_text() {
                            title = Some(msg.content_text.chars().take(200).collect());
                        }
                        ordinal += 1;
                        messages.push(msg);
                    }
                }
                "assistant" => {
                    for msg in self.parse_assistant_content(&content, ordinal, ts) {
                        if let Some(name) = &msg.tool_name {
                            tools_used.push(name.clone());
                        }
                        ordinal += 1;
                        messages.push(msg);
                    }
                }
                _ => {}
            }
        }

        let session_id = session_id.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        if first_ts == 0 {
            first_ts = file_mtime_epoch(path);
        }
        if last_ts == 0 {
            last_ts = first_ts;
        }

        let (project_path, project_name) = infer_project_from_cwd(cwd.as_deref());

        Ok(Some(ParsedSession {
            id: session_id,
            source: Source::ClaudeCode,
            project_path,
            project_name,
            cwd,
            model,
            git_branch,
            first_message_at: first_ts,
            last_message_at: last_ts,
            total_tokens,
            compaction_count,
            tools_used,
            raw_path: path.to_string_lossy().to_string(),
            title,
            messages,
        }))
    }
}
