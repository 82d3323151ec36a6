// crates/core/src/parsers/gemini.rs
//! Adapter for Gemini CLI session files.
//!
//! Sessions live at `{root}/{sha256-of-cwd}/chats/session-*.json`, one JSON
//! object per file. The human-readable project path is recovered by hashing
//! every entry of the sibling `trustedFolders.json` registry and matching
//! against the directory hash.

use super::{
    file_mtime_epoch, iso_to_epoch, truncate_chars, TranscriptParser, TOOL_OUTPUT_TRUNCATE,
};
use crate::error::ParseError;
use crate::types::{ParsedMessage, ParsedSession, Role, Source};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub struct GeminiParser {
    hash_to_path: HashMap<String, String>,
}

impl Default for GeminiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiParser {
    /// Build a parser using the default registry at
    /// `~/.gemini/trustedFolders.json`.
    pub fn new() -> Self {
        let registry = dirs::home_dir().map(|h| h.join(".gemini").join("trustedFolders.json"));
        match registry {
            Some(path) => Self::with_registry_file(&path),
            None => Self {
                hash_to_path: HashMap::new(),
            },
        }
    }

    /// Build a parser with an explicit trusted-folders registry file.
    pub fn with_registry_file(path: &Path) -> Self {
        Self {
            hash_to_path: load_trusted_folders(path),
        }
    }

    fn extract_user_text(msg: &Value) -> String {
        match msg.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => {
                let parts: Vec<&str> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.as_str()),
                        _ => item.get("text").and_then(Value::as_str),
                    })
                    .filter(|t| !t.is_empty())
                    .collect();
                parts.join("\n")
            }
            _ => String::new(),
        }
    }
}

/// Hash every registry entry so a project hash can be reversed to its path.
fn load_trusted_folders(path: &Path) -> HashMap<String, String> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    let Ok(value) = serde_json::from_str::<Value>(&text) else {
        debug!(path = %path.display(), "unparseable trustedFolders registry");
        return HashMap::new();
    };

    let folders: Vec<String> = match value {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    };

    folders
        .into_iter()
        .map(|folder| {
            let digest = Sha256::digest(folder.as_bytes());
            (hex::encode(digest), folder)
        })
        .collect()
}

impl TranscriptParser for GeminiParser {
    fn source(&self) -> Source {
        Source::Gemini
    }

    fn discover_files(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for base in roots {
            if !base.exists() {
                continue;
            }
            let mut found: Vec<PathBuf> = WalkDir::new(base)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| {
                    p.extension().is_some_and(|e| e == "json")
                        && p.file_name()
                            .is_some_and(|n| n.to_string_lossy().starts_with("session-"))
                })
                .collect();
            found.sort();
            files.extend(found);
        }
        files
    }

    fn parse(&self, path: &Path) -> Result<Option<ParsedSession>, ParseError> {
        let bytes = std::fs::read(path).map_err(|e| ParseError::io(path, e))?;
        let text = String::from_utf8_lossy(&bytes);
        let data: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping corrupt gemini session");
                return Ok(None);
            }
        };
        if !data.is_object() {
            return Ok(None);
        }

        let session_id = data
            .get("sessionId")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default()
            });
        let project_hash = data
            .get("projectHash")
            .and_then(Value::as_str)
            .unwrap_or("");
        let Some(raw_messages) = data.get("messages").and_then(Value::as_array) else {
            return Ok(None);
        };
        if raw_messages.is_empty() {
            return Ok(None);
        }

        let project_path = self.hash_to_path.get(project_hash).cloned();
        let project_name = match &project_path {
            Some(p) => Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().to_string()),
            // Unknown hash: keep a short prefix so the project is addressable
            None => Some(project_hash.chars().take(12).collect()),
        };

        let mut first_ts = data
            .get("startTime")
            .and_then(Value::as_str)
            .map(iso_to_epoch)
            .unwrap_or(0);
        let mut last_ts = data
            .get("lastUpdated")
            .and_then(Value::as_str)
            .map(iso_to_epoch)
            .unwrap_or(0);

        let mut messages: Vec<ParsedMessage> = Vec::new();
        let mut ordinal: i64 = 0;
        let mut total_tokens: i64 = 0;
        let mut tools_used: Vec<String> = Vec::new();
        let mut model: Option<String> = None;
        let mut title: Option<String> = None;

        for msg in raw_messages {
            if !msg.is_object() {
                continue;
            }
            let msg_type = msg.get("type").and_then(Value::as_str).unwrap_or("");
            let ts = msg
                .get("timestamp")
                .and_then(Value::as_str)
                .map(iso_to_epoch)
                .unwrap_or(0);

            match msg_type {
                "user" => {
                    let text = Self::extract_user_text(msg);
                    if !text.is_empty() {
                        if title.is_none() {
                            title = Some(text.chars().take(200).collect());
                        }
                        messages.push(ParsedMessage::text(ordinal, Role::User, text, ts));
                        ordinal += 1;
                    }
                }
                "gemini" => {
                    if model.is_none() {
                        model = msg.get("model").and_then(Value::as_str).map(String::from);
                    }
                    if let Some(total) = msg
                        .get("tokens")
                        .and_then(|t| t.get("total"))
                        .and_then(Value::as_i64)
                    {
                        total_tokens += total;
                    }

                    // Thoughts, tool calls + results, and text all live in one
                    // gemini-typed record and become one message each.
                    for thought in msg
                        .get("thoughts")
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                    {
                        let subject = thought.get("subject").and_then(Value::as_str).unwrap_or("");
                        let desc = thought
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or("");
                        let thought_text = if subject.is_empty() {
                            desc.to_string()
                        } else {
                            format!("{subject}: {desc}")
                        };
                        if !thought_text.is_empty() {
                            messages.push(ParsedMessage::thinking(
                                ordinal,
                                truncate_chars(&thought_text, 1000),
                                ts,
                            ));
                            ordinal += 1;
                        }
                    }

                    for tc in msg
                        .get("toolCalls")
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                    {
                        let name = tc.get("name").and_then(Value::as_str).unwrap_or("");
                        if name.is_empty() {
                            continue;
                        }
                        tools_used.push(name.to_string());

                        let args = tc.get("args").cloned().unwrap_or(Value::Null);
                        let args_text = args.to_string();
                        let side_channel = serde_json::json!({
                            "name": name,
                            "args": truncate_chars(&args_text, 1000),
                            "status": tc.get("status"),
                        });
                        messages.push(ParsedMessage::tool_call(
                            ordinal,
                            name.to_string(),
                            truncate_chars(&args_text, 500),
                            Some(side_channel.to_string()),
                            ts,
                        ));
                        ordinal += 1;

                        let result_text = match tc.get("result") {
                            Some(Value::String(s)) => s.clone(),
                            Some(other) => other.to_string(),
                            None => String::new(),
                        };
                        messages.push(ParsedMessage::tool_result(
                            ordinal,
                            truncate_chars(&result_text, TOOL_OUTPUT_TRUNCATE),
                            None,
                            ts,
                        ));
                        ordinal += 1;
                    }

                    if let Some(content) = msg.get("content").and_then(Value::as_str) {
                        if !content.trim().is_empty() {
                            messages.push(ParsedMessage::text(
                                ordinal,
                                Role::Assistant,
                                content.to_string(),
                                ts,
                            ));
                            ordinal += 1;
                        }
                    }
                }
                "info" => {
                    let text = match msg.get("content") {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Array(items)) => items
                            .iter()
                            .filter_map(|i| i.get("text").and_then(Value::as_str))
                            .collect::<Vec<_>>()
                            .join(" "),
                        _ => String::new(),
                    };
                    if !text.trim().is_empty() {
                        messages.push(ParsedMessage::text(ordinal, Role::System, text, ts));
                        ordinal += 1;
                    }
                }
                _ => {}
            }
        }

        if first_ts == 0 {
            first_ts = file_mtime_epoch(path);
        }
        if last_ts == 0 {
            last_ts = first_ts;
        }

        Ok(Some(ParsedSession {
            id: session_id,
            source: Source::Gemini,
            cwd: project_path.clone(),
            project_path,
            project_name,
            model,
            git_branch: None,
            first_message_at: first_ts,
            last_message_at: last_ts,
            total_tokens,
            compaction_count: 0,
            tools_used,
            raw_path: path.to_string_lossy().to_string(),
            title,
            messages,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentType;
    use std::fs;

    fn project_hash_for(path: &str) -> String {
        hex::encode(Sha256::digest(path.as_bytes()))
    }

    fn write_fixture(dir: &Path, project: &str) -> (PathBuf, PathBuf) {
        let hash = project_hash_for(project);
        let chats = dir.join("tmp").join(&hash).join("chats");
        fs::create_dir_all(&chats).unwrap();

        let session = serde_json::json!({
            "sessionId": "600e16e2-68f5-48df-97a5-1cedbe3c57a2",
            "projectHash": hash,
            "startTime": "2026-02-13T01:31:56.201Z",
            "lastUpdated": "2026-02-13T01:32:10.699Z",
            "messages": [
                {
                    "id": "msg-1",
                    "timestamp": "2026-02-13T01:31:56.500Z",
                    "type": "user",
                    "content": [{"text": "search the latest nba score"}],
                },
                {
                    "id": "msg-2",
                    "timestamp": "2026-02-13T01:32:00.000Z",
                    "type": "gemini",
                    "content": "",
                    "toolCalls": [{
                        "name": "google_web_search",
                        "args": {"query": "latest nba score"},
                        "result": [{"functionResponse": {"result": "Lakers 110 - Celtics 105"}}],
                        "status": "success",
                    }],
                    "thoughts": [{
                        "subject": "Querying NBA Scores",
                        "description": "Searching for the latest NBA scores.",
                    }],
                    "model": "gemini-3-pro-preview",
                    "tokens": {"input": 8000, "output": 13, "total": 8049},
                },
                {
                    "id": "msg-3",
                    "timestamp": "2026-02-13T01:32:10.000Z",
                    "type": "gemini",
                    "content": "The latest NBA score is Lakers 110, Celtics 105.",
                    "tokens": {"input": 8259, "output": 108, "total": 8367},
                    "model": "gemini-3-pro-preview",
                },
            ],
        });
        let session_file = chats.join("session-2026-02-13T01-31-600e16e2.json");
        fs::write(&session_file, session.to_string()).unwrap();

        let registry = dir.join("trustedFolders.json");
        fs::write(
            &registry,
            serde_json::json!({ project: "TRUST_FOLDER" }).to_string(),
        )
        .unwrap();

        (session_file, registry)
    }

    #[test]
    fn test_parse_session_and_recover_project() {
        let tmp = tempfile::tempdir().unwrap();
        let (session_file, registry) = write_fixture(tmp.path(), "/srv/work/scores");

        let parser = GeminiParser::with_registry_file(&registry);
        let session = parser.parse(&session_file).unwrap().unwrap();

        assert_eq!(session.id, "600e16e2-68f5-48df-97a5-1cedbe3c57a2");
        assert_eq!(session.source, Source::Gemini);
        assert_eq!(session.project_path.as_deref(), Some("/srv/work/scores"));
        assert_eq!(session.project_name.as_deref(), Some("scores"));
        assert_eq!(session.model.as_deref(), Some("gemini-3-pro-preview"));
        assert_eq!(session.title.as_deref(), Some("search the latest nba score"));
        assert!(session.first_message_at > 0);
        assert!(session.last_message_at >= session.first_message_at);

        // Tokens accumulate across gemini messages
        assert_eq!(session.total_tokens, 8049 + 8367);

        // user + thinking + tool_call + tool_result + assistant text
        assert_eq!(session.message_count(), 5);
        assert_eq!(session.user_message_count(), 1);
        let kinds: Vec<ContentType> = session.messages.iter().map(|m| m.content_type).collect();
        assert_eq!(
            kinds,
            vec![
                ContentType::Text,
                ContentType::Thinking,
                ContentType::ToolCall,
                ContentType::ToolResult,
                ContentType::Text,
            ]
        );
        assert_eq!(session.tools_used_sorted(), vec!["google_web_search"]);
    }

    #[test]
    fn test_unknown_hash_keeps_prefix_as_name() {
        let tmp = tempfile::tempdir().unwrap();
        let (session_file, _) = write_fixture(tmp.path(), "/srv/work/scores");

        // Registry without the folder: hash cannot be reversed
        let empty_registry = tmp.path().join("empty.json");
        fs::write(&empty_registry, "{}").unwrap();
        let parser = GeminiParser::with_registry_file(&empty_registry);
        let session = parser.parse(&session_file).unwrap().unwrap();

        assert!(session.project_path.is_none());
        assert_eq!(session.project_name.as_deref().map(str::len), Some(12));
    }

    #[test]
    fn test_empty_and_no_message_files_are_none() {
        let tmp = tempfile::tempdir().unwrap();
        let parser = GeminiParser::with_registry_file(&tmp.path().join("missing.json"));

        let empty = tmp.path().join("session-empty.json");
        fs::write(&empty, "{}").unwrap();
        assert!(parser.parse(&empty).unwrap().is_none());

        let no_msgs = tmp.path().join("session-nomsgs.json");
        fs::write(
            &no_msgs,
            serde_json::json!({"sessionId": "x", "messages": []}).to_string(),
        )
        .unwrap();
        assert!(parser.parse(&no_msgs).unwrap().is_none());

        let corrupt = tmp.path().join("session-corrupt.json");
        fs::write(&corrupt, "{not json").unwrap();
        assert!(parser.parse(&corrupt).unwrap().is_none());
    }

    #[test]
    fn test_discover_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (session_file, _) = write_fixture(tmp.path(), "/srv/work/scores");
        fs::write(session_file.parent().unwrap().join("notes.json"), "{}").unwrap();

        let parser = GeminiParser::with_registry_file(&tmp.path().join("missing.json"));
        let files = parser.discover_files(&[tmp.path().join("tmp")]);
        assert_eq!(files.len(), 1);
        assert!(files[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("session-"));
    }
}
