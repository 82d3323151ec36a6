// crates/core/src/parsers/codex.rs
//! Adapter for Codex CLI rollout files.
//!
//! Sessions live at `{root}/{year}/{month}/{day}/rollout-{ts}-{uuid}.jsonl`.
//! Each line is `{"timestamp": ..., "type": ..., "payload": {...}}` with
//! types `session_meta`, `turn_context`, `response_item`, `event_msg`.

use super::{
    file_mtime_epoch, infer_project_from_cwd, iso_to_epoch, read_jsonl_values, truncate_chars,
    TranscriptParser, TOOL_OUTPUT_TRUNCATE,
};
use crate::error::ParseError;
use crate::is_synthetic_preamble;
use crate::types::{ParsedMessage, ParsedSession, Role, Source};
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// User text longer than this is assumed to be an injected instruction
/// block, not a human prompt, when picking a title.
const TITLE_MAX_SOURCE_CHARS: usize = 2000;

#[derive(Debug, Default)]
pub struct CodexParser;

impl CodexParser {
    pub fn new() -> Self {
        Self
    }

    /// Map one `response_item` payload to a message, or `None` for variants
    /// that carry no conversational content.
    fn parse_response_item(&self, payload: &Value, ordinal: i64, ts: i64) -> Option<ParsedMessage> {
        match payload.get("type").and_then(Value::as_str)? {
            "message" => {
                let role = match payload.get("role").and_then(Value::as_str) {
                    Some("assistant") => Role::Assistant,
                    Some("system") => Role::System,
                    _ => Role::User,
                };
                let text = join_text_parts(payload.get("content"));
                if text.is_empty() {
                    return None;
                }
                Some(ParsedMessage::text(ordinal, role, text, ts))
            }
            "reasoning" => {
                let text = join_text_parts(payload.get("summary"));
                if text.is_empty() {
                    return None;
                }
                Some(ParsedMessage::thinking(ordinal, text, ts))
            }
            "function_call" => {
                let name = payload
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let args = payload
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let side_channel = serde_json::json!({
                    "name": name,
                    "arguments": args,
                    "call_id": payload.get("call_id"),
                });
                Some(ParsedMessage::tool_call(
                    ordinal,
                    name,
                    truncate_chars(&args, 500),
                    Some(side_channel.to_string()),
                    ts,
                ))
            }
            "function_call_output" => {
                let output = payload
                    .get("output")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let side_channel = serde_json::json!({
                    "call_id": payload.get("call_id"),
                    "output": truncate_chars(&output, 1000),
                });
                Some(ParsedMessage::tool_result(
                    ordinal,
                    truncate_chars(&output, TOOL_OUTPUT_TRUNCATE),
                    Some(side_channel.to_string()),
                    ts,
                ))
            }
            "custom_tool_call" => {
                let name = payload
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let input = value_as_text(payload.get("input"));
                let side_channel = serde_json::json!({
                    "name": name,
                    "input": truncate_chars(&input, 1000),
                    "call_id": payload.get("call_id"),
                });
                Some(ParsedMessage::tool_call(
                    ordinal,
                    name,
                    truncate_chars(&input, 500),
                    Some(side_channel.to_string()),
                    ts,
                ))
            }
            "custom_tool_call_output" => {
                let output = value_as_text(payload.get("output"));
                Some(ParsedMessage::tool_result(
                    ordinal,
                    truncate_chars(&output, TOOL_OUTPUT_TRUNCATE),
                    None,
                    ts,
                ))
            }
            _ => None,
        }
    }
}

/// Concatenate the `text` fields of a content/summary part array.
fn join_text_parts(parts: Option<&Value>) -> String {
    let Some(Value::Array(parts)) = parts else {
        return String::new();
    };
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            Value::String(s) => Some(s.as_str()),
            _ => part.get("text").and_then(Value::as_str),
        })
        .filter(|t| !t.is_empty())
        .collect();
    texts.join("\n")
}

fn value_as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// A candidate title must look like a human prompt, not an injected
/// preamble block.
fn usable_as_title(text: &str) -> bool {
    !is_synthetic_preamble(text) && text.chars().count() < TITLE_MAX_SOURCE_CHARS
}

impl TranscriptParser for CodexParser {
    fn source(&self) -> Source {
        Source::Codex
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
                    p.extension().is_some_and(|e| e == "jsonl")
                        && p.file_name()
                            .is_some_and(|n| n.to_string_lossy().starts_with("rollout-"))
                })
                .collect();
            found.sort();
            files.extend(found);
        }
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
        let mut tools_used: Vec<String> = Vec::new();
        let mut total_tokens: i64 = 0;

        let mut messages: Vec<ParsedMessage> = Vec::new();
        let mut ordinal: i64 = 0;
        let mut first_ts: i64 = 0;
        let mut last_ts: i64 = 0;
        let mut title: Option<String> = None;

        for rec in &records {
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

            let rec_type = rec.get("type").and_then(Value::as_str).unwrap_or("");
            let empty = Value::Object(serde_json::Map::new());
            let payload = rec.get("payload").unwrap_or(&empty);

            match rec_type {
                "session_meta" => {
                    session_id = payload
                        .get("id")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .or(session_id);
                    if cwd.is_none() {
                        cwd = payload.get("cwd").and_then(Value::as_str).map(String::from);
                    }
                }
                "turn_context" => {
                    if cwd.is_none() {
                        cwd = payload.get("cwd").and_then(Value::as_str).map(String::from);
                    }
                    if model.is_none() {
                        model = payload.get("model").and_then(Value::as_str).map(String::from);
                    }
                }
                "response_item" => {
                    if let Some(msg) = self.parse_response_item(payload, ordinal, ts) {
                        if title.is_none() && msg.is_user_text() {
                            let text = msg.content_text.trim();
                            if usable_as_title(text) {
                                title = Some(text.chars().take(200).collect());
                            }
                        }
                        if let Some(name) = &msg.tool_name {
                            tools_used.push(name.clone());
                        }
                        ordinal += 1;
                        messages.push(msg);
                    }
                }
                "event_msg" => match payload.get("type").and_then(Value::as_str) {
                    Some("user_message") => {
                        let text = payload
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string();
                        if !text.is_empty() {
                            if title.is_none() {
                                title = Some(text.chars().take(200).collect());
                            }
                            messages.push(ParsedMessage::text(ordinal, Role::User, text, ts));
                            ordinal += 1;
                        }
                    }
                    Some("token_count") => {
                        // Running totals; keep the latest reported value.
                        if let Some(total) = payload
                            .get("info")
                            .and_then(|i| i.get("total_token_usage"))
                            .and_then(|u| u.get("total_tokens"))
                            .and_then(Value::as_i64)
                        {
                            total_tokens = total;
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        let session_id = session_id.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().trim_start_matches("rollout-").to_string())
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
            source: Source::Codex,
            project_path,
            project_name,
            cwd,
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
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write_rollout(dir: &Path, rel: &str, lines: &[String]) -> PathBuf {
        let file = dir.join(rel);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, lines.join("\n")).unwrap();
        file
    }

    fn sample_lines() -> Vec<String> {
        vec![
            r#"{"timestamp":"2026-01-12T08:00:00.000Z","type":"session_meta","payload":{"id":"sess-42","cwd":"/srv/work/app"}}"#.into(),
            r#"{"timestamp":"2026-01-12T08:00:01.000Z","type":"turn_context","payload":{"cwd":"/srv/work/app","model":"gpt-5.1-codex-max"}}"#.into(),
            r#"{"timestamp":"2026-01-12T08:00:02.000Z","type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"<environment_context>injected</environment_context>"}]}}"#.into(),
            r#"{"timestamp":"2026-01-12T08:00:03.000Z","type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"Fix the netplan permissions error on Ubuntu"}]}}"#.into(),
            r#"{"timestamp":"2026-01-12T08:00:04.000Z","type":"response_item","payload":{"type":"reasoning","summary":[{"type":"summary_text","text":"looking at file modes"}]}}"#.into(),
            r#"{"timestamp":"2026-01-12T08:00:05.000Z","type":"response_item","payload":{"type":"function_call","name":"shell_command","arguments":"{\"command\":\"chmod 600 /etc/netplan/config.yaml\"}","call_id":"c1"}}"#.into(),
            r#"{"timestamp":"2026-01-12T08:00:06.000Z","type":"response_item","payload":{"type":"function_call_output","call_id":"c1","output":"ok"}}"#.into(),
            r#"{"timestamp":"2026-01-12T08:00:07.000Z","type":"event_msg","payload":{"type":"token_count","info":{"total_token_usage":{"total_tokens":5400}}}}"#.into(),
        ]
    }

    #[test]
    fn test_parse_rollout_session() {
        let tmp = tempfile::tempdir().unwrap();
        let file = write_rollout(
            tmp.path(),
            "2026/01/12/rollout-2026-01-12T08-00-00-sess-42.jsonl",
            &sample_lines(),
        );

        let session = CodexParser::new().parse(&file).unwrap().unwrap();
        assert_eq!(session.id, "sess-42");
        assert_eq!(session.source, Source::Codex);
        assert_eq!(session.model.as_deref(), Some("gpt-5.1-codex-max"));
        assert_eq!(session.total_tokens, 5400);
        assert_eq!(session.user_message_count(), 2);
        assert_eq!(session.tools_used_sorted(), vec!["shell_command"]);
        // Title skips the injected environment context block
        assert_eq!(
            session.title.as_deref(),
            Some("Fix the netplan permissions error on Ubuntu")
        );

        let kinds: Vec<ContentType> = session.messages.iter().map(|m| m.content_type).collect();
        assert_eq!(
            kinds,
            vec![
                ContentType::Text,
                ContentType::Text,
                ContentType::Thinking,
                ContentType::ToolCall,
                ContentType::ToolResult,
            ]
        );
        let ordinals: Vec<i64> = session.messages.iter().map(|m| m.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_session_id_derived_from_filename() {
        let tmp = tempfile::tempdir().unwrap();
        let file = write_rollout(
            tmp.path(),
            "2026/01/12/rollout-2026-01-12T09-00-00-abc.jsonl",
            &[r#"{"timestamp":"2026-01-12T09:00:00Z","type":"event_msg","payload":{"type":"user_message","message":"hi"}}"#.to_string()],
        );
        let session = CodexParser::new().parse(&file).unwrap().unwrap();
        assert_eq!(session.id, "2026-01-12T09-00-00-abc");
    }

    #[test]
    fn test_discover_files_recursive_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        write_rollout(tmp.path(), "2026/01/11/rollout-a.jsonl", &sample_lines());
        write_rollout(tmp.path(), "2026/01/12/rollout-b.jsonl", &sample_lines());
        write_rollout(tmp.path(), "2026/01/12/other-c.jsonl", &sample_lines());

        let files = CodexParser::new().discover_files(&[tmp.path().to_path_buf()]);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("rollout-")));
    }

    #[test]
    fn test_event_user_message_is_title_candidate() {
        let tmp = tempfile::tempdir().unwrap();
        let file = write_rollout(
            tmp.path(),
            "rollout-x.jsonl",
            &[r#"{"timestamp":"2026-01-12T09:00:00Z","type":"event_msg","payload":{"type":"user_message","message":"try chmod 600"}}"#.to_string()],
        );
        let session = CodexParser::new().parse(&file).unwrap().unwrap();
        assert_eq!(session.title.as_deref(), Some("try chmod 600"));
        assert_eq!(session.user_message_count(), 1);
    }
}
