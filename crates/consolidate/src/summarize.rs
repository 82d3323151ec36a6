// crates/consolidate/src/summarize.rs
//! Per-session summarization (L3 → L2).

use crate::ConsolidateResult;
use serde_json::Value;
use tactical_memory_core::llm::{Backend, LlmClient};
use tactical_memory_db::{Database, MessageRow, NewSummary};
use tracing::{debug, warn};

/// Conversations shorter than this (rendered) are not worth a summary.
const MIN_CONVERSATION_CHARS: usize = 100;

/// Cap on rendered messages; the rest collapse into an "N more" marker.
const MAX_RENDERED_MESSAGES: usize = 200;

const SUMMARIZE_PROMPT: &str = r#"You are analyzing a CLI coding session transcript. Generate a structured summary.

The session used {model} via {source} in project "{project}" (cwd: {cwd}).

Here are the messages (user/assistant conversation):

{conversation}

---

Respond with a JSON object (no markdown, just raw JSON):
{
  "summary_text": "A 200-500 word summary of what happened in this session. Include the problem being solved, approaches tried, and final outcome.",
  "key_decisions": ["decision 1", "decision 2", ...],
  "files_touched": ["/path/to/file1.py", ...],
  "commands_run": ["notable command 1", ...],
  "outcome": "completed | partial | error"
}"#;

/// Render a conversation for the prompt: ordinal order, thinking skipped,
/// per-type truncation caps, bounded message count.
pub fn format_conversation(messages: &[MessageRow]) -> String {
    let mut lines = Vec::new();
    let mut rendered = 0usize;

    for msg in messages {
        if rendered >= MAX_RENDERED_MESSAGES {
            lines.push(format!("... ({} more messages)", messages.len() - rendered));
            break;
        }
        let text = msg.content_text.as_deref().unwrap_or("");
        if text.trim().is_empty() {
            continue;
        }
        let content_type = msg.content_type.as_deref().unwrap_or("text");
        match content_type {
            "thinking" => continue,
            "tool_call" => {
                let tool = msg.tool_name.as_deref().unwrap_or("unknown");
                lines.push(format!("[{} → {}]: {}", msg.role, tool, clip(text, 300)));
            }
            "tool_result" => {
                lines.push(format!("[tool result]: {}", clip(text, 200)));
            }
            _ => {
                lines.push(format!("[{}]: {}", msg.role, clip(text, 500)));
            }
        }
        rendered += 1;
    }

    lines.join("\n")
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Parse a JSON object from LLM output, tolerating markdown wrapping.
///
/// Tries, in order: the whole text, a fenced code block, and the first
/// balanced `{…}` substring.
pub fn parse_json_object(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.is_object() {
            return Some(value);
        }
    }

    if let Some(inner) = fenced_block(text) {
        if let Ok(value) = serde_json::from_str::<Value>(inner) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    balanced_object(text).and_then(|candidate| {
        serde_json::from_str::<Value>(candidate)
            .ok()
            .filter(Value::is_object)
    })
}

/// The body of the first ``` or ```json fence.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// The first brace-balanced `{…}` substring.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Summarize one session and store the result, atomically promoting the
/// session to L2.
///
/// Returns `Ok(None)` when there is nothing to summarize (missing or tiny
/// session) or the LLM reply was unusable. Both count as "skipped", not errors.
pub async fn summarize_session(
    db: &Database,
    llm: &dyn LlmClient,
    session_id: &str,
    model: Option<&str>,
    backend: Option<Backend>,
) -> ConsolidateResult<Option<NewSummary>> {
    let Some(session) = db.get_session(session_id).await? else {
        return Ok(None);
    };
    let messages = db.get_session_messages(session_id).await?;
    if messages.is_empty() {
        return Ok(None);
    }

    let conversation = format_conversation(&messages);
    if conversation.chars().count() < MIN_CONVERSATION_CHARS {
        debug!(session_id, "conversation too short to summarize");
        return Ok(None);
    }

    let prompt = SUMMARIZE_PROMPT
        .replace("{model}", session.model.as_deref().unwrap_or("unknown"))
        .replace("{source}", &session.source)
        .replace("{project}", session.project_name.as_deref().unwrap_or("unknown"))
        .replace("{cwd}", session.cwd.as_deref().unwrap_or("unknown"))
        .replace("{conversation}", &conversation);

    let reply = llm
        .call_llm(&prompt, Some(&session.source), model, backend)
        .await?;

    let Some(data) = parse_json_object(&reply) else {
        warn!(session_id, "LLM returned no parseable summary JSON");
        return Ok(None);
    };

    let summary = NewSummary {
        session_id: session_id.to_string(),
        summary_text: data
            .get("summary_text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        key_decisions: string_list(&data, "key_decisions"),
        files_touched: string_list(&data, "files_touched"),
        commands_run: string_list(&data, "commands_run"),
        outcome: data
            .get("outcome")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        generator_model: model.unwrap_or("default").to_string(),
    };

    db.upsert_summary(&summary).await?;
    Ok(Some(summary))
}
