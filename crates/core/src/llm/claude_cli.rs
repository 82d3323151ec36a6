// crates/core/src/llm/claude_cli.rs
//! Claude CLI backend: spawns `claude` and parses its JSON output.

use super::backend::Backend;
use super::types::{LlmError, LlmResponse};
use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Env vars that make a spawned `claude` believe it is nested inside a
/// running session. All CLAUDE-prefixed vars are stripped before spawning.
fn stripped_env_vars() -> Vec<String> {
    let known = ["CLAUDECODE", "CLAUDE_CODE_SSE_PORT", "CLAUDE_CODE_ENTRYPOINT"];
    let extra = std::env::vars()
        .map(|(k, _)| k)
        .filter(|k| k.starts_with("CLAUDE") && !known.contains(&k.as_str()));
    known.iter().map(|s| s.to_string()).chain(extra).collect()
}

/// One-shot text completion: `claude -p --output-format json --model M "prompt"`.
pub async fn call_claude(prompt: &str, model: &str) -> Result<String, LlmError> {
    let stripped = stripped_env_vars();
    debug!(model, stripped_vars = ?stripped, "claude CLI: spawning");

    let mut cmd = Command::new("claude");
    cmd.args(["-p", "--output-format", "json", "--model", model, prompt])
        .stdin(Stdio::null());
    for var in &stripped {
        cmd.env_remove(var);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| LlmError::SpawnFailed(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(LlmError::CliError(format!(
            "exit={:?}: {}",
            output.status.code(),
            &stderr[..stderr.len().min(500)]
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: Value =
        serde_json::from_str(&stdout).map_err(|e| LlmError::ParseFailed(e.to_string()))?;

    let text = parsed["result"]
        .as_str()
        .or_else(|| parsed["content"].as_str())
        .unwrap_or("")
        .to_string();
    if text.is_empty() {
        return Err(LlmError::EmptyResponse("claude returned no result text".into()));
    }
    Ok(text)
}

/// Structured completion over `--output-format stream-json`, capturing
/// thinking blocks, tool activity, and usage, and writing one trace file
/// per call under `{CWD}/tests/traces/`.
pub async fn call_claude_full(prompt: &str, model: &str) -> Result<LlmResponse, LlmError> {
    let stripped = stripped_env_vars();
    debug!(model, "claude CLI: spawning stream-json call");

    let mut cmd = Command::new("claude");
    cmd.args([
        "-p",
        "--output-format",
        "stream-json",
        "--verbose",
        "--model",
        model,
        prompt,
    ])
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
    for var in &stripped {
        cmd.env_remove(var);
    }

    let mut child = cmd.spawn().map_err(|e| LlmError::SpawnFailed(e.to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| LlmError::SpawnFailed("failed to capture stdout".into()))?;

    let mut result_text: Option<String> = None;
    let mut assistant_texts: Vec<String> = Vec::new();
    let mut thinking: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();
    let mut tool_results: Vec<Value> = Vec::new();
    let mut usage: Option<Value> = None;
    let mut session_id: Option<String> = None;
    let mut turns: Vec<Value> = Vec::new();

    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let ts = Utc::now().timestamp();

        match event.get("type").and_then(Value::as_str) {
            Some("system") => {
                if session_id.is_none() {
                    session_id = event
                        .get("session_id")
                        .and_then(Value::as_str)
                        .map(String::from);
                }
            }
            Some("assistant") => {
                let blocks = event
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for block in blocks {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            if let Some(text) = block.get("text").and_then(Value::as_str) {
                                assistant_texts.push(text.to_string());
                                turns.push(serde_json::json!({
                                    "role": "assistant", "type": "text", "text": text, "ts": ts,
                                }));
                            }
                        }
                        Some("thinking") => {
                            if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                                thinking.push(text.to_string());
                                turns.push(serde_json::json!({
                                    "role": "assistant", "type": "thinking", "text": text, "ts": ts,
                                }));
                            }
                        }
                        Some("tool_use") => {
                            turns.push(serde_json::json!({
                                "role": "assistant", "type": "tool_use",
                                "input": block.get("input"), "ts": ts,
                            }));
                            tool_calls.push(block);
                        }
                        _ => {}
                    }
                }
            }
            Some("user") => {
                let blocks = event
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for block in blocks {
                    if block.get("type").and_then(Value::as_str) == Some("tool_result") {
                        turns.push(serde_json::json!({
                            "role": "tool", "type": "tool_result",
                            "content": block.get("content"), "ts": ts,
                        }));
                        tool_results.push(block);
                    }
                }
            }
            Some("result") => {
                result_text = event
                    .get("result")
                    .and_then(Value::as_str)
                    .map(String::from);
                usage = event.get("usage").cloned();
                if session_id.is_none() {
                    session_id = event
                        .get("session_id")
                        .and_then(Value::as_str)
                        .map(String::from);
                }
            }
            _ => {}
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| LlmError::SpawnFailed(e.to_string()))?;

    let text = match result_text {
        Some(t) if !t.is_empty() => t,
        _ if !assistant_texts.is_empty() => assistant_texts.join("\n"),
        _ => {
            return Err(LlmError::EmptyResponse(format!(
                "claude stream produced no text (exit={:?})",
                status.code()
            )))
        }
    };

    let mut response = LlmResponse {
        text,
        thinking,
        tool_calls,
        tool_results,
        usage,
        session_id,
        backend: Backend::Claude,
        trace_path: None,
    };
    response.trace_path = write_trace(&response, model, &turns);
    Ok(response)
}

/// Persist a per-call trace under `{CWD}/tests/traces/`. Best-effort.
fn write_trace(response: &LlmResponse, model: &str, turns: &[Value]) -> Option<PathBuf> {
    let dir = std::env::current_dir().ok()?.join("tests").join("traces");
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(error = %e, "cannot create trace directory");
        return None;
    }
    let id = response
        .session_id
        .clone()
        .unwrap_or_else(|| format!("call-{}", Utc::now().timestamp_millis()));
    let path = dir.join(format!("{id}.json"));

    let trace = serde_json::json!({
        "session_id": response.session_id,
        "backend": response.backend.as_str(),
        "model": model,
        "cwd": std::env::current_dir().ok(),
        "usage": response.usage,
        "turns": turns,
    });
    match std::fs::write(&path, trace.to_string()) {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot write trace file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripped_env_vars_cover_known_session_markers() {
        let vars = stripped_env_vars();
        assert!(vars.contains(&"CLAUDECODE".to_string()));
        assert!(vars.contains(&"CLAUDE_CODE_SSE_PORT".to_string()));
        assert!(vars.contains(&"CLAUDE_CODE_ENTRYPOINT".to_string()));
    }
}
