// crates/core/src/llm/codex_cli.rs
//! Codex CLI backend: `codex exec` one-shot completions.

use super::types::LlmError;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// One-shot completion: `codex exec --skip-git-repo-check -m M "prompt"`.
pub async fn call_codex(prompt: &str, model: &str) -> Result<String, LlmError> {
    debug!(model, "codex CLI: spawning");

    let output = Command::new("codex")
        .args(["exec", "--skip-git-repo-check", "-m", model, prompt])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| LlmError::SpawnFailed(e.to_string()))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(LlmError::CliError(format!(
            "exit={:?}: {}",
            output.status.code(),
            &stderr[..stderr.len().min(500)]
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        return Err(LlmError::EmptyResponse(format!(
            "codex returned nothing: {}",
            &stderr[..stderr.len().min(500)]
        )));
    }
    Ok(stdout)
}
