// crates/core/src/llm/gemini_cli.rs
//! Gemini CLI backend.

use super::types::LlmError;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// One-shot completion: `gemini --prompt P --model M --output-format text`.
pub async fn call_gemini(prompt: &str, model: &str) -> Result<String, LlmError> {
    debug!(model, "gemini CLI: spawning");

    let output = Command::new("gemini")
        .args(["--prompt", prompt, "--model", model, "--output-format", "text"])
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
            "gemini returned nothing: {}",
            &stderr[..stderr.len().min(500)]
        )));
    }
    Ok(stdout)
}
