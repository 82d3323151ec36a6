// crates/core/src/llm/types.rs
//! Response/error types for LLM CLI integration.

use super::backend::Backend;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when invoking an LLM CLI backend.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Failed to spawn LLM process: {0}")]
    SpawnFailed(String),

    #[error("CLI returned error: {0}")]
    CliError(String),

    #[error("CLI returned no output: {0}")]
    EmptyResponse(String),

    #[error("Failed to parse CLI response: {0}")]
    ParseFailed(String),

    #[error("No LLM CLI backend found. Install one of: claude, codex, gemini")]
    NoBackend,
}

/// Full structured response from the stream-json claude path.
#[derive(Debug, Clone, Serialize)]
pub struct LlmResponse {
    pub text: String,
    pub thinking: Vec<String>,
    pub tool_calls: Vec<serde_json::Value>,
    pub tool_results: Vec<serde_json::Value>,
    pub usage: Option<serde_json::Value>,
    pub session_id: Option<String>,
    pub backend: Backend,
    pub trace_path: Option<PathBuf>,
}
