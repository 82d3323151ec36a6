// crates/core/src/llm/router.rs
//! The `LlmClient` capability and its CLI-backed implementation.
//!
//! Consolidation stages talk to this trait only; whether the words come
//! from `claude`, `codex`, or `gemini` is a routing detail.

use super::backend::Backend;
use super::claude_cli::call_claude;
use super::codex_cli::call_codex;
use super::gemini_cli::call_gemini;
use super::types::LlmError;
use async_trait::async_trait;
use tracing::warn;

/// Synchronous-feeling text completion against whichever backend fits.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a prompt and get the text response.
    ///
    /// `source` picks the native backend (`claude_code` → claude, …);
    /// `backend` overrides routing entirely; `model` overrides the
    /// backend's default model.
    async fn call_llm(
        &self,
        prompt: &str,
        source: Option<&str>,
        model: Option<&str>,
        backend: Option<Backend>,
    ) -> Result<String, LlmError>;
}

/// Routes calls to locally installed CLI backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliRouter;

impl CliRouter {
    pub fn new() -> Self {
        Self
    }

    /// Pick a backend for a session source: the source's native CLI when
    /// installed, otherwise the first available CLI.
    fn resolve_backend(source: Option<&str>) -> Result<Backend, LlmError> {
        if let Some(native) = source.and_then(Backend::for_source) {
            if native.is_available() {
                return Ok(native);
            }
        }
        Backend::ALL
            .into_iter()
            .find(Backend::is_available)
            .ok_or(LlmError::NoBackend)
    }

    async fn dispatch(backend: Backend, prompt: &str, model: &str) -> Result<String, LlmError> {
        match backend {
            Backend::Claude => call_claude(prompt, model).await,
            Backend::Codex => call_codex(prompt, model).await,
            Backend::Gemini => call_gemini(prompt, model).await,
        }
    }
}

#[async_trait]
impl LlmClient for CliRouter {
    async fn call_llm(
        &self,
        prompt: &str,
        source: Option<&str>,
        model: Option<&str>,
        backend: Option<Backend>,
    ) -> Result<String, LlmError> {
        // An explicit backend override is authoritative: no fallback.
        if let Some(chosen) = backend {
            let model = model.unwrap_or_else(|| chosen.default_model());
            return Self::dispatch(chosen, prompt, model).await;
        }

        let primary = Self::resolve_backend(source)?;
        let primary_model = model.unwrap_or_else(|| primary.default_model());
        let first_error = match Self::dispatch(primary, prompt, primary_model).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        // Try each other available backend once before giving up.
        for fallback in Backend::ALL {
            if fallback == primary || !fallback.is_available() {
                continue;
            }
            warn!(
                primary = primary.as_str(),
                fallback = fallback.as_str(),
                error = %first_error,
                "LLM backend failed, trying fallback"
            );
            if let Ok(text) = Self::dispatch(fallback, prompt, fallback.default_model()).await {
                return Ok(text);
            }
        }

        Err(first_error)
    }
}
