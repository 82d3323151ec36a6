// crates/core/src/llm/mod.rs
//! LLM invocation via locally installed CLI tools. No API keys involved;
//! each backend rides its CLI's own authentication.

mod backend;
mod claude_cli;
mod codex_cli;
mod gemini_cli;
mod router;
mod types;

pub use backend::{which, Backend};
pub use claude_cli::{call_claude, call_claude_full};
pub use codex_cli::call_codex;
pub use gemini_cli::call_gemini;
pub use router::{CliRouter, LlmClient};
pub use types::{LlmError, LlmResponse};
