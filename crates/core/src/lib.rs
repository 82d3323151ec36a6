// crates/core/src/lib.rs
//! Core types and source adapters for tactical-memory.
//!
//! This crate holds everything that does not touch the store: the uniform
//! session/message data model, the per-vendor transcript parsers, regex
//! entity extraction, the LLM CLI client, configuration, and path layout.

pub mod config;
pub mod entities;
pub mod error;
pub mod llm;
pub mod parsers;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::ParseError;
pub use types::{ContentType, ParsedMessage, ParsedSession, Role, Source};

/// User-role messages injected by tooling rather than typed by a human.
///
/// A message whose text begins with one of these markers is not counted as
/// real human input when picking titles or judging session quality.
pub const SYNTHETIC_PREAMBLE_MARKERS: &[&str] = &[
    "# AGENTS.md",
    "<environment_context>",
    "# Context from my IDE",
    "<INSTRUCTIONS>",
    "<permissions",
    "Read the file /var/folders",
    "Read the file /tmp",
];

/// True when `text` starts with a known tool-injected preamble marker.
pub fn is_synthetic_preamble(text: &str) -> bool {
    let trimmed = text.trim_start();
    SYNTHETIC_PREAMBLE_MARKERS
        .iter()
        .any(|m| trimmed.starts_with(m))
}
