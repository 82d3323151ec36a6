// crates/core/src/llm/backend.rs
//! Backend selection tables: source → backend, backend → default model,
//! plus the PATH presence probe.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A locally installed LLM CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    Claude,
    Codex,
    Gemini,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Claude, Backend::Codex, Backend::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Claude => "claude",
            Backend::Codex => "codex",
            Backend::Gemini => "gemini",
        }
    }

    /// The executable name on PATH. Happens to equal the backend name.
    pub fn command(&self) -> &'static str {
        self.as_str()
    }

    /// Fast, cheap default model per backend.
    pub fn default_model(&self) -> &'static str {
        match self {
            Backend::Claude => "haiku",
            Backend::Codex => "o3",
            Backend::Gemini => "gemini-2.5-flash",
        }
    }

    /// Map a session source tag to its native backend.
    pub fn for_source(source: &str) -> Option<Backend> {
        match source {
            "claude_code" => Some(Backend::Claude),
            "codex" => Some(Backend::Codex),
            "gemini" => Some(Backend::Gemini),
            _ => None,
        }
    }

    /// True when the backend's CLI is on PATH.
    pub fn is_available(&self) -> bool {
        which(self.command()).is_some()
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(Backend::Claude),
            "codex" => Ok(Backend::Codex),
            "gemini" => Ok(Backend::Gemini),
            other => Err(format!("unknown backend: {other} (expected claude, codex, or gemini)")),
        }
    }
}

/// Locate an executable on PATH.
pub fn which(command: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(command);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
