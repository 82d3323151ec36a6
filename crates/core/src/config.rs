// crates/core/src/config.rs
//! Runtime configuration, loaded from `~/.tactical/config.toml` when present.

use crate::paths;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

/// Configuration for the memory engine. Every field has a working default,
/// so a missing config file means "everything on, standard locations".
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub codex_enabled: bool,
    pub claude_code_enabled: bool,
    pub gemini_enabled: bool,

    pub codex_paths: Vec<PathBuf>,
    pub claude_code_paths: Vec<PathBuf>,
    pub gemini_paths: Vec<PathBuf>,

    pub db_path: PathBuf,

    pub summarize_workers: usize,
    pub promote_workers: usize,
    pub promote_cooldown_seconds: u64,
    pub l1_budget_tokens: usize,
    pub min_user_messages: i64,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            codex_enabled: true,
            claude_code_enabled: true,
            gemini_enabled: true,
            codex_paths: vec![home.join(".codex").join("sessions")],
            claude_code_paths: vec![home.join(".claude").join("projects")],
            gemini_paths: vec![home.join(".gemini").join("tmp")],
            db_path: paths::db_path().unwrap_or_else(|| PathBuf::from("memory.sqlite")),
            summarize_workers: 8,
            promote_workers: 4,
            promote_cooldown_seconds: 3600,
            l1_budget_tokens: 2000,
            min_user_messages: 3,
        }
    }
}

impl Config {
    /// Load the config file if it exists, falling back to defaults on any
    /// read or parse failure.
    pub fn load() -> Self {
        let Some(path) = paths::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable config file, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.codex_enabled);
        assert!(config.claude_code_enabled);
        assert!(config.gemini_enabled);
        assert_eq!(config.summarize_workers, 8);
        assert_eq!(config.promote_workers, 4);
        assert_eq!(config.promote_cooldown_seconds, 3600);
        assert_eq!(config.l1_budget_tokens, 2000);
        assert_eq!(config.min_user_messages, 3);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: Config = toml::from_str(
            r#"
            summarize_workers = 2
            gemini_enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.summarize_workers, 2);
        assert!(!config.gemini_enabled);
        // untouched fields keep their defaults
        assert_eq!(config.promote_workers, 4);
        assert!(config.codex_enabled);
    }
}
