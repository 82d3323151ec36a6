// crates/core/src/paths.rs
//! Centralized path functions for all persisted state.
//!
//! Single source of truth: everything tactical-memory writes lives under
//! `~/.tactical/`.

use std::path::PathBuf;

/// Daily pipeline sentinel filename. Contents are a UTF-8 `YYYY-MM-DD`
/// local date.
pub const DAILY_SENTINEL_FILE: &str = ".last_daily_auto";

/// Promote cooldown sentinel filename. Contents are a UTF-8 float epoch
/// string.
pub const PROMOTE_SENTINEL_FILE: &str = ".last_promote_run";

/// State root: `~/.tactical/`.
pub fn state_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join(".tactical"))
}

/// SQLite store: `~/.tactical/memory.sqlite`.
pub fn db_path() -> Option<PathBuf> {
    state_dir().map(|d| d.join("memory.sqlite"))
}

/// Optional config file: `~/.tactical/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    state_dir().map(|d| d.join("config.toml"))
}

/// Daily pipeline sentinel: `~/.tactical/.last_daily_auto`.
pub fn daily_sentinel_path() -> Option<PathBuf> {
    state_dir().map(|d| d.join(DAILY_SENTINEL_FILE))
}

/// Promote cooldown sentinel: `~/.tactical/.last_promote_run`.
pub fn promote_sentinel_path() -> Option<PathBuf> {
    state_dir().map(|d| d.join(PROMOTE_SENTINEL_FILE))
}
