// crates/core/src/parsers/mod.rs
//! Vendor transcript adapters.
//!
//! Each adapter turns one on-disk session format into the uniform
//! [`ParsedSession`] + [`ParsedMessage`] stream. Adapters never touch the
//! store and never call out to the network.

mod claude_code;
mod codex;
mod gemini;

pub use claude_code::ClaudeCodeParser;
pub use codex::CodexParser;
pub use gemini::GeminiParser;

use crate::error::ParseError;
use crate::types::{ParsedSession, Source};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tool-result payloads are truncated to this many characters to keep
/// message rows bounded.
pub const TOOL_OUTPUT_TRUNCATE: usize = 500;

/// Marker appended to truncated payloads.
pub const TRUNCATION_SENTINEL: &str = "…[truncated]";

/// A parser for one vendor's on-disk transcript format.
pub trait TranscriptParser: Send + Sync {
    /// The source tag this adapter produces.
    fn source(&self) -> Source;

    /// Find all session files under the given roots, in a stable order.
    /// Missing roots are skipped silently.
    fn discover_files(&self, roots: &[PathBuf]) -> Vec<PathBuf>;

    /// Parse one session file.
    ///
    /// Returns `Ok(None)` for files that are empty or structurally unusable;
    /// `Err` is reserved for IO-level failures.
    fn parse(&self, path: &Path) -> Result<Option<ParsedSession>, ParseError>;
}

/// Truncate to `max_chars` Unicode scalar values, appending the sentinel
/// when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str(TRUNCATION_SENTINEL);
    out
}

/// Convert an ISO-8601 timestamp string to unix epoch seconds.
///
/// Accepts both `2026-02-13T01:31:56.201Z` and `2026-02-13T01:31:56`,
/// treating any trailing zone designator or offset as UTC. Returns 0 when
/// the string cannot be parsed.
pub fn iso_to_epoch(ts: &str) -> i64 {
    let trimmed = ts.trim_end_matches('Z');
    let trimmed = trimmed.split('+').next().unwrap_or(trimmed);
    chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// File mtime as epoch seconds, 0 when unavailable.
pub fn file_mtime_epoch(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Infer `(project_path, project_name)` from a working directory.
///
/// Prefers the first directory under a conventional code root
/// (`Code`, `Projects`, `src`, `repos`, `workspace`); otherwise the cwd
/// itself is the project.
pub fn infer_project_from_cwd(cwd: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(cwd) = cwd else {
        return (None, None);
    };
    let path = Path::new(cwd);
    let leaf = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| cwd.to_string());

    let home = dirs::home_dir();
    let under_home = home
        .as_deref()
        .map(|h| path.starts_with(h) && path != h)
        .unwrap_or(false);
    if !under_home {
        return (Some(cwd.to_string()), Some(leaf));
    }

    const CODE_ROOTS: &[&str] = &["Code", "Projects", "src", "repos", "workspace"];
    let parts: Vec<&std::ffi::OsStr> = path.iter().collect();
    for (i, part) in parts.iter().enumerate() {
        if CODE_ROOTS.contains(&part.to_string_lossy().as_ref()) && i + 1 < parts.len() {
            let project: PathBuf = parts[..=i + 1].iter().collect();
            let name = parts[i + 1].to_string_lossy().to_string();
            return (Some(project.to_string_lossy().to_string()), Some(name));
        }
    }

    (Some(cwd.to_string()), Some(leaf))
}

/// Read a JSONL file into a list of JSON values.
///
/// Invalid UTF-8 is replaced rather than failing the file; malformed lines
/// are skipped with a debug log.
pub fn read_jsonl_values(path: &Path) -> Result<Vec<serde_json::Value>, ParseError> {
    let bytes = std::fs::read(path).map_err(|e| ParseError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut values = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(value) => values.push(value),
            Err(e) => {
                debug!(
                    path = %path.display(),
                    line = line_number + 1,
                    error = %e,
                    "skipping malformed JSONL line"
                );
            }
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_iso_to_epoch() {
        let ts = iso_to_epoch("2025-11-20T23:43:13.218Z");
        assert!(ts > 0);
        // Right ballpark: Nov 2025
        assert!((1730000000..1770000000).contains(&ts));

        // Without fractional seconds
        assert_eq!(
            iso_to_epoch("2025-11-20T23:43:13Z"),
            iso_to_epoch("2025-11-20T23:43:13.000Z")
        );
        // With explicit offset fragment (treated as UTC)
        assert!(iso_to_epoch("2025-11-20T23:43:13+00:00") > 0);
        assert_eq!(iso_to_epoch("not a timestamp"), 0);
        assert_eq!(iso_to_epoch(""), 0);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 100), "short");
        let long = "x".repeat(1000);
        let cut = truncate_chars(&long, 100);
        assert!(cut.starts_with("xxx"));
        assert!(cut.ends_with(TRUNCATION_SENTINEL));
        assert_eq!(cut.chars().count(), 100 + TRUNCATION_SENTINEL.chars().count());
        // Counts characters, not bytes
        let emoji = "é".repeat(10);
        assert_eq!(truncate_chars(&emoji, 10), emoji);
    }

    #[test]
    fn test_infer_project_from_cwd() {
        let home = dirs::home_dir().unwrap();
        let cwd = home.join("Code").join("apas").join("src");
        let (path, name) = infer_project_from_cwd(Some(&cwd.to_string_lossy()));
        assert_eq!(name.as_deref(), Some("apas"));
        assert!(path.unwrap().ends_with("Code/apas"));

        // Outside home: the cwd itself is the project
        let (path, name) = infer_project_from_cwd(Some("/srv/deploy"));
        assert_eq!(path.as_deref(), Some("/srv/deploy"));
        assert_eq!(name.as_deref(), Some("deploy"));

        assert_eq!(infer_project_from_cwd(None), (None, None));
    }

    #[test]
    fn test_read_jsonl_skips_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type":"user"}}"#).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"type":"assistant"}}"#).unwrap();

        let values = read_jsonl_values(file.path()).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["type"], "user");
        assert_eq!(values[1]["type"], "assistant");
    }
}
