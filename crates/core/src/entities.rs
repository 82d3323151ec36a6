// crates/core/src/entities.rs
//! Regex entity extraction over message text.
//!
//! A pure pass: text in, canonicalized `(kind, value, context)` hits out.
//! Persistence lives in the db crate.

use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Kinds of terms worth remembering across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    FilePath,
    Function,
    ErrorType,
    Package,
    Command,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::FilePath => "file_path",
            EntityKind::Function => "function",
            EntityKind::ErrorType => "error_type",
            EntityKind::Package => "package",
            EntityKind::Command => "command",
        }
    }
}

/// One extracted term with a snippet of surrounding text.
#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub kind: EntityKind,
    pub value: String,
    pub context: String,
}

fn patterns() -> &'static [(EntityKind, Regex)] {
    static PATTERNS: OnceLock<Vec<(EntityKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                EntityKind::FilePath,
                // Absolute paths with an extension
                Regex::new(r#"(?m)(?:^|[\s"'`(])(/[\w./\-]+\.\w{1,10})"#).unwrap(),
            ),
            (
                EntityKind::Function,
                Regex::new(r"(?m)(?:fn |def |function |class |async def )\s*(\w+)").unwrap(),
            ),
            (
                EntityKind::ErrorType,
                Regex::new(
                    r"(?m)((?:Error|Exception|Panic|FAIL|TypeError|ValueError|KeyError|RuntimeError|ImportError|ModuleNotFoundError|FileNotFoundError|PermissionError|SyntaxError|AttributeError|NameError|IndexError|OSError)[\w:]*)",
                )
                .unwrap(),
            ),
            (
                EntityKind::Package,
                Regex::new(r#"(?m)(?:import |from |require\(['"]|use )(\w[\w./\-]*)"#).unwrap(),
            ),
            (
                EntityKind::Command,
                Regex::new(r"(?m)(?:^\$ |^> )\s*(\w[\w\-]+ [^\n]{0,80})").unwrap(),
            ),
        ]
    })
}

/// Values too generic to be worth indexing.
fn is_ignored(kind: EntityKind, value: &str) -> bool {
    let denied: &[&str] = match kind {
        EntityKind::FilePath => &["/dev/null", "/tmp", "/usr", "/bin", "/etc"],
        EntityKind::Function => &["self", "cls", "main", "test", "init", "new", "get", "set"],
        EntityKind::Package => &["os", "sys", "re", "json", "time", "typing", "io"],
        _ => &[],
    };
    denied.contains(&value)
}

/// Snap a byte index to the nearest char boundary at or below it.
fn floor_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Snap a byte index to the nearest char boundary at or above it.
fn ceil_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Extract entities from a text string.
///
/// Each `(kind, value)` pair is reported at most once per call, with a
/// ±50-byte context snippet around its first occurrence.
pub fn extract_entities(text: &str) -> Vec<ExtractedEntity> {
    let mut results = Vec::new();
    let mut seen: HashSet<(EntityKind, String)> = HashSet::new();

    for (kind, pattern) in patterns() {
        for captures in pattern.captures_iter(text) {
            let Some(group) = captures.get(1) else {
                continue;
            };
            let value = group.as_str().trim();
            if value.len() < 2 || is_ignored(*kind, value) {
                continue;
            }
            if !seen.insert((*kind, value.to_string())) {
                continue;
            }

            let start = floor_boundary(text, group.start().saturating_sub(50));
            let end = ceil_boundary(text, group.end() + 50);
            let context = text[start..end].replace('\n', " ").trim().to_string();

            results.push(ExtractedEntity {
                kind: *kind,
                value: value.to_string(),
                context,
            });
        }
    }

    results
}
