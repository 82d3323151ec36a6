// crates/db/src/indexer.rs
//! Ingestor: discover → parse → delta-detect → store pipeline.
//!
//! Fast by contract: no LLM calls, no network. A single failed file is
//! logged and skipped and never aborts the batch.

use crate::{Database, DbResult};
use std::path::PathBuf;
use tactical_memory_core::parsers::{
    ClaudeCodeParser, CodexParser, GeminiParser, TranscriptParser,
};
use tactical_memory_core::{Config, ParsedSession};
use tracing::{debug, info, warn};

/// What one ingest pass did.
#[derive(Debug, Default, Clone)]
pub struct IngestReport {
    /// Sessions written (new + updated).
    pub sessions: usize,
    /// Messages belonging to written sessions.
    pub messages: usize,
    pub new_session_ids: Vec<String>,
    pub updated_session_ids: Vec<String>,
}

/// Delta status of one parsed file against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    New,
    Updated,
    Unchanged,
}

/// Build the enabled adapters with their configured roots.
pub fn enabled_parsers(config: &Config) -> Vec<(Box<dyn TranscriptParser>, Vec<PathBuf>)> {
    let mut parsers: Vec<(Box<dyn TranscriptParser>, Vec<PathBuf>)> = Vec::new();
    if config.codex_enabled {
        parsers.push((Box::new(CodexParser::new()), config.codex_paths.clone()));
    }
    if config.claude_code_enabled {
        parsers.push((
            Box::new(ClaudeCodeParser::new()),
            config.claude_code_paths.clone(),
        ));
    }
    if config.gemini_enabled {
        parsers.push((Box::new(GeminiParser::new()), config.gemini_paths.clone()));
    }
    parsers
}

/// Ingest new and changed sessions from every enabled source.
pub async fn auto_ingest(db: &Database, config: &Config) -> DbResult<IngestReport> {
    let mut report = IngestReport::default();

    for (parser, roots) in enabled_parsers(config) {
        let files = parser.discover_files(&roots);
        debug!(
            source = parser.source().as_str(),
            files = files.len(),
            "discovered session files"
        );

        for file in files {
            let parsed = match parser.parse(&file) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => continue,
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "skipping unreadable session file");
                    continue;
                }
            };

            // Sessions with no real user input are never stored, and never
            // counted as new or updated.
            if parsed.user_message_count() == 0 {
                continue;
            }

            match session_status(db, &parsed).await? {
                SessionStatus::Unchanged => continue,
                SessionStatus::New => report.new_session_ids.push(parsed.id.clone()),
                SessionStatus::Updated => report.updated_session_ids.push(parsed.id.clone()),
            }

            db.upsert_session(&parsed).await?;
            db.insert_messages(&parsed.id, &parsed.messages).await?;
            db.extract_entities_for_session(&parsed.id).await?;

            report.sessions += 1;
            report.messages += parsed.messages.len();
        }
    }

    if report.sessions > 0 {
        info!(
            sessions = report.sessions,
            messages = report.messages,
            new = report.new_session_ids.len(),
            updated = report.updated_session_ids.len(),
            "ingest complete"
        );
    }
    Ok(report)
}

/// Compare the parse against the stored row on the three delta fields.
async fn session_status(db: &Database, parsed: &ParsedSession) -> DbResult<SessionStatus> {
    let Some(stored) = db.get_session(&parsed.id).await? else {
        return Ok(SessionStatus::New);
    };
    let changed = stored.message_count != parsed.message_count()
        || stored.user_message_count != parsed.user_message_count()
        || stored.last_message_at != parsed.last_message_at;
    Ok(if changed {
        SessionStatus::Updated
    } else {
        SessionStatus::Unchanged
    })
}
