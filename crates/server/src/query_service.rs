// crates/server/src/query_service.rs
//! The four public query operations, rendered as markdown for whatever
//! tool host fronts them.
//!
//! Every operation starts with the lightweight on-query refresh. Misses
//! come back as friendly strings, never errors; malformed date filters
//! are silently ignored.

use crate::orchestrator::Orchestrator;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tactical_memory_consolidate::select_l1_context;
use tactical_memory_search::{hybrid_search, timeline};
use tracing::warn;

/// How many recent session summaries `project_context` includes.
const CONTEXT_RECENT_SESSIONS: i64 = 5;

/// How many messages `recall_session` renders before eliding.
const RECALL_MESSAGE_LIMIT: usize = 100;

pub struct QueryService {
    orchestrator: Orchestrator,
}

impl QueryService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Ranked hybrid search across all sessions.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        project: Option<&str>,
        after: Option<&str>,
    ) -> String {
        self.orchestrator.on_query_refresh().await;
        let after_epoch = after.and_then(parse_iso_timestamp);

        let results = match hybrid_search(self.orchestrator.db(), query, limit, project, after_epoch)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "search failed");
                return "No matching sessions found.".to_string();
            }
        };
        if results.is_empty() {
            return "No matching sessions found.".to_string();
        }

        let blocks: Vec<String> = results
            .iter()
            .map(|r| {
                let mut block = format!(
                    "**{}** (score: {:.2})\n  Session: {} | Source: {} | Project: {}\n  Date: {}",
                    r.title.as_deref().unwrap_or("Untitled"),
                    r.score,
                    r.session_id,
                    r.source,
                    r.project_name.as_deref().unwrap_or("N/A"),
                    format_ts(r.first_message_at),
                );
                if let Some(summary) = &r.summary {
                    block.push_str(&format!("\n  Summary: {}...", clip(summary, 200)));
                }
                if let Some(snippet) = &r.snippet {
                    block.push_str(&format!("\n  Match: {}", clip(snippet, 150)));
                }
                block
            })
            .collect();
        blocks.join("\n\n")
    }

    /// Chronological session listing with summaries.
    pub async fn timeline(
        &self,
        project: Option<&str>,
        after: Option<&str>,
        before: Option<&str>,
        limit: usize,
    ) -> String {
        self.orchestrator.on_query_refresh().await;
        let after_epoch = after.and_then(parse_iso_timestamp);
        let before_epoch = before.and_then(parse_iso_timestamp);

        let entries = match timeline(
            self.orchestrator.db(),
            project,
            after_epoch,
            before_epoch,
            limit,
        )
        .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "timeline failed");
                Vec::new()
            }
        };
        if entries.is_empty() {
            return "No sessions found for the given criteria.".to_string();
        }

        let blocks: Vec<String> = entries
            .iter()
            .map(|entry| {
                let mut block = format!(
                    "[{}] **{}**\n  {} | {} | {} user msgs | tier: {}",
                    format_ts(entry.first_message_at),
                    entry.title.as_deref().unwrap_or("Untitled"),
                    entry.source,
                    entry.project_name.as_deref().unwrap_or("N/A"),
                    entry.user_message_count,
                    entry.tier,
                );
                if let Some(summary) = &entry.summary {
                    block.push_str(&format!("\n  {}...", clip(summary, 150)));
                }
                block
            })
            .collect();
        blocks.join("\n\n")
    }

    /// Accumulated knowledge for a project: the L1 block plus the most
    /// recent session summaries.
    pub async fn project_context(&self, project_path: &str) -> String {
        self.orchestrator.on_query_refresh().await;
        let db = self.orchestrator.db();
        let budget = self.orchestrator.config().l1_budget_tokens;

        let l1_block = match select_l1_context(db, project_path, budget).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "L1 context selection failed");
                String::new()
            }
        };

        let mut recent = Vec::new();
        if let Ok(sessions) = db
            .list_sessions(None, Some(project_path), None, None, CONTEXT_RECENT_SESSIONS)
            .await
        {
            for session in sessions {
                if let Ok(Some(summary)) = db.get_summary(&session.id).await {
                    recent.push(format!(
                        "### {} ({})\n{}",
                        session.title.as_deref().unwrap_or("Untitled"),
                        format_date(session.first_message_at),
                        clip(&summary.summary_text, 300),
                    ));
                }
            }
        }

        let mut parts = Vec::new();
        if !l1_block.is_empty() {
            parts.push(l1_block);
        }
        if !recent.is_empty() {
            parts.push(format!("## Recent Sessions\n\n{}", recent.join("\n\n")));
        }
        if parts.is_empty() {
            return format!("No accumulated knowledge for project: {project_path}");
        }
        parts.join("\n\n")
    }

    /// Everything about one session: metadata, summary, decisions, and the
    /// first hundred messages.
    pub async fn recall_session(&self, session_id: &str) -> String {
        self.orchestrator.on_query_refresh().await;
        let db = self.orchestrator.db();

        let session = match db.get_session(session_id).await {
            Ok(Some(session)) => session,
            _ => return format!("Session not found: {session_id}"),
        };
        let messages = db.get_session_messages(session_id).await.unwrap_or_default();
        let summary = db.get_summary(session_id).await.ok().flatten();

        let mut output = vec![
            format!("# Session: {}", session.title.as_deref().unwrap_or("Untitled")),
            format!("**Date**: {}", format_ts(session.first_message_at)),
            format!(
                "**Source**: {} | **Model**: {}",
                session.source,
                session.model.as_deref().unwrap_or("N/A"),
            ),
            format!(
                "**Project**: {} ({})",
                session.project_name.as_deref().unwrap_or("N/A"),
                session.cwd.as_deref().unwrap_or("N/A"),
            ),
            format!(
                "**Messages**: {} ({} user)",
                session.message_count, session.user_message_count,
            ),
            format!("**Tier**: {}", session.tier),
        ];

        if let Some(summary) = &summary {
            output.push(format!("\n## Summary\n{}", summary.summary_text));
            let decisions = summary.decisions();
            if !decisions.is_empty() {
                output.push("\n**Key Decisions**:".to_string());
                for decision in decisions {
                    output.push(format!("- {decision}"));
                }
            }
        }

        output.push("\n## Messages\n".to_string());
        for msg in messages.iter().take(RECALL_MESSAGE_LIMIT) {
            let text = msg.content_text.as_deref().unwrap_or("");
            if text.is_empty() {
                continue;
            }
            match msg.content_type.as_deref() {
                Some("thinking") => continue,
                Some("tool_call") => {
                    let tool = msg.tool_name.as_deref().unwrap_or("?");
                    output.push(format!("**[{} -> {}]**: {}", msg.role, tool, clip(text, 300)));
                }
                Some("tool_result") => {
                    output.push(format!("**[tool result]**: {}", clip(text, 200)));
                }
                _ => output.push(format!("**[{}]**: {}", msg.role, clip(text, 500))),
            }
        }
        if messages.len() > RECALL_MESSAGE_LIMIT {
            output.push(format!(
                "\n... and {} more messages",
                messages.len() - RECALL_MESSAGE_LIMIT
            ));
        }

        output.join("\n\n")
    }
}

/// Parse a user-supplied ISO date or datetime into epoch seconds.
/// Returns `None` (never an error) for anything unparseable.
pub fn parse_iso_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc().timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp());
    }
    None
}

fn format_ts(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

fn format_date(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iso_timestamp() {
        let date = parse_iso_timestamp("2026-02-01").unwrap();
        assert_eq!(date % 86_400, 0);

        assert!(parse_iso_timestamp("2026-02-01T12:30:00").is_some());
        assert!(parse_iso_timestamp("2026-02-01T12:30:00.500Z").is_some());
        assert!(parse_iso_timestamp("2026-02-01T12:30:00+00:00").is_some());

        // Malformed filters are silently ignored upstream
        assert!(parse_iso_timestamp("last tuesday").is_none());
        assert!(parse_iso_timestamp("").is_none());
    }

    #[test]
    fn test_format_ts() {
        assert_eq!(format_ts(0), "1970-01-01 00:00");
        assert_eq!(format_date(86_400), "1970-01-02");
    }
}
