// crates/search/src/lib.rs
//! Hybrid session ranking: FTS BM25 blended with recency decay and
//! session importance.
//!
//! No vector index here; retrieval is lexical plus behavioral signals,
//! which is enough for "where did I solve this before" queries.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use tactical_memory_db::{Database, DbResult, SessionRow};

/// Recency half-life in days: a month-old session scores 0.5.
const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

/// How many message-level FTS hits feed the session ranking.
const FTS_CANDIDATE_LIMIT: i64 = 50;

/// A ranked session hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub session_id: String,
    pub score: f64,
    pub source: String,
    pub project_name: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub first_message_at: i64,
    pub snippet: Option<String>,
}

/// One entry of the chronological timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub session_id: String,
    pub source: String,
    pub project_name: Option<String>,
    pub title: Option<String>,
    pub model: Option<String>,
    pub first_message_at: i64,
    pub last_message_at: i64,
    pub message_count: i64,
    pub user_message_count: i64,
    pub tier: String,
    pub summary: Option<String>,
}

/// Exponential decay by age with a 30-day half-life. Ages in the future
/// clamp to "now".
pub fn recency_score(first_message_at: i64) -> f64 {
    recency_score_at(first_message_at, Utc::now().timestamp())
}

pub fn recency_score_at(first_message_at: i64, now: i64) -> f64 {
    let age_days = ((now - first_message_at) as f64 / 86_400.0).max(0.0);
    2f64.powf(-age_days / RECENCY_HALF_LIFE_DAYS)
}

/// How much a session mattered, judged by its size and intensity.
/// Each factor saturates at 1, so the total stays in [0, 1].
pub fn importance_score(session: &SessionRow) -> f64 {
    let msg_factor = (session.message_count as f64 / 100.0).min(1.0);
    let user_factor = (session.user_message_count as f64 / 20.0).min(1.0);
    let token_factor = (session.total_tokens as f64 / 200_000.0).min(1.0);
    let compaction_factor = (session.compaction_count as f64 / 5.0).min(1.0);

    msg_factor * 0.3 + user_factor * 0.3 + token_factor * 0.2 + compaction_factor * 0.2
}

/// Hybrid search over all sessions.
///
/// Scoring: `0.5 * bm25_norm + 0.25 * recency + 0.25 * importance`, where
/// `bm25_norm` is the per-session best BM25 normalized by the maximum over
/// the surviving candidate set.
pub async fn hybrid_search(
    db: &Database,
    query: &str,
    limit: usize,
    project_path: Option<&str>,
    after: Option<i64>,
) -> DbResult<Vec<SearchResult>> {
    let hits = db.search_fts(query, FTS_CANDIDATE_LIMIT).await?;

    // Group to sessions, keeping the strongest match and its snippet.
    // BM25 is negative (lower is better); rank on the absolute value.
    let mut per_session: HashMap<String, (f64, String)> = HashMap::new();
    for hit in hits {
        let rank = hit.rank.abs();
        let snippet: String = hit
            .content_text
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(200)
            .collect();
        match per_session.get(&hit.session_id) {
            Some((best, _)) if *best >= rank => {}
            _ => {
                per_session.insert(hit.session_id, (rank, snippet));
            }
        }
    }
    if per_session.is_empty() {
        return Ok(Vec::new());
    }

    // Resolve sessions and apply filters before normalizing, so the BM25
    // scale comes from the surviving candidates only.
    let mut candidates = Vec::new();
    for (session_id, (rank, snippet)) in per_session {
        let Some(session) = db.get_session(&session_id).await? else {
            continue;
        };
        if let Some(project) = project_path {
            if session.project_path.as_deref() != Some(project) {
                continue;
            }
        }
        if let Some(after) = after {
            if session.first_message_at < after {
                continue;
            }
        }
        candidates.push((session, rank, snippet));
    }

    let max_rank = candidates
        .iter()
        .map(|(_, rank, _)| *rank)
        .fold(0.0f64, f64::max)
        .max(f64::MIN_POSITIVE);

    let mut results = Vec::new();
    for (session, rank, snippet) in candidates {
        let fts_norm = rank / max_rank;
        let recency = recency_score(session.first_message_at);
        let importance = importance_score(&session);
        let score = fts_norm * 0.5 + recency * 0.25 + importance * 0.25;

        let summary = db
            .get_summary(&session.id)
            .await?
            .map(|s| s.summary_text);

        results.push(SearchResult {
            session_id: session.id,
            score,
            source: session.source,
            project_name: session.project_name,
            title: session.title,
            summary,
            first_message_at: session.first_message_at,
            snippet: (!snippet.is_empty()).then_some(snippet),
        });
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    Ok(results)
}

/// Chronological session listing (oldest first), each entry joined with
/// its summary when one exists.
pub async fn timeline(
    db: &Database,
    project_path: Option<&str>,
    after: Option<i64>,
    before: Option<i64>,
    limit: usize,
) -> DbResult<Vec<TimelineEntry>> {
    let sessions = db
        .list_sessions(None, project_path, after, before, limit as i64)
        .await?;

    let mut entries = Vec::with_capacity(sessions.len());
    for session in sessions {
        let summary = db
            .get_summary(&session.id)
            .await?
            .map(|s| s.summary_text);
        entries.push(TimelineEntry {
            session_id: session.id,
            source: session.source,
            project_name: session.project_name,
            title: session.title,
            model: session.model,
            first_message_at: session.first_message_at,
            last_message_at: session.last_message_at,
            message_count: session.message_count,
            user_message_count: session.user_message_count,
            tier: session.tier,
            summary,
        });
    }

    entries.sort_by_key(|e| e.first_message_at);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactical_memory_core::{ParsedMessage, ParsedSession, Role, Source};
    use tactical_memory_db::NewSummary;

    fn session(id: &str, first: i64, last: i64, text: &str) -> ParsedSession {
        ParsedSession {
            id: id.to_string(),
            source: Source::Codex,
            project_path: Some("/srv/work/myproject".into()),
            project_name: Some("myproject".into()),
            cwd: Some("/srv/work/myproject".into()),
            model: Some("gpt-5.1-codex-max".into()),
            git_branch: None,
            first_message_at: first,
            last_message_at: last,
            total_tokens: 10_000,
            compaction_count: 0,
            tools_used: vec![],
            raw_path: format!("/tmp/{id}.jsonl"),
            title: Some(text.chars().take(200).collect()),
            messages: vec![
                ParsedMessage::text(0, Role::User, text.to_string(), first),
                ParsedMessage::text(1, Role::Assistant, "on it".into(), first + 5),
                ParsedMessage::text(2, Role::User, "thanks".into(), last),
            ],
        }
    }

    async fn seed(db: &Database, sessions: &[ParsedSession]) {
        for s in sessions {
            db.upsert_session(s).await.unwrap();
            db.insert_messages(&s.id, &s.messages).await.unwrap();
        }
    }

    #[test]
    fn test_recency_score_shape() {
        let now = Utc::now().timestamp();
        assert!(recency_score_at(now, now) > 0.99);
        let month_ago = now - 30 * 86_400;
        assert!((recency_score_at(month_ago, now) - 0.5).abs() < 0.01);
        // Clock skew: future sessions score as "now"
        assert!((recency_score_at(now + 3600, now) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_importance_score_saturates() {
        let maxed = SessionRow {
            id: "x".into(),
            source: "codex".into(),
            project_path: None,
            project_name: None,
            cwd: None,
            model: None,
            git_branch: None,
            first_message_at: 0,
            last_message_at: 0,
            message_count: 100,
            user_message_count: 20,
            total_tokens: 200_000,
            compaction_count: 5,
            tools_used: None,
            tier: "L3".into(),
            raw_path: None,
            ingested_at: None,
            title: None,
        };
        let score = importance_score(&maxed);
        assert!((0.99..=1.0).contains(&score));

        let small = SessionRow {
            message_count: 5,
            user_message_count: 2,
            total_tokens: 1000,
            compaction_count: 0,
            ..maxed
        };
        assert!(importance_score(&small) < score);
    }

    #[tokio::test]
    async fn test_hybrid_search_ranks_and_bounds() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now().timestamp();
        seed(
            &db,
            &[
                session("s1", now - 86_400, now, "Fix the netplan permissions error on Ubuntu"),
                session("s2", now - 40 * 86_400, now - 39 * 86_400, "Unrelated refactoring work"),
            ],
        )
        .await;

        let results = hybrid_search(&db, "netplan permissions", 10, None, None)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].session_id, "s1");
        assert!(results[0].snippet.as_deref().unwrap().contains("netplan"));
        for r in &results {
            assert!(r.score <= 1.0 + 1e-9, "hybrid score stays within [0, 1]");
        }
    }

    #[tokio::test]
    async fn test_hybrid_search_filters() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now().timestamp();
        seed(&db, &[session("s1", now - 86_400, now, "netplan troubles")]).await;

        let other = hybrid_search(&db, "netplan", 10, Some("/elsewhere"), None)
            .await
            .unwrap();
        assert!(other.is_empty());

        let too_recent = hybrid_search(&db, "netplan", 10, None, Some(now))
            .await
            .unwrap();
        assert!(too_recent.is_empty());

        let matching = hybrid_search(&db, "netplan", 10, Some("/srv/work/myproject"), None)
            .await
            .unwrap();
        assert_eq!(matching.len(), 1);
    }

    #[tokio::test]
    async fn test_hybrid_search_empty_on_no_match() {
        let db = Database::new_in_memory().await.unwrap();
        let results = hybrid_search(&db, "anything", 10, None, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_timeline_is_chronological_with_summaries() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now().timestamp();
        seed(
            &db,
            &[
                session("newer", now - 1000, now, "second task"),
                session("older", now - 5000, now - 4000, "first task"),
            ],
        )
        .await;
        db.upsert_summary(&NewSummary {
            session_id: "older".into(),
            summary_text: "did the first task".into(),
            key_decisions: vec![],
            files_touched: vec![],
            commands_run: vec![],
            outcome: "completed".into(),
            generator_model: "test".into(),
        })
        .await
        .unwrap();

        let entries = timeline(&db, None, None, None, 50).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].session_id, "older");
        assert_eq!(entries[0].summary.as_deref(), Some("did the first task"));
        assert_eq!(entries[0].tier, "L2");
        assert!(entries[1].summary.is_none());
    }
}
