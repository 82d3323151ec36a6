// crates/db/src/fts.rs
//! Full-text search over message content.

use crate::{Database, DbResult};
use sqlx::Row;

/// One message-level FTS match with its BM25 rank (lower is better).
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub message_id: i64,
    pub session_id: String,
    pub content_text: Option<String>,
    pub rank: f64,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for FtsHit {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            message_id: row.try_get("message_id")?,
            session_id: row.try_get("session_id")?,
            content_text: row.try_get("content_text")?,
            rank: row.try_get("rank")?,
        })
    }
}

/// Escape a user query for the FTS5 MATCH operator.
///
/// FTS5 treats `- : * ^` and the AND/OR/NOT keywords as syntax. Wrapping
/// every whitespace-separated token in double quotes (with embedded quotes
/// doubled) forces literal matching, so `o3-mini` or `2025-12` search as
/// plain terms. Empty queries pass through unchanged.
pub fn escape_fts5(query: &str) -> String {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect();
    if tokens.is_empty() {
        return query.to_string();
    }
    tokens.join(" ")
}

impl Database {
    /// Full-text search across message text, best BM25 first.
    pub async fn search_fts(&self, query: &str, limit: i64) -> DbResult<Vec<FtsHit>> {
        let escaped = escape_fts5(query);
        let rows = sqlx::query_as::<_, FtsHit>(
            r#"
            SELECT m.id AS message_id, m.session_id, m.content_text,
                   bm25(messages_fts) AS rank
            FROM messages_fts
            JOIN messages m ON m.id = messages_fts.rowid
            WHERE messages_fts MATCH ?1
            ORDER BY rank
            LIMIT ?2
            "#,
        )
        .bind(&escaped)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_session;
    use crate::Database;

    #[test]
    fn test_escape_fts5_quotes_tokens() {
        assert_eq!(escape_fts5("netplan permissions"), r#""netplan" "permissions""#);
        assert_eq!(escape_fts5("o3-mini"), r#""o3-mini""#);
        assert_eq!(escape_fts5(r#"say "hi""#), r#""say" ""hi"""#);
        assert_eq!(escape_fts5(""), "");
    }

    async fn seeded_db() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        let session = sample_session("s1", 1000, 2000);
        db.upsert_session(&session).await.unwrap();
        db.insert_messages("s1", &session.messages).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_search_finds_messages() {
        let db = seeded_db().await;
        let hits = db.search_fts("netplan permissions", 20).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits
            .iter()
            .any(|h| h.content_text.as_deref().unwrap_or("").contains("netplan")));
        assert_eq!(hits[0].session_id, "s1");
    }

    #[tokio::test]
    async fn test_operator_characters_do_not_break_match() {
        let db = Database::new_in_memory().await.unwrap();
        let mut session = sample_session("s1", 1000, 2000);
        session.messages[1].content_text = "switched the summarizer to o3-mini today".into();
        db.upsert_session(&session).await.unwrap();
        db.insert_messages("s1", &session.messages).await.unwrap();

        // Each of these contains FTS5 operator syntax when unescaped
        for query in ["o3-mini", "summarizer:", "o3*", "NOT"] {
            let result = db.search_fts(query, 20).await;
            assert!(result.is_ok(), "query {query:?} should not be a syntax error");
        }
        let hits = db.search_fts("o3-mini", 20).await.unwrap();
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn test_delete_keeps_index_in_sync() {
        let db = seeded_db().await;
        assert!(!db.search_fts("netplan", 20).await.unwrap().is_empty());

        db.delete_project_data("/srv/work/myproject").await.unwrap();
        assert!(db.search_fts("netplan", 20).await.unwrap().is_empty());
    }
}
