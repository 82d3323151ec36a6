// crates/db/src/queries/sessions.rs
// Session and message persistence.

use crate::row_types::{MessageRow, SessionRow};
use crate::{Database, DbResult};
use chrono::Utc;
use tactical_memory_core::{ParsedMessage, ParsedSession};

impl Database {
    /// Insert or update a session record.
    ///
    /// On conflict only the re-ingestable fields move: counters, tool
    /// names, `last_message_at`, `ingested_at`, and `title`. Identity and
    /// first-seen fields (`source`, `first_message_at`, project fields,
    /// `tier`) are never rewritten.
    pub async fn upsert_session(&self, session: &ParsedSession) -> DbResult<()> {
        let tools_used = serde_json::to_string(&session.tools_used_sorted())
            .unwrap_or_else(|_| "[]".to_string());
        let ingested_at = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, source, project_path, project_name, cwd, model,
                git_branch, first_message_at, last_message_at,
                message_count, user_message_count, total_tokens,
                compaction_count, tools_used, tier, raw_path,
                ingested_at, title
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12,
                ?13, ?14, 'L3', ?15,
                ?16, ?17
            )
            ON CONFLICT(id) DO UPDATE SET
                last_message_at = excluded.last_message_at,
                message_count = excluded.message_count,
                user_message_count = excluded.user_message_count,
                total_tokens = excluded.total_tokens,
                compaction_count = excluded.compaction_count,
                tools_used = excluded.tools_used,
                ingested_at = excluded.ingested_at,
                title = excluded.title
            "#,
        )
        .bind(&session.id)
        .bind(session.source.as_str())
        .bind(&session.project_path)
        .bind(&session.project_name)
        .bind(&session.cwd)
        .bind(&session.model)
        .bind(&session.git_branch)
        .bind(session.first_message_at)
        .bind(session.last_message_at)
        .bind(session.message_count())
        .bind(session.user_message_count())
        .bind(session.total_tokens)
        .bind(session.compaction_count)
        .bind(&tools_used)
        .bind(&session.raw_path)
        .bind(ingested_at)
        .bind(&session.title)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Bulk insert messages for a session.
    ///
    /// Insert-or-ignore on `(session_id, ordinal)`: re-ingesting the same
    /// file never duplicates rows.
    pub async fn insert_messages(
        &self,
        session_id: &str,
        messages: &[ParsedMessage],
    ) -> DbResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for msg in messages {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO messages (
                    session_id, ordinal, role, content_type,
                    content_text, content_json, tool_name,
                    token_count, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(session_id)
            .bind(msg.ordinal)
            .bind(msg.role.as_str())
            .bind(msg.content_type.as_str())
            .bind(&msg.content_text)
            .bind(&msg.content_json)
            .bind(&msg.tool_name)
            .bind(msg.token_count)
            .bind(msg.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn session_exists(&self, session_id: &str) -> DbResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn get_session(&self, session_id: &str) -> DbResult<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// All messages of a session in ordinal order.
    pub async fn get_session_messages(&self, session_id: &str) -> DbResult<Vec<MessageRow>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE session_id = ?1 ORDER BY ordinal",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// List sessions, newest first, with optional filters.
    pub async fn list_sessions(
        &self,
        source: Option<&str>,
        project_path: Option<&str>,
        after: Option<i64>,
        before: Option<i64>,
        limit: i64,
    ) -> DbResult<Vec<SessionRow>> {
        let mut sql = String::from("SELECT * FROM sessions WHERE 1=1");
        if source.is_some() {
            sql.push_str(" AND source = ?");
        }
        if project_path.is_some() {
            sql.push_str(" AND project_path = ?");
        }
        if after.is_some() {
            sql.push_str(" AND first_message_at >= ?");
        }
        if before.is_some() {
            sql.push_str(" AND first_message_at <= ?");
        }
        sql.push_str(" ORDER BY first_message_at DESC LIMIT ?");

        let mut query = sqlx::query_as::<_, SessionRow>(&sql);
        if let Some(source) = source {
            query = query.bind(source.to_string());
        }
        if let Some(project_path) = project_path {
            query = query.bind(project_path.to_string());
        }
        if let Some(after) = after {
            query = query.bind(after);
        }
        if let Some(before) = before {
            query = query.bind(before);
        }
        query = query.bind(limit);

        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Distinct project paths with at least one session.
    pub async fn project_paths(&self) -> DbResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT project_path FROM sessions WHERE project_path IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::sample_session;
    use crate::Database;
    use pretty_assertions::assert_eq;
    use tactical_memory_core::{ParsedMessage, Role};

    #[tokio::test]
    async fn test_upsert_and_get_session() {
        let db = Database::new_in_memory().await.unwrap();
        let session = sample_session("s1", 1000, 2000);
        db.upsert_session(&session).await.unwrap();

        let row = db.get_session("s1").await.unwrap().unwrap();
        assert_eq!(row.source, "codex");
        assert_eq!(row.project_name.as_deref(), Some("myproject"));
        assert_eq!(row.tier, "L3");
        assert_eq!(row.message_count, 3);
        assert_eq!(row.user_message_count, 2);
        assert!(db.session_exists("s1").await.unwrap());
        assert!(!db.session_exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_conflict_preserves_identity_fields() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_session(&sample_session("s1", 1000, 2000)).await.unwrap();

        // Re-ingest with more messages and a different claimed start time
        let mut updated = sample_session("s1", 500, 3000);
        updated.messages.push(ParsedMessage::text(
            3,
            Role::Assistant,
            "done".into(),
            3000,
        ));
        db.upsert_session(&updated).await.unwrap();

        let row = db.get_session("s1").await.unwrap().unwrap();
        // first_message_at never moves after the first ingest
        assert_eq!(row.first_message_at, 1000);
        // counters and last_message_at follow the newest parse
        assert_eq!(row.last_message_at, 3000);
        assert_eq!(row.message_count, 4);
    }

    #[tokio::test]
    async fn test_insert_messages_idempotent() {
        let db = Database::new_in_memory().await.unwrap();
        let session = sample_session("s1", 1000, 2000);
        db.upsert_session(&session).await.unwrap();

        db.insert_messages("s1", &session.messages).await.unwrap();
        db.insert_messages("s1", &session.messages).await.unwrap();

        let messages = db.get_session_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 3);
        let ordinals: Vec<i64> = messages.iter().map(|m| m.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_list_sessions_filters() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_session(&sample_session("s1", 1000, 2000)).await.unwrap();
        db.upsert_session(&sample_session("s2", 5000, 6000)).await.unwrap();

        let all = db.list_sessions(None, None, None, None, 50).await.unwrap();
        assert_eq!(all.len(), 2);
        // Newest first
        assert_eq!(all[0].id, "s2");

        let codex = db.list_sessions(Some("codex"), None, None, None, 50).await.unwrap();
        assert_eq!(codex.len(), 2);
        let claude = db
            .list_sessions(Some("claude_code"), None, None, None, 50)
            .await
            .unwrap();
        assert!(claude.is_empty());

        let recent = db.list_sessions(None, None, Some(3000), None, 50).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "s2");

        let early = db.list_sessions(None, None, None, Some(3000), 50).await.unwrap();
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].id, "s1");
    }
}
