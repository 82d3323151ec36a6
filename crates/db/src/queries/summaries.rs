// crates/db/src/queries/summaries.rs
// Summary persistence. Upsert/delete share a transaction with the session
// tier flip, so a summary row and an L3 tier can never coexist.

use crate::row_types::{SessionRow, SummaryRow};
use crate::{Database, DbResult};
use chrono::Utc;

/// A freshly generated session summary, ready to store.
#[derive(Debug, Clone)]
pub struct NewSummary {
    pub session_id: String,
    pub summary_text: String,
    pub key_decisions: Vec<String>,
    pub files_touched: Vec<String>,
    pub commands_run: Vec<String>,
    pub outcome: String,
    pub generator_model: String,
}

impl Database {
    /// Upsert a summary and atomically promote its session to L2.
    pub async fn upsert_summary(&self, summary: &NewSummary) -> DbResult<()> {
        let key_decisions =
            serde_json::to_string(&summary.key_decisions).unwrap_or_else(|_| "[]".into());
        let files_touched =
            serde_json::to_string(&summary.files_touched).unwrap_or_else(|_| "[]".into());
        let commands_run =
            serde_json::to_string(&summary.commands_run).unwrap_or_else(|_| "[]".into());
        let generated_at = Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO session_summaries (
                session_id, summary_text, key_decisions, files_touched,
                commands_run, outcome, generated_at, generator_model
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(session_id) DO UPDATE SET
                summary_text = excluded.summary_text,
                key_decisions = excluded.key_decisions,
                files_touched = excluded.files_touched,
                commands_run = excluded.commands_run,
                outcome = excluded.outcome,
                generated_at = excluded.generated_at,
                generator_model = excluded.generator_model
            "#,
        )
        .bind(&summary.session_id)
        .bind(&summary.summary_text)
        .bind(&key_decisions)
        .bind(&files_touched)
        .bind(&commands_run)
        .bind(&summary.outcome)
        .bind(generated_at)
        .bind(&summary.generator_model)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE sessions SET tier = 'L2' WHERE id = ?1")
            .bind(&summary.session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_summary(&self, session_id: &str) -> DbResult<Option<SummaryRow>> {
        let row = sqlx::query_as::<_, SummaryRow>(
            "SELECT * FROM session_summaries WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Delete a summary for re-generation, reverting the session to L3.
    /// Returns whether a row was deleted.
    pub async fn delete_summary(&self, session_id: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM session_summaries WHERE session_id = ?1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted > 0 {
            sqlx::query("UPDATE sessions SET tier = 'L3' WHERE id = ?1")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(deleted > 0)
    }

    /// Sessions that have no summary yet and enough real user input to be
    /// worth summarizing. Newest first.
    pub async fn get_unsummarized_sessions(
        &self,
        min_user_messages: i64,
    ) -> DbResult<Vec<SessionRow>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT s.* FROM sessions s
            LEFT JOIN session_summaries ss ON s.id = ss.session_id
            WHERE ss.session_id IS NULL
              AND s.user_message_count >= ?1
            ORDER BY s.first_message_at DESC
            "#,
        )
        .bind(min_user_messages)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Project paths having at least `min` summarized sessions.
    pub async fn projects_with_min_summaries(&self, min: i64) -> DbResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT s.project_path FROM sessions s
            JOIN session_summaries ss ON ss.session_id = s.id
            WHERE s.project_path IS NOT NULL
            GROUP BY s.project_path
            HAVING COUNT(*) >= ?1
            "#,
        )
        .bind(min)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{sample_session, sample_summary as summary_for};
    use crate::Database;

    #[tokio::test]
    async fn test_upsert_summary_promotes_tier() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_session(&sample_session("s1", 1000, 2000)).await.unwrap();

        db.upsert_summary(&summary_for("s1")).await.unwrap();

        let summary = db.get_summary("s1").await.unwrap().unwrap();
        assert!(summary.summary_text.contains("netplan"));
        assert_eq!(summary.decisions(), vec!["Used chmod 600"]);

        let session = db.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.tier, "L2");
    }

    #[tokio::test]
    async fn test_delete_summary_reverts_tier() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_session(&sample_session("s1", 1000, 2000)).await.unwrap();
        db.upsert_summary(&summary_for("s1")).await.unwrap();

        assert!(db.delete_summary("s1").await.unwrap());
        assert!(db.get_summary("s1").await.unwrap().is_none());
        let session = db.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.tier, "L3");

        // Deleting again is a no-op
        assert!(!db.delete_summary("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_unsummarized_respects_threshold() {
        let db = Database::new_in_memory().await.unwrap();
        // s1 has 2 user messages, s2 has 2 as well but gets a summary
        let mut small = sample_session("s1", 1000, 2000);
        small.messages.pop(); // drop one user message -> 1 user msg
        db.upsert_session(&small).await.unwrap();
        db.upsert_session(&sample_session("s2", 3000, 4000)).await.unwrap();
        db.upsert_session(&sample_session("s3", 5000, 6000)).await.unwrap();
        db.upsert_summary(&summary_for("s2")).await.unwrap();

        let pending = db.get_unsummarized_sessions(2).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|s| s.id.as_str()).collect();
        // s1 is below the threshold, s2 is summarized
        assert_eq!(ids, vec!["s3"]);
    }

    #[tokio::test]
    async fn test_projects_with_min_summaries() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_session(&sample_session("s1", 1000, 2000)).await.unwrap();
        db.upsert_session(&sample_session("s2", 3000, 4000)).await.unwrap();
        db.upsert_summary(&summary_for("s1")).await.unwrap();

        assert!(db.projects_with_min_summaries(2).await.unwrap().is_empty());

        db.upsert_summary(&summary_for("s2")).await.unwrap();
        let projects = db.projects_with_min_summaries(2).await.unwrap();
        assert_eq!(projects, vec!["/srv/work/myproject"]);
    }
}
