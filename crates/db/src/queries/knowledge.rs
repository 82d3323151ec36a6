// crates/db/src/queries/knowledge.rs
// The L1 tier: an append-only log of consolidated facts per project.

use crate::row_types::KnowledgeRow;
use crate::{Database, DbResult};
use chrono::Utc;
use serde::Serialize;

/// A knowledge candidate accepted for insertion.
#[derive(Debug, Clone, Serialize)]
pub struct NewKnowledge {
    pub project_path: String,
    pub knowledge_type: String,
    pub content: String,
    pub confidence: f64,
    pub evidence_count: i64,
    pub source_sessions: Vec<String>,
}

/// Row counts removed by a project prune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneCounts {
    pub knowledge: u64,
    pub summaries: u64,
    pub messages: u64,
    pub sessions: u64,
}

impl Database {
    /// Insert a new knowledge entry and return its id.
    pub async fn upsert_project_knowledge(&self, entry: &NewKnowledge) -> DbResult<i64> {
        let source_sessions =
            serde_json::to_string(&entry.source_sessions).unwrap_or_else(|_| "[]".into());
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO project_knowledge (
                project_path, knowledge_type, content, confidence,
                evidence_count, source_sessions, first_seen_at, last_confirmed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
        )
        .bind(&entry.project_path)
        .bind(&entry.knowledge_type)
        .bind(&entry.content)
        .bind(entry.confidence)
        .bind(entry.evidence_count)
        .bind(&source_sessions)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Count a repeated observation toward an existing entry.
    ///
    /// Bumps `evidence_count` and `last_confirmed_at`; with a confidence
    /// given, keeps the maximum of old and new so confidence never drops.
    pub async fn confirm_knowledge(
        &self,
        knowledge_id: i64,
        confidence: Option<f64>,
    ) -> DbResult<()> {
        let now = Utc::now().timestamp();
        match confidence {
            Some(confidence) => {
                sqlx::query(
                    r#"
                    UPDATE project_knowledge
                    SET evidence_count = evidence_count + 1,
                        last_confirmed_at = ?1,
                        confidence = MAX(confidence, ?2)
                    WHERE id = ?3
                    "#,
                )
                .bind(now)
                .bind(confidence)
                .bind(knowledge_id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE project_knowledge
                    SET evidence_count = evidence_count + 1,
                        last_confirmed_at = ?1
                    WHERE id = ?2
                    "#,
                )
                .bind(now)
                .bind(knowledge_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Active (non-superseded) knowledge for a project, strongest first.
    pub async fn get_project_knowledge(&self, project_path: &str) -> DbResult<Vec<KnowledgeRow>> {
        let rows = sqlx::query_as::<_, KnowledgeRow>(
            r#"
            SELECT * FROM project_knowledge
            WHERE project_path = ?1 AND superseded_by IS NULL
            ORDER BY confidence DESC, last_confirmed_at DESC
            "#,
        )
        .bind(project_path)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete all active knowledge entries for a project.
    pub async fn clear_project_knowledge(&self, project_path: &str) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM project_knowledge WHERE project_path = ?1 AND superseded_by IS NULL",
        )
        .bind(project_path)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Remove every row belonging to a project, in one transaction:
    /// knowledge → summaries → messages → sessions.
    pub async fn delete_project_data(&self, project_path: &str) -> DbResult<PruneCounts> {
        let mut tx = self.pool.begin().await?;

        let knowledge = sqlx::query("DELETE FROM project_knowledge WHERE project_path = ?1")
            .bind(project_path)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let summaries = sqlx::query(
            r#"
            DELETE FROM session_summaries WHERE session_id IN
                (SELECT id FROM sessions WHERE project_path = ?1)
            "#,
        )
        .bind(project_path)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Occurrences reference messages; clear them first so the FK holds.
        sqlx::query(
            r#"
            DELETE FROM entity_occurrences WHERE session_id IN
                (SELECT id FROM sessions WHERE project_path = ?1)
            "#,
        )
        .bind(project_path)
        .execute(&mut *tx)
        .await?;

        let messages = sqlx::query(
            r#"
            DELETE FROM messages WHERE session_id IN
                (SELECT id FROM sessions WHERE project_path = ?1)
            "#,
        )
        .bind(project_path)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let sessions = sqlx::query("DELETE FROM sessions WHERE project_path = ?1")
            .bind(project_path)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(PruneCounts {
            knowledge,
            summaries,
            messages,
            sessions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_session, sample_summary};
    use crate::Database;

    fn entry(content: &str, confidence: f64) -> NewKnowledge {
        NewKnowledge {
            project_path: "/srv/work/myproject".into(),
            knowledge_type: "pattern".into(),
            content: content.into(),
            confidence,
            evidence_count: 1,
            source_sessions: vec!["s1".into()],
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_knowledge() {
        let db = Database::new_in_memory().await.unwrap();
        let id = db
            .upsert_project_knowledge(&entry("Use chmod 600 for netplan", 0.6))
            .await
            .unwrap();
        assert!(id > 0);

        let rows = db.get_project_knowledge("/srv/work/myproject").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].evidence_count, 1);
        assert!(rows[0].superseded_by.is_none());
    }

    #[tokio::test]
    async fn test_confirm_is_monotonic() {
        let db = Database::new_in_memory().await.unwrap();
        let id = db
            .upsert_project_knowledge(&entry("Use chmod 600 for netplan", 0.6))
            .await
            .unwrap();

        // Confirming with lower confidence must not decrease it
        db.confirm_knowledge(id, Some(0.4)).await.unwrap();
        let rows = db.get_project_knowledge("/srv/work/myproject").await.unwrap();
        assert_eq!(rows[0].evidence_count, 2);
        assert!((rows[0].confidence - 0.6).abs() < 1e-9);

        // Confirming with higher confidence raises it
        db.confirm_knowledge(id, Some(0.8)).await.unwrap();
        let rows = db.get_project_knowledge("/srv/work/myproject").await.unwrap();
        assert_eq!(rows[0].evidence_count, 3);
        assert!((rows[0].confidence - 0.8).abs() < 1e-9);

        // Confirming without confidence only bumps the evidence
        db.confirm_knowledge(id, None).await.unwrap();
        let rows = db.get_project_knowledge("/srv/work/myproject").await.unwrap();
        assert_eq!(rows[0].evidence_count, 4);
        assert!((rows[0].confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_clear_project_knowledge() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_project_knowledge(&entry("a", 0.6)).await.unwrap();
        db.upsert_project_knowledge(&entry("b", 0.7)).await.unwrap();

        assert_eq!(db.clear_project_knowledge("/srv/work/myproject").await.unwrap(), 2);
        assert!(db
            .get_project_knowledge("/srv/work/myproject")
            .await
            .unwrap()
            .is_empty());
        // Absent target: zero
        assert_eq!(db.clear_project_knowledge("/nowhere").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_project_data_cascades() {
        let db = Database::new_in_memory().await.unwrap();
        let session = sample_session("s1", 1000, 2000);
        db.upsert_session(&session).await.unwrap();
        db.insert_messages("s1", &session.messages).await.unwrap();
        db.extract_entities_for_session("s1").await.unwrap();
        db.upsert_summary(&sample_summary("s1")).await.unwrap();
        db.upsert_project_knowledge(&entry("Use chmod 600", 0.6)).await.unwrap();

        let counts = db.delete_project_data("/srv/work/myproject").await.unwrap();
        assert_eq!(counts.knowledge, 1);
        assert_eq!(counts.summaries, 1);
        assert_eq!(counts.messages, 3);
        assert_eq!(counts.sessions, 1);

        assert!(db.get_session("s1").await.unwrap().is_none());
        assert!(db.get_summary("s1").await.unwrap().is_none());

        // Absent target returns zeros
        let counts = db.delete_project_data("/nowhere").await.unwrap();
        assert_eq!(counts, PruneCounts::default());
    }
}
