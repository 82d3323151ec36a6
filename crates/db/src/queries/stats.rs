// crates/db/src/queries/stats.rs
// Store totals and histograms.

use crate::{Database, DbResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Totals and histograms across all tiers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub total_entities: i64,
    pub total_summaries: i64,
    pub total_knowledge_entries: i64,
    pub sessions_by_source: BTreeMap<String, i64>,
    pub sessions_by_tier: BTreeMap<String, i64>,
    pub jobs_by_status: BTreeMap<String, i64>,
}

impl Database {
    pub async fn stats(&self) -> DbResult<StoreStats> {
        let mut stats = StoreStats::default();

        stats.total_sessions = self.count_rows("sessions").await?;
        stats.total_messages = self.count_rows("messages").await?;
        stats.total_entities = self.count_rows("entities").await?;
        stats.total_summaries = self.count_rows("session_summaries").await?;
        stats.total_knowledge_entries = self.count_rows("project_knowledge").await?;

        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT source, COUNT(*) FROM sessions GROUP BY source")
                .fetch_all(&self.pool)
                .await?;
        stats.sessions_by_source = rows.into_iter().collect();

        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT tier, COUNT(*) FROM sessions GROUP BY tier")
                .fetch_all(&self.pool)
                .await?;
        stats.sessions_by_tier = rows.into_iter().collect();

        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM memory_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        stats.jobs_by_status = rows.into_iter().collect();

        Ok(stats)
    }

    async fn count_rows(&self, table: &str) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{sample_session, sample_summary};
    use crate::{Database, NewJob};

    #[tokio::test]
    async fn test_stats_empty() {
        let db = Database::new_in_memory().await.unwrap();
        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.total_messages, 0);
        assert!(stats.sessions_by_source.is_empty());
    }

    #[tokio::test]
    async fn test_stats_histograms() {
        let db = Database::new_in_memory().await.unwrap();
        let session = sample_session("s1", 1000, 2000);
        db.upsert_session(&session).await.unwrap();
        db.insert_messages("s1", &session.messages).await.unwrap();
        db.upsert_session(&sample_session("s2", 3000, 4000)).await.unwrap();
        db.upsert_summary(&sample_summary("s2")).await.unwrap();
        db.enqueue_job(&NewJob::new("summarize")).await.unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.total_summaries, 1);
        assert_eq!(stats.sessions_by_source.get("codex"), Some(&2));
        assert_eq!(stats.sessions_by_tier.get("L3"), Some(&1));
        assert_eq!(stats.sessions_by_tier.get("L2"), Some(&1));
        assert_eq!(stats.jobs_by_status.get("pending"), Some(&1));
    }
}
