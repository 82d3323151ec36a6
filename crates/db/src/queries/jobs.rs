// crates/db/src/queries/jobs.rs
// Durable job queue. The only producer/consumer surface between background
// work and future extensions.

use crate::row_types::JobRow;
use crate::{Database, DbResult};
use chrono::Utc;

/// Parameters for a queued job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub priority: i64,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            target_type: None,
            target_id: None,
            priority: 0,
        }
    }

    pub fn target(mut self, target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id.into());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

impl Database {
    /// Enqueue a job, returning its id.
    pub async fn enqueue_job(&self, job: &NewJob) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO memory_jobs (job_type, target_type, target_id, priority, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&job.job_type)
        .bind(&job.target_type)
        .bind(&job.target_id)
        .bind(job.priority)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Claim the next pending job: highest priority first, oldest first.
    ///
    /// Exactly one pending row moves to `running` with a started timestamp;
    /// select and update share a transaction.
    pub async fn claim_job(&self) -> DbResult<Option<JobRow>> {
        let mut tx = self.pool.begin().await?;
        let job = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM memory_jobs
            WHERE status = 'pending'
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = job else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query("UPDATE memory_jobs SET status = 'running', started_at = ?1 WHERE id = ?2")
            .bind(Utc::now().timestamp())
            .bind(job.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(job))
    }

    /// Finish a job. With an error, records it and burns one retry.
    pub async fn finish_job(&self, job_id: i64, error: Option<&str>) -> DbResult<()> {
        let now = Utc::now().timestamp();
        match error {
            Some(error) => {
                sqlx::query(
                    r#"
                    UPDATE memory_jobs
                    SET status = 'error',
                        finished_at = ?1,
                        last_error = ?2,
                        retry_remaining = retry_remaining - 1
                    WHERE id = ?3
                    "#,
                )
                .bind(now)
                .bind(error)
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE memory_jobs SET status = 'done', finished_at = ?1 WHERE id = ?2",
                )
                .bind(now)
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Fetch one job by id.
    pub async fn get_job(&self, job_id: i64) -> DbResult<Option<JobRow>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM memory_jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_enqueue_claim_finish() {
        let db = Database::new_in_memory().await.unwrap();
        let job_id = db
            .enqueue_job(&NewJob::new("extract_entities").target("session", "s1"))
            .await
            .unwrap();
        assert!(job_id > 0);

        let job = db.claim_job().await.unwrap().unwrap();
        assert_eq!(job.id, job_id);
        assert_eq!(job.job_type, "extract_entities");
        assert_eq!(job.target_id.as_deref(), Some("s1"));

        let claimed = db.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(claimed.status, "running");
        assert!(claimed.started_at.is_some());

        db.finish_job(job_id, None).await.unwrap();
        let done = db.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(done.status, "done");

        // Queue is drained
        assert!(db.claim_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_priority_and_fifo_order() {
        let db = Database::new_in_memory().await.unwrap();
        let low = db.enqueue_job(&NewJob::new("summarize")).await.unwrap();
        let high = db
            .enqueue_job(&NewJob::new("promote").priority(5))
            .await
            .unwrap();

        assert_eq!(db.claim_job().await.unwrap().unwrap().id, high);
        assert_eq!(db.claim_job().await.unwrap().unwrap().id, low);
    }

    #[tokio::test]
    async fn test_error_decrements_retries() {
        let db = Database::new_in_memory().await.unwrap();
        let job_id = db.enqueue_job(&NewJob::new("summarize")).await.unwrap();
        db.claim_job().await.unwrap();
        db.finish_job(job_id, Some("LLM unavailable")).await.unwrap();

        let failed = db.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(failed.status, "error");
        assert_eq!(failed.retry_remaining, 2);
        assert_eq!(failed.last_error.as_deref(), Some("LLM unavailable"));
    }
}
