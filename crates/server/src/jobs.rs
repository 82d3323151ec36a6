// crates/server/src/jobs.rs
//! Worker that drains the durable job queue.
//!
//! Not part of the orchestrator's own scheduling; this is the consumer
//! side of the `memory_jobs` table for CLI-driven and external producers.

use std::sync::Arc;
use tactical_memory_consolidate::{promote_project_knowledge, summarize_session, WordOverlap};
use tactical_memory_core::llm::LlmClient;
use tactical_memory_db::{Database, DbResult, JobRow};
use tracing::{info, warn};

/// Run one claimed job to completion.
async fn process_job(db: &Database, llm: &dyn LlmClient, job: &JobRow) -> Result<(), String> {
    let target = job.target_id.as_deref().unwrap_or_default();
    match job.job_type.as_str() {
        "extract_entities" => {
            let count = db
                .extract_entities_for_session(target)
                .await
                .map_err(|e| e.to_string())?;
            info!(session_id = target, count, "extracted entities");
            Ok(())
        }
        "summarize" => {
            let result = summarize_session(db, llm, target, None, None)
                .await
                .map_err(|e| e.to_string())?;
            if result.is_some() {
                info!(session_id = target, "summarized session");
            } else {
                warn!(session_id = target, "summarize produced nothing");
            }
            Ok(())
        }
        "promote" => {
            let report = promote_project_knowledge(db, llm, &WordOverlap, target, None, None)
                .await
                .map_err(|e| e.to_string())?;
            info!(
                project = target,
                entries = report.entries.len(),
                "promoted knowledge"
            );
            Ok(())
        }
        other => Err(format!("unknown job type: {other}")),
    }
}

/// Drain pending jobs until the queue is empty or `max_jobs` is reached.
/// Returns how many jobs were processed (including failed ones).
pub async fn run_worker(
    db: &Database,
    llm: &Arc<dyn LlmClient>,
    max_jobs: Option<usize>,
) -> DbResult<usize> {
    let mut processed = 0;
    while max_jobs.map_or(true, |max| processed < max) {
        let Some(job) = db.claim_job().await? else {
            break;
        };
        match process_job(db, llm.as_ref(), &job).await {
            Ok(()) => db.finish_job(job.id, None).await?,
            Err(error) => {
                warn!(job_id = job.id, error = %error, "job failed");
                db.finish_job(job.id, Some(&error)).await?;
            }
        }
        processed += 1;
    }
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tactical_memory_core::llm::{Backend, LlmError};
    use tactical_memory_db::NewJob;

    struct NoLlm;

    #[async_trait]
    impl LlmClient for NoLlm {
        async fn call_llm(
            &self,
            _prompt: &str,
            _source: Option<&str>,
            _model: Option<&str>,
            _backend: Option<Backend>,
        ) -> Result<String, LlmError> {
            Err(LlmError::NoBackend)
        }
    }

    #[tokio::test]
    async fn test_worker_drains_queue_and_records_failures() {
        let db = Database::new_in_memory().await.unwrap();
        let llm: Arc<dyn LlmClient> = Arc::new(NoLlm);

        // extract_entities on a missing session succeeds with zero hits;
        // an unknown job type fails and burns a retry.
        let ok_id = db
            .enqueue_job(&NewJob::new("extract_entities").target("session", "ghost"))
            .await
            .unwrap();
        let bad_id = db.enqueue_job(&NewJob::new("defragment")).await.unwrap();

        let processed = run_worker(&db, &llm, None).await.unwrap();
        assert_eq!(processed, 2);

        assert_eq!(db.get_job(ok_id).await.unwrap().unwrap().status, "done");
        let failed = db.get_job(bad_id).await.unwrap().unwrap();
        assert_eq!(failed.status, "error");
        assert_eq!(failed.retry_remaining, 2);
        assert!(failed.last_error.as_deref().unwrap().contains("defragment"));
    }

    #[tokio::test]
    async fn test_worker_honors_max_jobs() {
        let db = Database::new_in_memory().await.unwrap();
        let llm: Arc<dyn LlmClient> = Arc::new(NoLlm);
        for _ in 0..3 {
            db.enqueue_job(&NewJob::new("extract_entities").target("session", "ghost"))
                .await
                .unwrap();
        }

        let processed = run_worker(&db, &llm, Some(2)).await.unwrap();
        assert_eq!(processed, 2);
        // One job left pending
        assert!(db.claim_job().await.unwrap().is_some());
    }
}
