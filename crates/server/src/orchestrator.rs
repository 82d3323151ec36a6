// crates/server/src/orchestrator.rs
//! Coordinates all slow work: the daily pipeline, on-query background
//! triggers, worker pools, cooldown sentinels, and the quality filter.

use crate::guard::{BackgroundGuard, TaskKind};
use regex_lite::Regex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tactical_memory_consolidate::{promote_project_knowledge, summarize_session, WordOverlap};
use tactical_memory_core::llm::LlmClient;
use tactical_memory_core::{is_synthetic_preamble, paths, Config};
use tactical_memory_db::{auto_ingest, Database, DbResult, SessionRow};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Quality floor: fewer real messages than this is noise.
const MIN_QUALITY_MESSAGES: i64 = 5;

/// Quality floor: conversations shorter than this (seconds) are noise.
const MIN_QUALITY_DURATION_SECS: i64 = 60;

/// A project needs this many summaries before promotion is worthwhile.
const MIN_SUMMARIES_FOR_PROMOTE: i64 = 2;

/// What one daily pipeline run did.
#[derive(Debug, Default, Clone)]
pub struct DailyReport {
    pub ingested: usize,
    pub summarized: usize,
    pub promoted_entries: usize,
}

/// The scheduling hub. Cheap to clone; clones share the store pool, the
/// LLM client, and the re-entrancy guard.
#[derive(Clone)]
pub struct Orchestrator {
    db: Database,
    llm: Arc<dyn LlmClient>,
    config: Arc<Config>,
    guard: BackgroundGuard,
    state_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(db: Database, llm: Arc<dyn LlmClient>, config: Arc<Config>) -> Self {
        let state_dir = paths::state_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_state_dir(db, llm, config, state_dir)
    }

    /// Like [`Orchestrator::new`] but with an explicit sentinel directory.
    pub fn with_state_dir(
        db: Database,
        llm: Arc<dyn LlmClient>,
        config: Arc<Config>,
        state_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            llm,
            config,
            guard: BackgroundGuard::new(),
            state_dir,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Cooldown sentinels
    // ========================================================================

    // Filenames come from `paths`; only the directory is overridable, so
    // the default state dir yields exactly `paths::daily_sentinel_path()`
    // and `paths::promote_sentinel_path()`.

    fn daily_sentinel(&self) -> PathBuf {
        self.state_dir.join(paths::DAILY_SENTINEL_FILE)
    }

    fn promote_sentinel(&self) -> PathBuf {
        self.state_dir.join(paths::PROMOTE_SENTINEL_FILE)
    }

    fn today() -> String {
        chrono::Local::now().format("%Y-%m-%d").to_string()
    }

    /// True when the daily pipeline has not yet completed today.
    pub fn daily_is_stale(&self) -> bool {
        match std::fs::read_to_string(self.daily_sentinel()) {
            Ok(date) => date.trim() != Self::today(),
            Err(_) => true,
        }
    }

    fn mark_daily_run(&self) {
        if let Err(e) = std::fs::create_dir_all(&self.state_dir)
            .and_then(|_| std::fs::write(self.daily_sentinel(), Self::today()))
        {
            warn!(error = %e, "cannot write daily sentinel");
        }
    }

    /// True while the standalone promote pass is inside its cooldown.
    pub fn promote_cooldown_active(&self) -> bool {
        let Ok(text) = std::fs::read_to_string(self.promote_sentinel()) else {
            return false;
        };
        let Ok(last_run) = text.trim().parse::<f64>() else {
            return false;
        };
        let now = chrono::Utc::now().timestamp() as f64;
        now - last_run < self.config.promote_cooldown_seconds as f64
    }

    fn mark_promote_run(&self) {
        let now = chrono::Utc::now().timestamp() as f64;
        if let Err(e) = std::fs::create_dir_all(&self.state_dir)
            .and_then(|_| std::fs::write(self.promote_sentinel(), now.to_string()))
        {
            warn!(error = %e, "cannot write promote sentinel");
        }
    }

    // ========================================================================
    // Quality filter
    // ========================================================================

    /// Whether a session carries enough signal to be worth LLM time.
    pub async fn is_quality_session(&self, session: &SessionRow) -> DbResult<bool> {
        if session.user_message_count < self.config.min_user_messages
            || session.message_count < MIN_QUALITY_MESSAGES
            || session.duration_seconds() < MIN_QUALITY_DURATION_SECS
        {
            return Ok(false);
        }

        let Some(title) = session.title.as_deref() else {
            return Ok(false);
        };
        if title_is_low_signal(title) {
            return Ok(false);
        }

        // At least two user messages must be real human input, not
        // tool-injected preamble blocks.
        let messages = self.db.get_session_messages(&session.id).await?;
        let organic = messages
            .iter()
            .filter(|m| m.role == "user" && m.content_type.as_deref() == Some("text"))
            .filter(|m| !is_synthetic_preamble(m.content_text.as_deref().unwrap_or("")))
            .count();
        Ok(organic >= 2)
    }

    // ========================================================================
    // Daily pipeline
    // ========================================================================

    /// Run the full pipeline: ingest → summarize new/updated → backfill →
    /// promote → self-test. Returns `None` when suppressed by the daily
    /// sentinel (unless forced) or because a run is already in flight.
    pub async fn daily_auto_process(&self, force: bool) -> DbResult<Option<DailyReport>> {
        if !force && !self.daily_is_stale() {
            debug!("daily pipeline already ran today");
            return Ok(None);
        }
        let Some(_permit) = self.guard.try_acquire(TaskKind::Daily) else {
            debug!("daily pipeline already running");
            return Ok(None);
        };

        let report = self.run_daily_pipeline().await?;
        // Written only on full completion, so a crashed run retries.
        self.mark_daily_run();
        info!(
            ingested = report.ingested,
            summarized = report.summarized,
            promoted = report.promoted_entries,
            "daily pipeline complete"
        );
        Ok(Some(report))
    }

    async fn run_daily_pipeline(&self) -> DbResult<DailyReport> {
        let ingest = auto_ingest(&self.db, &self.config).await?;
        let mut report = DailyReport {
            ingested: ingest.sessions,
            ..DailyReport::default()
        };

        // New sessions, quality-filtered.
        let fresh = self.filter_quality(&ingest.new_session_ids).await?;
        report.summarized += self.summarize_sessions(fresh).await;

        // Updated sessions: their stored summary is stale. Drop and redo.
        for id in &ingest.updated_session_ids {
            self.db.delete_summary(id).await?;
        }
        report.summarized += self
            .summarize_sessions(ingest.updated_session_ids.clone())
            .await;

        // Backfill everything still unsummarized that passes the filter.
        let pending = self
            .db
            .get_unsummarized_sessions(self.config.min_user_messages)
            .await?;
        let mut backlog = Vec::new();
        for session in &pending {
            if self.is_quality_session(session).await? {
                backlog.push(session.id.clone());
            }
        }
        report.summarized += self.summarize_sessions(backlog).await;

        // Promote every project with enough summaries.
        let projects = self
            .db
            .projects_with_min_summaries(MIN_SUMMARIES_FOR_PROMOTE)
            .await?;
        report.promoted_entries = self.promote_projects(projects).await;

        self.self_test().await;
        Ok(report)
    }

    async fn filter_quality(&self, ids: &[String]) -> DbResult<Vec<String>> {
        let mut kept = Vec::new();
        for id in ids {
            if let Some(session) = self.db.get_session(id).await? {
                if self.is_quality_session(&session).await? {
                    kept.push(id.clone());
                }
            }
        }
        Ok(kept)
    }

    /// Non-fatal end-of-run sanity check, surfaced through the log.
    async fn self_test(&self) {
        match self.db.stats().await {
            Ok(stats) => info!(
                sessions = stats.total_sessions,
                summaries = stats.total_summaries,
                knowledge = stats.total_knowledge_entries,
                "self-test: store reachable"
            ),
            Err(e) => warn!(error = %e, "self-test: stats query failed"),
        }
        if let Err(e) = self.db.search_fts("session", 5).await {
            warn!(error = %e, "self-test: FTS smoke query failed");
        }
    }

    // ========================================================================
    // Worker pools
    // ========================================================================

    /// Summarize sessions on a bounded pool. Per-task failures are logged
    /// and never abort siblings. Returns how many summaries were written.
    pub async fn summarize_sessions(&self, ids: Vec<String>) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let semaphore = Arc::new(Semaphore::new(self.config.summarize_workers.max(1)));
        let mut tasks = JoinSet::new();

        for id in ids {
            let semaphore = Arc::clone(&semaphore);
            let db = self.db.clone();
            let llm = Arc::clone(&self.llm);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return 0usize;
                };
                match summarize_session(&db, llm.as_ref(), &id, None, None).await {
                    Ok(Some(_)) => 1,
                    Ok(None) => {
                        debug!(session_id = %id, "summarize skipped");
                        0
                    }
                    Err(e) => {
                        warn!(session_id = %id, error = %e, "summarize failed");
                        0
                    }
                }
            });
        }

        let mut written = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(count) => written += count,
                Err(e) => error!(error = %e, "summarize worker panicked"),
            }
        }
        written
    }

    /// Promote projects on a bounded pool. Returns total accepted entries
    /// (new + confirmed) across all projects.
    pub async fn promote_projects(&self, projects: Vec<String>) -> usize {
        if projects.is_empty() {
            return 0;
        }
        let semaphore = Arc::new(Semaphore::new(self.config.promote_workers.max(1)));
        let mut tasks = JoinSet::new();

        for project in projects {
            let semaphore = Arc::clone(&semaphore);
            let db = self.db.clone();
            let llm = Arc::clone(&self.llm);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return 0usize;
                };
                match promote_project_knowledge(&db, llm.as_ref(), &WordOverlap, &project, None, None)
                    .await
                {
                    Ok(report) => report.entries.len(),
                    Err(e) => {
                        warn!(project = %project, error = %e, "promote failed");
                        0
                    }
                }
            });
        }

        let mut entries = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(count) => entries += count,
                Err(e) => error!(error = %e, "promote worker panicked"),
            }
        }
        entries
    }

    // ========================================================================
    // Background triggers
    // ========================================================================

    /// The lightweight refresh that precedes every query operation:
    /// synchronous ingest, then background work as needed. Never raises.
    pub async fn on_query_refresh(&self) {
        let report = match auto_ingest(&self.db, &self.config).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "on-query ingest failed");
                return;
            }
        };

        if self.daily_is_stale() {
            // First use today: the full pipeline covers everything.
            self.daily_background();
            return;
        }

        if !report.new_session_ids.is_empty() {
            self.summarize_background(report.new_session_ids.clone());
            self.promote_background();
        }
    }

    /// Start the daily pipeline on a background worker. No-op when it
    /// already ran today or is already running.
    pub fn daily_background(&self) {
        if !self.daily_is_stale() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            match this.daily_auto_process(false).await {
                Ok(Some(report)) => debug!(?report, "background daily pipeline finished"),
                Ok(None) => {}
                Err(e) => error!(error = %e, "background daily pipeline failed"),
            }
        });
    }

    /// Start summarization of specific sessions in the background.
    pub fn summarize_background(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let Some(permit) = self.guard.try_acquire(TaskKind::Summarize) else {
            debug!("summarize already running, skipping");
            return;
        };
        let this = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let filtered = match this.filter_quality(&ids).await {
                Ok(filtered) => filtered,
                Err(e) => {
                    warn!(error = %e, "quality filter failed");
                    return;
                }
            };
            let written = this.summarize_sessions(filtered).await;
            debug!(written, "background summarize finished");
        });
    }

    /// Start a promotion pass over all eligible projects in the
    /// background, honoring the hourly cooldown sentinel.
    pub fn promote_background(&self) {
        if self.promote_cooldown_active() {
            debug!("promote cooldown active, skipping");
            return;
        }
        let Some(permit) = self.guard.try_acquire(TaskKind::Promote) else {
            debug!("promote already running, skipping");
            return;
        };
        let this = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match this.db.projects_with_min_summaries(MIN_SUMMARIES_FOR_PROMOTE).await {
                Ok(projects) => {
                    let entries = this.promote_projects(projects).await;
                    // Marked only after the pass completes.
                    this.mark_promote_run();
                    debug!(entries, "background promote finished");
                }
                Err(e) => error!(error = %e, "background promote failed"),
            }
        });
    }
}

/// Titles that look like paths, single words, or injected banners carry no
/// signal worth an LLM call.
fn title_is_low_signal(title: &str) -> bool {
    static PURE_PATH: OnceLock<Regex> = OnceLock::new();
    let pure_path = PURE_PATH.get_or_init(|| Regex::new(r"^[/~][\w./\-]*$").unwrap());

    let title = title.trim();
    title.is_empty()
        || pure_path.is_match(title)
        || !title.contains(char::is_whitespace)
        || title.starts_with("You are:")
        || title.starts_with("[Request interrupted")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_is_low_signal() {
        assert!(title_is_low_signal(""));
        assert!(title_is_low_signal("/srv/work/app/src/main.rs"));
        assert!(title_is_low_signal("~/notes/todo.md"));
        assert!(title_is_low_signal("yes"));
        assert!(title_is_low_signal("rebuild"));
        assert!(title_is_low_signal("You are: a helpful assistant"));
        assert!(title_is_low_signal("[Request interrupted by user]"));

        assert!(!title_is_low_signal("Fix the netplan permissions error"));
        assert!(!title_is_low_signal("why does cargo rebuild everything"));
    }
}
