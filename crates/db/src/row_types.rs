// crates/db/src/row_types.rs
// Row types returned by store queries.

use serde::Serialize;
use sqlx::Row;

/// A stored session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub id: String,
    pub source: String,
    pub project_path: Option<String>,
    pub project_name: Option<String>,
    pub cwd: Option<String>,
    pub model: Option<String>,
    pub git_branch: Option<String>,
    pub first_message_at: i64,
    pub last_message_at: i64,
    pub message_count: i64,
    pub user_message_count: i64,
    pub total_tokens: i64,
    pub compaction_count: i64,
    pub tools_used: Option<String>,
    pub tier: String,
    pub raw_path: Option<String>,
    pub ingested_at: Option<i64>,
    pub title: Option<String>,
}

impl SessionRow {
    /// Wall-clock span of the conversation in seconds.
    pub fn duration_seconds(&self) -> i64 {
        (self.last_message_at - self.first_message_at).max(0)
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for SessionRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            source: row.try_get("source")?,
            project_path: row.try_get("project_path")?,
            project_name: row.try_get("project_name")?,
            cwd: row.try_get("cwd")?,
            model: row.try_get("model")?,
            git_branch: row.try_get("git_branch")?,
            first_message_at: row.try_get("first_message_at")?,
            last_message_at: row.try_get("last_message_at")?,
            message_count: row.try_get("message_count")?,
            user_message_count: row.try_get("user_message_count")?,
            total_tokens: row.try_get("total_tokens")?,
            compaction_count: row.try_get("compaction_count")?,
            tools_used: row.try_get("tools_used")?,
            tier: row.try_get("tier")?,
            raw_path: row.try_get("raw_path")?,
            ingested_at: row.try_get("ingested_at")?,
            title: row.try_get("title")?,
        })
    }
}

/// A stored message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub session_id: String,
    pub ordinal: i64,
    pub role: String,
    pub content_type: Option<String>,
    pub content_text: Option<String>,
    pub content_json: Option<String>,
    pub tool_name: Option<String>,
    pub token_count: i64,
    pub created_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for MessageRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            ordinal: row.try_get("ordinal")?,
            role: row.try_get("role")?,
            content_type: row.try_get("content_type")?,
            content_text: row.try_get("content_text")?,
            content_json: row.try_get("content_json")?,
            tool_name: row.try_get("tool_name")?,
            token_count: row.try_get("token_count")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// A stored per-session summary (the L2 tier).
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub session_id: String,
    pub summary_text: String,
    pub key_decisions: Option<String>,
    pub files_touched: Option<String>,
    pub commands_run: Option<String>,
    pub outcome: Option<String>,
    pub generated_at: Option<i64>,
    pub generator_model: Option<String>,
}

impl SummaryRow {
    /// Parse a JSON string-array side field, tolerating absent or bad data.
    pub fn decisions(&self) -> Vec<String> {
        self.key_decisions
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for SummaryRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            session_id: row.try_get("session_id")?,
            summary_text: row.try_get("summary_text")?,
            key_decisions: row.try_get("key_decisions")?,
            files_touched: row.try_get("files_touched")?,
            commands_run: row.try_get("commands_run")?,
            outcome: row.try_get("outcome")?,
            generated_at: row.try_get("generated_at")?,
            generator_model: row.try_get("generator_model")?,
        })
    }
}

/// A stored project-knowledge entry (the L1 tier).
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeRow {
    pub id: i64,
    pub project_path: String,
    pub knowledge_type: String,
    pub content: String,
    pub confidence: f64,
    pub evidence_count: i64,
    pub source_sessions: Option<String>,
    pub first_seen_at: Option<i64>,
    pub last_confirmed_at: Option<i64>,
    pub superseded_by: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for KnowledgeRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            project_path: row.try_get("project_path")?,
            knowledge_type: row.try_get("knowledge_type")?,
            content: row.try_get("content")?,
            confidence: row.try_get("confidence")?,
            evidence_count: row.try_get("evidence_count")?,
            source_sessions: row.try_get("source_sessions")?,
            first_seen_at: row.try_get("first_seen_at")?,
            last_confirmed_at: row.try_get("last_confirmed_at")?,
            superseded_by: row.try_get("superseded_by")?,
        })
    }
}

/// A row in the durable job queue.
#[derive(Debug, Clone, Serialize)]
pub struct JobRow {
    pub id: i64,
    pub job_type: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub status: String,
    pub priority: i64,
    pub retry_remaining: i64,
    pub created_at: Option<i64>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub last_error: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for JobRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            job_type: row.try_get("job_type")?,
            target_type: row.try_get("target_type")?,
            target_id: row.try_get("target_id")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            retry_remaining: row.try_get("retry_remaining")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            last_error: row.try_get("last_error")?,
        })
    }
}
