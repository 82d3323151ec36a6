// crates/db/src/entities.rs
//! Entity persistence and the per-session extraction pass.

use crate::{Database, DbResult};
use tactical_memory_core::entities::extract_entities;

impl Database {
    /// Upsert a canonical entity, returning its id.
    ///
    /// Repeat sightings bump `occurrence_count` and push `last_seen_at`
    /// forward; `first_seen_at` never moves.
    pub async fn upsert_entity(
        &self,
        entity_type: &str,
        canonical_value: &str,
        seen_at: i64,
    ) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO entities (entity_type, canonical_value, first_seen_at, last_seen_at, occurrence_count)
            VALUES (?1, ?2, ?3, ?3, 1)
            ON CONFLICT(entity_type, canonical_value) DO UPDATE SET
                last_seen_at = MAX(excluded.last_seen_at, entities.last_seen_at),
                occurrence_count = entities.occurrence_count + 1
            RETURNING id
            "#,
        )
        .bind(entity_type)
        .bind(canonical_value)
        .bind(seen_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Link an entity to the message it appeared in. At most one occurrence
    /// per `(entity, message)` pair.
    pub async fn insert_entity_occurrence(
        &self,
        entity_id: i64,
        session_id: &str,
        message_id: i64,
        context_snippet: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO entity_occurrences
                (entity_id, session_id, message_id, context_snippet)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(entity_id)
        .bind(session_id)
        .bind(message_id)
        .bind(context_snippet)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Run the regex pass over a session's user and assistant text messages
    /// and persist every hit. Returns the number of hits processed.
    pub async fn extract_entities_for_session(&self, session_id: &str) -> DbResult<usize> {
        if self.get_session(session_id).await?.is_none() {
            return Ok(0);
        }
        let messages = self.get_session_messages(session_id).await?;

        let mut count = 0;
        for msg in &messages {
            if msg.role != "user" && msg.role != "assistant" {
                continue;
            }
            if msg.content_type.as_deref() != Some("text") {
                continue;
            }
            let Some(text) = msg.content_text.as_deref() else {
                continue;
            };
            if text.is_empty() {
                continue;
            }

            for hit in extract_entities(text) {
                let entity_id = self
                    .upsert_entity(hit.kind.as_str(), &hit.value, msg.created_at)
                    .await?;
                self.insert_entity_occurrence(entity_id, session_id, msg.id, &hit.context)
                    .await?;
                count += 1;
            }
        }
        Ok(count)
    }
}
