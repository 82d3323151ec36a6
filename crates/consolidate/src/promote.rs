// crates/consolidate/src/promote.rs
//! Cross-session knowledge promotion (L2 → L1) with fuzzy dedup against
//! the project's existing knowledge.

use crate::similarity::Similarity;
use crate::ConsolidateResult;
use serde_json::Value;
use std::collections::HashMap;
use tactical_memory_core::llm::{Backend, LlmClient};
use tactical_memory_db::{Database, NewKnowledge, SummaryRow};
use tracing::{debug, info, warn};

/// Knowledge candidates below this confidence are dropped.
const MIN_CANDIDATE_CONFIDENCE: f64 = 0.5;

/// Candidates at or above this similarity to an existing entry count as
/// confirmations of it instead of new rows.
const DEDUP_THRESHOLD: f64 = 0.7;

/// At most this many summarized sessions feed one promotion pass.
const MAX_SESSIONS: i64 = 100;

/// Source-session lists stored on a knowledge row are bounded.
const MAX_SOURCE_SESSIONS: usize = 10;

const PROMOTE_PROMPT: &str = r#"You are analyzing multiple coding session summaries for the same project.
Extract stable patterns, preferences, architectural decisions, and gotchas.

Project: {project_path}

Session summaries:
{summaries}

Existing knowledge entries (if any):
{existing}

---

Return a JSON array of knowledge entries. Each entry should be a pattern that appears across
multiple sessions (not one-off observations). Types: pattern, preference, architecture, gotcha, workflow.

[
  {
    "knowledge_type": "pattern | preference | architecture | gotcha | workflow",
    "content": "Concise description of the knowledge entry",
    "confidence": 0.5
  },
  ...
]

Only include entries with confidence >= 0.5. Return empty array [] if nothing is stable enough."#;

/// Outcome of one promotion pass.
#[derive(Debug, Default, Clone)]
pub struct PromoteReport {
    /// Accepted candidates, in LLM order.
    pub entries: Vec<NewKnowledge>,
    /// Candidates folded into existing entries as confirmations.
    pub confirmed: usize,
    /// Candidates inserted as new entries.
    pub new: usize,
}

/// Consolidate a project's session summaries into L1 knowledge.
///
/// Needs at least 2 summarized sessions; otherwise returns an empty
/// report. Running twice on unchanged inputs confirms instead of
/// duplicating (idempotent modulo `last_confirmed_at`).
pub async fn promote_project_knowledge(
    db: &Database,
    llm: &dyn LlmClient,
    sim: &dyn Similarity,
    project_path: &str,
    model: Option<&str>,
    backend: Option<Backend>,
) -> ConsolidateResult<PromoteReport> {
    // One consistent read of the project's summarized sessions.
    let sessions = db
        .list_sessions(None, Some(project_path), None, None, MAX_SESSIONS)
        .await?;
    let mut summarized: Vec<(String, Option<String>, String, SummaryRow)> = Vec::new();
    for session in &sessions {
        if let Some(summary) = db.get_summary(&session.id).await? {
            summarized.push((
                session.id.clone(),
                session.title.clone(),
                session.source.clone(),
                summary,
            ));
        }
    }
    if summarized.len() < 2 {
        debug!(project_path, "fewer than 2 summaries, nothing to promote");
        return Ok(PromoteReport::default());
    }

    // The dominant source among the summarized sessions picks the backend.
    let dominant_source = dominant_source(summarized.iter().map(|(_, _, source, _)| source.as_str()));

    let summaries_text = summarized
        .iter()
        .map(|(id, title, _, summary)| {
            format!(
                "Session {} ({}):\n{}\nDecisions: {}\n",
                id,
                title.as_deref().unwrap_or("untitled"),
                summary.summary_text,
                summary.key_decisions.as_deref().unwrap_or("[]"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n");

    let existing = db.get_project_knowledge(project_path).await?;
    let existing_text = if existing.is_empty() {
        "None yet.".to_string()
    } else {
        existing
            .iter()
            .map(|e| {
                format!(
                    "- [{}] {} (confidence: {})",
                    e.knowledge_type, e.content, e.confidence
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let prompt = PROMOTE_PROMPT
        .replace("{project_path}", project_path)
        .replace("{summaries}", &summaries_text)
        .replace("{existing}", &existing_text);

    let reply = llm
        .call_llm(&prompt, dominant_source.as_deref(), model, backend)
        .await?;
    let candidates = parse_candidates(&reply);

    let source_sessions: Vec<String> = summarized
        .iter()
        .take(MAX_SOURCE_SESSIONS)
        .map(|(id, _, _, _)| id.clone())
        .collect();

    let mut report = PromoteReport::default();
    for candidate in candidates {
        let confidence = candidate
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5);
        if confidence < MIN_CANDIDATE_CONFIDENCE {
            continue;
        }
        let content = candidate
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string();
        if content.is_empty() {
            continue;
        }
        let knowledge_type = candidate
            .get("knowledge_type")
            .and_then(Value::as_str)
            .unwrap_or("pattern")
            .to_string();

        // Fuzzy-match against prior knowledge: a close-enough candidate is
        // the same fact observed again, not a new row.
        let best_match = existing
            .iter()
            .map(|entry| (entry, sim.score(&content, &entry.content)))
            .filter(|(_, score)| *score >= DEDUP_THRESHOLD)
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let entry = NewKnowledge {
            project_path: project_path.to_string(),
            knowledge_type,
            content,
            confidence,
            evidence_count: 1,
            source_sessions: source_sessions.clone(),
        };

        match best_match {
            Some((matched, score)) => {
                debug!(id = matched.id, score, "confirming existing knowledge entry");
                db.confirm_knowledge(matched.id, Some(confidence)).await?;
                report.confirmed += 1;
            }
            None => {
                db.upsert_project_knowledge(&entry).await?;
                report.new += 1;
            }
        }
        report.entries.push(entry);
    }

    info!(
        project_path,
        confirmed = report.confirmed,
        new = report.new,
        "promotion pass complete"
    );
    Ok(report)
}

/// Most frequent source tag, ties broken by first appearance.
fn dominant_source<'a>(sources: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, source) in sources.enumerate() {
        let entry = counts.entry(source).or_insert((0, position));
        entry.0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, pos_a)), (_, (count_b, pos_b))| {
            count_a.cmp(count_b).then(pos_b.cmp(pos_a))
        })
        .map(|(source, _)| source.to_string())
}

/// Parse the LLM reply as a JSON array of candidate objects, salvaging a
/// bracketed substring when the reply has prose around it.
fn parse_candidates(text: &str) -> Vec<Value> {
    let parsed = serde_json::from_str::<Value>(text).ok().or_else(|| {
        let start = text.find('[')?;
        let end = text.rfind(']')?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<Value>(&text[start..=end]).ok()
    });

    match parsed {
        Some(Value::Array(items)) => items.into_iter().filter(|v| v.is_object()).collect(),
        _ => {
            warn!("LLM returned no parseable knowledge array");
            Vec::new()
        }
    }
}

/// Render the project's strongest knowledge as a markdown block under an
/// approximate token budget (4 chars ≈ 1 token).
pub async fn select_l1_context(
    db: &Database,
    project_path: &str,
    budget_tokens: usize,
) -> ConsolidateResult<String> {
    let entries = db.get_project_knowledge(project_path).await?;
    if entries.is_empty() {
        return Ok(String::new());
    }

    let mut lines = vec!["## Project Knowledge (from previous sessions)\n".to_string()];
    let mut estimated_tokens = 10usize; // header

    for entry in &entries {
        let line = format!("- **[{}]** {}", entry.knowledge_type, entry.content);
        let line_tokens = line.len() / 4;
        if estimated_tokens + line_tokens > budget_tokens {
            break;
        }
        estimated_tokens += line_tokens;
        lines.push(line);
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_candidates_plain_and_salvaged() {
        let plain = r#"[{"knowledge_type":"pattern","content":"a","confidence":0.6}]"#;
        assert_eq!(parse_candidates(plain).len(), 1);

        let wrapped = format!("Sure, here are the entries:\n{plain}\nHope that helps!");
        assert_eq!(parse_candidates(&wrapped).len(), 1);

        assert!(parse_candidates("no array at all").is_empty());
        assert!(parse_candidates(r#"{"not":"an array"}"#).is_empty());
        // Non-object items are dropped
        assert_eq!(parse_candidates(r#"[1, {"content":"x"}, "y"]"#).len(), 1);
    }

    #[test]
    fn test_dominant_source() {
        assert_eq!(
            dominant_source(["codex", "claude_code", "codex"].into_iter()),
            Some("codex".to_string())
        );
        // Tie: first seen wins
        assert_eq!(
            dominant_source(["gemini", "codex"].into_iter()),
            Some("gemini".to_string())
        );
        assert_eq!(dominant_source(std::iter::empty()), None);
    }
}
