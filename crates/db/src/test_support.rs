// crates/db/src/test_support.rs
// Shared fixtures for this crate's unit tests.

use crate::NewSummary;
use tactical_memory_core::{ParsedMessage, ParsedSession, Role, Source};

pub(crate) fn sample_session(id: &str, first: i64, last: i64) -> ParsedSession {
    ParsedSession {
        id: id.to_string(),
        source: Source::Codex,
        project_path: Some("/srv/work/myproject".into()),
        project_name: Some("myproject".into()),
        cwd: Some("/srv/work/myproject".into()),
        model: Some("gpt-5.1-codex-max".into()),
        git_branch: Some("main".into()),
        first_message_at: first,
        last_message_at: last,
        total_tokens: 10_000,
        compaction_count: 0,
        tools_used: vec!["shell_command".into()],
        raw_path: "/tmp/rollout-test.jsonl".into(),
        title: Some("Fix the netplan permissions error".into()),
        messages: vec![
            ParsedMessage::text(
                0,
                Role::User,
                "Fix the netplan permissions error on Ubuntu".into(),
                first,
            ),
            ParsedMessage::text(
                1,
                Role::Assistant,
                "The file /etc/netplan/config.yaml needs chmod 600.".into(),
                first + 10,
            ),
            ParsedMessage::text(2, Role::User, "try chmod 600".into(), last),
        ],
    }
}

pub(crate) fn sample_summary(session_id: &str) -> NewSummary {
    NewSummary {
        session_id: session_id.to_string(),
        summary_text: "Fixed netplan permissions on Ubuntu".into(),
        key_decisions: vec!["Used chmod 600".into()],
        files_touched: vec!["/etc/netplan/config.yaml".into()],
        commands_run: vec!["chmod 600".into()],
        outcome: "completed".into(),
        generator_model: "test".into(),
    }
}
