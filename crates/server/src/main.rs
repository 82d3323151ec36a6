// crates/server/src/main.rs
//! `tactical-memory` CLI: thin presentation over the library crates.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tactical_memory_consolidate::{promote_project_knowledge, summarize_session, WordOverlap};
use tactical_memory_core::llm::{Backend, CliRouter, LlmClient};
use tactical_memory_core::Config;
use tactical_memory_db::{auto_ingest, Database};
use tactical_memory_server::{jobs, Orchestrator, QueryService};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tactical-memory",
    version,
    about = "Life-long context memory for CLI coding assistants"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest sessions from the configured CLI tools
    Ingest {
        /// Only ingest from this source (codex, claude_code, gemini)
        #[arg(long)]
        source: Option<String>,
    },
    /// Search across sessions
    Search {
        /// Search query
        query: Vec<String>,
        /// Filter by project path
        #[arg(long)]
        project: Option<String>,
        /// Filter by date (ISO format)
        #[arg(long)]
        after: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show a chronological session timeline
    Timeline {
        #[arg(long)]
        project: Option<String>,
        /// Start date (ISO)
        #[arg(long)]
        after: Option<String>,
        /// End date (ISO)
        #[arg(long)]
        before: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show store statistics
    Stats,
    /// Generate summaries for unsummarized sessions
    Summarize {
        /// Max sessions to summarize
        #[arg(long)]
        limit: Option<usize>,
        /// Model override
        #[arg(long)]
        model: Option<String>,
        /// Backend override (claude, codex, gemini)
        #[arg(long)]
        backend: Option<String>,
    },
    /// Promote session summaries to project knowledge
    Promote {
        /// Only promote for this project path
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        backend: Option<String>,
    },
    /// Show accumulated knowledge for a project
    Context {
        project_path: String,
    },
    /// Recall a specific session
    Recall {
        session_id: String,
        /// Also print the messages
        #[arg(long)]
        messages: bool,
    },
    /// Run the full pipeline: ingest → summarize → promote
    Process {
        /// Ignore cooldown sentinels
        #[arg(long)]
        force: bool,
    },
    /// Delete everything stored for a project
    Prune {
        project_path: String,
    },
    /// Drain the background job queue
    Work {
        /// Max jobs to process
        #[arg(long)]
        max: Option<usize>,
    },
}

fn parse_backend(backend: Option<&str>) -> anyhow::Result<Option<Backend>> {
    backend
        .map(|b| b.parse::<Backend>().map_err(anyhow::Error::msg))
        .transpose()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load();

    if let Command::Ingest { source: Some(source) } = &cli.command {
        match source.as_str() {
            "codex" => {
                config.claude_code_enabled = false;
                config.gemini_enabled = false;
            }
            "claude_code" => {
                config.codex_enabled = false;
                config.gemini_enabled = false;
            }
            "gemini" => {
                config.codex_enabled = false;
                config.claude_code_enabled = false;
            }
            other => anyhow::bail!("unknown source: {other}"),
        }
    }

    let db = Database::new(&config.db_path)
        .await
        .context("cannot open memory store")?;
    let llm: Arc<dyn LlmClient> = Arc::new(CliRouter::new());
    let config = Arc::new(config);
    let orchestrator = Orchestrator::new(db.clone(), Arc::clone(&llm), Arc::clone(&config));

    match cli.command {
        Command::Ingest { .. } => {
            let report = auto_ingest(&db, &config).await?;
            println!("Ingest complete:");
            println!("  Sessions written:  {}", report.sessions);
            println!("  New sessions:      {}", report.new_session_ids.len());
            println!("  Updated sessions:  {}", report.updated_session_ids.len());
            println!("  Messages stored:   {}", report.messages);
        }

        Command::Search {
            query,
            project,
            after,
            limit,
        } => {
            let service = QueryService::new(orchestrator);
            let output = service
                .search(&query.join(" "), limit, project.as_deref(), after.as_deref())
                .await;
            println!("{output}");
        }

        Command::Timeline {
            project,
            after,
            before,
            limit,
        } => {
            let service = QueryService::new(orchestrator);
            let output = service
                .timeline(project.as_deref(), after.as_deref(), before.as_deref(), limit)
                .await;
            println!("{output}");
        }

        Command::Stats => {
            let stats = db.stats().await?;
            println!("Tactical Memory Statistics");
            println!("{}", "=".repeat(40));
            println!("  Total sessions:    {}", stats.total_sessions);
            println!("  Total messages:    {}", stats.total_messages);
            println!("  Total entities:    {}", stats.total_entities);
            println!("  Total summaries:   {}", stats.total_summaries);
            println!("  Knowledge entries: {}", stats.total_knowledge_entries);
            println!("\n  Sessions by source:");
            for (source, count) in &stats.sessions_by_source {
                println!("    {source}: {count}");
            }
            println!("\n  Sessions by tier:");
            for (tier, count) in &stats.sessions_by_tier {
                println!("    {tier}: {count}");
            }
            if !stats.jobs_by_status.is_empty() {
                println!("\n  Jobs by status:");
                for (status, count) in &stats.jobs_by_status {
                    println!("    {status}: {count}");
                }
            }
            println!("\n  Store: {}", db.db_path().display());
            if let Ok(meta) = std::fs::metadata(db.db_path()) {
                println!("  Size: {:.1} MB", meta.len() as f64 / (1024.0 * 1024.0));
            }
        }

        Command::Summarize {
            limit,
            model,
            backend,
        } => {
            let backend = parse_backend(backend.as_deref())?;
            let pending = db
                .get_unsummarized_sessions(config.min_user_messages)
                .await?;
            if pending.is_empty() {
                println!("No sessions need summarization.");
                return Ok(());
            }
            let limit = limit.unwrap_or(pending.len());
            println!(
                "Found {} unsummarized sessions, processing {}",
                pending.len(),
                limit.min(pending.len())
            );

            let mut written = 0;
            for (i, session) in pending.iter().take(limit).enumerate() {
                let label = session.title.as_deref().unwrap_or(&session.id);
                match summarize_session(&db, llm.as_ref(), &session.id, model.as_deref(), backend)
                    .await
                {
                    Ok(Some(_)) => {
                        println!("  [{}/{}] Summarized: {label}", i + 1, limit);
                        written += 1;
                    }
                    Ok(None) => println!("  [{}/{}] Skipped (too short): {label}", i + 1, limit),
                    Err(e) => println!("  [{}/{}] Error: {label}: {e}", i + 1, limit),
                }
            }
            println!("\nSummarized {written} sessions.");
        }

        Command::Promote {
            project,
            model,
            backend,
        } => {
            let backend = parse_backend(backend.as_deref())?;
            let projects = match project {
                Some(project) => vec![project],
                None => db.project_paths().await?,
            };
            if projects.is_empty() {
                println!("No projects found.");
                return Ok(());
            }

            println!("Promoting knowledge for {} projects...", projects.len());
            let mut total = 0;
            for project in &projects {
                match promote_project_knowledge(
                    &db,
                    llm.as_ref(),
                    &WordOverlap,
                    project,
                    model.as_deref(),
                    backend,
                )
                .await
                {
                    Ok(report) if !report.entries.is_empty() => {
                        println!(
                            "  [{project}] {} new, {} confirmed",
                            report.new, report.confirmed
                        );
                        total += report.entries.len();
                    }
                    Ok(_) => println!(
                        "  [{project}] No stable patterns found (need >= 2 summarized sessions)"
                    ),
                    Err(e) => println!("  [{project}] Error: {e}"),
                }
            }
            println!("\nPromote complete: {total} knowledge entries processed.");
        }

        Command::Context { project_path } => {
            let service = QueryService::new(orchestrator);
            println!("{}", service.project_context(&project_path).await);
        }

        Command::Recall {
            session_id,
            messages,
        } => {
            let service = QueryService::new(orchestrator);
            let mut output = service.recall_session(&session_id).await;
            if !messages {
                // Keep the metadata and summary, drop the transcript
                if let Some(idx) = output.find("\n## Messages") {
                    output.truncate(idx);
                }
            }
            println!("{}", output.trim_end());
        }

        Command::Process { force } => match orchestrator.daily_auto_process(force).await? {
            Some(report) => {
                println!("Pipeline complete:");
                println!("  Sessions ingested:  {}", report.ingested);
                println!("  Sessions summarized: {}", report.summarized);
                println!("  Knowledge entries:  {}", report.promoted_entries);
            }
            None => println!("Pipeline already ran today (use --force to override)."),
        },

        Command::Prune { project_path } => {
            let counts = db.delete_project_data(&project_path).await?;
            println!("Pruned {project_path}:");
            println!("  Knowledge entries: {}", counts.knowledge);
            println!("  Summaries:         {}", counts.summaries);
            println!("  Messages:          {}", counts.messages);
            println!("  Sessions:          {}", counts.sessions);
        }

        Command::Work { max } => {
            let processed = jobs::run_worker(&db, &llm, max).await?;
            println!("Processed {processed} jobs.");
        }
    }

    Ok(())
}
