// crates/consolidate/src/lib.rs
//! The two LLM-assisted consolidation stages: per-session summaries
//! (L3 → L2) and cross-session project knowledge (L2 → L1).

mod promote;
mod similarity;
mod summarize;

pub use promote::{promote_project_knowledge, select_l1_context, PromoteReport};
pub use similarity::{Similarity, WordOverlap};
pub use summarize::{format_conversation, parse_json_object, summarize_session};

use tactical_memory_core::llm::LlmError;
use tactical_memory_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsolidateError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

pub type ConsolidateResult<T> = Result<T, ConsolidateError>;
