// crates/db/src/queries/mod.rs
pub mod jobs;
pub mod knowledge;
pub mod sessions;
pub mod stats;
pub mod summaries;
