//! Per-worker shard storage: record indices ordered by admission date,
//! the date-range counting queries built on them, directory ingestion,
//! and the age-bracket statistics table behind topk queries.

pub mod ingest;
pub mod shard;
pub mod stats;

pub use ingest::{scan_country, IngestOutcome};
pub use shard::{InsertOutcome, ShardStore};
pub use stats::{CaseStats, TopkResult};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
