//! The shard-owner process: loads its assigned country directories into
//! an in-memory shard store, registers its ephemeral listening port with
//! the query server, streams per-file age-bracket reports, and answers
//! shard-local queries one connection at a time.

pub mod serve;
pub mod state;

pub use serve::handle_query;
pub use state::WorkerState;
