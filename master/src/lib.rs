//! The commander process: discovers country shard directories, spawns the
//! worker fleet, assigns shards round-robin over each worker's stdin, and
//! respawns crashed workers into the same shard slot.

pub mod supervisor;

pub use supervisor::{Supervisor, SupervisorConfig};
