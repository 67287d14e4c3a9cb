//! The query server: front door for clients, registration point for
//! shard workers. A bounded connection queue feeds a fixed pool of
//! handler tasks; a concurrent registry maps countries to worker
//! addresses and absorbs crash/replacement address patches.

pub mod config;
pub mod dispatch;
pub mod queries;
pub mod queue;
pub mod registry;

pub use config::ServerConfig;
pub use dispatch::run_server;
pub use queue::ConnQueue;
pub use registry::WorkerRegistry;
