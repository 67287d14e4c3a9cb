use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Runtime settings for the query server. Defaults cover a local
/// deployment; a YAML file and `PLAGUED_*` environment variables layer
/// on top, in that order.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address both listeners bind to.
    pub host: String,
    /// Port clients send queries to.
    pub query_port: u16,
    /// Port workers register and stream statistics to.
    pub stats_port: u16,
    /// Capacity of the pending-connection queue.
    pub queue_size: usize,
    /// Number of handler tasks draining the queue.
    pub num_handlers: usize,
}

impl ServerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("query_port", 7654)?
            .set_default("stats_port", 7655)?
            .set_default("queue_size", 64)?
            .set_default("num_handlers", 8)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(Environment::with_prefix("PLAGUED"))
            .build()?
            .try_deserialize()
    }
}
