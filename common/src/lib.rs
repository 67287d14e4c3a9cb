pub mod command;
pub mod error;
pub mod report;
pub mod types;

pub use command::{ClientCommand, QueryArgs, ServerInfo};
pub use error::{PlagueError, Result};
pub use report::FileReport;
pub use types::*;
