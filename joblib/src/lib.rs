mod actors;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod report;
pub mod store;
pub mod types;

// re-export the job coord handle as if it is the job coordinator itself.
pub use actors::coordinator::JobCoordinatorHandle as JobCoordinator;
pub use actors::follower::LogLines;
pub use config::Config;
pub use error::{Error, Result};
pub use events::{JobStatus, SPAWN_FAILED_EXIT_CODE, WAIT_FAILED_EXIT_CODE};
pub use registry::JobRow;
pub use report::Report;
pub use store::{JobRecord, JobStore};
pub use types::JobId;
