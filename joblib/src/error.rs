use crate::types::JobId;
use std::{io, result};
use thiserror;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not allocate job storage: {0}")]
    Allocation(#[source] io::Error),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("no such job: {0}")]
    NotFound(String),
    #[error("job {0} is not running")]
    NotRunning(JobId),
    #[error("job {0} has no verifiable process to signal")]
    ProcessUnknown(JobId),
    #[error("malformed record for job {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("job store i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("bad configuration: {0}")]
    Config(String),
    #[error("job coordinator exited")]
    CoordinatorExited,
}

pub type Result<T> = result::Result<T, Error>;
