use crate::error;
use crate::events::JobStatus;
use crate::types::{Command, JobId, Name};
use tokio::sync::{oneshot, watch};

#[derive(Debug)]
pub enum CoordinatorMessage {
    Launch {
        name: Name,
        command: Command,
        response: oneshot::Sender<error::Result<JobId>>,
    },
    Stop {
        job_id: JobId,
        response: oneshot::Sender<error::Result<()>>,
    },
    /// Status channel of a job watched by this coordinator, if any.
    Watch {
        job_id: JobId,
        response: oneshot::Sender<Option<watch::Receiver<JobStatus>>>,
    },
}
