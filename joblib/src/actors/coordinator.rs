mod actor;
mod messages;

use self::{
    actor::JobCoordinator,
    messages::CoordinatorMessage::{self, Launch, Stop, Watch},
};
use crate::actors::{follower::LogLines, worker::wait_finished};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::JobStatus;
use crate::registry::{self, JobRow};
use crate::report::{self, Report};
use crate::store::{JobRecord, JobStore};
use crate::types::JobId;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// A `JobCoordinator` which launches jobs and answers questions about them.
///
/// This struct is actually an actor handle. Launching and stopping go through the
/// actor spawned by `JobCoordinator::spawn`, which owns one watcher per launched job.
/// Read-only queries go straight to the [`JobStore`], which is the source of truth
/// for every job, including jobs launched by other processes sharing the same root.
/// The handle can be cloned freely without any extra synchronization.
#[derive(Clone)]
pub struct JobCoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    store: JobStore,
    poll_interval: Duration,
}

impl JobCoordinatorHandle {
    /// Spawn a new coordinator over the store rooted at `config.root`.
    ///
    /// `config.channel_capacity` limits the build-up of inbound messages.
    pub fn spawn(config: Config) -> Self {
        let (sender, receiver) = mpsc::channel(config.channel_capacity);
        let store = JobStore::new(&config.root);
        JobCoordinator::spawn(receiver, store.clone(), config.shell.clone());
        Self {
            sender,
            store,
            poll_interval: config.poll_interval(),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Start `command` in the background and return its id without waiting for it.
    ///
    /// Empty names or commands are rejected before anything is stored. A command
    /// that cannot even be started still gets an id; its job is finished at once
    /// with [`SPAWN_FAILED_EXIT_CODE`](crate::SPAWN_FAILED_EXIT_CODE).
    pub async fn launch(&self, name: &str, command: &str) -> Result<JobId> {
        validate(name, command)?;
        self.request(|response| Launch {
            name: name.to_string(),
            command: command.to_string(),
            response,
        })
        .await?
    }

    /// Send SIGTERM to a running job's process group.
    pub async fn stop(&self, job_id: &JobId) -> Result<()> {
        self.request(|response| Stop {
            job_id: *job_id,
            response,
        })
        .await?
    }

    /// Resolve once the job is finished.
    ///
    /// Jobs watched by this coordinator wake the caller directly; any other job
    /// is polled from the store.
    pub async fn wait(&self, job_id: &JobId) -> Result<JobStatus> {
        let watched = self
            .request(|response| Watch {
                job_id: *job_id,
                response,
            })
            .await?;
        if let Some(status) = watched {
            if let Some(finished) = wait_finished(status).await {
                return Ok(finished);
            }
        }
        loop {
            let record = self.store.read(job_id).await?;
            if record.status.is_finished() {
                return Ok(record.status);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn read(&self, job_id: &JobId) -> Result<JobRecord> {
        self.store.read(job_id).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobRow>> {
        registry::list_jobs(&self.store).await
    }

    /// Follow a job's log from the beginning.
    pub async fn tail(&self, job_id: &JobId) -> Result<LogLines> {
        LogLines::follow(self.store.clone(), *job_id, self.poll_interval).await
    }

    pub async fn export(&self) -> Result<Report> {
        report::export(&self.store).await
    }

    async fn request<T>(
        &self,
        msg: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(msg(tx))
            .await
            .map_err(|_| Error::CoordinatorExited)?;
        rx.await.map_err(|_| Error::CoordinatorExited)
    }
}

fn validate(name: &str, command: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidCommand("job name is empty".into()));
    }
    if command.trim().is_empty() {
        return Err(Error::InvalidCommand("command is empty".into()));
    }
    Ok(())
}
