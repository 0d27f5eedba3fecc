use super::messages::CoordinatorMessage;
use crate::actors::worker::{process_start_time, signal_group, spawn_child, WorkerHandle};
use crate::error::{Error, Result};
use crate::events::JobStatus;
use crate::store::{JobRecord, JobStore};
use crate::types::JobId;
use std::{collections::HashMap, path::PathBuf};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

pub struct JobCoordinator {
    inbox: mpsc::Receiver<CoordinatorMessage>,
    store: JobStore,
    shell: PathBuf,
    workers: HashMap<JobId, WorkerHandle>,
}

impl JobCoordinator {
    pub fn spawn(inbox: mpsc::Receiver<CoordinatorMessage>, store: JobStore, shell: PathBuf) {
        let actor = Self {
            inbox,
            store,
            shell,
            workers: HashMap::new(),
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use self::CoordinatorMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Launch {
                    name,
                    command,
                    response,
                } => {
                    let _ = response.send(self.launch(&name, &command).await);
                }
                Stop { job_id, response } => {
                    self.stop(job_id, response).await;
                }
                Watch { job_id, response } => {
                    let _ = response.send(self.watch(job_id));
                }
            }
        }
    }

    async fn launch(&mut self, name: &str, command: &str) -> Result<JobId> {
        // finished workers have nothing left to offer
        self.workers.retain(|_, worker| !worker.is_finished());

        let record = self.store.create(name, command).await?;
        let child = match spawn_child(&self.store, &self.shell, &record) {
            Ok(child) => child,
            Err(err) => {
                warn!("job {} ({}) failed to start: {}", record.id, name, err);
                self.store
                    .set_spawn_failure(&record.id, &err.to_string())
                    .await?;
                return Ok(record.id);
            }
        };

        // recorded before the watcher exists, so it can never land after set_terminal.
        // the child is not reaped until the watcher waits on it, so its stat is still there.
        if let Some(pid) = child.id() {
            let started = process_start_time(pid).await;
            if let Err(err) = self.store.set_pid(&record.id, pid, started).await {
                warn!("job {}: failed to record pid {}: {}", record.id, pid, err);
            }
        }
        info!("launched job {} ({}): {}", record.id, name, command);
        let worker = WorkerHandle::watch(self.store.clone(), record.id, child);
        self.workers.insert(record.id, worker);
        Ok(record.id)
    }

    async fn stop(&mut self, job_id: JobId, response: oneshot::Sender<Result<()>>) {
        if let Some(worker) = self.workers.get(&job_id) {
            worker.stop(job_id, response);
            return;
        }

        let result = match self.store.read(&job_id).await {
            Ok(record) => self.stop_foreign(record).await,
            Err(err) => Err(err),
        };
        let _ = response.send(result);
    }

    /// Stop a job launched by another process through its recorded process group.
    ///
    /// The group is only signalled while the recorded pid still names the
    /// process that was spawned, i.e. its start time matches the recorded one.
    async fn stop_foreign(&self, record: JobRecord) -> Result<()> {
        let job_id = record.id;
        if record.status.is_finished() {
            return Err(Error::NotRunning(job_id));
        }
        let (pid, recorded) = match (record.pid, record.pid_started) {
            (Some(pid), Some(started)) => (pid, started),
            _ => {
                warn!("job {}: refusing to stop, no recorded process identity", job_id);
                return Err(Error::ProcessUnknown(job_id));
            }
        };
        match process_start_time(pid).await {
            Some(started) if started == recorded => {
                debug!("job {}: signalling process group {}", job_id, pid);
                signal_group(pid, libc::SIGTERM).map_err(Error::from)
            }
            // gone; its supervisor has not recorded the exit yet, or never will
            None => Err(Error::NotRunning(job_id)),
            Some(started) => {
                warn!(
                    "job {}: pid {} was reused (started at {}, recorded {}), not signalling",
                    job_id, pid, started, recorded
                );
                Err(Error::ProcessUnknown(job_id))
            }
        }
    }

    fn watch(&self, job_id: JobId) -> Option<watch::Receiver<JobStatus>> {
        self.workers.get(&job_id).map(WorkerHandle::subscribe)
    }
}
