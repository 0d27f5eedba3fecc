use super::messages::WorkerMessage;
use super::signal_group;
use crate::error::Error as JobError;
use crate::events::{exit_code_of, JobStatus, WAIT_FAILED_EXIT_CODE};
use crate::store::JobStore;
use crate::types::JobId;

use tokio::{
    process::Child,
    select,
    sync::{mpsc, watch},
};
use tracing::{debug, error, info};

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    status_tx: watch::Sender<JobStatus>,
    store: JobStore,
    job_id: JobId,
    pid: Option<u32>,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::UnboundedReceiver<WorkerMessage>,
        status_tx: watch::Sender<JobStatus>,
        store: JobStore,
        job_id: JobId,
        child: Child,
    ) {
        let actor = Self {
            inbox,
            status_tx,
            store,
            job_id,
            pid: child.id(),
        };
        tokio::spawn(async move { actor.run(child).await });
    }

    async fn run(mut self, mut child: Child) {
        let mut inbox_open = true;
        let exit_code = loop {
            select! {
                // wait for the child to exit and reap it
                exit_status = child.wait() => {
                    break match exit_status {
                        Ok(exit_status) => exit_code_of(exit_status),
                        Err(err) => {
                            error!("job {}: lost exit status: {}", self.job_id, err);
                            WAIT_FAILED_EXIT_CODE
                        }
                    };
                }
                maybe_msg = self.inbox.recv(), if inbox_open => {
                    match maybe_msg {
                        Some(msg) => self.handle_message(msg),
                        // handle dropped: keep watching, the job outlives it
                        None => inbox_open = false,
                    }
                }
            }
        };
        self.finalize(exit_code).await;
    }

    fn handle_message(&mut self, msg: WorkerMessage) {
        match msg {
            WorkerMessage::Stop { response } => {
                let result = match self.pid {
                    Some(pid) => signal_group(pid, libc::SIGTERM).map_err(JobError::from),
                    None => Err(JobError::NotRunning(self.job_id)),
                };
                debug!("job {}: stop requested: {:?}", self.job_id, result);
                let _ = response.send(result);
            }
        }
    }

    async fn finalize(mut self, exit_code: i32) {
        // later stop requests are refused by the handle once the inbox is closed
        self.inbox.close();
        while let Ok(WorkerMessage::Stop { response }) = self.inbox.try_recv() {
            let _ = response.send(Err(JobError::NotRunning(self.job_id)));
        }

        if let Err(err) = self.store.set_terminal(&self.job_id, exit_code).await {
            error!("job {}: failed to record exit code {}: {}", self.job_id, exit_code, err);
        } else {
            info!("job {} finished with exit code {}", self.job_id, exit_code);
        }
        let _ = self.status_tx.send(JobStatus::Finished { exit_code });
    }
}
