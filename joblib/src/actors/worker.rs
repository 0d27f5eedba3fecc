mod actor;
mod messages;

use crate::error::{self, Error};
use crate::events::JobStatus;
use crate::store::{JobRecord, JobStore};
use crate::types::JobId;
use actor::Actor;
use messages::WorkerMessage;
use std::{fs::OpenOptions, io, os::unix::process::CommandExt, path::Path, process::Stdio};
use tokio::{
    fs, process,
    process::Child,
    sync::{mpsc, oneshot, watch},
};

/// Handle to the watcher of one running job.
///
/// The actor behind it owns the child process and is the only writer of the
/// job's terminal state. The child keeps running if the handle is dropped.
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::UnboundedSender<WorkerMessage>,
    status: watch::Receiver<JobStatus>,
}

impl WorkerHandle {
    /// Start the watcher for an already spawned job process.
    pub fn watch(store: JobStore, job_id: JobId, child: Child) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(JobStatus::Running);
        Actor::spawn(inbox, status_tx, store, job_id, child);
        Self { sender, status }
    }

    pub fn is_finished(&self) -> bool {
        self.status.borrow().is_finished()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status.clone()
    }

    /// Ask the worker to terminate the job's process group.
    pub fn stop(&self, job_id: JobId, response: oneshot::Sender<error::Result<()>>) {
        if let Err(mpsc::error::SendError(WorkerMessage::Stop { response })) =
            self.sender.send(WorkerMessage::Stop { response })
        {
            // the watcher already finalized the job and went away
            let _ = response.send(Err(Error::NotRunning(job_id)));
        }
    }
}

/// Start `record.command` under `shell`.
///
/// stdout and stderr both go straight to the job's log in append mode, so
/// output is merged in emission order and capture does not depend on this
/// process staying alive. The shell leads a new process group.
pub fn spawn_child(store: &JobStore, shell: &Path, record: &JobRecord) -> io::Result<Child> {
    let log = OpenOptions::new()
        .append(true)
        .open(store.log_path(&record.id))?;
    let mut command = process::Command::new(shell);
    command
        .arg("-c")
        .arg(&record.command)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log));
    command.as_std_mut().process_group(0);
    command.spawn()
}

/// Resolve once `status` reports a terminal state. `None` if the watcher
/// disappeared before publishing one.
pub async fn wait_finished(mut status: watch::Receiver<JobStatus>) -> Option<JobStatus> {
    loop {
        let current = *status.borrow();
        if current.is_finished() {
            return Some(current);
        }
        if status.changed().await.is_err() {
            let last = *status.borrow();
            return last.is_finished().then(|| last);
        }
    }
}

/// Send `signal` to every process in the group led by `pgid`.
///
/// A group that no longer exists is not an error: the job already exited and
/// its watcher is finalizing it.
pub fn signal_group(pgid: u32, signal: i32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pgid)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    // SAFETY: killpg has no memory-safety preconditions.
    let rc = unsafe { libc::killpg(pgid, signal) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Ok(()),
        _ => Err(err),
    }
}

/// Start time of `pid` in clock ticks after boot (field 22 of `/proc/<pid>/stat`).
///
/// Together with the pid this identifies one process: a recycled pid gets a
/// different start time. `None` when the process is gone or there is no procfs.
pub async fn process_start_time(pid: u32) -> Option<u64> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).await.ok()?;
    parse_start_time(&stat)
}

fn parse_start_time(stat: &str) -> Option<u64> {
    // the command name (field 2) may hold spaces and parens; fields resume after the last ')'
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(19)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_time_is_field_twenty_two() {
        let stat = "4242 (sh -c (x)) S 1 4242 4242 0 -1 4194560 97 0 0 0 0 0 0 0 20 0 1 0 987654 2277376 208";
        assert_eq!(parse_start_time(stat), Some(987654));
        assert_eq!(parse_start_time("garbage"), None);
    }

    #[tokio::test]
    async fn start_time_of_live_and_dead_processes() {
        let own = process_start_time(std::process::id()).await;
        assert_eq!(own.is_some(), Path::new("/proc/self/stat").exists());
        assert_eq!(process_start_time(u32::MAX).await, None);
    }
}
