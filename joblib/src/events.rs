use serde::{Deserialize, Serialize};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// Exit code recorded when the command could not be started at all.
pub const SPAWN_FAILED_EXIT_CODE: i32 = -1;
/// Exit code recorded when the process ran but its exit status was lost.
pub const WAIT_FAILED_EXIT_CODE: i32 = -2;

/// Lifecycle of a job. The exit code only exists once the job is finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Finished { exit_code: i32 },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Finished { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            JobStatus::Running => None,
            JobStatus::Finished { exit_code } => Some(*exit_code),
        }
    }

    /// Status token as persisted and displayed.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Finished { .. } => "finished",
        }
    }
}

/// Map a process exit status to the recorded exit code, using the shell's
/// `128 + signal` convention for processes killed by a signal.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        code
    } else if let Some(signal) = status.signal() {
        128 + signal
    } else {
        WAIT_FAILED_EXIT_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_of_maps_codes_and_signals() {
        // raw wait statuses: exit code lives in the high byte, signal in the low bits
        assert_eq!(exit_code_of(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code_of(ExitStatus::from_raw(7 << 8)), 7);
        assert_eq!(exit_code_of(ExitStatus::from_raw(libc::SIGTERM)), 128 + 15);
    }

    #[test]
    fn finished_status_carries_exit_code() {
        let status = JobStatus::Finished { exit_code: 3 };
        assert!(status.is_finished());
        assert_eq!(status.exit_code(), Some(3));
        assert_eq!(JobStatus::Running.exit_code(), None);
        assert_eq!(status.as_str(), "finished");
    }
}
