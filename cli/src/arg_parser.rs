use clap::{Parser, Subcommand};
use joblib::JobId;
use std::path::PathBuf;

/// Launch shell commands as background jobs and inspect them
#[derive(Debug, Parser)]
#[clap(name = "jobctl", version)]
pub struct ArgParser {
    /// Job store directory (overrides the config file)
    #[clap(short = 'r', long = "root", env = "JOBCTL_ROOT")]
    pub root: Option<PathBuf>,
    /// TOML config file
    #[clap(short = 'c', long = "config", env = "JOBCTL_CONFIG")]
    pub config: Option<PathBuf>,
    /// More log output (-v info, -vv debug, -vvv trace)
    #[clap(short = 'v', long = "verbose", parse(from_occurrences))]
    pub verbose: u8,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum SubCommand {
    /// start a new job and supervise it until it exits
    ///
    /// Only a supervising process records the job's exit status. Ctrl-C stops
    /// the job and keeps supervising until it exits; a second Ctrl-C abandons
    /// it, leaving the job running and its record `running` for good.
    Launch {
        /// label for the job
        name: String,
        /// shell command line to run
        command: String,
        /// print the job id and exit at once; the job keeps running but
        /// nothing will record its exit status
        #[clap(short = 'd', long = "detach")]
        detach: bool,
    },
    /// list all jobs
    List,
    /// show one job's record
    Status {
        /// Uuid v4 string
        job_id: JobId,
    },
    /// follow a job's output until it finishes
    Tail {
        /// Uuid v4 string
        job_id: JobId,
    },
    /// send SIGTERM to a running job
    Stop {
        /// Uuid v4 string
        job_id: JobId,
    },
    /// block until a job finishes and exit with its exit code
    Wait {
        /// Uuid v4 string
        job_id: JobId,
    },
    /// write a report of every job and its output
    Export,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_launch_with_global_flags() {
        let args = ArgParser::try_parse_from([
            "jobctl",
            "-vv",
            "--root",
            "/tmp/jobs",
            "launch",
            "backup",
            "tar czf /tmp/x.tgz /data",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.root, Some(PathBuf::from("/tmp/jobs")));
        assert_eq!(
            args.sub_command,
            SubCommand::Launch {
                name: "backup".into(),
                command: "tar czf /tmp/x.tgz /data".into(),
                detach: false,
            }
        );
    }

    #[test]
    fn launch_can_detach() {
        let args = ArgParser::try_parse_from(["jobctl", "launch", "--detach", "nightly", "sleep 60"])
            .unwrap();
        assert_eq!(
            args.sub_command,
            SubCommand::Launch {
                name: "nightly".into(),
                command: "sleep 60".into(),
                detach: true,
            }
        );
    }

    #[test]
    fn rejects_malformed_job_id() {
        assert!(ArgParser::try_parse_from(["jobctl", "status", "not-a-uuid"]).is_err());
    }
}
