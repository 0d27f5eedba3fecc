use anyhow::{Context, Result};
use futures::StreamExt;
use joblib::{registry, JobCoordinator, JobId, JobStatus};
use std::io::Write;

// what a shell reports for a process ended by SIGINT
const INTERRUPTED_EXIT_CODE: i32 = 130;

pub struct JobCli {
    inner: JobCoordinator,
}

impl JobCli {
    pub fn new(coordinator: JobCoordinator) -> Self {
        Self { inner: coordinator }
    }

    /// Launch a job, print its id, then stay alive as its supervisor so the
    /// exit code gets recorded. Returns the job's exit code.
    ///
    /// The job runs in its own process group, so Ctrl-C reaches only this
    /// process. The first one stops the job and keeps supervising; the second
    /// abandons it.
    pub async fn launch(&self, name: &str, command: &str) -> Result<i32> {
        let job_id = self.start(name, command).await?;

        let wait = self.inner.wait(&job_id);
        tokio::pin!(wait);
        let mut stopping = false;
        let status = loop {
            tokio::select! {
                status = &mut wait => break status?,
                _ = tokio::signal::ctrl_c() => {
                    if stopping {
                        eprintln!(
                            "warning: abandoning job {}; it may keep running and will stay `running`",
                            job_id
                        );
                        return Ok(INTERRUPTED_EXIT_CODE);
                    }
                    stopping = true;
                    eprintln!("stopping job {} (Ctrl-C again to abandon it)", job_id);
                    if let Err(err) = self.inner.stop(&job_id).await {
                        eprintln!("failed to stop job {}: {}", job_id, err);
                    }
                }
            }
        };
        let exit_code = exit_code(status);
        eprintln!("job {} finished with exit code {}", job_id, exit_code);
        Ok(exit_code)
    }

    /// Launch a job and return without supervising it.
    pub async fn launch_detached(&self, name: &str, command: &str) -> Result<()> {
        let job_id = self.start(name, command).await?;
        eprintln!(
            "warning: job {} is detached; it keeps running but its exit status will not be recorded",
            job_id
        );
        Ok(())
    }

    async fn start(&self, name: &str, command: &str) -> Result<JobId> {
        let job_id = self.inner.launch(name, command).await?;
        println!("{}", job_id);
        std::io::stdout().flush()?;
        Ok(job_id)
    }

    pub async fn list(&self) -> Result<()> {
        let rows = self.inner.list_jobs().await?;
        print!("{}", registry::render_table(&rows));
        Ok(())
    }

    pub async fn status(&self, job_id: JobId) -> Result<()> {
        let record = self.inner.read(&job_id).await?;
        println!("id:       {}", record.id);
        println!("name:     {}", record.name);
        println!("command:  {}", record.command);
        println!("status:   {}", record.status.as_str());
        if let Some(code) = record.status.exit_code() {
            println!("exit:     {}", code);
        }
        if let Some(pid) = record.pid {
            println!("pid:      {}", pid);
        }
        println!("created:  {}", record.created_at.to_rfc3339());
        if let Some(finished_at) = record.finished_at {
            println!("finished: {}", finished_at.to_rfc3339());
        }
        if let Some(err) = record.spawn_error {
            println!("error:    {}", err);
        }
        println!("log:      {}", self.inner.store().log_path(&job_id).display());
        Ok(())
    }

    /// Print the job's log as it grows. Ctrl-C stops following, not the job.
    pub async fn tail(&self, job_id: JobId) -> Result<()> {
        let mut lines = self.inner.tail(&job_id).await?;
        loop {
            tokio::select! {
                line = lines.next() => match line {
                    Some(line) => println!("{}", line?),
                    None => return Ok(()),
                },
                _ = tokio::signal::ctrl_c() => return Ok(()),
            }
        }
    }

    pub async fn stop(&self, job_id: JobId) -> Result<()> {
        self.inner.stop(&job_id).await?;
        println!("Sent SIGTERM to job {}", job_id);
        Ok(())
    }

    pub async fn wait(&self, job_id: JobId) -> Result<i32> {
        Ok(exit_code(self.inner.wait(&job_id).await?))
    }

    pub async fn export(&self) -> Result<()> {
        let report = self.inner.export().await.context("export failed")?;
        println!("{}", report.path.display());
        Ok(())
    }
}

fn exit_code(status: JobStatus) -> i32 {
    status.exit_code().unwrap_or(joblib::WAIT_FAILED_EXIT_CODE)
}
