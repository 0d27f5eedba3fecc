use crate::error::{Error, Result};
use crate::events::{JobStatus, SPAWN_FAILED_EXIT_CODE};
use crate::types::{Command, JobId, Name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

const JOBS_DIR: &str = "jobs";
const REPORTS_DIR: &str = "reports";
const RECORD_FILE: &str = "job.json";
const LOG_FILE: &str = "output.log";

/// Everything persisted about one job, stored as a single JSON document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub name: Name,
    pub command: Command,
    #[serde(flatten)]
    pub status: JobStatus,
    /// Advisory. The spawned shell leads its own process group, so this is also the pgid.
    pub pid: Option<u32>,
    /// Start time of `pid` in clock ticks after boot, telling it apart from a recycled pid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_started: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_error: Option<String>,
}

impl JobRecord {
    fn new(name: &str, command: &str) -> Self {
        Self {
            id: JobId::new(),
            name: name.to_string(),
            command: command.to_string(),
            status: JobStatus::Running,
            pid: None,
            pid_started: None,
            created_at: Utc::now(),
            finished_at: None,
            spawn_error: None,
        }
    }
}

/// One entry of [`JobStore::list`]. `record` is `None` when the job's metadata
/// is missing or cannot be decoded; the entry is still reported.
#[derive(Clone, Debug)]
pub struct JobSummary {
    /// Name of the job's directory, which is its id unless the store was tampered with.
    pub key: String,
    pub record: Option<JobRecord>,
    pub log_path: PathBuf,
}

/// Filesystem-backed store with one directory per job:
///
/// ```text
/// <root>/jobs/<id>/job.json     record
/// <root>/jobs/<id>/output.log   merged stdout and stderr
/// <root>/reports/               exported reports
/// ```
///
/// Records are replaced by writing a temporary file and renaming it into place,
/// so a reader sees either the old or the new record and never a mix of both.
#[derive(Clone, Debug)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join(JOBS_DIR)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join(REPORTS_DIR)
    }

    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.jobs_dir().join(id.to_string())
    }

    pub fn log_path(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join(LOG_FILE)
    }

    /// Allocate a new job: its directory, an empty log and a `running` record all
    /// exist before this returns.
    pub async fn create(&self, name: &str, command: &str) -> Result<JobRecord> {
        fs::create_dir_all(self.jobs_dir())
            .await
            .map_err(Error::Allocation)?;

        let record = JobRecord::new(name, command);
        let dir = self.job_dir(&record.id);
        // create_dir fails on an existing directory, so an id is never reused
        fs::create_dir(&dir).await.map_err(Error::Allocation)?;

        if let Err(err) = self.init_job_dir(&dir, &record).await {
            let _ = fs::remove_dir_all(&dir).await;
            return Err(Error::Allocation(err));
        }
        debug!("created job {} in {}", record.id, dir.display());
        Ok(record)
    }

    async fn init_job_dir(&self, dir: &Path, record: &JobRecord) -> io::Result<()> {
        fs::OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(dir.join(LOG_FILE))
            .await?;
        write_record(dir, record).await
    }

    /// Append raw bytes to a job's log.
    pub async fn append_log(&self, id: &JobId, bytes: &[u8]) -> Result<()> {
        let mut log = fs::OpenOptions::new()
            .append(true)
            .open(self.log_path(id))
            .await
            .map_err(|err| not_found_or(err, id))?;
        log.write_all(bytes).await?;
        log.flush().await?;
        Ok(())
    }

    /// Record the spawned process id and its start time. Never touches the status.
    pub async fn set_pid(&self, id: &JobId, pid: u32, started: Option<u64>) -> Result<JobRecord> {
        self.update(id, |record| {
            record.pid = Some(pid);
            record.pid_started = started;
        })
        .await
    }

    /// Mark a job finished with `exit_code`. Safe to repeat; the last call wins.
    pub async fn set_terminal(&self, id: &JobId, exit_code: i32) -> Result<JobRecord> {
        self.update(id, |record| finish(record, exit_code)).await
    }

    /// Finalize a job whose command never started.
    pub async fn set_spawn_failure(&self, id: &JobId, message: &str) -> Result<JobRecord> {
        self.append_log(id, format!("failed to start job: {}\n", message).as_bytes())
            .await?;
        self.update(id, |record| {
            record.spawn_error = Some(message.to_string());
            finish(record, SPAWN_FAILED_EXIT_CODE);
        })
        .await
    }

    pub async fn read(&self, id: &JobId) -> Result<JobRecord> {
        read_record(&self.job_dir(id))
            .await
            .map_err(|err| match err {
                Error::Io(io) => not_found_or(io, id),
                other => other,
            })
    }

    /// Every job directory under the store, ordered by creation time then key.
    pub async fn list(&self) -> Result<Vec<JobSummary>> {
        let mut entries = match fs::read_dir(self.jobs_dir()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut summaries = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    // the directory stream cannot be resumed; keep what was read
                    warn!("job listing cut short: {}", err);
                    break;
                }
            };
            let key = entry.file_name().to_string_lossy().into_owned();
            match entry.file_type().await {
                Ok(file_type) if !file_type.is_dir() => continue,
                Ok(_) => {}
                // still listed; reading the record below decides what is shown
                Err(err) => warn!("cannot stat job entry {}: {}", key, err),
            }
            let dir = entry.path();
            let record = match read_record(&dir).await {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!("unreadable record for job {}: {}", key, err);
                    None
                }
            };
            summaries.push(JobSummary {
                key,
                record,
                log_path: dir.join(LOG_FILE),
            });
        }
        summaries.sort_by(compare_summaries);
        Ok(summaries)
    }

    async fn update<F>(&self, id: &JobId, mutate: F) -> Result<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut record = self.read(id).await?;
        mutate(&mut record);
        write_record(&self.job_dir(id), &record).await?;
        debug!("job {} record updated: {}", id, record.status.as_str());
        Ok(record)
    }
}

fn finish(record: &mut JobRecord, exit_code: i32) {
    record.status = JobStatus::Finished { exit_code };
    record.finished_at = Some(Utc::now());
}

fn not_found_or(err: io::Error, id: &JobId) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::NotFound(id.to_string())
    } else {
        Error::Io(err)
    }
}

// records without metadata sort last
fn compare_summaries(a: &JobSummary, b: &JobSummary) -> Ordering {
    let created = |s: &JobSummary| s.record.as_ref().map(|r| r.created_at);
    match (created(a), created(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.key.cmp(&b.key))
}

async fn read_record(dir: &Path) -> Result<JobRecord> {
    let bytes = fs::read(dir.join(RECORD_FILE)).await?;
    serde_json::from_slice(&bytes).map_err(|source| Error::Malformed {
        id: dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        source,
    })
}

async fn write_record(dir: &Path, record: &JobRecord) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(record)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    // unique temp name so concurrent writers never share a half-written file
    let tmp = dir.join(format!(".{}.{}.tmp", RECORD_FILE, JobId::new()));
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);
    if let Err(err) = fs::rename(&tmp, dir.join(RECORD_FILE)).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err);
    }
    Ok(())
}
