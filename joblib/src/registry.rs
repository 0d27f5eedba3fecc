use crate::error::Result;
use crate::events::JobStatus;
use crate::store::{JobStore, JobSummary};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::PathBuf;

/// Shown for any field whose metadata is missing or unreadable.
pub const PLACEHOLDER: &str = "unknown";
/// Shown as the exit code of a job that is still running.
pub const NO_EXIT_CODE: &str = "-";

/// One human-oriented line of the job listing.
#[derive(Clone, Debug, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub status: String,
    pub exit_code: String,
    pub name: String,
    pub created_at: String,
    pub log_path: PathBuf,
    /// Parsed status, when the record could be read.
    pub job_status: Option<JobStatus>,
}

impl From<JobSummary> for JobRow {
    fn from(summary: JobSummary) -> Self {
        match summary.record {
            Some(record) => Self {
                id: record.id.to_string(),
                status: record.status.as_str().to_string(),
                exit_code: record
                    .status
                    .exit_code()
                    .map_or_else(|| NO_EXIT_CODE.to_string(), |code| code.to_string()),
                name: record.name,
                created_at: timestamp(&record.created_at),
                log_path: summary.log_path,
                job_status: Some(record.status),
            },
            None => Self {
                id: summary.key,
                status: PLACEHOLDER.to_string(),
                exit_code: PLACEHOLDER.to_string(),
                name: PLACEHOLDER.to_string(),
                created_at: PLACEHOLDER.to_string(),
                log_path: summary.log_path,
                job_status: None,
            },
        }
    }
}

/// All known jobs, oldest first. A job with broken metadata still gets a row.
pub async fn list_jobs(store: &JobStore) -> Result<Vec<JobRow>> {
    Ok(store.list().await?.into_iter().map(JobRow::from).collect())
}

pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render rows as an aligned plain-text table.
pub fn render_table(rows: &[JobRow]) -> String {
    const HEADERS: [&str; 6] = ["ID", "STATUS", "EXIT", "CREATED", "NAME", "LOG"];

    let cells: Vec<[String; 6]> = rows
        .iter()
        .map(|row| {
            [
                row.id.clone(),
                row.status.clone(),
                row.exit_code.clone(),
                row.created_at.clone(),
                single_line(&row.name),
                row.log_path.display().to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for line in &cells {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS.map(String::from), &widths);
    for line in &cells {
        push_line(&mut out, line, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let last = cells.len() - 1;
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if i == last {
            out.push_str(cell);
        } else {
            out.push_str(&format!("{:<width$}  ", cell, width = *width));
        }
    }
    out.push('\n');
}

fn single_line(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn rows_use_placeholders_for_broken_metadata() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        let ok = store.create("ok", "true").await.unwrap();
        store.set_terminal(&ok.id, 0).await.unwrap();
        let running = store.create("running", "sleep 1").await.unwrap();
        let broken = store.create("broken", "true").await.unwrap();
        std::fs::remove_file(store.job_dir(&broken.id).join("job.json")).unwrap();

        let rows = list_jobs(&store).await.unwrap();
        assert_eq!(rows.len(), 3);

        let row = |id: &str| rows.iter().find(|r| r.id == id).unwrap();
        let ok_row = row(&ok.id.to_string());
        assert_eq!((ok_row.status.as_str(), ok_row.exit_code.as_str()), ("finished", "0"));
        assert_eq!(ok_row.name, "ok");

        let running_row = row(&running.id.to_string());
        assert_eq!(running_row.status, "running");
        assert_eq!(running_row.exit_code, NO_EXIT_CODE);

        let broken_row = row(&broken.id.to_string());
        assert_eq!(broken_row.status, PLACEHOLDER);
        assert_eq!(broken_row.exit_code, PLACEHOLDER);
        assert_eq!(broken_row.name, PLACEHOLDER);
        assert_eq!(broken_row.job_status, None);
        assert_eq!(broken_row.log_path, store.log_path(&broken.id));
    }

    #[test]
    fn table_aligns_columns() {
        let rows = vec![JobRow {
            id: "abc".into(),
            status: "running".into(),
            exit_code: NO_EXIT_CODE.into(),
            name: "multi\nline".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            log_path: PathBuf::from("/tmp/abc/output.log"),
            job_status: Some(JobStatus::Running),
        }];
        let table = render_table(&rows);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ID   STATUS   EXIT  CREATED"));
        assert!(lines[1].contains("multi line"));
        assert_eq!(lines[0].find("STATUS"), lines[1].find("running"));
    }
}
