use crate::error::Result;
use crate::registry::{self, render_table, JobRow};
use crate::store::JobStore;
use crate::types::JobId;
use chrono::{DateTime, Utc};
use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufWriter},
};
use tracing::{info, warn};

/// A report written by [`export`].
#[derive(Clone, Debug)]
pub struct Report {
    pub path: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub job_count: usize,
}

/// Write a snapshot of every job (the listing plus each full log) to the
/// store's reports directory.
///
/// Running jobs contribute whatever they have logged so far. A job with broken
/// metadata is rendered with placeholders rather than failing the export.
/// Logs are streamed into the report one at a time.
pub async fn export(store: &JobStore) -> Result<Report> {
    let rows = registry::list_jobs(store).await?;
    let generated_at = Utc::now();

    fs::create_dir_all(store.reports_dir()).await?;
    let suffix: String = JobId::new().to_string().chars().take(8).collect();
    let path = store.reports_dir().join(format!(
        "report-{}-{}.txt",
        generated_at.format("%Y%m%dT%H%M%S%.3fZ"),
        suffix
    ));
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await?;
    let mut out = BufWriter::new(file);
    if let Err(err) = write_report(&mut out, &rows, generated_at).await {
        warn!("export to {} failed: {}", path.display(), err);
        let _ = fs::remove_file(&path).await;
        return Err(err.into());
    }

    info!("exported {} jobs to {}", rows.len(), path.display());
    Ok(Report {
        path,
        generated_at,
        job_count: rows.len(),
    })
}

/// Write the report for `rows` to `out`, copying each job's log as it is right now.
pub async fn write_report<W>(
    out: &mut W,
    rows: &[JobRow],
    generated_at: DateTime<Utc>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!(
        "# job report\ngenerated: {}\njobs: {}\n\n{}",
        registry::timestamp(&generated_at),
        rows.len(),
        render_table(rows)
    );
    out.write_all(header.as_bytes()).await?;

    for row in rows {
        out.write_all(format!("\n===== job {} ({}) =====\n", row.id, row.name).as_bytes())
            .await?;
        if let Err(err) = copy_log(&row.log_path, out).await {
            out.write_all(format!("(log unavailable: {})\n", err).as_bytes())
                .await?;
        }
        out.write_all(format!("===== end {} =====\n", row.id).as_bytes())
            .await?;
    }
    out.flush().await
}

/// Render the report text for `rows` in memory.
pub async fn render_report(rows: &[JobRow], generated_at: DateTime<Utc>) -> String {
    let mut out = Vec::new();
    // writing into a Vec only fails on log reads, which are reported inline
    let _ = write_report(&mut out, rows, generated_at).await;
    String::from_utf8_lossy(&out).into_owned()
}

// copies the log and terminates its last line if the job has not yet done so
async fn copy_log<W>(path: &Path, out: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut log = fs::File::open(path).await?;
    let copied = tokio::io::copy(&mut log, out).await?;
    if copied == 0 {
        return Ok(());
    }
    log.seek(SeekFrom::Start(copied - 1)).await?;
    let mut last = [0u8; 1];
    log.read_exact(&mut last).await?;
    if last[0] != b'\n' {
        out.write_all(b"\n").await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn export_survives_broken_jobs() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());

        let done = store.create("done", "echo done").await.unwrap();
        store.append_log(&done.id, b"done\n").await.unwrap();
        store.set_terminal(&done.id, 0).await.unwrap();

        let partial = store.create("partial", "tail -f x").await.unwrap();
        store.append_log(&partial.id, b"no newline yet").await.unwrap();

        let broken = store.create("broken", "true").await.unwrap();
        std::fs::write(store.job_dir(&broken.id).join("job.json"), b"garbage").unwrap();
        std::fs::remove_file(store.log_path(&broken.id)).unwrap();

        let report = export(&store).await.unwrap();
        assert_eq!(report.job_count, 3);
        assert!(report.path.starts_with(store.reports_dir()));

        let text = std::fs::read_to_string(&report.path).unwrap();
        assert!(text.starts_with("# job report\ngenerated: "));
        assert!(text.contains(&format!("===== job {} (done) =====\ndone\n===== end {} =====", done.id, done.id)));
        assert!(text.contains(&format!("no newline yet\n===== end {} =====", partial.id)));
        assert!(text.contains(&format!("===== job {} (unknown) =====\n(log unavailable:", broken.id)));
    }

    #[tokio::test]
    async fn exports_never_overwrite_each_other() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        let first = export(&store).await.unwrap();
        let second = export(&store).await.unwrap();
        assert_ne!(first.path, second.path);
        assert_eq!(first.job_count, 0);
    }

    #[tokio::test]
    async fn large_logs_are_copied_whole() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        let job = store.create("bulk", "seq 100000").await.unwrap();
        let body: Vec<u8> = (0..40_000u32)
            .flat_map(|n| format!("{}\n", n).into_bytes())
            .chain(b"tail".iter().copied())
            .collect();
        store.append_log(&job.id, &body).await.unwrap();

        let report = export(&store).await.unwrap();
        let text = std::fs::read(&report.path).unwrap();
        let opening = format!("===== job {} (bulk) =====\n", job.id);
        let start = find(&text, opening.as_bytes()).unwrap() + opening.len();
        let closing = format!("\n===== end {} =====\n", job.id);
        let end = find(&text, closing.as_bytes()).unwrap();
        assert_eq!(&text[start..end], &body[..]);

        let rows = registry::list_jobs(&store).await.unwrap();
        let rendered = render_report(&rows, report.generated_at).await;
        assert_eq!(rendered.as_bytes(), &text[..]);
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }
}
