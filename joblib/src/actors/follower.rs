mod actor;

use crate::error::{Error, Result};
use crate::store::JobStore;
use crate::types::JobId;
use actor::Actor;
use futures::Stream;
use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{fs, sync::mpsc};

const LINE_BUFFER: usize = 256;
/// Longer lines are delivered in pieces of this many bytes.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Lines of one job's log, following new output while the job runs.
///
/// The stream ends once the job is finished and its log has been read to the end.
/// Dropping it stops the background reader. Every call to
/// [`LogLines::follow`] starts again from the first line.
pub struct LogLines {
    lines: mpsc::Receiver<Result<String>>,
}

impl LogLines {
    pub async fn follow(store: JobStore, job_id: JobId, poll_interval: Duration) -> Result<Self> {
        let log = fs::File::open(store.log_path(&job_id))
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => Error::NotFound(job_id.to_string()),
                _ => Error::Io(err),
            })?;
        let (tx, lines) = mpsc::channel(LINE_BUFFER);
        Actor::spawn(store, job_id, poll_interval, log, tx);
        Ok(Self { lines })
    }

    /// Next line, or `None` once the log is exhausted.
    pub async fn next_line(&mut self) -> Option<Result<String>> {
        self.lines.recv().await
    }
}

impl Stream for LogLines {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.lines.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn overlong_lines_are_split() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        let record = store.create("noisy", "cat big.bin").await.unwrap();
        store
            .append_log(&record.id, &vec![b'x'; MAX_LINE_BYTES + 10])
            .await
            .unwrap();
        store.append_log(&record.id, b"\nshort\n").await.unwrap();
        store.set_terminal(&record.id, 0).await.unwrap();

        let follow = LogLines::follow(store, record.id, Duration::from_millis(10))
            .await
            .unwrap();
        let lines: Vec<String> = follow.map(|line| line.unwrap()).collect().await;
        let lengths: Vec<usize> = lines.iter().map(String::len).collect();
        assert_eq!(lengths, vec![MAX_LINE_BYTES, 10, 5]);
        assert_eq!(lines[2], "short");
    }

    #[tokio::test]
    async fn line_split_across_reads_is_joined() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        let record = store.create("slow", "true").await.unwrap();
        store.append_log(&record.id, b"hel").await.unwrap();

        let mut follow = LogLines::follow(store.clone(), record.id, Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.append_log(&record.id, b"lo\nworld").await.unwrap();
        assert_eq!(follow.next_line().await.unwrap().unwrap(), "hello");

        store.set_terminal(&record.id, 0).await.unwrap();
        assert_eq!(follow.next_line().await.unwrap().unwrap(), "world");
        assert!(follow.next_line().await.is_none());
    }
}
