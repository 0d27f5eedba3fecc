use super::MAX_LINE_BYTES;
use crate::error::Result;
use crate::store::JobStore;
use crate::types::JobId;

use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::{fs::File, io::AsyncReadExt, select, sync::mpsc};
use tracing::debug;

pub struct Actor {
    store: JobStore,
    job_id: JobId,
    poll_interval: Duration,
    log: File,
    buffer: BytesMut,
    // bytes at the front of `buffer` already known to hold no newline
    scanned: usize,
    lines: mpsc::Sender<Result<String>>,
}

impl Actor {
    pub fn spawn(
        store: JobStore,
        job_id: JobId,
        poll_interval: Duration,
        log: File,
        lines: mpsc::Sender<Result<String>>,
    ) {
        let actor = Self {
            store,
            job_id,
            poll_interval,
            log,
            buffer: BytesMut::with_capacity(4096),
            scanned: 0,
            lines,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        loop {
            match self.log.read_buf(&mut self.buffer).await {
                Ok(n) if n > 0 => {
                    if !self.emit_lines().await {
                        return; // reader dropped
                    }
                }
                Ok(_) => {
                    // caught up with the writer; only a finished job ends the stream
                    match self.store.read(&self.job_id).await {
                        Ok(record) if record.status.is_finished() => {
                            self.drain().await;
                            return;
                        }
                        Ok(_) => {
                            select! {
                                _ = tokio::time::sleep(self.poll_interval) => {}
                                _ = self.lines.closed() => return,
                            }
                        }
                        Err(err) => {
                            let _ = self.lines.send(Err(err)).await;
                            return;
                        }
                    }
                }
                Err(err) => {
                    let _ = self.lines.send(Err(err.into())).await;
                    return;
                }
            }
        }
    }

    /// Read whatever is left after the job finished, including a last line
    /// without a trailing newline.
    async fn drain(&mut self) {
        loop {
            match self.log.read_buf(&mut self.buffer).await {
                Ok(n) if n > 0 => {
                    if !self.emit_lines().await {
                        return;
                    }
                }
                Ok(_) => break,
                Err(err) => {
                    let _ = self.lines.send(Err(err.into())).await;
                    return;
                }
            }
        }
        if !self.buffer.is_empty() {
            self.scanned = 0;
            let rest = self.buffer.split();
            let _ = self
                .lines
                .send(Ok(String::from_utf8_lossy(&rest).into_owned()))
                .await;
        }
        debug!("job {}: log follow complete", self.job_id);
    }

    /// Send every complete line in the buffer, and any run of [`MAX_LINE_BYTES`]
    /// without a newline as a line of its own. Returns false once nobody is listening.
    async fn emit_lines(&mut self) -> bool {
        loop {
            let window = self.buffer.len().min(MAX_LINE_BYTES + 1);
            let newline = self.buffer[self.scanned..window]
                .iter()
                .position(|b| *b == b'\n');
            let line = match newline {
                Some(pos) => {
                    let line = self.buffer.split_to(self.scanned + pos);
                    self.buffer.advance(1); // the newline itself
                    line
                }
                None if self.buffer.len() > MAX_LINE_BYTES => self.buffer.split_to(MAX_LINE_BYTES),
                None => {
                    self.scanned = window;
                    return true;
                }
            };
            self.scanned = 0;
            let line = String::from_utf8_lossy(&line).into_owned();
            if self.lines.send(Ok(line)).await.is_err() {
                return false;
            }
        }
    }
}
