//! Persistent JSON-lines record of every alert.
//!
//! One line per alert, in arrival order, appended to a single file. The file
//! and its parent directory are created on the first alert.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::alert::Alert;
use crate::fanout::{AlertSubscriber, SubscriberError};

/// Block size used when scanning the log backwards.
const READ_CHUNK_BYTES: u64 = 8 * 1024;

/// Append-only incident log.
pub struct IncidentLog {
    path: PathBuf,
    /// Opened lazily. Readers open their own handle and never take this lock.
    file: Mutex<Option<File>>,
    written: AtomicU64,
}

impl IncidentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
            written: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written by this instance.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Appends one line for `alert` and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub async fn append(&self, alert: &Alert) -> Result<(), SubscriberError> {
        let mut line = serde_json::to_vec(alert)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(file) = guard.as_mut() else {
            return Err(SubscriberError::Other("incident log is not open".into()));
        };

        if let Err(e) = write_line(file, &line).await {
            // Reopen on the next alert in case the file was rotated away.
            guard.take();
            return Err(e.into());
        }
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns up to `limit` logged alerts, newest first.
    ///
    /// Reads backwards from the end of the file and stops as soon as `limit`
    /// entries are found. A missing file reads as empty. Lines that are not
    /// valid JSON, including a line still being appended, are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn read_recent(&self, limit: usize) -> Result<Vec<Value>, SubscriberError> {
        let mut entries = Vec::new();
        if limit == 0 {
            return Ok(entries);
        }

        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        let mut end = file.metadata().await?.len();
        // Start of a line whose beginning lies in an earlier block.
        let mut partial: Vec<u8> = Vec::new();

        while end > 0 && entries.len() < limit {
            let start = end.saturating_sub(READ_CHUNK_BYTES);
            let mut block = vec![0u8; (end - start) as usize];
            file.seek(SeekFrom::Start(start)).await?;
            file.read_exact(&mut block).await?;
            block.extend_from_slice(&partial);
            end = start;

            let mut lines = block.split(|b| *b == b'\n');
            let first = if end > 0 { lines.next() } else { None };
            for line in lines.rev() {
                if entries.len() == limit {
                    break;
                }
                if let Ok(value) = serde_json::from_slice(line) {
                    entries.push(value);
                }
            }
            partial = first.map(<[u8]>::to_vec).unwrap_or_default();
        }

        Ok(entries)
    }

    async fn open(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        log::info!("[IncidentLog] Appending to {}", self.path.display());
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

#[async_trait]
impl AlertSubscriber for IncidentLog {
    fn name(&self) -> &str {
        "incident-log"
    }

    async fn on_alert(&self, alert: Arc<Alert>) -> Result<(), SubscriberError> {
        self.append(&alert).await
    }
}
