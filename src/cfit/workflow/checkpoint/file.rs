// SPDX-License-Identifier: MIT

//! Append-only JSONL checkpoint log, one file per thread
//!
//! Each `put` opens the thread's log, appends one JSON line, syncs it and
//! closes the file again. `get` returns the last line that parses, so a
//! write torn by a crash costs one record, never the thread. A torn tail is
//! terminated before the next record is appended.

use super::{Checkpoint, CheckpointSaver};
use crate::adk::error::CheckpointError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

/// Per-thread write locks; an entry lives only while a write holds it
type Locks = HashMap<String, Arc<Mutex<()>>>;

/// File-backed checkpoint saver. Open once per process; no file handle is
/// held between writes. `close` refuses further reads and writes.
pub struct FileSaver {
    dir: PathBuf,
    locks: Mutex<Option<Locks>>,
}

impl FileSaver {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CheckpointError::io(format!("creating {}", dir.display()), e))?;
        log::info!("Checkpoint log opened at {}", dir.display());

        Ok(Self {
            dir,
            locks: Mutex::new(Some(HashMap::new())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", thread_id))
    }

    async fn lock_for(&self, thread_id: &str) -> Result<Arc<Mutex<()>>, CheckpointError> {
        let mut locks = self.locks.lock().await;
        let locks = locks.as_mut().ok_or(CheckpointError::Closed)?;
        Ok(locks.entry(thread_id.to_string()).or_default().clone())
    }

    /// Drop the thread's lock entry once no other writer is waiting on it.
    /// Clones are only taken under the map lock, so the count is stable here.
    async fn release(&self, thread_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if let Some(locks) = locks.as_mut() {
            if Arc::strong_count(&lock) == 2 {
                locks.remove(thread_id);
            }
        }
    }

    async fn append(&self, thread_id: &str, line: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(thread_id);
        let context = || format!("appending to {}", path.display());

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CheckpointError::io(context(), e))?;

        let len = file
            .metadata()
            .await
            .map_err(|e| CheckpointError::io(context(), e))?
            .len();
        let mut record = String::with_capacity(line.len() + 2);
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))
                .await
                .map_err(|e| CheckpointError::io(context(), e))?;
            file.read_exact(&mut last)
                .await
                .map_err(|e| CheckpointError::io(context(), e))?;
            if last[0] != b'\n' {
                log::warn!("Terminating torn checkpoint line in {}", path.display());
                record.push('\n');
            }
        }
        record.push_str(line);
        record.push('\n');

        file.write_all(record.as_bytes())
            .await
            .map_err(|e| CheckpointError::io(context(), e))?;
        file.sync_data()
            .await
            .map_err(|e| CheckpointError::io(context(), e))?;
        Ok(())
    }

    async fn ensure_open(&self) -> Result<(), CheckpointError> {
        if self.locks.lock().await.is_none() {
            return Err(CheckpointError::Closed);
        }
        Ok(())
    }

    #[cfg(test)]
    async fn held_locks(&self) -> usize {
        self.locks.lock().await.as_ref().map_or(0, HashMap::len)
    }
}

/// Last line of the log that parses as a checkpoint
fn latest_record(content: &str, thread_id: &str) -> Option<Checkpoint> {
    for line in content.lines().rev().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<Checkpoint>(line) {
            Ok(checkpoint) => return Some(checkpoint),
            Err(e) => log::warn!("Skipping unreadable checkpoint line for {}: {}", thread_id, e),
        }
    }
    None
}

#[async_trait]
impl CheckpointSaver for FileSaver {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        self.ensure_open().await?;
        let path = self.path_for(thread_id);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CheckpointError::io(format!("reading {}", path.display()), e));
            }
        };

        Ok(latest_record(&content, thread_id))
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let line = serde_json::to_string(checkpoint)?;
        let thread_id = checkpoint.thread_id.as_str();

        let lock = self.lock_for(thread_id).await?;
        let written = {
            let _guard = lock.lock().await;
            self.append(thread_id, &line).await
        };
        self.release(thread_id, lock).await;
        written
    }

    async fn close(&self) -> Result<(), CheckpointError> {
        if self.locks.lock().await.take().is_some() {
            log::info!("Checkpoint log at {} closed", self.dir.display());
        }
        Ok(())
    }
}
