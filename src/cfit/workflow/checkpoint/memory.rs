// SPDX-License-Identifier: MIT

use super::{Checkpoint, CheckpointSaver};
use crate::adk::error::CheckpointError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process checkpoint history, lost at shutdown
pub struct MemorySaver {
    threads: RwLock<Option<HashMap<String, Vec<Checkpoint>>>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(Some(HashMap::new())),
        }
    }

    /// Every checkpoint written for a thread, oldest first
    pub async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let threads = self.threads.read().await;
        let threads = threads.as_ref().ok_or(CheckpointError::Closed)?;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }
}

impl Default for MemorySaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointSaver for MemorySaver {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let threads = self.threads.read().await;
        let threads = threads.as_ref().ok_or(CheckpointError::Closed)?;
        Ok(threads.get(thread_id).and_then(|h| h.last()).cloned())
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut threads = self.threads.write().await;
        let threads = threads.as_mut().ok_or(CheckpointError::Closed)?;
        threads
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), CheckpointError> {
        self.threads.write().await.take();
        Ok(())
    }
}
