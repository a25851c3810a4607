// SPDX-License-Identifier: MIT

//! Checkpoint persistence for resumable workflow runs
//!
//! One logical record per thread identifier. Savers are append-only
//! underneath; only the latest record is ever read back.

mod file;
mod memory;

pub use file::FileSaver;
pub use memory::MemorySaver;

use crate::adk::error::CheckpointError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Outcome of the run that wrote a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Written at a super-step barrier; more nodes remain
    Running,
    /// Graph exhausted
    Completed,
    /// A node failed; the run was aborted
    Failed,
}

/// A persisted Job State snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Name of the graph that wrote this record; empty for direct saves
    #[serde(default)]
    pub workflow: String,
    /// Super-step counter at the time of the write
    #[serde(default)]
    pub step: u64,
    pub status: RunStatus,
    /// Nodes done in the run that wrote this record
    #[serde(default)]
    pub completed: Vec<String>,
    pub values: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Whether a new run of `workflow` should skip the nodes in `completed`
    pub fn resumable_by(&self, workflow: &str) -> bool {
        self.workflow == workflow && matches!(self.status, RunStatus::Running | RunStatus::Failed)
    }
}

/// Storage backend for checkpoints
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Latest checkpoint for a thread, if any
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Append a checkpoint; it becomes the thread's latest
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Release the backend at process shutdown
    async fn close(&self) -> Result<(), CheckpointError>;
}

/// Thread identifiers double as file names, so keep them plain
pub(crate) fn validate_thread_id(thread_id: &str) -> Result<(), CheckpointError> {
    let valid = !thread_id.is_empty()
        && thread_id.len() <= 128
        && !thread_id.starts_with('.')
        && thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidThreadId(thread_id.to_string()))
    }
}

/// Process-wide handle to the checkpoint backend.
///
/// Opened once at start and shared by every run; clones share the backend.
#[derive(Clone)]
pub struct CheckpointManager {
    saver: Arc<dyn CheckpointSaver>,
}

impl CheckpointManager {
    pub fn new(saver: Arc<dyn CheckpointSaver>) -> Self {
        Self { saver }
    }

    /// Manager over a fresh in-memory backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySaver::new()))
    }

    /// Job State of the latest checkpoint; empty when the thread is unknown
    pub async fn load(&self, thread_id: &str) -> Result<Map<String, Value>, CheckpointError> {
        Ok(self
            .latest(thread_id)
            .await?
            .map(|cp| cp.values)
            .unwrap_or_default())
    }

    /// Persist a Job State outside of any graph run
    pub async fn save(
        &self,
        thread_id: &str,
        values: &Map<String, Value>,
    ) -> Result<(), CheckpointError> {
        self.put(Checkpoint {
            thread_id: thread_id.to_string(),
            workflow: String::new(),
            step: 0,
            status: RunStatus::Completed,
            completed: Vec::new(),
            values: values.clone(),
            updated_at: Utc::now(),
        })
        .await
    }

    pub async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        validate_thread_id(thread_id)?;
        self.saver.get(thread_id).await
    }

    pub async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        validate_thread_id(&checkpoint.thread_id)?;
        log::debug!(
            "Checkpoint thread={} workflow={} step={} status={:?}",
            checkpoint.thread_id,
            checkpoint.workflow,
            checkpoint.step,
            checkpoint.status
        );
        self.saver.put(&checkpoint).await
    }

    pub async fn close(&self) -> Result<(), CheckpointError> {
        self.saver.close().await
    }
}
