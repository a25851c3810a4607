// SPDX-License-Identifier: MIT

//! WorkflowRunner - one entry point per topology, keyed by thread id
//!
//! Rejects a second concurrent run on a thread that already has one in
//! flight; runs on different threads proceed independently.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::builder::Builder;
use super::checkpoint::CheckpointManager;
use super::graph::{CompiledGraph, NodeStatus, RunEvent};
use super::registry::NodeRegistry;
use super::types::WorkflowDefinition;
use crate::adk::error::{GraphError, RunError};

/// Summary of a registered topology
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowInfo {
    pub name: String,
    pub description: String,
    pub nodes: Vec<String>,
}

/// Removes the thread from the in-flight set when the run ends, however it ends
struct ThreadGuard {
    thread_id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.thread_id);
    }
}

#[derive(Clone)]
pub struct WorkflowRunner {
    graphs: HashMap<String, CompiledGraph>,
    descriptions: HashMap<String, String>,
    checkpoints: CheckpointManager,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl WorkflowRunner {
    pub fn new(checkpoints: CheckpointManager) -> Self {
        Self {
            graphs: HashMap::new(),
            descriptions: HashMap::new(),
            checkpoints,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Build and register every definition. Any invalid topology fails the
    /// whole set before a single run can start.
    pub async fn from_definitions(
        defs: &[WorkflowDefinition],
        registry: NodeRegistry,
        checkpoints: CheckpointManager,
    ) -> Result<Self, GraphError> {
        let builder = Builder::new(registry);
        let mut runner = Self::new(checkpoints);
        for def in defs {
            let graph = builder.build_graph(def).await?;
            log::info!("Registered workflow '{}'", def.name);
            runner.insert(graph.compile(runner.checkpoints.clone()), &def.description);
        }
        Ok(runner)
    }

    pub fn insert(&mut self, graph: CompiledGraph, description: &str) {
        let name = graph.name().to_string();
        self.descriptions.insert(name.clone(), description.to_string());
        self.graphs.insert(name, graph);
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn graph(&self, workflow: &str) -> Option<&CompiledGraph> {
        self.graphs.get(workflow)
    }

    /// Registered topologies, sorted by name
    pub fn workflows(&self) -> Vec<WorkflowInfo> {
        let mut infos: Vec<WorkflowInfo> = self
            .graphs
            .values()
            .map(|g| WorkflowInfo {
                name: g.name().to_string(),
                description: self.descriptions.get(g.name()).cloned().unwrap_or_default(),
                nodes: g.graph().nodes().iter().map(|n| n.name.clone()).collect(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn run(
        &self,
        workflow: &str,
        thread_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, RunError> {
        self.run_stream(workflow, thread_id, fields, None).await
    }

    pub async fn run_stream(
        &self,
        workflow: &str,
        thread_id: &str,
        fields: Map<String, Value>,
        events: Option<mpsc::Sender<RunEvent>>,
    ) -> Result<Value, RunError> {
        let graph = self
            .graphs
            .get(workflow)
            .ok_or_else(|| RunError::UnknownWorkflow(workflow.to_string()))?;

        let _guard = self.acquire(thread_id)?;
        graph.invoke_stream(thread_id, fields, events).await
    }

    /// Latest checkpointed document for a thread; empty object when unknown
    pub async fn state(&self, thread_id: &str) -> Result<Value, RunError> {
        Ok(Value::Object(self.checkpoints.load(thread_id).await?))
    }

    /// Node statuses of `workflow` as recorded by the thread's latest checkpoint
    pub async fn progress(
        &self,
        workflow: &str,
        thread_id: &str,
    ) -> Result<Vec<(String, NodeStatus)>, RunError> {
        let graph = self
            .graphs
            .get(workflow)
            .ok_or_else(|| RunError::UnknownWorkflow(workflow.to_string()))?;
        graph.node_statuses(thread_id).await
    }

    fn acquire(&self, thread_id: &str) -> Result<ThreadGuard, RunError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(thread_id.to_string()) {
            log::warn!("Rejecting concurrent run on thread {}", thread_id);
            return Err(RunError::ThreadBusy(thread_id.to_string()));
        }
        Ok(ThreadGuard {
            thread_id: thread_id.to_string(),
            in_flight: self.in_flight.clone(),
        })
    }
}
