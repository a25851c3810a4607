// SPDX-License-Identifier: MIT

//! Super-step graph executor
//!
//! Each super-step runs every ready node concurrently against the state as
//! of the last barrier, awaits them all, then merges their updates in
//! registration order. A checkpoint is written after every barrier.

use chrono::Utc;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::builder::{Graph, GraphNode};
use super::types::{NodeStatus, RunEvent};
use crate::adk::error::{NodeError, RunError};
use crate::cfit::workflow::checkpoint::{Checkpoint, CheckpointManager, RunStatus};
use crate::cfit::workflow::node::Update;
use crate::cfit::workflow::state::JobState;

/// A graph bound to a checkpoint backend, ready to be invoked per job
#[derive(Clone)]
pub struct CompiledGraph {
    graph: Arc<Graph>,
    checkpoints: CheckpointManager,
}

impl Graph {
    pub fn compile(self, checkpoints: CheckpointManager) -> CompiledGraph {
        CompiledGraph {
            graph: Arc::new(self),
            checkpoints,
        }
    }
}

/// Per-run bookkeeping shared by the super-step loop
struct Run<'a> {
    thread_id: &'a str,
    workflow: &'a str,
    step: u64,
    done: HashSet<String>,
    state: JobState,
    events: Option<mpsc::Sender<RunEvent>>,
}

impl Run<'_> {
    async fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = tx.send(event).await;
        }
    }

    fn completed(&self, order: &[GraphNode]) -> Vec<String> {
        order
            .iter()
            .filter(|n| self.done.contains(&n.name))
            .map(|n| n.name.clone())
            .collect()
    }
}

impl CompiledGraph {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn name(&self) -> &str {
        self.graph.name()
    }

    /// Run to completion or failure and return the merged document
    pub async fn invoke(&self, thread_id: &str, fields: Map<String, Value>) -> Result<Value, RunError> {
        self.invoke_stream(thread_id, fields, None).await
    }

    /// `invoke` that also reports progress on `events`
    pub async fn invoke_stream(
        &self,
        thread_id: &str,
        fields: Map<String, Value>,
        events: Option<mpsc::Sender<RunEvent>>,
    ) -> Result<Value, RunError> {
        let graph = &self.graph;
        let mut state = JobState::new(graph.schema());
        let mut done = HashSet::new();
        let mut step = 0;
        let mut resumed = false;

        if let Some(checkpoint) = self.checkpoints.latest(thread_id).await? {
            if checkpoint.resumable_by(graph.name()) {
                done = checkpoint
                    .completed
                    .iter()
                    .filter(|n| graph.contains(n))
                    .cloned()
                    .collect();
                step = checkpoint.step;
                resumed = true;
            }
            state.hydrate(checkpoint.values);
        }
        state.apply(fields);

        let mut run = Run {
            thread_id,
            workflow: graph.name(),
            step,
            done,
            state,
            events,
        };

        log::info!(
            "Starting workflow '{}' on thread {} (resumed: {}, {} node(s) already done)",
            run.workflow,
            thread_id,
            resumed,
            run.done.len()
        );
        run.emit(RunEvent::RunStarted {
            thread_id: thread_id.to_string(),
            workflow: run.workflow.to_string(),
            resumed,
        })
        .await;

        loop {
            let pending: Vec<&GraphNode> = graph
                .nodes()
                .iter()
                .filter(|n| !run.done.contains(&n.name))
                .collect();
            if pending.is_empty() {
                break;
            }

            let ready: Vec<&GraphNode> = pending
                .iter()
                .copied()
                .filter(|n| n.predecessors.iter().all(|p| run.done.contains(p)))
                .collect();
            if ready.is_empty() {
                let stalled = pending.iter().map(|n| n.name.clone()).collect();
                return Err(RunError::Stalled(stalled));
            }

            run.step += 1;
            let names: Vec<String> = ready.iter().map(|n| n.name.clone()).collect();
            log::info!("Super-step {}: running {:?}", run.step, names);
            run.emit(RunEvent::SuperStep {
                step: run.step,
                nodes: names,
            })
            .await;

            if let Err(err) = self.super_step(&mut run, &ready).await {
                // The node failure is what the caller needs to see
                if let Err(cp_err) = self.checkpoint(&mut run, RunStatus::Failed).await {
                    log::error!(
                        "Could not checkpoint aborted run on thread {}: {}",
                        thread_id,
                        cp_err
                    );
                }
                log::error!("Workflow '{}' aborted on thread {}: {}", run.workflow, thread_id, err);
                return Err(err);
            }
            self.checkpoint(&mut run, RunStatus::Running).await?;
        }

        self.checkpoint(&mut run, RunStatus::Completed).await?;
        log::info!("Workflow '{}' finished on thread {}", run.workflow, thread_id);
        run.emit(RunEvent::RunFinished {
            thread_id: thread_id.to_string(),
        })
        .await;

        Ok(run.state.to_json())
    }

    /// Run the ready set concurrently, then merge in registration order.
    /// Successful siblings of a failed node are still merged.
    async fn super_step(&self, run: &mut Run<'_>, ready: &[&GraphNode]) -> Result<(), RunError> {
        let futures = ready.iter().map(|node| {
            let slice = run.state.slice(node.unit.input_keys());
            let unit = node.unit.clone();
            async move { unit.execute(slice).await }
        });
        let results = join_all(futures).await;

        let mut failure: Option<(String, NodeError)> = None;
        for (node, result) in ready.iter().zip(results) {
            match result {
                Ok(update) => {
                    let update = declared_only(node, update);
                    let keys: Vec<String> = update.keys().cloned().collect();
                    run.state.apply(update);
                    run.done.insert(node.name.clone());
                    log::info!("Node {} completed, wrote {:?}", node.name, keys);
                    run.emit(RunEvent::NodeCompleted {
                        node: node.name.clone(),
                        keys,
                    })
                    .await;
                }
                Err(e) => {
                    log::error!("Node {} failed: {}", node.name, e);
                    run.emit(RunEvent::NodeFailed {
                        node: node.name.clone(),
                        error: e.to_string(),
                    })
                    .await;
                    if failure.is_none() {
                        failure = Some((node.name.clone(), e));
                    }
                }
            }
        }

        match failure {
            Some((node, source)) => Err(RunError::Node { node, source }),
            None => Ok(()),
        }
    }

    async fn checkpoint(&self, run: &mut Run<'_>, status: RunStatus) -> Result<(), RunError> {
        let checkpoint = Checkpoint {
            thread_id: run.thread_id.to_string(),
            workflow: run.workflow.to_string(),
            step: run.step,
            status,
            completed: run.completed(self.graph.nodes()),
            values: run.state.values().clone(),
            updated_at: Utc::now(),
        };
        self.checkpoints.put(checkpoint).await?;
        run.emit(RunEvent::Checkpointed { step: run.step }).await;
        Ok(())
    }

    /// Status of every node as recorded by the thread's latest checkpoint
    pub async fn node_statuses(&self, thread_id: &str) -> Result<Vec<(String, NodeStatus)>, RunError> {
        let checkpoint = self.checkpoints.latest(thread_id).await?;
        let (done, failed) = match &checkpoint {
            Some(cp) if cp.workflow == self.graph.name() => {
                (cp.completed.clone(), cp.status == RunStatus::Failed)
            }
            _ => (Vec::new(), false),
        };

        Ok(self
            .graph
            .nodes()
            .iter()
            .map(|n| {
                let status = if done.contains(&n.name) {
                    NodeStatus::Done
                } else if failed && n.predecessors.iter().all(|p| done.contains(p)) {
                    // Ready when the run aborted; the failed node is among these
                    NodeStatus::Ready
                } else {
                    NodeStatus::Pending
                };
                (n.name.clone(), status)
            })
            .collect())
    }
}

/// Drop keys a node did not declare as outputs
fn declared_only(node: &GraphNode, update: Update) -> Update {
    let declared = node.unit.output_keys();
    update
        .into_iter()
        .filter(|(key, _)| {
            let ok = declared.iter().any(|d| d == key);
            if !ok {
                log::warn!("Node {} wrote undeclared key '{}', dropping it", node.name, key);
            }
            ok
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::{CheckpointError, TransportError};
    use crate::cfit::workflow::checkpoint::{CheckpointSaver, MemorySaver};
    use crate::cfit::workflow::graph::builder::GraphBuilder;
    use crate::cfit::workflow::graph::types::{END, START};
    use crate::cfit::workflow::node::{StateSlice, TaskUnit};
    use crate::cfit::workflow::state::StateSchema;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Writes `value` under its single output key after an optional delay,
    /// recording the slice it was given.
    struct MockUnit {
        name: String,
        inputs: Vec<String>,
        outputs: Vec<String>,
        value: Value,
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
        seen: Mutex<Option<StateSlice>>,
    }

    impl MockUnit {
        fn new(name: &str, inputs: &[&str], output: &str, value: Value) -> Self {
            Self {
                name: name.to_string(),
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                outputs: vec![output.to_string()],
                value,
                delay: Duration::ZERO,
                fail: false,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(None),
            }
        }

        fn delayed(mut self, ms: u64) -> Self {
            self.delay = Duration::from_millis(ms);
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn seen(&self) -> Option<StateSlice> {
            self.seen.lock().unwrap().clone()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskUnit for MockUnit {
        fn name(&self) -> &str {
            &self.name
        }

        fn input_keys(&self) -> &[String] {
            &self.inputs
        }

        fn output_keys(&self) -> &[String] {
            &self.outputs
        }

        async fn execute(&self, slice: StateSlice) -> Result<Update, NodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some(slice);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(NodeError::Transport(TransportError::Timeout {
                    service: "mock".into(),
                }));
            }
            let mut update = Update::new();
            update.insert(self.outputs[0].clone(), self.value.clone());
            Ok(update)
        }
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn chain(units: &[Arc<MockUnit>], schema: StateSchema) -> Graph {
        let mut b = GraphBuilder::new("chain").with_schema(schema);
        let mut prev = START.to_string();
        for unit in units {
            b.add_node(unit.name.clone(), unit.clone());
            b.add_edge(prev.clone(), unit.name.clone());
            prev = unit.name.clone();
        }
        b.add_edge(prev, END);
        b.build().unwrap()
    }

    #[tokio::test]
    async fn test_linear_run_threads_state() {
        let n1 = Arc::new(MockUnit::new("n1", &["input"], "a", json!("from n1")));
        let n2 = Arc::new(MockUnit::new("n2", &["a"], "b", json!("from n2")));
        let graph = chain(&[n1.clone(), n2.clone()], StateSchema::default())
            .compile(CheckpointManager::in_memory());

        let out = graph
            .invoke("t", fields(json!({"input": "hello"})))
            .await
            .unwrap();

        assert_eq!(out["a"], "from n1");
        assert_eq!(out["b"], "from n2");
        assert_eq!(n2.seen(), Some(fields(json!({"a": "from n1"}))));
    }

    #[tokio::test]
    async fn test_fan_in_waits_for_delayed_predecessor() {
        let fast = Arc::new(MockUnit::new("fast", &[], "report", json!({"standard": "s"})));
        let slow = Arc::new(
            MockUnit::new("slow", &[], "report", json!({"deep_dives": "d"})).delayed(100),
        );
        let join = Arc::new(MockUnit::new("join", &["report"], "final_report", json!("f")));

        let mut b =
            GraphBuilder::new("fan").with_schema(StateSchema::accumulating(&["report"]));
        b.add_node("fast", fast.clone())
            .add_node("slow", slow.clone())
            .add_node("join", join.clone())
            .add_edge(START, "fast")
            .add_edge(START, "slow")
            .add_edge("fast", "join")
            .add_edge("slow", "join")
            .add_edge("join", END);
        let graph = b.build().unwrap().compile(CheckpointManager::in_memory());

        graph.invoke("t", Map::new()).await.unwrap();

        assert_eq!(
            join.seen(),
            Some(fields(json!({"report": {"standard": "s", "deep_dives": "d"}})))
        );
        assert_eq!(join.calls(), 1);
    }

    #[tokio::test]
    async fn test_siblings_run_concurrently() {
        let a = Arc::new(MockUnit::new("a", &[], "x", json!(1)).delayed(200));
        let b_unit = Arc::new(MockUnit::new("b", &[], "y", json!(2)).delayed(200));

        let mut b = GraphBuilder::new("par");
        b.add_node("a", a.clone())
            .add_node("b", b_unit.clone())
            .add_edge(START, "a")
            .add_edge(START, "b")
            .add_edge("a", END)
            .add_edge("b", END);
        let graph = b.build().unwrap().compile(CheckpointManager::in_memory());

        let started = std::time::Instant::now();
        graph.invoke("t", Map::new()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(390));
    }

    #[tokio::test]
    async fn test_merge_order_is_registration_order() {
        // "late" finishes first but is registered second, so its value wins
        let early = Arc::new(MockUnit::new("early", &[], "k", json!("early")).delayed(80));
        let late = Arc::new(MockUnit::new("late", &[], "k", json!("late")));

        let mut b = GraphBuilder::new("order");
        b.add_node("early", early)
            .add_node("late", late)
            .add_edge(START, "early")
            .add_edge(START, "late")
            .add_edge("early", END)
            .add_edge("late", END);
        let graph = b.build().unwrap().compile(CheckpointManager::in_memory());

        let out = graph.invoke("t", Map::new()).await.unwrap();
        assert_eq!(out["k"], "late");
    }

    #[tokio::test]
    async fn test_slice_and_declared_outputs_are_enforced() {
        struct Greedy {
            inputs: Vec<String>,
            outputs: Vec<String>,
            seen: Mutex<Option<StateSlice>>,
        }

        #[async_trait]
        impl TaskUnit for Greedy {
            fn name(&self) -> &str {
                "greedy"
            }
            fn input_keys(&self) -> &[String] {
                &self.inputs
            }
            fn output_keys(&self) -> &[String] {
                &self.outputs
            }
            async fn execute(&self, slice: StateSlice) -> Result<Update, NodeError> {
                *self.seen.lock().unwrap() = Some(slice);
                Ok(fields(json!({"allowed": 1, "sneaky": 2})))
            }
        }

        let greedy = Arc::new(Greedy {
            inputs: vec!["resume".into(), "absent".into()],
            outputs: vec!["allowed".into()],
            seen: Mutex::new(None),
        });
        let mut b = GraphBuilder::new("slice");
        b.add_node("greedy", greedy.clone())
            .add_edge(START, "greedy")
            .add_edge("greedy", END);
        let graph = b.build().unwrap().compile(CheckpointManager::in_memory());

        let out = graph
            .invoke("t", fields(json!({"resume": "r", "jd_url": "u"})))
            .await
            .unwrap();

        assert_eq!(
            greedy.seen.lock().unwrap().clone(),
            Some(fields(json!({"resume": "r"})))
        );
        assert_eq!(out["allowed"], 1);
        assert!(out.get("sneaky").is_none());
    }

    #[tokio::test]
    async fn test_abort_and_resume() {
        let manager = CheckpointManager::in_memory();
        let n1 = Arc::new(MockUnit::new("n1", &[], "a", json!(1)));
        let broken = Arc::new(MockUnit::new("n2", &["a"], "b", json!(2)).failing());
        let n3 = Arc::new(MockUnit::new("n3", &["b"], "c", json!(3)));

        let graph = chain(&[n1.clone(), broken.clone(), n3.clone()], StateSchema::default())
            .compile(manager.clone());
        let err = graph.invoke("job", Map::new()).await.unwrap_err();

        assert!(matches!(&err, RunError::Node { node, .. } if node == "n2"));
        assert!(err.transport().is_some_and(|t| t.is_timeout()));
        assert_eq!(n3.calls(), 0);

        let saved = manager.load("job").await.unwrap();
        assert_eq!(saved.get("a"), Some(&json!(1)));
        assert!(saved.get("c").is_none());
        let latest = manager.latest("job").await.unwrap().unwrap();
        assert_eq!(latest.status, RunStatus::Failed);
        assert_eq!(latest.completed, vec!["n1"]);

        let statuses = graph.node_statuses("job").await.unwrap();
        assert_eq!(statuses[0], ("n1".to_string(), NodeStatus::Done));
        assert_eq!(statuses[1], ("n2".to_string(), NodeStatus::Ready));
        assert_eq!(statuses[2], ("n3".to_string(), NodeStatus::Pending));

        // Same topology with n2 fixed
        let fixed = Arc::new(MockUnit::new("n2", &["a"], "b", json!(2)));
        let graph = chain(&[n1.clone(), fixed.clone(), n3.clone()], StateSchema::default())
            .compile(manager.clone());
        let out = graph.invoke("job", Map::new()).await.unwrap();

        assert_eq!(out, json!({"a": 1, "b": 2, "c": 3}));
        assert_eq!(n1.calls(), 1, "n1 must not be re-run on resume");
        assert_eq!(fixed.calls(), 1);
        assert_eq!(n3.calls(), 1);
        assert_eq!(
            manager.latest("job").await.unwrap().unwrap().status,
            RunStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_failed_super_step_keeps_successful_sibling() {
        let manager = CheckpointManager::in_memory();
        let ok = Arc::new(MockUnit::new("ok", &[], "a", json!("kept")).delayed(30));
        let bad = Arc::new(MockUnit::new("bad", &[], "b", json!("lost")).failing());

        let mut b = GraphBuilder::new("siblings");
        b.add_node("ok", ok)
            .add_node("bad", bad)
            .add_edge(START, "ok")
            .add_edge(START, "bad")
            .add_edge("ok", END)
            .add_edge("bad", END);
        let graph = b.build().unwrap().compile(manager.clone());

        assert!(graph.invoke("t", Map::new()).await.is_err());
        let latest = manager.latest("t").await.unwrap().unwrap();
        assert_eq!(latest.values.get("a"), Some(&json!("kept")));
        assert_eq!(latest.completed, vec!["ok"]);
    }

    /// Accepts every checkpoint except the one recording a failure
    struct RefusesFailed(MemorySaver);

    #[async_trait]
    impl CheckpointSaver for RefusesFailed {
        async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
            self.0.get(thread_id).await
        }

        async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
            if checkpoint.status == RunStatus::Failed {
                return Err(CheckpointError::Closed);
            }
            self.0.put(checkpoint).await
        }

        async fn close(&self) -> Result<(), CheckpointError> {
            self.0.close().await
        }
    }

    #[tokio::test]
    async fn test_node_error_survives_failed_checkpoint_write() {
        let manager = CheckpointManager::new(Arc::new(RefusesFailed(MemorySaver::new())));
        let n1 = Arc::new(MockUnit::new("n1", &[], "a", json!(1)));
        let broken = Arc::new(MockUnit::new("n2", &["a"], "b", json!(2)).failing());
        let graph = chain(&[n1, broken], StateSchema::default()).compile(manager.clone());

        let err = graph.invoke("job", Map::new()).await.unwrap_err();
        assert!(matches!(&err, RunError::Node { node, .. } if node == "n2"));
        assert!(err.transport().is_some_and(|t| t.is_timeout()));

        // The barrier checkpoint before the failure is still there
        let latest = manager.latest("job").await.unwrap().unwrap();
        assert_eq!(latest.status, RunStatus::Running);
        assert_eq!(latest.completed, vec!["n1"]);
    }

    #[tokio::test]
    async fn test_completed_thread_reruns_over_hydrated_state() {
        let manager = CheckpointManager::in_memory();
        let n1 = Arc::new(MockUnit::new("n1", &["seed"], "a", json!(1)));
        let graph = chain(&[n1.clone()], StateSchema::default()).compile(manager.clone());

        graph
            .invoke("t", fields(json!({"seed": "s"})))
            .await
            .unwrap();
        let out = graph.invoke("t", Map::new()).await.unwrap();

        assert_eq!(n1.calls(), 2);
        assert_eq!(n1.seen(), Some(fields(json!({"seed": "s"}))));
        assert_eq!(out, json!({"seed": "s", "a": 1}));
    }

    #[tokio::test]
    async fn test_events_are_streamed() {
        let n1 = Arc::new(MockUnit::new("n1", &[], "a", json!(1)));
        let graph = chain(&[n1], StateSchema::default()).compile(CheckpointManager::in_memory());

        let (tx, mut rx) = mpsc::channel(32);
        graph.invoke_stream("t", Map::new(), Some(tx)).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(
            events.first(),
            Some(&RunEvent::RunStarted {
                thread_id: "t".into(),
                workflow: "chain".into(),
                resumed: false
            })
        );
        assert!(events.contains(&RunEvent::NodeCompleted {
            node: "n1".into(),
            keys: vec!["a".into()]
        }));
        assert_eq!(
            events.last(),
            Some(&RunEvent::RunFinished {
                thread_id: "t".into()
            })
        );
    }
}
