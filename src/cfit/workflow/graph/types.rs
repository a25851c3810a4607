// SPDX-License-Identifier: MIT

//! Graph type definitions: markers, node status and run events

use serde::{Deserialize, Serialize};

/// Virtual entry marker. Edges from it mark the graph's entry nodes.
pub const START: &str = "__start__";

/// Virtual exit marker. Every node must have a path to it.
pub const END: &str = "__end__";

pub fn is_reserved(name: &str) -> bool {
    name == START || name == END
}

/// Per-run lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
}

/// Progress notifications emitted while a graph runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        thread_id: String,
        workflow: String,
        resumed: bool,
    },
    SuperStep {
        step: u64,
        nodes: Vec<String>,
    },
    NodeCompleted {
        node: String,
        keys: Vec<String>,
    },
    NodeFailed {
        node: String,
        error: String,
    },
    Checkpointed {
        step: u64,
    },
    RunFinished {
        thread_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved(START));
        assert!(is_reserved(END));
        assert!(!is_reserved("decompose_jd"));
    }

    #[test]
    fn test_run_event_serialization() {
        let event = RunEvent::SuperStep {
            step: 2,
            nodes: vec!["standard_analysis".into(), "deep_dives_analysis".into()],
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "super_step",
                "step": 2,
                "nodes": ["standard_analysis", "deep_dives_analysis"]
            })
        );
    }

    #[test]
    fn test_node_status_lowercase() {
        assert_eq!(serde_json::to_value(NodeStatus::Done).unwrap(), json!("done"));
    }
}
