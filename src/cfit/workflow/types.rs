// SPDX-License-Identifier: MIT

//! YAML schema types for workflow topologies
//!
//! A topology names task units from the shared pool and wires them with
//! `depends_on`. Nodes without dependencies hang off the start marker;
//! nodes nothing depends on lead to the end marker.

use serde::{Deserialize, Serialize};

use super::state::StateSchema;

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Merge policy per Job State key
    #[serde(default)]
    pub state: StateSchema,
    pub nodes: Vec<NodeDefinition>,
}

/// A node in a workflow topology
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeDefinition {
    /// Unique node identifier
    pub id: String,
    /// Task unit to run; defaults to the node id
    pub task: Option<String>,
    /// Nodes that must complete before this runs
    #[serde(default)]
    pub depends_on: DependsOn,
}

impl NodeDefinition {
    pub fn task_name(&self) -> &str {
        self.task.as_deref().unwrap_or(&self.id)
    }
}

/// Dependencies as a single name or a list
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(untagged)]
pub enum DependsOn {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl DependsOn {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            DependsOn::None => vec![],
            DependsOn::Single(s) => vec![s.clone()],
            DependsOn::Multiple(v) => v.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DependsOn::None => true,
            DependsOn::Single(_) => false,
            DependsOn::Multiple(v) => v.is_empty(),
        }
    }
}
