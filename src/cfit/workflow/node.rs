// SPDX-License-Identifier: MIT

//! Task units: the schedulable steps of a workflow graph

use crate::adk::error::NodeError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// The declared input keys of a node, copied out of the Job State
pub type StateSlice = Map<String, Value>;

/// A partial write to the Job State, keyed by declared output keys
pub type Update = Map<String, Value>;

/// One schedulable unit of work.
///
/// A unit is built once (holding its prompt chain or other configuration)
/// and executed at most once per run. It sees only its declared inputs and
/// may return any subset of its declared outputs.
#[async_trait]
pub trait TaskUnit: Send + Sync {
    fn name(&self) -> &str;

    fn input_keys(&self) -> &[String];

    fn output_keys(&self) -> &[String];

    async fn execute(&self, slice: StateSlice) -> Result<Update, NodeError>;
}

type PureFn = dyn Fn(&StateSlice) -> Result<Update, NodeError> + Send + Sync;

/// A synchronous transformation scheduled like any other unit
pub struct FnTask {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    func: Arc<PureFn>,
}

impl FnTask {
    pub fn new<F>(name: &str, inputs: &[&str], outputs: &[&str], func: F) -> Self
    where
        F: Fn(&StateSlice) -> Result<Update, NodeError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl TaskUnit for FnTask {
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
        (self.func)(&slice)
    }
}

/// Single-key update helper
pub fn update(key: &str, value: Value) -> Update {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}
