// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! This module provides the graph builder, which validates a topology
//! once, and the super-step executor that runs it per job.

pub mod builder;
pub mod executor;
pub mod types;

pub use builder::{Graph, GraphBuilder, GraphNode};
pub use executor::CompiledGraph;
pub use types::{is_reserved, NodeStatus, RunEvent, END, START};
