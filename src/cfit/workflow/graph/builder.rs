// SPDX-License-Identifier: MIT

//! Graph assembly and build-time validation
//!
//! Every structural problem is reported by `build`, before any node can run.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::types::{is_reserved, END, START};
use crate::adk::error::GraphError;
use crate::cfit::workflow::node::TaskUnit;
use crate::cfit::workflow::state::StateSchema;

/// A node of a built graph
#[derive(Clone)]
pub struct GraphNode {
    pub name: String,
    pub unit: Arc<dyn TaskUnit>,
    /// Real predecessor nodes; the start marker is not listed
    pub predecessors: Vec<String>,
}

/// A validated DAG. Nodes keep their registration order, which is also the
/// merge order inside a super-step.
#[derive(Clone)]
pub struct Graph {
    name: String,
    nodes: Vec<GraphNode>,
    edges: Vec<(String, String)>,
    schema: StateSchema,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.name == name)
    }
}

/// Declarative assembly of task units into a dependency graph
pub struct GraphBuilder {
    name: String,
    nodes: Vec<(String, Arc<dyn TaskUnit>)>,
    edges: Vec<(String, String)>,
    schema: StateSchema,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            schema: StateSchema::default(),
        }
    }

    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn add_node(&mut self, name: impl Into<String>, unit: Arc<dyn TaskUnit>) -> &mut Self {
        self.nodes.push((name.into(), unit));
        self
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        let mut declared: HashSet<&str> = HashSet::new();
        for (name, _) in &self.nodes {
            if is_reserved(name) {
                return Err(GraphError::ReservedName(name.clone()));
            }
            if !declared.insert(name.as_str()) {
                return Err(GraphError::DuplicateNode(name.clone()));
            }
        }

        for (from, to) in &self.edges {
            let from_ok = from == START || declared.contains(from.as_str());
            let to_ok = to == END || declared.contains(to.as_str());
            if !from_ok || !to_ok {
                return Err(GraphError::UnknownNode {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            if from == to {
                return Err(GraphError::SelfLoop(from.clone()));
            }
        }

        if !self.edges.iter().any(|(from, _)| from == START) {
            return Err(GraphError::NoEntry);
        }

        let order: Vec<&str> = self.nodes.iter().map(|(n, _)| n.as_str()).collect();
        check_acyclic(&order, &self.edges)?;

        let unreachable = unvisited(&order, START, &self.edges, |(from, to)| (from, to));
        if !unreachable.is_empty() {
            return Err(GraphError::Unreachable(unreachable));
        }

        let dead_ends = unvisited(&order, END, &self.edges, |(from, to)| (to, from));
        if !dead_ends.is_empty() {
            return Err(GraphError::DeadEnd(dead_ends));
        }

        let mut edges: Vec<(String, String)> = Vec::new();
        for edge in self.edges {
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        }

        let nodes = self
            .nodes
            .into_iter()
            .map(|(name, unit)| {
                let predecessors = edges
                    .iter()
                    .filter(|(from, to)| to == &name && from != START)
                    .map(|(from, _)| from.clone())
                    .collect();
                GraphNode {
                    name,
                    unit,
                    predecessors,
                }
            })
            .collect();

        Ok(Graph {
            name: self.name,
            nodes,
            edges,
            schema: self.schema,
        })
    }
}

/// Kahn's algorithm over the real nodes; whatever cannot be ordered is on
/// or behind a cycle.
fn check_acyclic(order: &[&str], edges: &[(String, String)]) -> Result<(), GraphError> {
    let mut in_degree: HashMap<&str, usize> = order.iter().map(|n| (*n, 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for (from, to) in edges {
        if from == START || to == END {
            continue;
        }
        successors.entry(from.as_str()).or_default().push(to.as_str());
        if let Some(d) = in_degree.get_mut(to.as_str()) {
            *d += 1;
        }
    }

    let mut queue: VecDeque<&str> = order
        .iter()
        .copied()
        .filter(|n| in_degree.get(n) == Some(&0))
        .collect();
    let mut sorted = 0usize;

    while let Some(node) = queue.pop_front() {
        sorted += 1;
        for &next in successors.get(node).into_iter().flatten() {
            if let Some(d) = in_degree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    if sorted == order.len() {
        return Ok(());
    }

    let cyclic = order
        .iter()
        .filter(|n| in_degree.get(*n).is_some_and(|d| *d > 0))
        .map(|n| n.to_string())
        .collect();
    Err(GraphError::Cycle(cyclic))
}

/// Nodes not visited by a traversal from `origin`. `orient` picks the
/// direction an edge is followed in.
fn unvisited<'a, F>(
    order: &[&str],
    origin: &'a str,
    edges: &'a [(String, String)],
    orient: F,
) -> Vec<String>
where
    F: Fn((&'a str, &'a str)) -> (&'a str, &'a str),
{
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        let (a, b) = orient((from.as_str(), to.as_str()));
        adjacency.entry(a).or_default().push(b);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([origin]);
    while let Some(node) = queue.pop_front() {
        for &next in adjacency.get(node).into_iter().flatten() {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }

    order
        .iter()
        .filter(|n| !seen.contains(*n))
        .map(|n| n.to_string())
        .collect()
}
