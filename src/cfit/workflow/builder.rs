// SPDX-License-Identifier: MIT

//! Builder - turns a workflow definition into a validated graph
//!
//! Units are looked up in the shared `NodeRegistry`; the same unit instance
//! backs every topology that names it.

use super::graph::{Graph, GraphBuilder, END, START};
use super::registry::NodeRegistry;
use super::types::WorkflowDefinition;
use crate::adk::error::GraphError;
use std::collections::HashSet;

pub struct Builder {
    registry: NodeRegistry,
}

impl Builder {
    pub fn new(registry: NodeRegistry) -> Self {
        Self { registry }
    }

    pub async fn build_graph(&self, def: &WorkflowDefinition) -> Result<Graph, GraphError> {
        let mut builder = GraphBuilder::new(def.name.clone()).with_schema(def.state.clone());
        let mut has_successor: HashSet<String> = HashSet::new();

        for node in &def.nodes {
            let unit = self
                .registry
                .get(node.task_name())
                .await
                .ok_or_else(|| GraphError::UnknownTask(node.task_name().to_string()))?;
            builder.add_node(node.id.clone(), unit);

            if node.depends_on.is_empty() {
                builder.add_edge(START, node.id.clone());
            }
            for dep in node.depends_on.to_vec() {
                has_successor.insert(dep.clone());
                builder.add_edge(dep, node.id.clone());
            }
        }

        for node in &def.nodes {
            if !has_successor.contains(&node.id) {
                builder.add_edge(node.id.clone(), END);
            }
        }

        log::debug!(
            "Building workflow '{}' with {} node(s)",
            def.name,
            def.nodes.len()
        );
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfit::workflow::loader::WorkflowLoader;
    use crate::cfit::workflow::node::{update, FnTask, TaskUnit};
    use serde_json::json;
    use std::sync::Arc;

    async fn registry(names: &[&str]) -> NodeRegistry {
        let registry = NodeRegistry::new();
        for name in names {
            let unit: Arc<dyn TaskUnit> =
                Arc::new(FnTask::new(name, &[], &["x"], |_| Ok(update("x", json!(1)))));
            registry.register(unit).await;
        }
        registry
    }

    #[tokio::test]
    async fn test_build_fan_in_from_yaml() {
        let def = WorkflowLoader::parse_yaml(
            r#"
name: report
state:
  report: { type: object, reducer: merge }
nodes:
  - id: standard_analysis
  - id: deep_dives_analysis
  - id: overall_analysis
    depends_on: [standard_analysis, deep_dives_analysis]
"#,
        )
        .unwrap();
        let builder = Builder::new(
            registry(&["standard_analysis", "deep_dives_analysis", "overall_analysis"]).await,
        );

        let graph = builder.build_graph(&def).await.unwrap();
        assert_eq!(graph.nodes().len(), 3);
        assert_eq!(
            graph.nodes()[2].predecessors,
            vec!["standard_analysis", "deep_dives_analysis"]
        );
        assert!(graph
            .edges()
            .contains(&("overall_analysis".to_string(), END.to_string())));
        assert!(!graph
            .edges()
            .contains(&("standard_analysis".to_string(), END.to_string())));
    }

    #[tokio::test]
    async fn test_unknown_task_is_rejected() {
        let def = WorkflowLoader::parse_yaml("name: w\nnodes:\n  - id: nope\n").unwrap();
        let builder = Builder::new(registry(&[]).await);
        assert_eq!(
            builder.build_graph(&def).await.err(),
            Some(GraphError::UnknownTask("nope".into()))
        );
    }

    #[tokio::test]
    async fn test_cycle_in_definition_is_rejected() {
        let def = WorkflowLoader::parse_yaml(
            r#"
name: loop
nodes:
  - id: a
  - id: b
    depends_on: [a, c]
  - id: c
    depends_on: b
"#,
        )
        .unwrap();
        let builder = Builder::new(registry(&["a", "b", "c"]).await);
        assert!(matches!(
            builder.build_graph(&def).await,
            Err(GraphError::Cycle(_))
        ));
    }

    #[tokio::test]
    async fn test_dependency_on_undeclared_node() {
        let def = WorkflowLoader::parse_yaml(
            "name: w\nnodes:\n  - id: a\n    depends_on: ghost\n",
        )
        .unwrap();
        let builder = Builder::new(registry(&["a"]).await);
        assert!(matches!(
            builder.build_graph(&def).await,
            Err(GraphError::UnknownNode { .. })
        ));
    }
}
