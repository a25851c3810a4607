// SPDX-License-Identifier: MIT

//! Workflow loader - YAML file loading and parsing
//!
//! The built-in topologies ship inside the binary; a directory of extra
//! YAML files may add to or replace them.

use super::types::WorkflowDefinition;
use crate::adk::error::CfitError;
use std::fs;
use std::path::Path;

const BUILTIN: &[(&str, &str)] = &[
    (
        "preprocess_resume",
        include_str!("../../../workflows/preprocess_resume.yaml"),
    ),
    (
        "preprocess_jd",
        include_str!("../../../workflows/preprocess_jd.yaml"),
    ),
    (
        "analyze_resume",
        include_str!("../../../workflows/analyze_resume.yaml"),
    ),
    (
        "analyze_fit",
        include_str!("../../../workflows/analyze_fit.yaml"),
    ),
    (
        "oneclick_resume",
        include_str!("../../../workflows/oneclick_resume.yaml"),
    ),
    (
        "oneclick_fit",
        include_str!("../../../workflows/oneclick_fit.yaml"),
    ),
    ("report", include_str!("../../../workflows/report.yaml")),
];

/// Loads workflow definitions from YAML
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition from a YAML file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowDefinition, CfitError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition, CfitError> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }

    /// The topologies compiled into the binary
    pub fn builtin(&self) -> Result<Vec<WorkflowDefinition>, CfitError> {
        BUILTIN
            .iter()
            .map(|(name, yaml)| {
                let def = Self::parse_yaml(yaml)?;
                if def.name != *name {
                    return Err(CfitError::Config(format!(
                        "built-in workflow file '{}' declares name '{}'",
                        name, def.name
                    )));
                }
                Ok(def)
            })
            .collect()
    }

    /// Every `*.yaml` / `*.yml` file in a directory, sorted by file name
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<WorkflowDefinition>, CfitError> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "yaml" || e == "yml")
            })
            .collect();
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                log::info!("Loading workflow from {}", path.display());
                self.load_workflow(&path)
            })
            .collect()
    }

    /// Built-ins overlaid with the definitions found in `dir`, if given.
    /// A file whose name matches a built-in replaces it.
    pub fn load_all(&self, dir: Option<&Path>) -> Result<Vec<WorkflowDefinition>, CfitError> {
        let mut defs = self.builtin()?;
        if let Some(dir) = dir {
            for def in self.load_dir(dir)? {
                match defs.iter_mut().find(|d| d.name == def.name) {
                    Some(existing) => {
                        log::info!("Workflow '{}' overridden from {}", def.name, dir.display());
                        *existing = def;
                    }
                    None => defs.push(def),
                }
            }
        }
        Ok(defs)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}
