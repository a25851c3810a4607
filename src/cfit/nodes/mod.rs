// SPDX-License-Identifier: MIT

//! The shared pool of task units every built-in topology draws from

pub mod evaluate;
pub mod jd;
pub mod report;
pub mod resume;

use crate::adk::chain::{Chain, PromptTemplate};
use crate::adk::error::NodeError;
use crate::adk::model::{GenerationConfig, Model};
use crate::cfit::extract::TextExtractor;
use crate::cfit::records::normalize_list;
use crate::cfit::workflow::node::{update, StateSlice, TaskUnit, Update};
use crate::cfit::workflow::registry::NodeRegistry;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Job State keys
pub mod keys {
    pub const RESUME_FILE: &str = "resume_file";
    pub const JD_URL: &str = "jd_url";
    pub const RESUME: &str = "resume";
    pub const JOB_DESCRIPTION: &str = "job_description";
    pub const RESUME_DETAILS: &str = "resume_details";
    pub const JD_DETAILS: &str = "jd_details";
    pub const APPLICANT_SKILLS: &str = "applicant_skills";
    pub const APPLICANT_RECRUITMENT: &str = "applicant_recruitment";
    pub const REPORT: &str = "report";
    pub const FINAL_REPORT: &str = "final_report";
}

/// Collaborators the task units are built with
#[derive(Clone)]
pub struct NodeServices {
    pub model: Arc<dyn Model>,
    pub extractor: Arc<dyn TextExtractor>,
    pub generation: GenerationConfig,
}

impl NodeServices {
    pub(crate) fn chain(&self, prompt: PromptTemplate) -> Chain {
        Chain::new(prompt, self.model.clone(), self.generation.clone())
    }
}

/// Every unit of the pool
pub fn default_units(services: &NodeServices) -> Vec<Arc<dyn TaskUnit>> {
    vec![
        Arc::new(jd::ExtractJd::new(services.extractor.clone())),
        Arc::new(resume::decompose_resume(services)),
        Arc::new(resume::decompose_experiences(services)),
        Arc::new(resume::decompose_projects(services)),
        Arc::new(resume::extract_company_projects()),
        Arc::new(jd::decompose_jd(services)),
        Arc::new(evaluate::evaluate_resume(services)),
        Arc::new(evaluate::evaluate_fit(services)),
        Arc::new(report::standard_analysis(services)),
        Arc::new(report::deep_dives_analysis(services)),
        Arc::new(report::overall_analysis(services)),
        Arc::new(report::formatter()),
    ]
}

pub async fn register_defaults(registry: &NodeRegistry, services: &NodeServices) {
    for unit in default_units(services) {
        log::debug!("Registered task unit: {}", unit.name());
        registry.register(unit).await;
    }
}

/// How the completion is read back
#[derive(Clone, Copy)]
pub enum Shape {
    /// Raw completion text
    Text,
    /// Coerced JSON, passed through a record normaliser
    Object(fn(Value) -> Value),
    /// Coerced JSON read as a list, unwrapping `key` if the model wrapped it
    List {
        key: &'static str,
        items: fn(Vec<Value>) -> Vec<Value>,
    },
}

/// Where the result lands in the Job State
#[derive(Clone, Debug)]
pub enum Target {
    Key(String),
    /// `{key: {sub: value}}`, for accumulating keys
    SubKey { key: String, sub: String },
}

impl Target {
    fn key(&self) -> &str {
        match self {
            Target::Key(k) | Target::SubKey { key: k, .. } => k,
        }
    }
}

type Variables = fn(&StateSlice) -> Map<String, Value>;

fn slice_as_variables(slice: &StateSlice) -> Map<String, Value> {
    slice.clone()
}

/// An LLM-backed unit: fill the prompt from the slice, complete, read the
/// completion back in the configured shape.
pub struct LlmTask {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    chain: Chain,
    shape: Shape,
    target: Target,
    variables: Variables,
}

impl LlmTask {
    pub fn new(name: &str, inputs: &[&str], chain: Chain, shape: Shape, target: Target) -> Self {
        Self {
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: vec![target.key().to_string()],
            chain,
            shape,
            target,
            variables: slice_as_variables,
        }
    }

    /// Derive the prompt variables from the slice instead of passing it as-is
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }
}

#[async_trait]
impl TaskUnit for LlmTask {
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
        let variables = (self.variables)(&slice);
        let value = match self.shape {
            Shape::Text => Value::String(self.chain.invoke_text(&variables).await?),
            Shape::Object(normalize) => normalize(self.chain.invoke_json(&variables).await?),
            Shape::List { key, items } => {
                let raw = self.chain.invoke_json(&variables).await?;
                Value::Array(items(normalize_list(raw, key)))
            }
        };

        Ok(match &self.target {
            Target::Key(key) => update(key, value),
            Target::SubKey { key, sub } => {
                let mut inner = Map::new();
                inner.insert(sub.clone(), value);
                update(key, Value::Object(inner))
            }
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_text_unit_writes_sub_key() {
        let model = ScriptedModel::new("Strong match");
        let services = services(model.clone());
        let task = LlmTask::new(
            "standard",
            &["resume_details"],
            services.chain(PromptTemplate::new("R: {resume_details}", &["resume_details"])),
            Shape::Text,
            Target::SubKey {
                key: "report".into(),
                sub: "standard".into(),
            },
        );

        assert_eq!(task.output_keys(), ["report".to_string()]);
        let out = task
            .execute(slice(json!({"resume_details": {"position": "SRE"}})))
            .await
            .unwrap();
        assert_eq!(out, slice(json!({"report": {"standard": "Strong match"}})));
        assert!(model.prompts.lock().unwrap()[0].contains("\"position\": \"SRE\""));
    }

    #[tokio::test]
    async fn test_malformed_list_output_degrades_to_empty() {
        let services = services(ScriptedModel::new("I could not find any projects."));
        let task = LlmTask::new(
            "projects",
            &["resume"],
            services.chain(PromptTemplate::new("{resume}", &["resume"])),
            Shape::List {
                key: "projects",
                items: |items| items,
            },
            Target::SubKey {
                key: "resume_details".into(),
                sub: "projects".into(),
            },
        );

        let out = task.execute(slice(json!({"resume": "..."}))).await.unwrap();
        assert_eq!(out, slice(json!({"resume_details": {"projects": []}})));
    }

    #[test]
    fn test_default_pool_names() {
        let units = default_units(&services(ScriptedModel::new("")));
        let names: Vec<&str> = units.iter().map(|u| u.name()).collect();
        assert_eq!(
            names,
            vec![
                "extract_jd",
                "decompose_resume",
                "decompose_experiences",
                "decompose_projects",
                "extract_company_projects",
                "decompose_jd",
                "evaluate_resume",
                "evaluate_fit",
                "standard_analysis",
                "deep_dives_analysis",
                "overall_analysis",
                "formatter"
            ]
        );
        for unit in &units {
            assert_eq!(unit.output_keys().len(), 1, "{}", unit.name());
        }
    }
}
