// SPDX-License-Identifier: MIT

//! Prompt chains: template fill, model completion, structured coercion
//!
//! A `Chain` is built once per task unit and invoked once per run. Each
//! invocation is the fixed pipeline `PromptTemplate::fill` ->
//! `Model::generate_content` -> `coerce`.

use crate::adk::coerce::coerce;
use crate::adk::error::TransportError;
use crate::adk::model::{Content, GenerationConfig, Model};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A prompt with `{name}` placeholders. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>, input_variables: &[&str]) -> Self {
        Self {
            template: template.into(),
            input_variables: input_variables.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Substitute declared variables. Strings are inserted as-is, other
    /// values as pretty JSON. A declared variable with no value becomes
    /// empty text; unknown placeholders are left untouched.
    pub fn fill(&self, variables: &Map<String, Value>) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find(|c| c == '{' || c == '}') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") || tail.starts_with("}}") {
                out.push_str(&tail[..1]);
                rest = &tail[2..];
                continue;
            }

            if tail.starts_with('{') {
                if let Some(end) = tail.find('}') {
                    let name = &tail[1..end];
                    if self.input_variables.iter().any(|v| v == name) {
                        match variables.get(name) {
                            Some(value) => out.push_str(&render(value)),
                            None => log::debug!("Prompt variable '{}' has no value", name),
                        }
                        rest = &tail[end + 1..];
                        continue;
                    }
                }
            }

            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }

        out.push_str(rest);
        out
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

/// Template fill, completion and coercion for one task unit
#[derive(Clone)]
pub struct Chain {
    prompt: PromptTemplate,
    model: Arc<dyn Model>,
    config: GenerationConfig,
}

impl Chain {
    pub fn new(prompt: PromptTemplate, model: Arc<dyn Model>, config: GenerationConfig) -> Self {
        Self {
            prompt,
            model,
            config,
        }
    }

    pub fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    /// Raw completion text. Transport failures propagate.
    pub async fn invoke_text(&self, variables: &Map<String, Value>) -> Result<String, TransportError> {
        let prompt = self.prompt.fill(variables);
        let history = [Content::user(prompt)];
        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;
        Ok(response.text())
    }

    /// Completion coerced to JSON. Malformed output degrades, never fails.
    pub async fn invoke_json(&self, variables: &Map<String, Value>) -> Result<Value, TransportError> {
        let raw = self.invoke_text(variables).await?;
        Ok(coerce(&raw))
    }
}
