// SPDX-License-Identifier: MIT

//! Job-description extraction and decomposition

use super::keys::{JD_DETAILS, JD_URL, JOB_DESCRIPTION};
use super::{LlmTask, NodeServices, Shape, Target};
use crate::adk::error::NodeError;
use crate::cfit::extract::TextExtractor;
use crate::cfit::prompts;
use crate::cfit::records::{normalize_object, JobDescription};
use crate::cfit::workflow::node::{update, StateSlice, TaskUnit, Update};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Fetches the posting at `jd_url` as text
pub struct ExtractJd {
    extractor: Arc<dyn TextExtractor>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl ExtractJd {
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            extractor,
            inputs: vec![JD_URL.to_string()],
            outputs: vec![JOB_DESCRIPTION.to_string()],
        }
    }
}

#[async_trait]
impl TaskUnit for ExtractJd {
    fn name(&self) -> &str {
        "extract_jd"
    }

    fn input_keys(&self) -> &[String] {
        &self.inputs
    }

    fn output_keys(&self) -> &[String] {
        &self.outputs
    }

    async fn execute(&self, slice: StateSlice) -> Result<Update, NodeError> {
        let url = slice
            .get(JD_URL)
            .and_then(Value::as_str)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| NodeError::other("jd_url is not set"))?;

        let text = self.extractor.extract_url(url).await?;
        log::info!("Extracted {} chars of job description", text.len());
        Ok(update(JOB_DESCRIPTION, Value::String(text)))
    }
}

pub fn decompose_jd(services: &NodeServices) -> LlmTask {
    LlmTask::new(
        "decompose_jd",
        &[JOB_DESCRIPTION],
        services.chain(prompts::jd_prompt()),
        Shape::Object(normalize_object::<JobDescription>),
        Target::Key(JD_DETAILS.into()),
    )
}
