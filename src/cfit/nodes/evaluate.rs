// SPDX-License-Identifier: MIT

//! Skills and fit evaluation

use super::keys::{APPLICANT_RECRUITMENT, APPLICANT_SKILLS, JD_DETAILS, RESUME_DETAILS};
use super::{LlmTask, NodeServices, Shape, Target};
use crate::cfit::prompts;
use crate::cfit::records::JobDescription;
use crate::cfit::workflow::node::StateSlice;
use serde_json::{Map, Value};

pub fn evaluate_resume(services: &NodeServices) -> LlmTask {
    LlmTask::new(
        "evaluate_resume",
        &[RESUME_DETAILS],
        services.chain(prompts::skills_prompt()),
        Shape::Text,
        Target::Key(APPLICANT_SKILLS.into()),
    )
}

pub fn evaluate_fit(services: &NodeServices) -> LlmTask {
    LlmTask::new(
        "evaluate_fit",
        &[RESUME_DETAILS, JD_DETAILS],
        services.chain(prompts::recruit_prompt()),
        Shape::Text,
        Target::Key(APPLICANT_RECRUITMENT.into()),
    )
    .with_variables(fit_variables)
}

/// Job-description fields go into the prompt one by one
fn fit_variables(slice: &StateSlice) -> Map<String, Value> {
    let mut vars = JobDescription::from_value(slice.get(JD_DETAILS)).prompt_fields();
    vars.insert(
        RESUME_DETAILS.to_string(),
        slice.get(RESUME_DETAILS).cloned().unwrap_or(Value::Null),
    );
    vars
}
