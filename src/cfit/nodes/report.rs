// SPDX-License-Identifier: MIT

//! Multi-stage report synthesis
//!
//! The two analyses write separate sub-keys of `report`; the overall
//! analysis reads both and adds its own; the formatter turns the lot into
//! one markdown document.

use super::keys::{APPLICANT_RECRUITMENT, FINAL_REPORT, JD_DETAILS, REPORT, RESUME_DETAILS};
use super::{LlmTask, NodeServices, Shape, Target};
use crate::cfit::prompts;
use crate::cfit::workflow::node::{update, FnTask, StateSlice};
use serde_json::Value;

fn section(sub: &str) -> Target {
    Target::SubKey {
        key: REPORT.into(),
        sub: sub.into(),
    }
}

pub fn standard_analysis(services: &NodeServices) -> LlmTask {
    LlmTask::new(
        "standard_analysis",
        &[RESUME_DETAILS, JD_DETAILS],
        services.chain(prompts::standard_analysis_prompt()),
        Shape::Text,
        section("standard"),
    )
}

pub fn deep_dives_analysis(services: &NodeServices) -> LlmTask {
    LlmTask::new(
        "deep_dives_analysis",
        &[RESUME_DETAILS, JD_DETAILS],
        services.chain(prompts::deep_dives_prompt()),
        Shape::Text,
        section("deep_dives"),
    )
}

pub fn overall_analysis(services: &NodeServices) -> LlmTask {
    LlmTask::new(
        "overall_analysis",
        &[REPORT],
        services.chain(prompts::overall_prompt()),
        Shape::Text,
        section("overall"),
    )
}

pub fn formatter() -> FnTask {
    FnTask::new(
        "formatter",
        &[REPORT, APPLICANT_RECRUITMENT],
        &[FINAL_REPORT],
        |slice| Ok(update(FINAL_REPORT, Value::String(format_report(slice)))),
    )
}

const SECTIONS: &[(&str, &str)] = &[
    ("overall", "Overall Assessment"),
    ("standard", "Requirements Review"),
    ("deep_dives", "Project Deep Dives"),
];

fn render(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    };
    (!text.is_empty()).then_some(text)
}

pub fn format_report(slice: &StateSlice) -> String {
    let mut out = String::from("# Applicant Fit Report\n");
    let mut written = 0;

    let report = slice.get(REPORT);
    for (key, title) in SECTIONS {
        if let Some(body) = report.and_then(|r| r.get(*key)).and_then(render) {
            out.push_str(&format!("\n## {}\n\n{}\n", title, body));
            written += 1;
        }
    }
    if let Some(body) = slice.get(APPLICANT_RECRUITMENT).and_then(render) {
        out.push_str(&format!("\n## Recruiter Evaluation\n\n{}\n", body));
        written += 1;
    }

    if written == 0 {
        out.push_str("\n_No analysis available._\n");
    }
    out
}
