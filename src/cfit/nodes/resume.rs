// SPDX-License-Identifier: MIT

//! Résumé decomposition and company-project reclassification

use super::keys::{RESUME, RESUME_DETAILS};
use super::{LlmTask, NodeServices, Shape, Target};
use crate::cfit::prompts;
use crate::cfit::records::{normalize_items, normalize_object, Experience, Project, ResumeDetails};
use crate::cfit::workflow::node::{update, FnTask};
use serde_json::{json, Map, Value};

pub fn decompose_resume(services: &NodeServices) -> LlmTask {
    LlmTask::new(
        "decompose_resume",
        &[RESUME],
        services.chain(prompts::resume_prompt()),
        Shape::Object(normalize_object::<ResumeDetails>),
        Target::Key(RESUME_DETAILS.into()),
    )
}

pub fn decompose_experiences(services: &NodeServices) -> LlmTask {
    LlmTask::new(
        "decompose_experiences",
        &[RESUME],
        services.chain(prompts::experiences_prompt()),
        Shape::List {
            key: "experiences",
            items: normalize_items::<Experience>,
        },
        Target::SubKey {
            key: RESUME_DETAILS.into(),
            sub: "experiences".into(),
        },
    )
}

pub fn decompose_projects(services: &NodeServices) -> LlmTask {
    LlmTask::new(
        "decompose_projects",
        &[RESUME],
        services.chain(prompts::projects_prompt()),
        Shape::List {
            key: "projects",
            items: normalize_items::<Project>,
        },
        Target::SubKey {
            key: RESUME_DETAILS.into(),
            sub: "projects".into(),
        },
    )
}

pub fn extract_company_projects() -> FnTask {
    FnTask::new(
        "extract_company_projects",
        &[RESUME_DETAILS],
        &[RESUME_DETAILS],
        |slice| Ok(update(RESUME_DETAILS, reclassify(slice.get(RESUME_DETAILS)))),
    )
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn as_list(details: Option<&Value>, key: &str) -> Vec<Value> {
    match details.and_then(|d| d.get(key)) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            log::warn!("'{}' is not a list, treating it as empty: {}", key, other);
            Vec::new()
        }
    }
}

/// Nest each project under the experience with the same company.
///
/// Experiences are keyed by `company`; a later entry with the same company
/// replaces an earlier one but keeps its position. Items of the wrong shape
/// are skipped. Projects without a matching company stay in `projects`.
pub fn reclassify(details: Option<&Value>) -> Value {
    let experiences = as_list(details, "experiences");
    let projects = as_list(details, "projects");

    let mut by_company: Vec<(Value, Map<String, Value>)> = Vec::new();
    for exp in experiences {
        match exp {
            Value::Object(map) if map.contains_key("company") => {
                let company = map["company"].clone();
                match by_company.iter_mut().find(|(c, _)| *c == company) {
                    Some(slot) => slot.1 = map,
                    None => by_company.push((company, map)),
                }
            }
            other => log::debug!("Skipping invalid experience item: {}", other),
        }
    }

    let mut remaining = Vec::new();
    for project in projects {
        let Value::Object(_) = project else {
            log::debug!("Skipping invalid project item: {}", project);
            continue;
        };

        let slot = match project.get("company").filter(|c| truthy(c)) {
            Some(company) => by_company.iter_mut().find(|(k, _)| k == company),
            None => None,
        };
        match slot {
            Some((_, exp)) => {
                let nested = exp
                    .entry("projects")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !nested.is_array() {
                    *nested = Value::Array(Vec::new());
                }
                if let Value::Array(list) = nested {
                    list.push(project);
                }
            }
            None => remaining.push(project),
        }
    }

    let experiences: Vec<Value> = by_company
        .into_iter()
        .map(|(_, exp)| Value::Object(exp))
        .collect();

    json!({
        "projects": remaining,
        "experiences": experiences,
    })
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::cfit::workflow::node::TaskUnit;

    fn details(projects: Value, experiences: Value) -> Value {
        json!({"projects": projects, "experiences": experiences})
    }

    #[test]
    fn test_matching_project_is_nested() {
        let out = reclassify(Some(&details(
            json!([{"title": "A", "company": "X"}]),
            json!([{"company": "X"}]),
        )));
        assert_eq!(
            out,
            json!({
                "projects": [],
                "experiences": [{"company": "X", "projects": [{"title": "A", "company": "X"}]}]
            })
        );
    }

    #[test]
    fn test_unmatched_project_is_left_over() {
        let out = reclassify(Some(&details(
            json!([{"title": "B"}]),
            json!([{"company": "Y"}]),
        )));
        assert_eq!(
            out,
            json!({"projects": [{"title": "B"}], "experiences": [{"company": "Y"}]})
        );
    }

    #[test]
    fn test_malformed_items_are_ignored() {
        let with_junk = reclassify(Some(&details(
            json!([{"title": "A", "company": "X"}, "stray"]),
            json!(["not a dict", {"company": "X"}]),
        )));
        let clean = reclassify(Some(&details(
            json!([{"title": "A", "company": "X"}]),
            json!([{"company": "X"}]),
        )));
        assert_eq!(with_junk, clean);
    }

    #[test]
    fn test_non_list_inputs_are_empty() {
        let out = reclassify(Some(&details(json!("oops"), json!({"company": "X"}))));
        assert_eq!(out, json!({"projects": [], "experiences": []}));
        assert_eq!(reclassify(None), json!({"projects": [], "experiences": []}));
        assert_eq!(
            reclassify(Some(&json!("not even a record"))),
            json!({"projects": [], "experiences": []})
        );
    }

    #[test]
    fn test_duplicate_company_last_wins_in_first_position() {
        let out = reclassify(Some(&details(
            json!([{"title": "P", "company": "X"}]),
            json!([
                {"company": "X", "role": "intern"},
                {"company": "Z"},
                {"company": "X", "role": "engineer"}
            ]),
        )));
        assert_eq!(
            out["experiences"],
            json!([
                {"company": "X", "role": "engineer", "projects": [{"title": "P", "company": "X"}]},
                {"company": "Z"}
            ])
        );
    }

    #[test]
    fn test_empty_company_never_matches() {
        let out = reclassify(Some(&details(
            json!([{"title": "side", "company": ""}, {"title": "oss", "company": null}]),
            json!([{"company": ""}]),
        )));
        assert_eq!(out["projects"].as_array().map(Vec::len), Some(2));
        assert_eq!(out["experiences"], json!([{"company": ""}]));
    }

    #[tokio::test]
    async fn test_extract_company_projects_unit() {
        let unit = extract_company_projects();
        let out = unit
            .execute(slice(json!({
                "resume_details": {
                    "position": "Backend",
                    "projects": [{"title": "A", "company": "X"}],
                    "experiences": [{"company": "X"}]
                }
            })))
            .await
            .unwrap();
        // Only the two reclassified lists are written; the merge keeps position
        assert_eq!(
            out["resume_details"],
            json!({
                "projects": [],
                "experiences": [{"company": "X", "projects": [{"title": "A", "company": "X"}]}]
            })
        );
    }

    #[tokio::test]
    async fn test_decompose_experiences_unwraps_and_normalizes() {
        let services = services(ScriptedModel::new(
            r#"{"experiences": [{"company": "Acme", "period": 2, "role": ["Backend"]}, "n/a"]}"#,
        ));
        let out = decompose_experiences(&services)
            .execute(slice(json!({"resume": "..."})))
            .await
            .unwrap();
        assert_eq!(
            out["resume_details"],
            json!({"experiences": [{"company": "Acme", "period": 2, "role": "Backend"}, "n/a"]})
        );
    }

    #[tokio::test]
    async fn test_decompose_resume_non_object_is_empty_record() {
        let services = services(ScriptedModel::new("Sorry, I can't help with that."));
        let out = decompose_resume(&services)
            .execute(slice(json!({"resume": "..."})))
            .await
            .unwrap();
        assert_eq!(out["resume_details"], json!({}));
    }
}
