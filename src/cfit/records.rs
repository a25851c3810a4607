// SPDX-License-Identifier: MIT

//! Typed résumé and job-description records
//!
//! LLM output is loosely shaped: a field asked for as a string may come back
//! as a number or a list. Every field here is optional and deserialised
//! leniently, and fields the record does not know about are carried through
//! untouched in `extra`.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output of résumé decomposition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeDetails {
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, deserialize_with = "text_list", skip_serializing_if = "Vec::is_empty")]
    pub tech_stacks: Vec<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub years: Option<String>,
    #[serde(default, deserialize_with = "text_list", skip_serializing_if = "Vec::is_empty")]
    pub awards: Vec<String>,
    #[serde(default, deserialize_with = "text_list", skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub etcetra: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One employment entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Years at the company, as reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Value>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One project entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "text_list", skip_serializing_if = "Vec::is_empty")]
    pub achievements: Vec<String>,
    /// Months spent, as reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Value>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "flag", skip_serializing_if = "Option::is_none")]
    pub team: Option<bool>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output of job-description decomposition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub company_information: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub introduction: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub responsibilities: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub qualification: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub preference: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub skills: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub benefits: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub tech_stacks: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobDescription {
    /// Read a stored `jd_details` value; anything unreadable is an empty record
    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .filter(|v| v.is_object())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// The fields a fit evaluation looks at, each as prompt text.
    /// Missing fields render as empty strings.
    pub fn prompt_fields(&self) -> Map<String, Value> {
        let fields = [
            ("company", &self.company),
            ("company_information", &self.company_information),
            ("title", &self.title),
            ("introduction", &self.introduction),
            ("responsibilities", &self.responsibilities),
            ("qualification", &self.qualification),
            ("preference", &self.preference),
            ("skills", &self.skills),
            ("tech_stacks", &self.tech_stacks),
        ];
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone().unwrap_or_default())))
            .collect()
    }
}

/// Pass a coerced value through record `T`. Non-objects become an empty record.
pub fn normalize_object<T>(value: Value) -> Value
where
    T: DeserializeOwned + Serialize + Default,
{
    let record = match value {
        Value::Object(_) => serde_json::from_value::<T>(value).unwrap_or_else(|e| {
            log::warn!("Discarding unreadable record: {}", e);
            T::default()
        }),
        other => {
            if !other.is_null() {
                log::debug!("Expected an object, got {}", kind(&other));
            }
            T::default()
        }
    };
    serde_json::to_value(record).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Turn a coerced value into a list of items.
///
/// A list is used as-is, an object wrapping the list under `key` is
/// unwrapped, any other non-empty object becomes a one-element list, and
/// everything else is empty.
pub fn normalize_list(value: Value, key: &str) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            Some(Value::Object(inner)) => vec![Value::Object(inner)],
            Some(_) => Vec::new(),
            None if map.is_empty() => Vec::new(),
            None => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    }
}

/// Normalise each object item through record `T`; other items are kept as
/// they are and left for reclassification to skip.
pub fn normalize_items<T>(items: Vec<Value>) -> Vec<Value>
where
    T: DeserializeOwned + Serialize + Default,
{
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(_) => normalize_object::<T>(item),
            other => other,
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => {
            let lines: Vec<String> = items.iter().filter_map(scalar_text).collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        other => scalar_text(&other).filter(|s| !s.is_empty()),
    })
}

fn text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(&other).into_iter().collect(),
    })
}

fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}
