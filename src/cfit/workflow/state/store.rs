// SPDX-License-Identifier: MIT

//! Job State document with per-key merge policy

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::schema::{ReducerType, StateSchema};

/// Shallow merge for accumulating keys.
///
/// An absent, null or empty existing value yields `incoming` unchanged. Two
/// objects combine field by field with `incoming` winning on overlap. Any
/// other shape pairing falls back to replacement.
pub fn merge(existing: Option<&Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(current)), Value::Object(new)) if !current.is_empty() => {
            let mut merged = current.clone();
            for (k, v) in new {
                merged.insert(k, v);
            }
            Value::Object(merged)
        }
        (Some(current), incoming) if !is_empty(current) && !incoming.is_object() => {
            log::debug!("Accumulating key received a non-object value, replacing");
            incoming
        }
        (_, incoming) => incoming,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// The shared document threaded through one workflow run.
///
/// Nodes never hold a `JobState`; they receive a slice and return an update
/// which the executor applies at the merge barrier.
#[derive(Debug, Clone, Default)]
pub struct JobState {
    /// Current state values
    fields: Map<String, Value>,
    /// Reducers for declared fields
    reducers: HashMap<String, ReducerType>,
}

impl JobState {
    /// Create a JobState from a schema, seeding declared defaults
    pub fn new(schema: &StateSchema) -> Self {
        let mut fields = Map::new();
        let mut reducers = HashMap::new();

        for (name, def) in &schema.fields {
            if let Some(default) = &def.default {
                fields.insert(name.clone(), default.clone());
            }
            reducers.insert(name.clone(), def.reducer.clone());
        }

        Self { fields, reducers }
    }

    /// Create an empty JobState where every key is overwritten
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load persisted values over the document as-is, bypassing reducers
    pub fn hydrate(&mut self, values: Map<String, Value>) {
        for (key, value) in values {
            self.fields.insert(key, value);
        }
    }

    /// Update a field using its reducer
    pub fn update(&mut self, key: &str, value: Value) {
        let reducer = self.reducers.get(key).cloned().unwrap_or_default();

        match reducer {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Merge => {
                let merged = merge(self.fields.get(key), value);
                self.fields.insert(key.to_string(), merged);
            }
        }
    }

    /// Apply every key of a partial update
    pub fn apply(&mut self, update: Map<String, Value>) {
        for (key, value) in update {
            self.update(&key, value);
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Copy of the requested keys; absent keys are simply missing
    pub fn slice<S: AsRef<str>>(&self, keys: &[S]) -> Map<String, Value> {
        keys.iter()
            .filter_map(|key| {
                let key = key.as_ref();
                self.fields.get(key).map(|v| (key.to_string(), v.clone()))
            })
            .collect()
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert state to JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
