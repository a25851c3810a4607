// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema declaring the merge policy of Job State keys
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

impl StateSchema {
    /// Merge policy for a key; undeclared keys are overwritten
    pub fn reducer(&self, key: &str) -> ReducerType {
        self.fields
            .get(key)
            .map(|def| def.reducer.clone())
            .unwrap_or_default()
    }

    /// Schema with the given keys declared as accumulating
    pub fn accumulating(keys: &[&str]) -> Self {
        let fields = keys
            .iter()
            .map(|key| {
                (
                    key.to_string(),
                    StateFieldDef {
                        field_type: Some(FieldType::Object),
                        reducer: ReducerType::Merge,
                        default: None,
                    },
                )
            })
            .collect();
        Self { fields }
    }
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateFieldDef {
    /// Informational type of the field
    #[serde(rename = "type", default)]
    pub field_type: Option<FieldType>,
    /// Reducer for merging values
    #[serde(default)]
    pub reducer: ReducerType,
    /// Value the key holds before any write
    pub default: Option<serde_json::Value>,
}

/// Supported field types
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// How a write to a key combines with the value already there
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Last write wins (default)
    #[default]
    Overwrite,
    /// Shallow union of object fields; incoming fields win
    Merge,
}
