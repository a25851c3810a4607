// SPDX-License-Identifier: MIT

use super::node::TaskUnit;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The shared pool of task units that topologies are composed from
#[derive(Clone)]
pub struct NodeRegistry {
    units: Arc<RwLock<HashMap<String, Arc<dyn TaskUnit>>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            units: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, unit: Arc<dyn TaskUnit>) {
        let mut units = self.units.write().await;
        units.insert(unit.name().to_string(), unit);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn TaskUnit>> {
        let units = self.units.read().await;
        units.get(name).cloned()
    }

    /// Registered unit names, sorted
    pub async fn names(&self) -> Vec<String> {
        let units = self.units.read().await;
        let mut names: Vec<String> = units.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
