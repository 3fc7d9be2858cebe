//! Applied resource state.
//!
//! The store remembers what has been provisioned. Applying a graph walks it in
//! build order and classifies each resource as created, replaced (properties
//! or dependencies changed) or unchanged. Resources that disappeared from the
//! graph are reported as removed and dropped.

use std::path::Path;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::topology::graph::{Resource, ResourceGraph, ResourceId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    pub resource: Resource,
    /// Bumped on every replacement.
    pub version: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub created: Vec<ResourceId>,
    pub replaced: Vec<ResourceId>,
    pub unchanged: Vec<ResourceId>,
    pub removed: Vec<ResourceId>,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.replaced.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
pub struct ResourceStore {
    resources: DashMap<ResourceId, StoredResource>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, graph: &ResourceGraph) -> ApplyReport {
        let mut report = ApplyReport::default();

        for resource in graph.resources() {
            let id = resource.id.clone();
            match self.resources.get_mut(&id) {
                Some(stored) if stored.resource == *resource => report.unchanged.push(id),
                Some(mut stored) => {
                    stored.resource = resource.clone();
                    stored.version += 1;
                    tracing::info!(resource = %id, version = stored.version, "Resource replaced");
                    report.replaced.push(id);
                }
                None => {
                    tracing::info!(resource = %id, "Resource created");
                    self.resources.insert(
                        id.clone(),
                        StoredResource {
                            resource: resource.clone(),
                            version: 1,
                        },
                    );
                    report.created.push(id);
                }
            }
        }

        let mut stale: Vec<ResourceId> = self
            .resources
            .iter()
            .filter(|entry| graph.get(entry.key()).is_none())
            .map(|entry| entry.key().clone())
            .collect();
        // tear down in reverse build order
        stale.sort_by(|a, b| b.kind.stage().cmp(&a.kind.stage()).then_with(|| a.cmp(b)));
        for id in stale {
            self.resources.remove(&id);
            tracing::info!(resource = %id, "Resource removed");
            report.removed.push(id);
        }

        report
    }

    pub fn get(&self, id: &ResourceId) -> Option<StoredResource> {
        self.resources.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Load state written by [`ResourceStore::save`]. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let store = Self::new();
        if !path.exists() {
            return Ok(store);
        }
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<StoredResource> = serde_json::from_str(&content)?;
        for entry in entries {
            store.resources.insert(entry.resource.id.clone(), entry);
        }
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut entries: Vec<StoredResource> =
            self.resources.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.resource.id.cmp(&b.resource.id));
        std::fs::write(path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}
