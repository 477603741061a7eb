//! Deployment record persistence port.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use buildabot_types::definition::DeploymentRecord;
use buildabot_types::error::StoreError;

/// Persists `deployment.json` for one entity.
///
/// Implementations must replace any previous record atomically: readers
/// see either the old record or the new one, never a partial file.
pub trait DeploymentStore: Send + Sync {
    fn save(
        &self,
        entity: &str,
        record: &DeploymentRecord,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Keeps records in memory, keyed by entity.
#[derive(Debug, Default)]
pub struct InMemoryDeploymentStore {
    records: Mutex<BTreeMap<String, DeploymentRecord>>,
}

impl InMemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity: &str) -> Option<DeploymentRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeploymentStore for InMemoryDeploymentStore {
    async fn save(&self, entity: &str, record: &DeploymentRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.to_string(), record.clone());
        Ok(())
    }
}
