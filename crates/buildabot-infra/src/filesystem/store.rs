//! `deployment.json` persistence next to each entity directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use buildabot_core::deploy::record::DeploymentStore;
use buildabot_types::definition::DeploymentRecord;
use buildabot_types::error::StoreError;

/// Writes records to `{definitions_dir}/{entity}/deployment.json`.
///
/// Each write goes to a temp file in the entity directory and is then
/// renamed over the old record.
#[derive(Debug, Clone)]
pub struct LocalDeploymentStore {
    root: PathBuf,
}

impl LocalDeploymentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn record_path(&self, entity: &str) -> PathBuf {
        self.root.join(entity).join(DeploymentRecord::FILE_NAME)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl DeploymentStore for LocalDeploymentStore {
    async fn save(&self, entity: &str, record: &DeploymentRecord) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        bytes.push(b'\n');

        let path = self.record_path(entity);
        let target = path.clone();
        let written = tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| StoreError::Write {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        written.map_err(|e| StoreError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(entity, path = %path.display(), "Wrote deployment record");
        Ok(())
    }
}
