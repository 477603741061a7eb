//! Filesystem adapters for build-a-bot.
//!
//! [`load_tree`] snapshots a definitions directory into a [`VirtualTree`];
//! [`store::LocalDeploymentStore`] writes `deployment.json` back next to
//! each entity.

pub mod store;

use std::path::{Path, PathBuf};

use buildabot_types::tree::VirtualTree;

pub use store::LocalDeploymentStore;

/// Editor and VCS droppings that never belong in a definition.
const IGNORED_FILES: &[&str] = &[".gitkeep", ".DS_Store"];

/// Errors while reading a definitions directory.
#[derive(Debug, thiserror::Error)]
pub enum TreeLoadError {
    #[error("definitions directory {0} does not exist")]
    Missing(PathBuf),

    /// No files at all. Callers treat this as "nothing to do".
    #[error("no definition files found under {0}")]
    Empty(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TreeLoadError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read every regular file under `root` into a [`VirtualTree`].
///
/// Directories are walked depth-first; symlinks are followed. A file that is
/// not valid UTF-8 or cannot be opened is recorded as unreadable so only its
/// entity fails to compile. The real filesystem is not touched again after
/// this returns.
pub async fn load_tree(root: &Path) -> Result<VirtualTree, TreeLoadError> {
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(TreeLoadError::Missing(root.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TreeLoadError::Missing(root.to_path_buf()));
        }
        Err(e) => return Err(TreeLoadError::io(root, e)),
    }

    let mut tree = VirtualTree::new(root.to_string_lossy());
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| TreeLoadError::io(&dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TreeLoadError::io(&dir, e))?
        {
            let path = entry.path();
            let meta = tokio::fs::metadata(&path)
                .await
                .map_err(|e| TreeLoadError::io(&path, e))?;

            if meta.is_dir() {
                pending.push(path);
                continue;
            }

            let ignored = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| IGNORED_FILES.contains(&n));
            if ignored {
                continue;
            }

            match tokio::fs::read_to_string(&path).await {
                Ok(content) => tree.insert(path.to_string_lossy(), content),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable definition file");
                    tree.mark_unreadable(path.to_string_lossy(), e.to_string());
                }
            }
        }
    }

    if tree.is_empty() {
        return Err(TreeLoadError::Empty(root.to_path_buf()));
    }

    tracing::debug!(root = %root.display(), files = tree.len(), "Loaded definitions tree");
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_tree_reads_nested_files() {
        let dir = tempdir().unwrap();
        write(dir.path(), "support/identity/backstory.txt", "You help.").await;
        write(dir.path(), "support/dataset/faq.txt", "Answer: {search}").await;

        let tree = load_tree(dir.path()).await.unwrap();
        assert_eq!(tree.len(), 2);
        let backstory = tree.entity_path("support", "identity/backstory.txt");
        assert_eq!(tree.get(&backstory), Some("You help."));
        assert!(tree.entity_names().contains("support"));
    }

    #[tokio::test]
    async fn test_load_tree_skips_ignored_files() {
        let dir = tempdir().unwrap();
        write(dir.path(), "support/dataset/.gitkeep", "").await;
        write(dir.path(), ".DS_Store", "junk").await;
        write(dir.path(), "support/identity/backstory.txt", "b").await;

        let tree = load_tree(dir.path()).await.unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[tokio::test]
    async fn test_load_tree_keeps_going_past_non_utf8_file() {
        let dir = tempdir().unwrap();
        write(dir.path(), "good/identity/backstory.txt", "You help.").await;
        let blob = dir.path().join("bad/dataset/blob.txt");
        tokio::fs::create_dir_all(blob.parent().unwrap()).await.unwrap();
        tokio::fs::write(&blob, [0xff, 0xfe, 0x00]).await.unwrap();

        let tree = load_tree(dir.path()).await.unwrap();
        assert_eq!(tree.len(), 1);
        let names = tree.entity_names();
        assert!(names.contains("good"));
        assert!(names.contains("bad"));

        let (path, _) = tree.unreadable().next().unwrap();
        assert!(path.ends_with("bad/dataset/blob.txt"));
    }

    #[tokio::test]
    async fn test_load_tree_empty_directory() {
        let dir = tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("support/dataset"))
            .await
            .unwrap();

        let err = load_tree(dir.path()).await.unwrap_err();
        assert!(matches!(err, TreeLoadError::Empty(_)));
    }

    #[tokio::test]
    async fn test_load_tree_missing_directory() {
        let dir = tempdir().unwrap();
        let err = load_tree(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, TreeLoadError::Missing(_)));
    }
}
