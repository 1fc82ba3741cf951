//! Per-run artifact workspace
//!
//! Every output a batch run produces is registered in the run's own
//! [`RunWorkspace`]. Artifacts are released when the caller consumes them, when
//! the run is finished, or when the workspace is dropped, which covers early
//! returns, errors and unwinding panics. Registries are never shared between
//! runs, so one run cannot release another run's artifacts.

use crate::{
    config::ArtifactStorage,
    error::{BgStudioError, Result},
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Reference to an artifact registered in a run workspace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactHandle {
    id: u64,
    run_id: Uuid,
    file_name: String,
}

impl ArtifactHandle {
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

#[derive(Debug)]
enum ArtifactRecord {
    File(PathBuf),
    Buffer(Vec<u8>),
}

/// Scoped owner of one run's transient artifacts
#[derive(Debug)]
pub struct RunWorkspace {
    run_id: Uuid,
    storage: ArtifactStorage,
    root: Option<TempDir>,
    registry: Mutex<HashMap<u64, ArtifactRecord>>,
    next_id: AtomicU64,
}

impl RunWorkspace {
    /// Create a workspace for a new run
    ///
    /// Disk storage creates a uniquely named directory under `parent` (or the
    /// system temp directory).
    ///
    /// # Errors
    /// - The workspace directory cannot be created
    pub fn new(storage: ArtifactStorage, parent: Option<&Path>) -> Result<Self> {
        let run_id = Uuid::new_v4();
        let root = match storage {
            ArtifactStorage::Memory => None,
            ArtifactStorage::Disk => {
                let prefix = format!("bgremove-run-{}-", run_id.simple());
                let mut builder = tempfile::Builder::new();
                builder.prefix(&prefix);
                let dir = match parent {
                    Some(parent) => {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            BgStudioError::file_io_error("create work directory", parent, &e)
                        })?;
                        builder.tempdir_in(parent)
                    },
                    None => builder.tempdir(),
                }
                .map_err(|e| {
                    BgStudioError::file_io_error(
                        "create run workspace in",
                        parent.map_or_else(std::env::temp_dir, Path::to_path_buf),
                        &e,
                    )
                })?;
                Some(dir)
            },
        };

        debug!(
            %run_id,
            storage = ?storage,
            root = ?root.as_ref().map(TempDir::path),
            "Run workspace created"
        );

        Ok(Self {
            run_id,
            storage,
            root,
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    #[must_use]
    pub fn storage(&self) -> ArtifactStorage {
        self.storage
    }

    /// Directory holding this run's files (disk storage only)
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_ref().map(TempDir::path)
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<u64, ArtifactRecord>> {
        // A panic while holding the lock leaves the map itself consistent
        self.registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register the bytes of item `index` under `file_name`
    ///
    /// # Errors
    /// - The artifact file cannot be written
    pub fn store(&self, index: usize, file_name: &str, bytes: Vec<u8>) -> Result<ArtifactHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = match &self.root {
            None => ArtifactRecord::Buffer(bytes),
            Some(root) => {
                // Per-item subdirectory so equal file names never collide on disk
                let dir = root.path().join(format!("{:04}", index));
                std::fs::create_dir_all(&dir)
                    .map_err(|e| BgStudioError::file_io_error("create artifact directory", &dir, &e))?;
                let path = dir.join(file_name);
                std::fs::write(&path, &bytes)
                    .map_err(|e| BgStudioError::file_io_error("write artifact", &path, &e))?;
                ArtifactRecord::File(path)
            },
        };

        self.registry().insert(id, record);
        Ok(ArtifactHandle {
            id,
            run_id: self.run_id,
            file_name: file_name.to_string(),
        })
    }

    fn check_owner(&self, handle: &ArtifactHandle) -> Result<()> {
        if handle.run_id == self.run_id {
            Ok(())
        } else {
            Err(BgStudioError::ArtifactReleased(format!(
                "'{}' belongs to run {}, not {}",
                handle.file_name, handle.run_id, self.run_id
            )))
        }
    }

    fn released(handle: &ArtifactHandle) -> BgStudioError {
        BgStudioError::ArtifactReleased(format!("'{}' is no longer available", handle.file_name))
    }

    /// Read an artifact without releasing it
    ///
    /// # Errors
    /// - Handle from another run, already released, or unreadable file
    pub fn read(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        self.check_owner(handle)?;
        let registry = self.registry();
        match registry.get(&handle.id) {
            Some(ArtifactRecord::Buffer(bytes)) => Ok(bytes.clone()),
            Some(ArtifactRecord::File(path)) => std::fs::read(path)
                .map_err(|e| BgStudioError::file_io_error("read artifact", path, &e)),
            None => Err(Self::released(handle)),
        }
    }

    /// Retrieve an artifact's bytes and release it
    ///
    /// # Errors
    /// - Handle from another run, already released, or unreadable file
    pub fn consume(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        self.check_owner(handle)?;
        let record = self
            .registry()
            .remove(&handle.id)
            .ok_or_else(|| Self::released(handle))?;

        match record {
            ArtifactRecord::Buffer(bytes) => Ok(bytes),
            ArtifactRecord::File(path) => {
                let bytes = std::fs::read(&path)
                    .map_err(|e| BgStudioError::file_io_error("read artifact", &path, &e));
                Self::remove_file(&path);
                bytes
            },
        }
    }

    /// Release one artifact
    ///
    /// Returns `false` if it was already released or belongs to another run;
    /// releasing twice is a no-op.
    pub fn release(&self, handle: &ArtifactHandle) -> bool {
        if self.check_owner(handle).is_err() {
            warn!(run_id = %self.run_id, file = %handle.file_name, "Ignoring release of foreign artifact");
            return false;
        }
        match self.registry().remove(&handle.id) {
            Some(ArtifactRecord::File(path)) => {
                Self::remove_file(&path);
                true
            },
            Some(ArtifactRecord::Buffer(_)) => true,
            None => false,
        }
    }

    /// Release every live artifact, returning how many were released
    pub fn release_all(&self) -> usize {
        let drained: Vec<ArtifactRecord> = self.registry().drain().map(|(_, r)| r).collect();
        for record in &drained {
            if let ArtifactRecord::File(path) = record {
                Self::remove_file(path);
            }
        }
        if !drained.is_empty() {
            debug!(run_id = %self.run_id, released = drained.len(), "Released run artifacts");
        }
        drained.len()
    }

    /// Number of artifacts not yet released
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.registry().len()
    }

    /// Whether `handle` is still registered
    #[must_use]
    pub fn is_live(&self, handle: &ArtifactHandle) -> bool {
        handle.run_id == self.run_id && self.registry().contains_key(&handle.id)
    }

    /// On-disk location of a live artifact (disk storage only)
    #[must_use]
    pub fn path_of(&self, handle: &ArtifactHandle) -> Option<PathBuf> {
        if handle.run_id != self.run_id {
            return None;
        }
        match self.registry().get(&handle.id) {
            Some(ArtifactRecord::File(path)) => Some(path.clone()),
            _ => None,
        }
    }

    fn remove_file(path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove artifact");
            }
        }
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        self.release_all();
        // TempDir removes the directory tree itself
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_store_read_consume() {
        let workspace = RunWorkspace::new(ArtifactStorage::Disk, None).unwrap();
        let handle = workspace.store(0, "cat_processed.png", vec![1, 2, 3]).unwrap();

        let path = workspace.path_of(&handle).unwrap();
        assert!(path.exists());
        assert_eq!(workspace.read(&handle).unwrap(), vec![1, 2, 3]);
        assert_eq!(workspace.live_count(), 1);

        assert_eq!(workspace.consume(&handle).unwrap(), vec![1, 2, 3]);
        assert!(!path.exists());
        assert_eq!(workspace.live_count(), 0);
        assert!(workspace.read(&handle).is_err());
    }

    #[test]
    fn test_same_name_for_different_items_does_not_collide() {
        let workspace = RunWorkspace::new(ArtifactStorage::Disk, None).unwrap();
        let a = workspace.store(0, "x.png", vec![1]).unwrap();
        let b = workspace.store(1, "x.png", vec![2]).unwrap();
        assert_eq!(workspace.read(&a).unwrap(), vec![1]);
        assert_eq!(workspace.read(&b).unwrap(), vec![2]);
    }

    #[test]
    fn test_double_release_is_noop() {
        let workspace = RunWorkspace::new(ArtifactStorage::Memory, None).unwrap();
        let handle = workspace.store(0, "a.png", vec![9]).unwrap();
        assert!(workspace.release(&handle));
        assert!(!workspace.release(&handle));
        assert!(workspace.consume(&handle).is_err());
    }

    #[test]
    fn test_foreign_handles_are_rejected() {
        let first = RunWorkspace::new(ArtifactStorage::Memory, None).unwrap();
        let second = RunWorkspace::new(ArtifactStorage::Memory, None).unwrap();
        let handle = first.store(0, "a.png", vec![1]).unwrap();

        assert!(!second.release(&handle));
        let err = second.read(&handle).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ArtifactReleased);
        assert!(first.is_live(&handle));
    }

    #[test]
    fn test_drop_removes_directory() {
        let parent = tempfile::tempdir().unwrap();
        let root = {
            let workspace = RunWorkspace::new(ArtifactStorage::Disk, Some(parent.path())).unwrap();
            workspace.store(0, "a.png", vec![1]).unwrap();
            workspace.store(1, "b.png", vec![2]).unwrap();
            workspace.root().unwrap().to_path_buf()
        };
        assert!(!root.exists());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_release_all_counts() {
        let workspace = RunWorkspace::new(ArtifactStorage::Memory, None).unwrap();
        workspace.store(0, "a", vec![]).unwrap();
        workspace.store(1, "b", vec![]).unwrap();
        assert_eq!(workspace.release_all(), 2);
        assert_eq!(workspace.release_all(), 0);
    }
}
