//! Scratch-space allocation for node processing.
//!
//! A `WorkspaceAllocator` hands a node function a filesystem path sized for
//! an expected maximum amount of scratch data. The framework decides whether
//! that path lives on regular disk or a fast ephemeral store. The caller owns
//! the path exclusively until its node function returns.

use crate::error::BridgeError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Capability for requesting scratch storage.
pub trait WorkspaceAllocator: Send + Sync {
    /// Return a directory suitable for up to `max_size` bytes of scratch
    /// data. May block on filesystem allocation.
    fn allocate(&self, max_size: u64) -> Result<PathBuf, BridgeError>;
}

impl<F> WorkspaceAllocator for F
where
    F: Fn(u64) -> Result<PathBuf, BridgeError> + Send + Sync,
{
    fn allocate(&self, max_size: u64) -> Result<PathBuf, BridgeError> {
        self(max_size)
    }
}

/// Disk-backed allocator creating one fresh subdirectory per request under a
/// fixed root.
pub struct DiskWorkspace {
    root: PathBuf,
    counter: AtomicU64,
}

impl DiskWorkspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl WorkspaceAllocator for DiskWorkspace {
    fn allocate(&self, max_size: u64) -> Result<PathBuf, BridgeError> {
        let dir = self.root.join(format!(
            "scratch-{}-{}",
            std::process::id(),
            self.counter.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).map_err(|e| BridgeError::WorkspaceAllocation {
            requested: max_size,
            reason: e.to_string(),
        })?;
        Ok(dir)
    }
}
