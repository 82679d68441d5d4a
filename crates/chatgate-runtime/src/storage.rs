//! Blob store capability
//!
//! Whole-document reads and writes of named resources. The store flushes
//! full snapshots, so the interface is deliberately coarse: no partial
//! writes, no append. A missing resource is `Ok(None)`, not an error, so
//! first runs need no special casing by callers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chatgate_core::{ChatgateError, Result};

// ----------------------------------------------------------------------------
// Storage Trait
// ----------------------------------------------------------------------------

/// Named-blob storage for state snapshots
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Read the entire resource; `None` when it does not exist
    async fn read_whole(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the entire resource
    async fn write_whole(&self, name: &str, bytes: Vec<u8>) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Memory Storage Implementation
// ----------------------------------------------------------------------------

/// In-memory storage for tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    available: AtomicBool,
}

impl MemoryStorage {
    /// Create an empty memory storage
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Create storage pre-seeded with named blobs
    pub fn with_blobs<I>(blobs: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        Self {
            blobs: Mutex::new(blobs.into_iter().collect()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle availability; unavailable storage fails every operation.
    /// Used by tests exercising the writer's log-and-continue path.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn read_whole(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ChatgateError::storage_error("Storage not available"));
        }
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(name).cloned())
    }

    async fn write_whole(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ChatgateError::storage_error("Storage not available"));
        }
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs.insert(name.to_string(), bytes);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// File Storage Implementation
// ----------------------------------------------------------------------------

/// Storage backed by files under a root directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create file storage rooted at `root`; the directory is created on
    /// first write if missing
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl BlobStorage for FileStorage {
    async fn read_whole(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_whole(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(name), bytes).await?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
