//! Filesystem-backed persistent store.
//!
//! One file per key, named by the SHA-256 of the key so names are stable
//! across restarts and safe on every filesystem:
//!
//! ```text
//! <directory>/
//!   3f9a…e1.cache
//!   b07c…42.cache
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use super::store::{BoxFuture, PersistentStore};
use super::types::{CacheError, CacheKey};

const ENTRY_EXTENSION: &str = "cache";
const TEMP_EXTENSION: &str = "tmp";

/// Persistent tier stored as files in one directory.
#[derive(Debug)]
pub struct DiskStore {
    directory: PathBuf,
    /// Distinguishes temp files of concurrent writes to the same key
    write_seq: AtomicU64,
}

impl DiskStore {
    /// Create a store rooted at `directory`.
    ///
    /// The directory is created on first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            write_seq: AtomicU64::new(0),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of entries on disk.
    pub async fn entry_count(&self) -> Result<usize, CacheError> {
        Ok(self.entry_paths().await?.len())
    }

    fn key_to_filename(key: &CacheKey) -> String {
        let digest = Sha256::digest(key.as_str().as_bytes());
        format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION)
    }

    fn key_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(Self::key_to_filename(key))
    }

    async fn entry_paths(&self) -> Result<Vec<PathBuf>, CacheError> {
        self.paths_with_extension(ENTRY_EXTENSION).await
    }

    /// Temp files left by writes that failed or were interrupted.
    async fn temp_paths(&self) -> Result<Vec<PathBuf>, CacheError> {
        self.paths_with_extension(TEMP_EXTENSION).await
    }

    async fn paths_with_extension(&self, extension: &str) -> Result<Vec<PathBuf>, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == extension) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

impl PersistentStore for DiskStore {
    fn put(&self, key: &CacheKey, data: Bytes) -> BoxFuture<'_, Result<(), CacheError>> {
        let path = self.key_path(key);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let key = key.clone();
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.directory).await?;

            // Write atomically via temp file
            let temp_path = path.with_extension(format!("{}.{}", seq, TEMP_EXTENSION));
            tokio::fs::write(&temp_path, &data).await?;
            if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e.into());
            }

            trace!(key = %key, bytes = data.len(), "Disk cache write");
            Ok(())
        })
    }

    fn get(&self, key: &CacheKey) -> BoxFuture<'_, Result<Option<Bytes>, CacheError>> {
        let path = self.key_path(key);
        Box::pin(async move {
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn delete_all(&self) -> BoxFuture<'_, Result<usize, CacheError>> {
        Box::pin(async move {
            let mut removed = 0;
            for path in self.entry_paths().await? {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            for path in self.temp_paths().await? {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            debug!(
                directory = %self.directory.display(),
                removed = removed,
                "Disk cache cleared"
            );
            Ok(removed)
        })
    }

    fn name(&self) -> &str {
        "disk"
    }
}
