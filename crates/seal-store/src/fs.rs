use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use seal_crypto::ContentHasher;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::memory::{validate_key, verify_blob};
use crate::model::{ArchiveMetadata, Locator};
use crate::traits::ArchiveStore;

/// Filesystem archive: one read-only file per key.
///
/// Layout under the root directory:
/// ```text
/// blobs/<key>          the stored bytes
/// meta/<key>.json      the ArchiveMetadata written with them
/// ```
/// Blobs are created with `create_new`, so the OS enforces write-once even
/// across processes, then fsynced and marked read-only.
#[derive(Debug, Clone)]
pub struct FsArchiveStore {
    root: PathBuf,
}

impl FsArchiveStore {
    /// Open (and create if needed) an archive rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("blobs"))?;
        fs::create_dir_all(root.join("meta"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join("blobs").join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join("meta").join(format!("{key}.json"))
    }
}

impl ArchiveStore for FsArchiveStore {
    fn put(&self, key: &str, bytes: &[u8], metadata: &ArchiveMetadata) -> StoreResult<Locator> {
        validate_key(key)?;
        let blob_path = self.blob_path(key);
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&blob_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes)?;
        file.sync_all()?;
        let mut permissions = file.metadata()?.permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&blob_path, permissions)?;

        let meta_path = self.meta_path(key);
        if let Some(parent) = meta_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let encoded = serde_json::to_vec_pretty(metadata)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&meta_path, encoded)?;

        let digest = ContentHasher::ARTIFACT.hash(bytes);
        debug!(key, digest = %digest.short_hex(), path = %blob_path.display(), "archived blob");
        Ok(Locator::new(key, digest, bytes.len() as u64))
    }

    fn get(&self, locator: &Locator) -> StoreResult<Vec<u8>> {
        validate_key(&locator.key)?;
        let bytes = match fs::read(self.blob_path(&locator.key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(locator.key.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        verify_blob(locator, &bytes)?;
        Ok(bytes)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        Ok(self.blob_path(key).is_file())
    }

    fn metadata(&self, key: &str) -> StoreResult<Option<ArchiveMetadata>> {
        validate_key(key)?;
        match fs::read(self.meta_path(key)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
