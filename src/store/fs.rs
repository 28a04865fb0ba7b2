//! Filesystem-backed content store keyed by SHA-256.
//!
//! Layout: `<root>/<first two hex chars>/<full hex digest>`. Storing the same
//! bytes twice is a no-op that returns the same id.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::StoreError;

use super::ContentStore;

pub struct FsContentStore {
    root: PathBuf,
}

fn hex32(d: [u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in d {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Content id for `bytes`.
pub fn content_id(bytes: &[u8]) -> String {
    hex32(Sha256::digest(bytes).into())
}

impl FsContentStore {
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Unreachable(format!("{}: {e}", root.display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        let shard = id.get(..2).unwrap_or("00");
        self.root.join(shard).join(id)
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn store(&self, bytes: &[u8]) -> Result<String, StoreError> {
        let id = content_id(bytes);
        let path = self.path_for(&id);
        if tokio::fs::try_exists(&path).await? {
            debug!(%id, "content already present");
            return Ok(id);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // A blob under its final id is always complete.
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(%id, len = bytes.len(), "stored content");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_store_is_content_addressed() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::open(dir.path().join("blobs")).await.unwrap();

        let a = store.store(b"hello").await.unwrap();
        let b = store.store(b"hello").await.unwrap();
        let c = store.store(b"world").await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(
            a,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(std::fs::read(store.path_for(&a)).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_open_fails_when_root_is_a_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();

        let err = FsContentStore::open(file.join("nested")).await.err().unwrap();
        assert!(matches!(err, StoreError::Unreachable(_)));
    }
}
