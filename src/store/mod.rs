//! Content-addressed store seam.

use async_trait::async_trait;

use crate::error::StoreError;

pub mod fs;

pub use fs::FsContentStore;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Persist `bytes` and return the identifier they can be fetched by.
    async fn store(&self, bytes: &[u8]) -> Result<String, StoreError>;
}
