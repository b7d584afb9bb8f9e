//! Blob storage for rendered presentations.
//!
//! The request handler and the purger only see the [`BlobStore`] trait. Production uses
//! [`AzureBlobStore`]; tests and local runs can use [`MemoryBlobStore`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::pptx::{RenderedDeck, PPTX_CONTENT_TYPE};

pub mod azure;
pub mod memory;
pub mod sas;

pub use azure::{AzureBlobStore, ConnectionInfo};
pub use memory::MemoryBlobStore;

/// How long a download link stays valid.
pub const LINK_VALIDITY_MINUTES: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage {operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("storage configuration error: {0}")]
    Config(String),

    #[error("storage key error: {0}")]
    Key(String),

    #[error("unreadable blob listing: {0}")]
    Listing(String),

    #[error("blob not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Creates or replaces `name`.
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    /// Read-only link to `name` valid during `[start, expiry]`.
    fn signed_read_url(
        &self,
        name: &str,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<String, StorageError>;

    /// Every blob whose name starts with `prefix`, across all pages.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn delete(&self, name: &str) -> Result<(), StorageError>;

    /// Short description for logs and the status endpoint.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub blob_name: String,
    pub url: String,
    pub valid_from: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Uploads `deck` and returns a read link valid for `LINK_VALIDITY_MINUTES` from `now`.
pub async fn upload_deck(
    store: &dyn BlobStore,
    deck: RenderedDeck,
    now: DateTime<Utc>,
) -> Result<UploadResult, StorageError> {
    let RenderedDeck { file_name, bytes } = deck;
    let size = bytes.len();

    store.put(&file_name, bytes, PPTX_CONTENT_TYPE).await?;

    let expires_at = now + Duration::minutes(LINK_VALIDITY_MINUTES);
    let url = store.signed_read_url(&file_name, now, expires_at)?;

    info!(blob = %file_name, bytes = size, expires_at = %expires_at, "presentation uploaded");

    Ok(UploadResult {
        blob_name: file_name,
        url,
        valid_from: now,
        expires_at,
    })
}
