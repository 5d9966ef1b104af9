//! Cloud Storage for Firebase module.
//!
//! Browses one bucket through the Firebase Storage REST API: listing folder
//! levels, reading object metadata and download URLs, uploading and
//! downloading content.

pub mod models;
pub mod reference;


use reference::StorageReference;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

/// Errors that can occur during Storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the Firebase Storage API.
    #[error("{0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid storage URL: {0}")]
    InvalidUrl(String),
    /// The object has no download token, so no public URL can be built.
    #[error("No download URL available for '{0}'")]
    NoDownloadUrl(String),
}

impl From<url::ParseError> for StorageError {
    fn from(e: url::ParseError) -> Self {
        StorageError::InvalidUrl(e.to_string())
    }
}

/// One level of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    /// Folder prefixes, without trailing slash.
    pub prefixes: Vec<StorageReference>,
    pub items: Vec<StorageReference>,
}

/// Client for one Cloud Storage for Firebase bucket.
#[derive(Clone)]
pub struct FirebaseStorage {
    client: ClientWithMiddleware,
    base_url: String,
    bucket: String,
}

impl FirebaseStorage {
    /// `api_root` is the service root (`https://firebasestorage.googleapis.com/v0`);
    /// `bucket` is the configuration's `storageBucket`, with or without `gs://`.
    pub fn new(client: ClientWithMiddleware, api_root: &str, bucket: &str) -> Self {
        Self {
            client,
            base_url: api_root.trim_end_matches('/').to_string(),
            bucket: bucket.trim_start_matches("gs://").trim_end_matches('/').to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The bucket root.
    pub fn root(&self) -> StorageReference {
        self.reference("")
    }

    /// A reference to `path` within the bucket.
    pub fn reference(&self, path: &str) -> StorageReference {
        StorageReference::new(
            self.client.clone(),
            self.base_url.clone(),
            self.bucket.clone(),
            path,
        )
    }
}
