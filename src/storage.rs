//! Blob storage for resume documents

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob storage is not configured")]
    Unavailable,
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object key for a participant's resume for one vacancy
pub fn storage_key(participant_id: &str, vacancy_ref: &str) -> String {
    format!("{participant_id}/{vacancy_ref}")
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Checked before every submission; unavailability is surfaced to the user
    fn is_available(&self) -> bool;

    /// Store `bytes` and return the storage key
    async fn store(
        &self,
        bytes: Vec<u8>,
        participant_id: &str,
        vacancy_ref: &str,
    ) -> Result<String, StorageError>;
}

/// S3-style object store reached with plain authenticated PUTs
pub struct HttpBlobStorage {
    client: Client,
    endpoint: Option<Url>,
    bucket: Option<String>,
    token: Option<String>,
}

impl HttpBlobStorage {
    pub fn new(
        endpoint: Option<&str>,
        bucket: Option<&str>,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let endpoint = match endpoint.filter(|e| !e.trim().is_empty()) {
            Some(raw) => Some(
                Url::parse(raw)
                    .map_err(|e| StorageError::Upload(format!("Invalid storage endpoint {raw}: {e}")))?,
            ),
            None => None,
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Upload(format!("Failed to create HTTP client: {e}")))?;

        let storage = Self {
            client,
            endpoint,
            bucket: bucket.map(str::trim).filter(|b| !b.is_empty()).map(str::to_string),
            token: token.map(str::to_string),
        };
        if !storage.is_available() {
            tracing::warn!("Blob storage endpoint or bucket missing; resume uploads are disabled");
        }
        Ok(storage)
    }

    fn object_url(&self, key: &str) -> Result<Url, StorageError> {
        let (Some(endpoint), Some(bucket)) = (&self.endpoint, &self.bucket) else {
            return Err(StorageError::Unavailable);
        };
        let mut url = endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::Upload(format!("Storage endpoint {endpoint} cannot be a base")))?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl BlobStorage for HttpBlobStorage {
    fn is_available(&self) -> bool {
        self.endpoint.is_some() && self.bucket.is_some()
    }

    async fn store(
        &self,
        bytes: Vec<u8>,
        participant_id: &str,
        vacancy_ref: &str,
    ) -> Result<String, StorageError> {
        let key = storage_key(participant_id, vacancy_ref);
        let url = self.object_url(&key)?;
        let size = bytes.len();

        let mut request = self
            .client
            .put(url)
            .header("content-type", "application/pdf")
            .header("x-amz-meta-uploaded-via", "interview-bot")
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Upload(format!("Request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upload(format!("HTTP {status}: {body}")));
        }

        tracing::info!(%key, size, "Resume stored");
        Ok(key)
    }
}
