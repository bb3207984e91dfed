//! Supabase storage REST client

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::time::Duration;

use super::{ObjectStorage, StorageError, StorageSettings, StoredObject};

/// Page size for list requests
const LIST_LIMIT: usize = 1000;

/// Storage client for one bucket
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(settings: &StorageSettings) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            service_key: settings.service_key.clone(),
            bucket: settings.bucket.clone(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        if code == 401 || code == 403 {
            return Err(StorageError::Unauthorized { status: code });
        }

        let message = response.text().await.unwrap_or_default();
        Err(StorageError::Http { status: code, message })
    }
}

fn network(err: reqwest::Error) -> StorageError {
    StorageError::Network(err.to_string())
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> Result<String, StorageError> {
        let size = data.len();
        let request = self
            .client
            .post(self.object_url(path))
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(data);

        let response = self.authorized(request).send().await.map_err(network)?;
        Self::check(response).await?;

        tracing::debug!(path, bytes = size, "Stored object");
        Ok(self.public_url(path))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
        let url = format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket);
        let request = self.client.post(url).json(&json!({
            "prefix": prefix,
            "limit": LIST_LIMIT,
            "offset": 0,
        }));

        let response = self.authorized(request).send().await.map_err(network)?;
        let response = Self::check(response).await?;
        response
            .json::<Vec<StoredObject>>()
            .await
            .map_err(|e| StorageError::Network(format!("Invalid list response: {}", e)))
    }

    async fn delete(&self, paths: &[String]) -> Result<(), StorageError> {
        if paths.is_empty() {
            return Ok(());
        }

        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let request = self.client.delete(url).json(&json!({ "prefixes": paths }));

        let response = self.authorized(request).send().await.map_err(network)?;
        Self::check(response).await?;

        tracing::debug!(count = paths.len(), "Deleted objects");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, path)
    }
}
