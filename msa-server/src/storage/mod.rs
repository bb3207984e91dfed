//! Object storage for audio files, covers and pre-generated archives
//!
//! The service only needs four operations, so storage is a small async trait.
//! Production uses the Supabase storage REST API; tests use an in-memory map.

pub mod paths;
mod supabase;

pub use supabase::SupabaseStorage;

use async_trait::async_trait;
use bytes::Bytes;
use msa_common::Transient;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Credentials rejected by the storage service (401/403)
    #[error("Storage rejected credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("Storage error: status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Storage network error: {0}")]
    Network(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        match self {
            StorageError::Network(_) => true,
            StorageError::Http { status, .. } => *status >= 500 || *status == 429,
            StorageError::Unauthorized { .. } | StorageError::Config(_) => false,
        }
    }
}

/// Object listed under a prefix
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredObject {
    /// Name relative to the listed prefix
    pub name: String,
}

/// Remote object store
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` at `path` (overwriting) and return its public URL
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> Result<String, StorageError>;

    /// Objects directly under `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError>;

    /// Delete the given object paths
    async fn delete(&self, paths: &[String]) -> Result<(), StorageError>;

    /// Public URL of an object path
    fn public_url(&self, path: &str) -> String;
}

/// Storage settings (`[storage]` section)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub base_url: String,
    /// Service role key; prefer `MSA_STORAGE_KEY` over the config file
    pub service_key: String,
    pub bucket: String,
    pub timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            service_key: String::new(),
            bucket: "musica".to_string(),
            timeout_secs: 120,
        }
    }
}

impl StorageSettings {
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.service_key.trim().is_empty()
    }
}

/// Content type for an upload by file extension
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
