//! In-process stand-ins for the remote audio host and object storage

use async_trait::async_trait;
use bytes::Bytes;
use msa_server::services::{AudioFetcher, FetchError};
use msa_server::storage::{ObjectStorage, StorageError, StoredObject};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted answer for one URI
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Audio(Bytes),
    Delayed(Duration, Bytes),
    Fail(FetchError),
}

/// Audio payload big enough to pass the minimum size check
pub fn audio_payload(tag: &str) -> Bytes {
    Bytes::from(format!("ID3{}", tag).repeat(400))
}

/// Fetcher answering from a URI table; unknown URIs are 404
#[derive(Debug, Default)]
pub struct FakeFetcher {
    responses: Mutex<HashMap<String, FakeResponse>>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, uri: &str, response: FakeResponse) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(uri.to_string(), response);
        self
    }

    pub fn with_audio(self, uri: &str) -> Self {
        let payload = audio_payload(uri);
        self.with(uri, FakeResponse::Audio(payload))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioFetcher for FakeFetcher {
    async fn fetch(&self, uri: &str) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.responses.lock().unwrap().get(uri).cloned();

        match response {
            Some(FakeResponse::Audio(bytes)) => Ok(bytes),
            Some(FakeResponse::Delayed(delay, bytes)) => {
                tokio::time::sleep(delay).await;
                Ok(bytes)
            }
            Some(FakeResponse::Fail(err)) => Err(err),
            None => Err(FetchError::Http { status: 404 }),
        }
    }
}

/// Bucket kept in a map; paths in `failing` reject writes, prefixes in
/// `failing_lists` reject listings
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
    failing: Mutex<HashSet<String>>,
    failing_lists: Mutex<HashSet<String>>,
    fail_all_puts: Mutex<bool>,
}

pub const PUBLIC_BASE: &str = "https://storage.test/public/musica";

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to a path containing `fragment` fail
    pub fn fail_paths_containing(&self, fragment: &str) {
        self.failing.lock().unwrap().insert(fragment.to_string());
    }

    /// Make listing any prefix containing `fragment` fail with a 500
    pub fn fail_lists_containing(&self, fragment: &str) {
        self.failing_lists.lock().unwrap().insert(fragment.to_string());
    }

    /// Let listings succeed again
    pub fn heal_lists(&self) {
        self.failing_lists.lock().unwrap().clear();
    }

    pub fn fail_all_puts(&self) {
        *self.fail_all_puts.lock().unwrap() = true;
    }

    /// Insert an object directly
    pub fn seed(&self, path: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(
            path.to_string(),
            (Bytes::copy_from_slice(data), "application/octet-stream".to_string()),
        );
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, path: &str) -> Option<(Bytes, String)> {
        self.objects.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> Result<String, StorageError> {
        let rejected = *self.fail_all_puts.lock().unwrap()
            || self
                .failing
                .lock()
                .unwrap()
                .iter()
                .any(|fragment| path.contains(fragment.as_str()));
        if rejected {
            return Err(StorageError::Http {
                status: 400,
                message: format!("rejected write to {}", path),
            });
        }

        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (data, content_type.to_string()));
        Ok(self.public_url(path))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
        let rejected = self
            .failing_lists
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| prefix.contains(fragment.as_str()));
        if rejected {
            return Err(StorageError::Http {
                status: 500,
                message: format!("listing {} failed", prefix),
            });
        }

        let folder = format!("{}/", prefix.trim_end_matches('/'));
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .keys()
            .filter_map(|path| path.strip_prefix(&folder))
            .filter(|rest| !rest.contains('/'))
            .map(|name| StoredObject { name: name.to_string() })
            .collect())
    }

    async fn delete(&self, paths: &[String]) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().unwrap();
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", PUBLIC_BASE, path)
    }
}
