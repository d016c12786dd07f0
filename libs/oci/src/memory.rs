//! In-memory registry for tests.
//!
//! Backs `BlobClient` with three maps: blob-by-digest, manifest-by-digest,
//! and tag-to-digest. A single `InMemoryRegistry` can be shared across
//! repositories and across push/pull clients, so round-trip tests exercise
//! the same store the seeded fixtures use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::client::{
    BlobClient, ContainerRegistryClientFactory, ManifestResponse, TokenCredential,
};
use crate::digest::compute_digest;
use crate::error::OciError;
use crate::manifest::MANIFEST_MEDIA_TYPE;

#[derive(Default)]
struct Store {
    /// Blob content keyed by (repository, digest).
    blobs: HashMap<(String, String), Bytes>,
    /// Manifest content keyed by (repository, digest).
    manifests: HashMap<(String, String), Bytes>,
    /// Tag aliases keyed by (repository, tag).
    tags: HashMap<(String, String), String>,
    /// When set, reported instead of the true manifest digest header.
    digest_header_override: Option<String>,
}

/// Shared in-memory registry state.
#[derive(Default, Clone)]
pub struct InMemoryRegistry {
    store: Arc<Mutex<Store>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob, returning its digest.
    pub fn put_blob(&self, repository: &str, data: Bytes) -> String {
        let digest = compute_digest(&data);
        let mut store = self.store.lock().unwrap();
        store
            .blobs
            .insert((repository.to_string(), digest.clone()), data);
        digest
    }

    /// Seed a manifest under a tag, returning its digest.
    pub fn put_manifest(&self, repository: &str, tag: &str, data: Bytes) -> String {
        let digest = compute_digest(&data);
        let mut store = self.store.lock().unwrap();
        store
            .manifests
            .insert((repository.to_string(), digest.clone()), data);
        store
            .tags
            .insert((repository.to_string(), tag.to_string()), digest.clone());
        digest
    }

    /// Force every manifest download to report the given digest header.
    pub fn override_digest_header(&self, digest: impl Into<String>) {
        self.store.lock().unwrap().digest_header_override = Some(digest.into());
    }

    /// Number of stored blobs, across all repositories.
    pub fn blob_count(&self) -> usize {
        self.store.lock().unwrap().blobs.len()
    }
}

/// Factory handing out per-repository clients over one shared store.
pub struct InMemoryClientFactory {
    registry: InMemoryRegistry,
}

impl InMemoryClientFactory {
    pub fn new(registry: InMemoryRegistry) -> Self {
        Self { registry }
    }
}

impl ContainerRegistryClientFactory for InMemoryClientFactory {
    fn create_blob_client(
        &self,
        _registry: &str,
        repository: &str,
        _credential: Arc<dyn TokenCredential>,
    ) -> Arc<dyn BlobClient> {
        Arc::new(InMemoryBlobClient {
            registry: self.registry.clone(),
            repository: repository.to_string(),
        })
    }
}

/// Blob client view of one repository in an `InMemoryRegistry`.
pub struct InMemoryBlobClient {
    registry: InMemoryRegistry,
    repository: String,
}

impl InMemoryBlobClient {
    pub fn new(registry: InMemoryRegistry, repository: impl Into<String>) -> Self {
        Self {
            registry,
            repository: repository.into(),
        }
    }

    fn key(&self, name: &str) -> (String, String) {
        (self.repository.clone(), name.to_string())
    }
}

#[async_trait]
impl BlobClient for InMemoryBlobClient {
    async fn download_manifest(
        &self,
        reference: &str,
        _accept: &str,
    ) -> Result<ManifestResponse, OciError> {
        let store = self.registry.store.lock().unwrap();

        let digest = if reference.contains(':') {
            reference.to_string()
        } else {
            store
                .tags
                .get(&self.key(reference))
                .cloned()
                .ok_or_else(|| OciError::NotFound(reference.to_string()))?
        };

        let content = store
            .manifests
            .get(&self.key(&digest))
            .cloned()
            .ok_or_else(|| OciError::NotFound(reference.to_string()))?;

        let digest = store
            .digest_header_override
            .clone()
            .unwrap_or(digest);

        Ok(ManifestResponse { digest, content })
    }

    async fn download_blob(&self, digest: &str) -> Result<Bytes, OciError> {
        let store = self.registry.store.lock().unwrap();
        store
            .blobs
            .get(&self.key(digest))
            .cloned()
            .ok_or_else(|| OciError::NotFound(digest.to_string()))
    }

    async fn upload_blob(&self, data: Bytes) -> Result<String, OciError> {
        Ok(self.registry.put_blob(&self.repository, data))
    }

    async fn upload_manifest(
        &self,
        data: Bytes,
        media_type: &str,
        tag: &str,
    ) -> Result<(), OciError> {
        if media_type != MANIFEST_MEDIA_TYPE {
            return Err(OciError::UnsupportedMediaType(media_type.to_string()));
        }
        self.registry.put_manifest(&self.repository, tag, data);
        Ok(())
    }
}
