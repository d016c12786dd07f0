//! Registry blob client.
//!
//! `BlobClient` abstracts the four operations the restore engine needs from a
//! registry: manifest download/upload and blob download/upload. The concrete
//! implementation speaks the OCI distribution HTTP API; an in-memory
//! implementation for tests lives in `memory`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::digest::compute_digest;
use crate::error::OciError;
use crate::manifest::MANIFEST_MEDIA_TYPE;

/// Response header carrying the manifest digest computed by the registry.
pub const DIGEST_HEADER: &str = "Docker-Content-Digest";

/// A downloaded manifest plus the digest the registry reported for it.
#[derive(Debug, Clone)]
pub struct ManifestResponse {
    /// Value of the `Docker-Content-Digest` response header.
    pub digest: String,
    /// Raw manifest bytes.
    pub content: Bytes,
}

/// Opaque bearer-token provider. Acquisition and refresh are external.
pub trait TokenCredential: Send + Sync {
    /// The token to attach to requests, if any.
    fn bearer_token(&self) -> Option<String>;
}

/// Credential that never supplies a token.
pub struct AnonymousCredential;

impl TokenCredential for AnonymousCredential {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

/// Credential wrapping a fixed token.
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        StaticTokenCredential { token: token.into() }
    }
}

impl TokenCredential for StaticTokenCredential {
    fn bearer_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

/// Abstract registry blob client, scoped to one repository.
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Download a manifest by tag or digest.
    ///
    /// `accept` is sent as the `Accept` header; the returned digest is the
    /// registry's `Docker-Content-Digest` header, unverified.
    async fn download_manifest(
        &self,
        reference: &str,
        accept: &str,
    ) -> Result<ManifestResponse, OciError>;

    /// Download a blob by digest.
    async fn download_blob(&self, digest: &str) -> Result<Bytes, OciError>;

    /// Upload a blob, returning the digest computed over its bytes.
    async fn upload_blob(&self, data: Bytes) -> Result<String, OciError>;

    /// Upload a manifest under the given tag.
    ///
    /// Only the module manifest media type is accepted.
    async fn upload_manifest(
        &self,
        data: Bytes,
        media_type: &str,
        tag: &str,
    ) -> Result<(), OciError>;
}

/// Creates blob clients for a (registry, repository) pair.
pub trait ContainerRegistryClientFactory: Send + Sync {
    fn create_blob_client(
        &self,
        registry: &str,
        repository: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Arc<dyn BlobClient>;
}

/// Configuration for the HTTPS client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Whole-request timeout applied to every transfer.
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Factory producing `HttpBlobClient` instances over a shared connection pool.
pub struct HttpClientFactory {
    client: Client,
}

impl HttpClientFactory {
    pub fn new(config: HttpClientConfig) -> Result<Self, OciError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client })
    }
}

impl ContainerRegistryClientFactory for HttpClientFactory {
    fn create_blob_client(
        &self,
        registry: &str,
        repository: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Arc<dyn BlobClient> {
        Arc::new(HttpBlobClient {
            client: self.client.clone(),
            registry_url: registry_base_url(registry),
            repository: repository.to_string(),
            credential,
        })
    }
}

fn registry_base_url(registry: &str) -> String {
    if registry.starts_with("http://") || registry.starts_with("https://") {
        registry.trim_end_matches('/').to_string()
    } else {
        format!("https://{registry}")
    }
}

/// Blob client speaking the OCI distribution HTTP API.
pub struct HttpBlobClient {
    client: Client,
    registry_url: String,
    repository: String,
    credential: Arc<dyn TokenCredential>,
}

impl HttpBlobClient {
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credential.bearer_token() {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    fn status_error(&self, status: StatusCode, url: &str, what: &str) -> OciError {
        match status {
            StatusCode::NOT_FOUND => OciError::NotFound(what.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                OciError::Forbidden(what.to_string())
            }
            status => OciError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            },
        }
    }
}

#[async_trait]
impl BlobClient for HttpBlobClient {
    async fn download_manifest(
        &self,
        reference: &str,
        accept: &str,
    ) -> Result<ManifestResponse, OciError> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url, self.repository, reference
        );
        debug!(url = %url, "Downloading manifest");

        let request = self.authorize(self.client.get(&url).header("Accept", accept));
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => {
                let digest = response
                    .headers()
                    .get(DIGEST_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .ok_or(OciError::MissingDigestHeader)?;
                let content = response.bytes().await?;
                Ok(ManifestResponse { digest, content })
            }
            status => Err(self.status_error(status, &url, reference)),
        }
    }

    async fn download_blob(&self, digest: &str) -> Result<Bytes, OciError> {
        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.registry_url, self.repository, digest
        );
        debug!(url = %url, "Downloading blob");

        let request = self.authorize(self.client.get(&url));
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => {
                let content = response.bytes().await?;
                let computed = compute_digest(&content);
                if computed != digest {
                    return Err(OciError::DigestMismatch {
                        expected: digest.to_string(),
                        actual: computed,
                    });
                }
                Ok(content)
            }
            status => Err(self.status_error(status, &url, digest)),
        }
    }

    async fn upload_blob(&self, data: Bytes) -> Result<String, OciError> {
        let digest = compute_digest(&data);
        let start_url = format!("{}/v2/{}/blobs/uploads/", self.registry_url, self.repository);

        // Two-step monolithic upload: POST for a session, PUT the bytes.
        let response = self.authorize(self.client.post(&start_url)).send().await?;
        if response.status() != StatusCode::ACCEPTED {
            return Err(self.status_error(response.status(), &start_url, &digest));
        }

        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or(OciError::UnexpectedStatus {
                status: response.status().as_u16(),
                url: start_url.clone(),
            })?;
        let location = if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}{}", self.registry_url, location)
        };
        let separator = if location.contains('?') { '&' } else { '?' };
        let put_url = format!("{location}{separator}digest={digest}");

        debug!(url = %put_url, size = data.len(), "Uploading blob");

        let response = self
            .authorize(self.client.put(&put_url))
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.status_error(response.status(), &put_url, &digest));
        }

        Ok(digest)
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

        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url, self.repository, tag
        );
        debug!(url = %url, size = data.len(), "Uploading manifest");

        let response = self
            .authorize(self.client.put(&url))
            .header("Content-Type", media_type)
            .body(data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.status_error(response.status(), &url, tag));
        }

        Ok(())
    }
}
