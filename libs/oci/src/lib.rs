//! OCI distribution wire layer for the Bicep module registry.
//!
//! Bicep modules are published as a narrow OCI artifact profile: one empty
//! config blob plus opaque layer blobs carrying file-name annotations. This
//! crate covers the wire side of that profile:
//!
//! - `digest`: SHA-256 content digests (`sha256:<hex>`)
//! - `descriptor`: content descriptors (pointer-with-integrity)
//! - `manifest`: the image-manifest v1 codec
//! - `client`: the `BlobClient` abstraction and its HTTPS implementation
//! - `memory`: an in-memory registry for tests
//!
//! Reference: https://github.com/opencontainers/distribution-spec

pub mod client;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod memory;

pub use client::{
    AnonymousCredential, BlobClient, ContainerRegistryClientFactory, HttpBlobClient,
    HttpClientConfig, HttpClientFactory, ManifestResponse, StaticTokenCredential,
    TokenCredential, DIGEST_HEADER,
};
pub use descriptor::{Descriptor, LAYER_TITLE_ANNOTATION};
pub use digest::{compute_digest, trim_digest, DIGEST_ALGORITHM};
pub use error::OciError;
pub use manifest::{Manifest, MANIFEST_MEDIA_TYPE};
pub use memory::{InMemoryBlobClient, InMemoryClientFactory, InMemoryRegistry};
