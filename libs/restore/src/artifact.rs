//! Artifact pull and push orchestration.
//!
//! Pull: manifest download, digest verification against the registry's
//! `Docker-Content-Digest` header, artifact-profile validation, then layer
//! downloads into the content-addressed cache. Push: config and layer blob
//! uploads followed by manifest compose and upload.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use bicep_oci::{
    compute_digest, trim_digest, BlobClient, ContainerRegistryClientFactory, Descriptor,
    Manifest, OciError, TokenCredential, LAYER_TITLE_ANNOTATION,
};

use crate::cache::ModuleCache;
use crate::config::{RestoreConfig, MODULE_LAYER_MEDIA_TYPE};
use crate::error::{RestoreError, Result};
use crate::reference::OciModuleReference;

/// Result of a successful pull.
#[derive(Debug, Clone)]
pub struct PullResult {
    /// Path of the artifact's entry-point file in the cache.
    pub entry_point: PathBuf,
    /// Number of layers written.
    pub layer_count: usize,
}

/// A layer to publish: optional file title plus its bytes.
#[derive(Debug, Clone)]
pub struct ModuleLayer {
    pub title: Option<String>,
    pub data: Bytes,
}

/// Pulls module artifacts into the cache and pushes them to registries.
pub struct ArtifactManager {
    config: RestoreConfig,
    factory: Arc<dyn ContainerRegistryClientFactory>,
    credential: Arc<dyn TokenCredential>,
    cache: ModuleCache,
}

impl ArtifactManager {
    pub fn new(
        config: RestoreConfig,
        factory: Arc<dyn ContainerRegistryClientFactory>,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        let cache = ModuleCache::new(&config.cache_root);
        Self {
            config,
            factory,
            credential,
            cache,
        }
    }

    /// The cache this manager populates.
    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    fn client_for(&self, reference: &OciModuleReference) -> Arc<dyn BlobClient> {
        self.factory.create_blob_client(
            &reference.registry,
            &reference.repository,
            self.credential.clone(),
        )
    }

    /// Pull a module artifact into the cache.
    pub async fn pull(&self, reference: &OciModuleReference) -> Result<PullResult> {
        let client = self.client_for(reference);

        let response = client
            .download_manifest(&reference.tag, &self.config.module_manifest_media_type)
            .await
            .map_err(|e| match e {
                OciError::NotFound(_) => RestoreError::ModuleNotFound(reference.to_string()),
                other => RestoreError::from_oci(other),
            })?;

        // The registry's digest header must match the body we received.
        let computed = compute_digest(&response.content);
        if computed != response.digest {
            return Err(RestoreError::IntegrityError {
                expected: response.digest,
                actual: computed,
            });
        }

        let manifest = Manifest::from_slice(&response.content).map_err(RestoreError::from_oci)?;
        self.validate_module_profile(reference, &manifest)?;

        let entry_dir = self.cache.ensure_entry_dir(reference)?;

        let mut entry_point = None;
        for layer in &manifest.layers {
            let file_name = layer
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| trim_digest(&layer.digest).to_string());

            let data = client.download_blob(&layer.digest).await.map_err(|e| match e {
                // A missing layer behind a valid manifest is a registry
                // consistency problem, not an absent module.
                OciError::NotFound(what) => {
                    RestoreError::Transport(format!("layer blob not found: {what}"))
                }
                other => RestoreError::from_oci(other),
            })?;

            let path = self.cache.write_layer(&entry_dir, &file_name, &data)?;
            entry_point.get_or_insert(path);

            debug!(
                reference = %reference,
                digest = %layer.digest,
                file = %file_name,
                "Restored layer"
            );
        }

        info!(
            reference = %reference,
            layers = manifest.layers.len(),
            "Module restored"
        );

        Ok(PullResult {
            entry_point: entry_point.unwrap_or(entry_dir),
            layer_count: manifest.layers.len(),
        })
    }

    /// Reject artifacts outside the module profile: the config must carry
    /// the engine's module-config media type and be empty.
    fn validate_module_profile(
        &self,
        reference: &OciModuleReference,
        manifest: &Manifest,
    ) -> Result<()> {
        let config = &manifest.config;
        if !config
            .media_type
            .eq_ignore_ascii_case(&self.config.module_config_media_type)
        {
            return Err(RestoreError::NotABicepModule(format!(
                "{reference}: unexpected config media type {}",
                config.media_type
            )));
        }
        if config.size != 0 {
            return Err(RestoreError::NotABicepModule(format!(
                "{reference}: config blob is not empty ({} bytes)",
                config.size
            )));
        }
        Ok(())
    }

    /// Publish a module artifact.
    pub async fn push(
        &self,
        reference: &OciModuleReference,
        config_data: Bytes,
        layers: &[ModuleLayer],
    ) -> Result<()> {
        let client = self.client_for(reference);

        let config_descriptor = Descriptor::from_bytes(
            &self.config.module_config_media_type,
            &config_data,
            BTreeMap::new(),
        );
        client
            .upload_blob(config_data)
            .await
            .map_err(RestoreError::from_oci)?;

        let mut layer_descriptors = Vec::with_capacity(layers.len());
        for layer in layers {
            let mut annotations = BTreeMap::new();
            if let Some(title) = &layer.title {
                annotations.insert(LAYER_TITLE_ANNOTATION.to_string(), title.clone());
            }
            let descriptor =
                Descriptor::from_bytes(MODULE_LAYER_MEDIA_TYPE, &layer.data, annotations);
            client
                .upload_blob(layer.data.clone())
                .await
                .map_err(RestoreError::from_oci)?;
            layer_descriptors.push(descriptor);
        }

        let manifest = Manifest::new(config_descriptor, layer_descriptors);
        let manifest_bytes = manifest.to_bytes().map_err(RestoreError::from_oci)?;

        client
            .upload_manifest(
                Bytes::from(manifest_bytes),
                &self.config.module_manifest_media_type,
                &reference.tag,
            )
            .await
            .map_err(RestoreError::from_oci)?;

        info!(reference = %reference, layers = layers.len(), "Module published");
        Ok(())
    }
}
