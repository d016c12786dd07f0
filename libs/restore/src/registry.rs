//! Registry dispatch.
//!
//! A registry is a capability set (`scheme_matches`, `restore`,
//! `local_path`, `in_cache`) with two variants. Dispatch is by reference
//! variant, not a class hierarchy: a local reference always lands on the
//! local registry and an OCI reference on the OCI registry.

use std::path::PathBuf;
use std::sync::Arc;

use crate::artifact::{ArtifactManager, PullResult};
use crate::error::Result;
use crate::fs::FileResolver;
use crate::reference::{ModuleReference, OciModuleReference};

/// A registry capable of answering restore queries for one reference scheme.
pub enum Registry {
    Local(LocalRegistry),
    Oci(OciRegistry),
}

impl Registry {
    /// Whether this registry serves the reference's scheme.
    pub fn scheme_matches(&self, reference: &ModuleReference) -> bool {
        matches!(
            (self, reference),
            (Registry::Local(_), ModuleReference::Local(_))
                | (Registry::Oci(_), ModuleReference::Oci(_))
        )
    }

    /// Whether the reference is already materialized locally.
    pub fn in_cache(&self, reference: &ModuleReference) -> bool {
        match (self, reference) {
            // Local modules are read in place; nothing to restore.
            (Registry::Local(_), ModuleReference::Local(_)) => true,
            (Registry::Oci(oci), ModuleReference::Oci(reference)) => oci.in_cache(reference),
            _ => false,
        }
    }

    /// Fetch the reference into the cache.
    pub async fn restore(&self, reference: &ModuleReference) -> Result<()> {
        match (self, reference) {
            (Registry::Local(_), ModuleReference::Local(_)) => Ok(()),
            (Registry::Oci(oci), ModuleReference::Oci(reference)) => {
                oci.restore(reference).await.map(|_| ())
            }
            _ => Ok(()),
        }
    }

    /// The on-disk path backing the reference, if one exists.
    pub fn local_path(&self, reference: &ModuleReference) -> Option<PathBuf> {
        match (self, reference) {
            (Registry::Local(local), ModuleReference::Local(reference)) => {
                local.local_path(reference)
            }
            (Registry::Oci(oci), ModuleReference::Oci(reference)) => oci.local_path(reference),
            _ => None,
        }
    }
}

/// Registry over modules that live next to their referrers on disk.
pub struct LocalRegistry {
    resolver: Arc<dyn FileResolver>,
}

impl LocalRegistry {
    pub fn new(resolver: Arc<dyn FileResolver>) -> Self {
        Self { resolver }
    }

    fn local_path(&self, reference: &crate::reference::LocalModuleReference) -> Option<PathBuf> {
        self.resolver.resolve(&reference.path)
    }
}

/// Registry over OCI module artifacts, backed by the artifact manager.
pub struct OciRegistry {
    manager: ArtifactManager,
}

impl OciRegistry {
    pub fn new(manager: ArtifactManager) -> Self {
        Self { manager }
    }

    pub fn in_cache(&self, reference: &OciModuleReference) -> bool {
        self.manager.cache().is_populated(reference)
    }

    pub async fn restore(&self, reference: &OciModuleReference) -> Result<PullResult> {
        self.manager.pull(reference).await
    }

    /// Entry-point file of a materialized artifact. The cache records no
    /// manifest order, so selection is over the file names: the single
    /// cached file, a `main.json` if several exist, else the first by name.
    pub fn local_path(&self, reference: &OciModuleReference) -> Option<PathBuf> {
        let files = self.manager.cache().entry_files(reference).ok()?;
        if files.is_empty() {
            return None;
        }
        files
            .iter()
            .find(|p| p.file_name().is_some_and(|n| n == "main.json"))
            .or_else(|| files.first())
            .cloned()
    }
}

/// Dispatches references to the registry serving their scheme.
pub struct RegistrySet {
    registries: Vec<Registry>,
}

impl RegistrySet {
    pub fn new(local: LocalRegistry, oci: OciRegistry) -> Self {
        Self {
            registries: vec![Registry::Local(local), Registry::Oci(oci)],
        }
    }

    /// The registry serving this reference's scheme.
    pub fn dispatch(&self, reference: &ModuleReference) -> &Registry {
        self.registries
            .iter()
            .find(|r| r.scheme_matches(reference))
            .expect("every reference variant has a registry")
    }

    /// Group references by the registry serving them, preserving input
    /// order within each partition.
    pub fn partition<'a>(
        &self,
        references: &'a [ModuleReference],
    ) -> Vec<(&Registry, Vec<&'a ModuleReference>)> {
        self.registries
            .iter()
            .map(|registry| {
                let partition = references
                    .iter()
                    .filter(|reference| registry.scheme_matches(reference))
                    .collect();
                (registry, partition)
            })
            .collect()
    }
}
