//! Batch restore entry point.
//!
//! The dispatcher partitions references by registry, skips ones already
//! materialized, and pulls the rest. Per-reference failures become stored
//! diagnostics rather than errors; the boolean return only tells the
//! scheduler whether recompilation is worthwhile.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::artifact::ArtifactManager;
use crate::config::RestoreConfig;
use crate::error::RestoreError;
use crate::fs::FileResolver;
use crate::reference::ModuleReference;
use crate::registry::{LocalRegistry, OciRegistry, Registry, RegistrySet};

use bicep_oci::{ContainerRegistryClientFactory, TokenCredential};

/// Coordinates restore across the registry set and records diagnostics.
pub struct ModuleDispatcher {
    config: RestoreConfig,
    registries: RegistrySet,
    errors: Mutex<HashMap<ModuleReference, RestoreError>>,
}

impl ModuleDispatcher {
    pub fn new(
        config: RestoreConfig,
        factory: Arc<dyn ContainerRegistryClientFactory>,
        credential: Arc<dyn TokenCredential>,
        resolver: Arc<dyn FileResolver>,
    ) -> Self {
        let manager = ArtifactManager::new(config.clone(), factory, credential);
        let registries = RegistrySet::new(
            LocalRegistry::new(resolver),
            OciRegistry::new(manager),
        );
        Self {
            config,
            registries,
            errors: Mutex::new(HashMap::new()),
        }
    }

    /// Parse a batch of reference strings, keeping only the valid ones.
    pub fn valid_references(&self, inputs: &[String], base: &Path) -> Vec<ModuleReference> {
        inputs
            .iter()
            .filter_map(|input| match ModuleReference::parse(input, base) {
                Ok(reference) => Some(reference),
                Err(err) => {
                    debug!(input = %input, error = %err, "Skipping invalid module reference");
                    None
                }
            })
            .collect()
    }

    /// Restore every reference not already materialized.
    ///
    /// Returns whether any work was done (pulls attempted or diagnostics
    /// recorded), so the caller knows a recompile could observe a change.
    /// Per-reference failures are stored, not raised.
    pub async fn restore(&self, references: &[ModuleReference]) -> bool {
        // Partition by registry, then keep only references the registry has
        // not materialized. Duplicates within a partition are dropped so a
        // reference is pulled at most once per batch.
        let mut pending: Vec<(&Registry, Vec<&ModuleReference>)> = Vec::new();
        for (registry, partition) in self.registries.partition(references) {
            let mut seen: HashSet<&ModuleReference> = HashSet::new();
            let mut missing: Vec<&ModuleReference> = Vec::new();
            for reference in partition {
                if !seen.insert(reference) {
                    continue;
                }
                if !registry.in_cache(reference) {
                    missing.push(reference);
                }
            }
            if !missing.is_empty() {
                pending.push((registry, missing));
            }
        }

        if pending.is_empty() {
            return false;
        }

        for (registry, missing) in pending {
            for reference in missing {
                if let ModuleReference::Oci(_) = reference {
                    if !self.config.registry_enabled {
                        self.record_error(reference, RestoreError::FeatureDisabled);
                        continue;
                    }
                }

                match registry.restore(reference).await {
                    Ok(()) => self.clear_error(reference),
                    Err(err) => {
                        warn!(reference = %reference, error = %err, "Module restore failed");
                        self.record_error(reference, err);
                    }
                }
            }
        }

        true
    }

    /// The diagnostic recorded for a reference in its last restore, if any.
    pub fn try_get_error(&self, reference: &ModuleReference) -> Option<RestoreError> {
        self.errors.lock().unwrap().get(reference).cloned()
    }

    /// The on-disk path backing a reference, if it is materialized.
    pub fn try_get_local_path(&self, reference: &ModuleReference) -> Option<PathBuf> {
        self.registries.dispatch(reference).local_path(reference)
    }

    fn record_error(&self, reference: &ModuleReference, error: RestoreError) {
        self.errors
            .lock()
            .unwrap()
            .insert(reference.clone(), error);
    }

    fn clear_error(&self, reference: &ModuleReference) {
        self.errors.lock().unwrap().remove(reference);
    }
}

#[async_trait::async_trait]
impl crate::scheduler::RestoreDispatch for ModuleDispatcher {
    async fn restore(&self, references: &[ModuleReference]) -> bool {
        ModuleDispatcher::restore(self, references).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFileResolver;
    use bicep_oci::{AnonymousCredential, InMemoryClientFactory, InMemoryRegistry};

    fn dispatcher(config: RestoreConfig) -> ModuleDispatcher {
        let factory = Arc::new(InMemoryClientFactory::new(InMemoryRegistry::new()));
        ModuleDispatcher::new(
            config,
            factory,
            Arc::new(AnonymousCredential),
            Arc::new(InMemoryFileResolver::new()),
        )
    }

    #[test]
    fn valid_references_filters_failures() {
        let root = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(RestoreConfig::new(root.path()));

        let inputs = vec![
            "oci:example.com/test/module:v1".to_string(),
            "fake:".to_string(),
            "./local.bicep".to_string(),
            "br:example.com/x:v1".to_string(),
        ];
        let valid = dispatcher.valid_references(&inputs, Path::new("/workspace"));
        assert_eq!(valid.len(), 2);
    }

    #[tokio::test]
    async fn restore_of_local_references_is_no_work() {
        let root = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(RestoreConfig::new(root.path()));

        let references =
            dispatcher.valid_references(&["./a.bicep".to_string()], Path::new("/workspace"));
        assert!(!dispatcher.restore(&references).await);
    }

    #[tokio::test]
    async fn feature_flag_rejects_registry_references() {
        let root = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(RestoreConfig::new(root.path()).with_registry_disabled());

        let references = dispatcher.valid_references(
            &["oci:example.com/test/module:v1".to_string()],
            Path::new("/workspace"),
        );
        assert!(dispatcher.restore(&references).await);
        assert_eq!(
            dispatcher.try_get_error(&references[0]),
            Some(RestoreError::FeatureDisabled)
        );
    }

    #[tokio::test]
    async fn missing_module_records_diagnostic() {
        let root = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(RestoreConfig::new(root.path()));

        let references = dispatcher.valid_references(
            &["oci:example.com/test/missing:v1".to_string()],
            Path::new("/workspace"),
        );
        assert!(dispatcher.restore(&references).await);
        assert!(matches!(
            dispatcher.try_get_error(&references[0]),
            Some(RestoreError::ModuleNotFound(_))
        ));
    }
}
