//! Engine configuration.
//!
//! The feature flag and cache root are process-wide decisions made once at
//! startup and passed down explicitly; nothing in the engine reads ambient
//! state after construction.

use std::path::PathBuf;

use bicep_oci::MANIFEST_MEDIA_TYPE;

/// Environment variable gating OCI registry references.
pub const REGISTRY_FEATURE_VAR: &str = "BICEP_REGISTRY_ENABLED_EXPERIMENTAL";

/// Media type of the (empty) config blob every Bicep module artifact carries.
pub const MODULE_CONFIG_MEDIA_TYPE: &str = "application/vnd.ms.bicep.module.config.v1+json";

/// Media type given to published module layer blobs.
pub const MODULE_LAYER_MEDIA_TYPE: &str = "application/vnd.ms.bicep.module.layer.v1+json";

/// Process-wide restore engine configuration.
#[derive(Debug, Clone)]
pub struct RestoreConfig {
    /// Whether OCI registry references are enabled.
    pub registry_enabled: bool,
    /// Root directory of the local artifact cache.
    pub cache_root: PathBuf,
    /// Media type required of a module artifact's config descriptor.
    pub module_config_media_type: String,
    /// Media type used for module manifest upload and Accept headers.
    pub module_manifest_media_type: String,
}

impl RestoreConfig {
    /// Build a config with the registry feature enabled.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            registry_enabled: true,
            cache_root: cache_root.into(),
            module_config_media_type: MODULE_CONFIG_MEDIA_TYPE.to_string(),
            module_manifest_media_type: MANIFEST_MEDIA_TYPE.to_string(),
        }
    }

    /// Build a config from the environment.
    ///
    /// `BICEP_REGISTRY_ENABLED_EXPERIMENTAL=true` enables registry
    /// references; anything else (including unset) leaves them disabled.
    pub fn from_env(cache_root: impl Into<PathBuf>) -> Self {
        let registry_enabled = std::env::var(REGISTRY_FEATURE_VAR)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            registry_enabled,
            ..Self::new(cache_root)
        }
    }

    /// Disable the registry feature.
    pub fn with_registry_disabled(mut self) -> Self {
        self.registry_enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_enables_registry() {
        let config = RestoreConfig::new("/tmp/cache");
        assert!(config.registry_enabled);
        assert_eq!(config.cache_root, PathBuf::from("/tmp/cache"));
        assert_eq!(config.module_manifest_media_type, MANIFEST_MEDIA_TYPE);
    }

    #[test]
    fn with_registry_disabled() {
        let config = RestoreConfig::new("/tmp/cache").with_registry_disabled();
        assert!(!config.registry_enabled);
    }
}
