//! OCI image-manifest v1 codec.
//!
//! Bicep modules use a single manifest shape: schema version 2, one config
//! descriptor, and an ordered list of layer descriptors. Encoding keeps a
//! stable field order so the manifest digest is reproducible; decoding
//! tolerates unknown fields but rejects missing required ones.

use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::error::OciError;

/// Media type of the manifest document itself.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// An OCI image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version, always 2.
    pub schema_version: u8,
    /// Config descriptor.
    pub config: Descriptor,
    /// Layer descriptors in artifact order.
    pub layers: Vec<Descriptor>,
}

impl Manifest {
    /// Compose a manifest at schema version 2.
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Manifest {
            schema_version: 2,
            config,
            layers,
        }
    }

    /// Encode to canonical JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, OciError> {
        serde_json::to_vec(self).map_err(|e| OciError::InvalidManifest(e.to_string()))
    }

    /// Decode from JSON bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, OciError> {
        serde_json::from_slice(data).map_err(|e| OciError::InvalidManifest(e.to_string()))
    }
}
