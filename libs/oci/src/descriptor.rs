//! OCI content descriptors.
//!
//! A descriptor is a pointer-with-integrity: media type, digest, size, and
//! optional annotations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::compute_digest;

/// Annotation key carrying the original file name of a layer.
pub const LAYER_TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// A content descriptor referencing a blob in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: String,
    /// Digest of the content (`sha256:<hex>`).
    pub digest: String,
    /// Size of the content in bytes.
    pub size: u64,
    /// Optional annotations. Omitted from the wire form when empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    /// Build a descriptor over a byte source, computing digest and size.
    pub fn from_bytes(
        media_type: impl Into<String>,
        data: &[u8],
        annotations: BTreeMap<String, String>,
    ) -> Self {
        Descriptor {
            media_type: media_type.into(),
            digest: compute_digest(data),
            size: data.len() as u64,
            annotations,
        }
    }

    /// The annotated file title, if one is present.
    pub fn title(&self) -> Option<&str> {
        self.annotations.get(LAYER_TITLE_ANNOTATION).map(String::as_str)
    }
}
