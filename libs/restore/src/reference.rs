//! Module reference model and parser.
//!
//! A Bicep file references modules in two schemes: a relative filesystem
//! path (`./storage.bicep`) or an OCI artifact coordinate
//! (`oci:example.com/modules/storage:v1`).

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{RestoreError, Result};

/// Scheme prefix for registry references.
pub const OCI_SCHEME: &str = "oci";

/// A reference to a module, by path or by registry coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleReference {
    Local(LocalModuleReference),
    Oci(OciModuleReference),
}

/// A module on the local filesystem, resolved against the referring file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalModuleReference {
    /// Absolute path to the referenced file.
    pub path: PathBuf,
}

/// A module in an OCI registry.
///
/// Equality is case-sensitive on all three components; host-name
/// normalization happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OciModuleReference {
    /// Registry DNS host.
    pub registry: String,
    /// Repository path; may contain slashes.
    pub repository: String,
    /// Tag, the substring after the final `:`.
    pub tag: String,
}

impl ModuleReference {
    /// Parse a reference as it appears in a Bicep file.
    ///
    /// `base` is the directory of the referring file; local references are
    /// joined against it.
    pub fn parse(input: &str, base: &Path) -> Result<Self> {
        match split_scheme(input) {
            None => Ok(ModuleReference::Local(LocalModuleReference {
                path: normalize(&base.join(input)),
            })),
            Some((scheme, rest)) => {
                if rest.is_empty() {
                    return Err(RestoreError::Malformed(input.to_string()));
                }
                if scheme != OCI_SCHEME {
                    return Err(RestoreError::UnsupportedTarget(input.to_string()));
                }
                parse_oci_body(input, rest).map(ModuleReference::Oci)
            }
        }
    }

    /// Parse a publish target, where only the OCI scheme is valid.
    pub fn parse_oci(input: &str) -> Result<OciModuleReference> {
        match split_scheme(input) {
            Some((scheme, rest)) if scheme == OCI_SCHEME => {
                if rest.is_empty() {
                    return Err(RestoreError::Malformed(input.to_string()));
                }
                parse_oci_body(input, rest)
            }
            Some((_, rest)) if rest.is_empty() => Err(RestoreError::Malformed(input.to_string())),
            _ => Err(RestoreError::UnsupportedTarget(input.to_string())),
        }
    }
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleReference::Local(local) => write!(f, "{}", local.path.display()),
            ModuleReference::Oci(oci) => write!(f, "{oci}"),
        }
    }
}

impl fmt::Display for OciModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}:{}",
            OCI_SCHEME, self.registry, self.repository, self.tag
        )
    }
}

/// Split a scheme prefix off the input, if one is present.
///
/// Relative paths and strings whose first `:` comes after a path separator
/// have no scheme. The scheme segment must be alphabetic.
fn split_scheme(input: &str) -> Option<(&str, &str)> {
    if input.starts_with("./") || input.starts_with("../") {
        return None;
    }
    let (scheme, rest) = input.split_once(':')?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((scheme, rest))
}

/// Parse `<host>/<repo>[/<repo>…]:<tag>`, the body after `oci:`.
fn parse_oci_body(original: &str, body: &str) -> Result<OciModuleReference> {
    let malformed = || RestoreError::Malformed(original.to_string());

    let (host_and_repo, tag) = body.rsplit_once(':').ok_or_else(malformed)?;
    if tag.is_empty() || tag.contains('/') {
        return Err(malformed());
    }

    let (registry, repository) = host_and_repo.split_once('/').ok_or_else(malformed)?;
    if !is_dns_name(registry) {
        return Err(malformed());
    }
    if repository.is_empty() || repository.split('/').any(str::is_empty) {
        return Err(malformed());
    }

    Ok(OciModuleReference {
        registry: registry.to_string(),
        repository: repository.to_string(),
        tag: tag.to_string(),
    })
}

/// A host is a dot-separated sequence of non-empty labels made of
/// alphanumerics and dashes.
fn is_dns_name(host: &str) -> bool {
    !host.is_empty()
        && host.split('.').all(|label| {
            !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Lexically collapse `.` and `..` components so equal references compare
/// equal regardless of how the referring file spelled the path.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}
