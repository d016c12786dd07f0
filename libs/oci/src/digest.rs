//! SHA-256 content digests.
//!
//! Every piece of registry content is addressed by `sha256:<64 hex chars>`.

use sha2::{Digest, Sha256};

/// The only digest algorithm this profile uses.
pub const DIGEST_ALGORITHM: &str = "sha256";

/// Compute the digest of a byte source, formatted `sha256:<lowercase-hex>`.
pub fn compute_digest(data: &[u8]) -> String {
    format!("{}:{}", DIGEST_ALGORITHM, hex::encode(Sha256::digest(data)))
}

/// Strip the algorithm prefix, returning the hex suffix.
///
/// A digest without a `:` separator is returned unchanged.
pub fn trim_digest(digest: &str) -> &str {
    match digest.split_once(':') {
        Some((_, hex)) => hex,
        None => digest,
    }
}
