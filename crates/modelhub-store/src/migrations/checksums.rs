//! Checksum helpers
//!
//! SHA256 over migration SQL (drift detection) and over stored model
//! content (corruption detection on load)

use sha2::{Digest, Sha256};

/// Compute SHA256 checksum of a string
pub fn compute_checksum(content: &str) -> String {
    content_checksum(content.as_bytes())
}

/// Compute SHA256 checksum of raw bytes, hex encoded
pub fn content_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
