//! Content hashing with domain separation.
//!
//! Algorithm: SHA-256. Every digest is taken over a null-terminated domain
//! prefix followed by canonical bytes from [`super::encode`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A content-addressed hash, rendered as `"sha256:<hex>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Domain prefix for a whole entry state (args, kwargs, globals).
pub const DOMAIN_ENTRY_STATE: &[u8] = b"RECRASH::ENTRY_STATE::V1\0";

/// Compute the canonical hash of a byte slice with domain separation.
#[must_use]
pub fn canonical_hash(domain: &[u8], data: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    ContentHash(format!("sha256:{}", hex::encode(hasher.finalize())))
}
